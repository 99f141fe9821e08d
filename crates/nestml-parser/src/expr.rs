//! Expression parser: Pratt precedence climbing.

use super::{ParseError, TokenStream};
use nestml_ast::{BinaryOp, Expr, ExprKind, LiteralValue, UnaryOp};
use nestml_lexer::Token;

/// Binary operator metadata: (precedence, operator).
///
/// All listed operators are left-associative; power is handled separately
/// (right-associative, binds tighter than unary minus on its left operand).
fn binary_op_info(token: &Token) -> Option<(u8, BinaryOp)> {
    match token {
        Token::Or => Some((10, BinaryOp::Or)),
        Token::And => Some((20, BinaryOp::And)),
        Token::EqEq => Some((30, BinaryOp::Eq)),
        Token::BangEq => Some((30, BinaryOp::Ne)),
        Token::Lt => Some((30, BinaryOp::Lt)),
        Token::LtEq => Some((30, BinaryOp::Le)),
        Token::Gt => Some((30, BinaryOp::Gt)),
        Token::GtEq => Some((30, BinaryOp::Ge)),
        Token::Plus => Some((40, BinaryOp::Add)),
        Token::Minus => Some((40, BinaryOp::Sub)),
        Token::Star => Some((50, BinaryOp::Mul)),
        Token::Slash => Some((50, BinaryOp::Div)),
        Token::Percent => Some((50, BinaryOp::Mod)),
        _ => None,
    }
}

/// Parse a full expression (ternary conditional is the loosest form).
pub fn parse_expr(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let condition = parse_pratt(stream, 0)?;

    if matches!(stream.peek(), Some(Token::Question)) {
        stream.advance();
        let then_expr = parse_expr(stream)?;
        stream.expect(Token::Colon)?;
        let else_expr = parse_expr(stream)?;
        let span = stream.span_from(start);
        return Ok(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ));
    }

    Ok(condition)
}

/// Pratt parser: binary operators with precedence climbing.
fn parse_pratt(stream: &mut TokenStream, min_prec: u8) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let mut left = parse_unary(stream)?;

    while let Some(token) = stream.peek() {
        if let Some((prec, op)) = binary_op_info(token) {
            if prec < min_prec {
                break;
            }

            stream.advance();
            let right = parse_pratt(stream, prec + 1)?;

            let span = stream.span_from(start);
            left = Expr::binary(op, left, right, span);
        } else {
            break;
        }
    }

    Ok(left)
}

/// Parse prefix operators.
fn parse_unary(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();

    let op = match stream.peek() {
        Some(Token::Minus) => Some(UnaryOp::Neg),
        Some(Token::Plus) => Some(UnaryOp::Pos),
        Some(Token::Not) => Some(UnaryOp::Not),
        _ => None,
    };

    if let Some(op) = op {
        stream.advance();
        let operand = parse_unary(stream)?;
        let span = stream.span_from(start);
        return Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ));
    }

    parse_power(stream)
}

/// Parse `base ** exponent` (right-associative; the exponent may itself
/// carry a sign, as in `2 ** -3`).
fn parse_power(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let base = parse_atom(stream)?;

    if matches!(stream.peek(), Some(Token::StarStar)) {
        stream.advance();
        let exponent = parse_unary(stream)?;
        let span = stream.span_from(start);
        return Ok(Expr::binary(BinaryOp::Pow, base, exponent, span));
    }

    Ok(base)
}

/// Parse atoms: literals, variables, calls, parenthesized expressions.
fn parse_atom(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();

    match stream.peek() {
        Some(Token::Integer(_)) | Some(Token::Float(_)) => parse_numeric_literal(stream),
        Some(Token::True) => {
            stream.advance();
            Ok(Expr::new(ExprKind::BoolLiteral(true), stream.span_from(start)))
        }
        Some(Token::False) => {
            stream.advance();
            Ok(Expr::new(
                ExprKind::BoolLiteral(false),
                stream.span_from(start),
            ))
        }
        Some(Token::String(_)) => {
            let span = stream.current_span();
            match stream.advance() {
                Some(Token::String(s)) => {
                    Ok(Expr::new(ExprKind::StringLiteral(s.clone()), span))
                }
                other => Err(ParseError::unexpected_token(other, "string literal", span)),
            }
        }
        Some(Token::Ident(_)) => {
            // Call if followed by '(' without a separator in between
            if matches!(stream.peek_nth(1), Some(Token::LParen)) {
                parse_call(stream)
            } else {
                let (name, _) = stream.expect_ident("in expression")?;
                Ok(Expr::new(
                    ExprKind::Variable {
                        name,
                        order: 0,
                        symbol: None,
                    },
                    stream.span_from(start),
                ))
            }
        }
        Some(Token::DerivedIdent(_)) => {
            let span = stream.current_span();
            match stream.advance() {
                Some(Token::DerivedIdent(raw)) => {
                    let (name, order) = split_primes(raw);
                    Ok(Expr::new(
                        ExprKind::Variable {
                            name,
                            order,
                            symbol: None,
                        },
                        span,
                    ))
                }
                other => Err(ParseError::unexpected_token(other, "in expression", span)),
            }
        }
        Some(Token::LParen) => {
            stream.advance();
            let mut expr = parse_expr(stream)?;
            stream.expect(Token::RParen)?;
            expr.span = stream.span_from(start);
            Ok(expr)
        }
        other => Err(ParseError::unexpected_token(
            other,
            "in expression",
            stream.current_span(),
        )),
    }
}

/// Parse a numeric literal, with an optional trailing unit symbol.
///
/// Juxtaposition is never valid NESTML except for unit-typed literals, so
/// an identifier directly after a number is its unit symbol — unless it
/// opens a call, which can only be a syntax error downstream.
fn parse_numeric_literal(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let span = stream.current_span();

    let value = match stream.advance() {
        Some(Token::Integer(n)) => LiteralValue::Integer(*n),
        Some(Token::Float(x)) => LiteralValue::Float(*x),
        other => {
            return Err(ParseError::unexpected_token(other, "numeric literal", span));
        }
    };

    let unit = match (stream.peek(), stream.peek_nth(1)) {
        (Some(Token::Ident(name)), next) if !matches!(next, Some(Token::LParen)) => {
            let name = name.clone();
            stream.advance();
            Some(name)
        }
        _ => None,
    };

    Ok(Expr::literal(value, unit, stream.span_from(start)))
}

/// Parse a function call.
fn parse_call(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let (name, _) = stream.expect_ident("at function call")?;
    stream.expect(Token::LParen)?;

    let mut args = Vec::new();
    while !matches!(stream.peek(), Some(Token::RParen)) {
        args.push(parse_expr(stream)?);
        if matches!(stream.peek(), Some(Token::RParen)) {
            break;
        }
        stream.expect(Token::Comma)?;
    }
    stream.expect(Token::RParen)?;

    Ok(Expr::new(
        ExprKind::Call { name, args },
        stream.span_from(start),
    ))
}

/// Split a derived identifier into base name and differential order.
pub fn split_primes(raw: &str) -> (String, u32) {
    let order = raw.chars().rev().take_while(|&c| c == '\'').count() as u32;
    (raw[..raw.len() - order as usize].to_string(), order)
}
