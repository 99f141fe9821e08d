//! Datatype and unit expression parsers.

use super::{ParseError, TokenStream};
use nestml_ast::{DataTypeExpr, UnitExpr};
use nestml_lexer::Token;

/// True if the current token can start a datatype.
pub fn at_datatype(stream: &TokenStream) -> bool {
    matches!(
        stream.peek(),
        Some(Token::Ident(_)) | Some(Token::Integer(1)) | Some(Token::LParen)
    )
}

/// Parse a datatype: a primitive name or a physical unit expression.
///
/// Grammar:
/// ```text
/// datatype  := 'real' | 'integer' | 'boolean' | 'string' | 'void' | unit_expr
/// unit_expr := unit_term (('*' | '/') unit_term)*
/// unit_term := unit_atom ('**' ['-'] integer)?
/// unit_atom := identifier | '1' | '(' unit_expr ')'
/// ```
///
/// The primitive names are ordinary identifiers to the lexer; they are
/// recognized here so that unit symbols stay an open set.
pub fn parse_datatype(stream: &mut TokenStream) -> Result<DataTypeExpr, ParseError> {
    if let Some(Token::Ident(name)) = stream.peek() {
        let primitive = match name.as_str() {
            "real" => Some(DataTypeExpr::Real),
            "integer" => Some(DataTypeExpr::Integer),
            "boolean" => Some(DataTypeExpr::Boolean),
            "string" => Some(DataTypeExpr::String),
            "void" => Some(DataTypeExpr::Void),
            _ => None,
        };
        if let Some(primitive) = primitive {
            stream.advance();
            return Ok(primitive);
        }
    }

    Ok(DataTypeExpr::Unit(parse_unit_expr(stream)?))
}

/// Parse a unit expression (`mV`, `nS/ms`, `1/ms`, `mV**2`).
pub fn parse_unit_expr(stream: &mut TokenStream) -> Result<UnitExpr, ParseError> {
    let mut left = parse_unit_power(stream)?;

    while matches!(stream.peek(), Some(Token::Star) | Some(Token::Slash)) {
        let is_mul = matches!(stream.peek(), Some(Token::Star));
        stream.advance();

        let right = parse_unit_power(stream)?;

        left = if is_mul {
            UnitExpr::Multiply(Box::new(left), Box::new(right))
        } else {
            UnitExpr::Divide(Box::new(left), Box::new(right))
        };
    }

    Ok(left)
}

/// Parse a unit atom with an optional integer power.
fn parse_unit_power(stream: &mut TokenStream) -> Result<UnitExpr, ParseError> {
    let base = parse_unit_atom(stream)?;

    if matches!(stream.peek(), Some(Token::StarStar)) {
        stream.advance();

        let negative = if matches!(stream.peek(), Some(Token::Minus)) {
            stream.advance();
            true
        } else {
            false
        };

        let span = stream.current_span();
        let exponent = match stream.advance() {
            Some(Token::Integer(n)) => *n as i32,
            other => {
                return Err(ParseError::unexpected_token(other, "unit exponent", span));
            }
        };

        let exponent = if negative { -exponent } else { exponent };
        return Ok(UnitExpr::Power(Box::new(base), exponent));
    }

    Ok(base)
}

/// Parse a base unit symbol, the `1` numerator, or a parenthesized
/// unit expression.
fn parse_unit_atom(stream: &mut TokenStream) -> Result<UnitExpr, ParseError> {
    match stream.peek() {
        Some(Token::LParen) => {
            stream.advance();
            let expr = parse_unit_expr(stream)?;
            stream.expect(Token::RParen)?;
            Ok(expr)
        }
        Some(Token::Integer(1)) => {
            stream.advance();
            Ok(UnitExpr::One)
        }
        Some(Token::Ident(name)) => {
            let unit_name = name.clone();
            stream.advance();
            Ok(UnitExpr::Base(unit_name))
        }
        other => Err(ParseError::unexpected_token(
            other,
            "in unit expression",
            stream.current_span(),
        )),
    }
}
