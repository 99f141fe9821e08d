//! Neuron, block, and statement parsers (keyword-dispatched).

use super::expr::{parse_expr, split_primes};
use super::types::{at_datatype, parse_datatype};
use super::{ParseError, TokenStream};
use nestml_ast::{
    BinaryOp, BlockKind, DeclBlock, Declaration, Equation, EquationsBlock, Expr, ExprKind, ForStmt,
    FunctionDef, IfStmt, InputBlock, InputPort, Neuron, OdeEquation, OdeShape, OutputBlock,
    PortKind, Stmt, UpdateBlock,
};
use nestml_lexer::Token;

/// Parse every neuron in a token stream.
///
/// Recovery is best-effort: on error the stream synchronizes to the next
/// `end` or `neuron` keyword, so one malformed neuron does not hide the
/// diagnostics of its siblings.
pub fn parse_neurons(stream: &mut TokenStream) -> (Vec<Neuron>, Vec<ParseError>) {
    let mut neurons = Vec::new();
    let mut errors = Vec::new();

    loop {
        stream.skip_separators();
        if stream.at_end() {
            break;
        }

        match stream.peek() {
            Some(Token::Neuron) => match parse_neuron(stream) {
                Ok(neuron) => neurons.push(neuron),
                Err(e) => {
                    errors.push(e);
                    stream.synchronize();
                }
            },
            other => {
                errors.push(ParseError::unexpected_token(
                    other,
                    "at top level; expected 'neuron'",
                    stream.current_span(),
                ));
                stream.synchronize();
            }
        }
    }

    (neurons, errors)
}

/// Parse one `neuron <name>: ... end` declaration.
fn parse_neuron(stream: &mut TokenStream) -> Result<Neuron, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Neuron)?;
    let (name, _) = stream.expect_ident("after 'neuron'")?;
    stream.expect(Token::Colon)?;
    stream.skip_separators();

    let mut neuron = Neuron::new(name, stream.current_span());

    loop {
        stream.skip_separators();
        match stream.peek() {
            Some(Token::End) => {
                stream.advance();
                break;
            }
            Some(Token::State) => {
                let block = parse_decl_block(stream, Token::State, BlockKind::State)?;
                neuron.state_blocks.push(block);
            }
            Some(Token::InitialValues) => {
                let block =
                    parse_decl_block(stream, Token::InitialValues, BlockKind::InitialValues)?;
                neuron.initial_blocks.push(block);
            }
            Some(Token::Parameters) => {
                let block = parse_decl_block(stream, Token::Parameters, BlockKind::Parameters)?;
                neuron.parameter_blocks.push(block);
            }
            Some(Token::Internals) => {
                let block = parse_decl_block(stream, Token::Internals, BlockKind::Internals)?;
                neuron.internal_blocks.push(block);
            }
            Some(Token::Equations) => neuron.equations_blocks.push(parse_equations(stream)?),
            Some(Token::Input) => neuron.input_blocks.push(parse_input(stream)?),
            Some(Token::Output) => neuron.output_blocks.push(parse_output(stream)?),
            Some(Token::Update) => neuron.update_blocks.push(parse_update(stream)?),
            Some(Token::Function) => neuron.functions.push(parse_function(stream)?),
            other => {
                return Err(ParseError::unexpected_token(
                    other,
                    "in neuron body; expected a block or 'end'",
                    stream.current_span(),
                ));
            }
        }
    }

    neuron.span = stream.span_from(start);
    Ok(neuron)
}

/// Parse a declaration block (`state:`, `parameters:`, ...).
fn parse_decl_block(
    stream: &mut TokenStream,
    keyword: Token,
    kind: BlockKind,
) -> Result<DeclBlock, ParseError> {
    let start = stream.current_pos();
    stream.expect(keyword)?;
    stream.expect(Token::Colon)?;
    stream.skip_separators();

    let mut declarations = Vec::new();
    loop {
        stream.skip_separators();
        if matches!(stream.peek(), Some(Token::End)) {
            stream.advance();
            break;
        }
        declarations.push(parse_declaration(stream)?);
        stream.expect_separator()?;
    }

    Ok(DeclBlock {
        kind,
        declarations,
        span: stream.span_from(start),
    })
}

/// Parse a declaration line:
/// `[recordable] [function] name (',' name)* datatype ['=' expr]`.
fn parse_declaration(stream: &mut TokenStream) -> Result<Declaration, ParseError> {
    let start = stream.current_pos();

    let recordable = if matches!(stream.peek(), Some(Token::Recordable)) {
        stream.advance();
        true
    } else {
        false
    };

    let is_alias = if matches!(stream.peek(), Some(Token::Function)) {
        stream.advance();
        true
    } else {
        false
    };

    let mut names = Vec::new();
    names.push(expect_declaration_name(stream)?);
    while matches!(stream.peek(), Some(Token::Comma)) {
        stream.advance();
        names.push(expect_declaration_name(stream)?);
    }

    let datatype = parse_datatype(stream)?;

    let initializer = if matches!(stream.peek(), Some(Token::Eq)) {
        stream.advance();
        Some(parse_expr(stream)?)
    } else {
        None
    };

    Ok(Declaration {
        names,
        datatype,
        initializer,
        recordable,
        is_alias,
        ty: None,
        span: stream.span_from(start),
    })
}

/// Expect a declarable name: a plain identifier or a primed one.
///
/// `initial_values` declares initial values per derivative order
/// (`g_ex' nS/ms = 0 nS/ms`), so primed names are legal here; the raw
/// text including primes is the symbol name.
fn expect_declaration_name(stream: &mut TokenStream) -> Result<String, ParseError> {
    let span = stream.current_span();
    match stream.advance() {
        Some(Token::Ident(name)) => Ok(name.clone()),
        Some(Token::DerivedIdent(raw)) => Ok(raw.clone()),
        other => Err(ParseError::unexpected_token(
            other,
            "at variable declaration",
            span,
        )),
    }
}

/// Parse an `equations:` block.
///
/// Entries: `shape f[''] = expr`, `x' = expr`, or `function a <dt> = expr`.
fn parse_equations(stream: &mut TokenStream) -> Result<EquationsBlock, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Equations)?;
    stream.expect(Token::Colon)?;
    stream.skip_separators();

    let mut equations = Vec::new();
    loop {
        stream.skip_separators();
        match stream.peek() {
            Some(Token::End) => {
                stream.advance();
                break;
            }
            Some(Token::Shape) => {
                let entry_start = stream.current_pos();
                stream.advance();

                let span = stream.current_span();
                let (name, order) = match stream.advance() {
                    Some(Token::Ident(name)) => (name.clone(), 0),
                    Some(Token::DerivedIdent(raw)) => split_primes(raw),
                    other => {
                        return Err(ParseError::unexpected_token(other, "after 'shape'", span));
                    }
                };

                stream.expect(Token::Eq)?;
                let rhs = parse_expr(stream)?;
                stream.expect_separator()?;

                equations.push(Equation::Shape(OdeShape {
                    name,
                    order,
                    rhs,
                    span: stream.span_from(entry_start),
                }));
            }
            Some(Token::Function) => {
                let decl = parse_declaration(stream)?;
                stream.expect_separator()?;
                equations.push(Equation::Alias(decl));
            }
            Some(Token::DerivedIdent(_)) => {
                let entry_start = stream.current_pos();
                let span = stream.current_span();
                let (name, order) = match stream.advance() {
                    Some(Token::DerivedIdent(raw)) => split_primes(raw),
                    other => {
                        return Err(ParseError::unexpected_token(other, "in equations", span));
                    }
                };

                stream.expect(Token::Eq)?;
                let rhs = parse_expr(stream)?;
                stream.expect_separator()?;

                equations.push(Equation::Ode(OdeEquation {
                    name,
                    order,
                    rhs,
                    span: stream.span_from(entry_start),
                }));
            }
            other => {
                return Err(ParseError::unexpected_token(
                    other,
                    "in equations block; expected shape, ODE, or function alias",
                    stream.current_span(),
                ));
            }
        }
    }

    Ok(EquationsBlock {
        equations,
        span: stream.span_from(start),
    })
}

/// Parse an `input:` block of port declarations.
fn parse_input(stream: &mut TokenStream) -> Result<InputBlock, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Input)?;
    stream.expect(Token::Colon)?;
    stream.skip_separators();

    let mut ports = Vec::new();
    loop {
        stream.skip_separators();
        if matches!(stream.peek(), Some(Token::End)) {
            stream.advance();
            break;
        }
        ports.push(parse_port(stream)?);
        stream.expect_separator()?;
    }

    Ok(InputBlock {
        ports,
        span: stream.span_from(start),
    })
}

/// Parse one input port:
/// `name [datatype] <- [inhibitory|excitatory]* (spike | current)`.
fn parse_port(stream: &mut TokenStream) -> Result<InputPort, ParseError> {
    let start = stream.current_pos();
    let (name, _) = stream.expect_ident("at input port")?;

    let datatype = if matches!(stream.peek(), Some(Token::LeftArrow)) {
        None
    } else if at_datatype(stream) {
        Some(parse_datatype(stream)?)
    } else {
        None
    };

    stream.expect(Token::LeftArrow)?;

    let mut inhibitory = false;
    let mut excitatory = false;
    loop {
        match stream.peek() {
            Some(Token::Inhibitory) => {
                stream.advance();
                inhibitory = true;
            }
            Some(Token::Excitatory) => {
                stream.advance();
                excitatory = true;
            }
            _ => break,
        }
    }

    let kind = match stream.peek() {
        Some(Token::Spike) => {
            stream.advance();
            PortKind::Spike {
                inhibitory,
                excitatory,
            }
        }
        Some(Token::Current) => {
            if inhibitory || excitatory {
                return Err(ParseError::invalid_syntax(
                    "current ports accept no inhibitory/excitatory modifier",
                    stream.current_span(),
                ));
            }
            stream.advance();
            PortKind::Current
        }
        other => {
            return Err(ParseError::unexpected_token(
                other,
                "after '<-'; expected 'spike' or 'current'",
                stream.current_span(),
            ));
        }
    };

    Ok(InputPort {
        name,
        datatype,
        kind,
        ty: None,
        span: stream.span_from(start),
    })
}

/// Parse `output: spike`.
fn parse_output(stream: &mut TokenStream) -> Result<OutputBlock, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Output)?;
    stream.expect(Token::Colon)?;
    stream.expect(Token::Spike)?;
    stream.expect_separator()?;

    Ok(OutputBlock {
        span: stream.span_from(start),
    })
}

/// Parse the `update:` block.
fn parse_update(stream: &mut TokenStream) -> Result<UpdateBlock, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Update)?;
    stream.expect(Token::Colon)?;
    stream.skip_separators();

    let statements = parse_stmts(stream)?;
    stream.expect(Token::End)?;

    Ok(UpdateBlock {
        statements,
        span: stream.span_from(start),
    })
}

/// Parse a user-defined function:
/// `function name(p1 dt1, ...) [dt]: body end`.
fn parse_function(stream: &mut TokenStream) -> Result<FunctionDef, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Function)?;
    let (name, _) = stream.expect_ident("after 'function'")?;
    stream.expect(Token::LParen)?;

    let mut params = Vec::new();
    while !matches!(stream.peek(), Some(Token::RParen)) {
        let (param, _) = stream.expect_ident("at function parameter")?;
        let datatype = parse_datatype(stream)?;
        params.push((param, datatype));
        if matches!(stream.peek(), Some(Token::RParen)) {
            break;
        }
        stream.expect(Token::Comma)?;
    }
    stream.expect(Token::RParen)?;

    let return_type = if matches!(stream.peek(), Some(Token::Colon)) {
        None
    } else {
        Some(parse_datatype(stream)?)
    };

    stream.expect(Token::Colon)?;
    stream.skip_separators();

    let body = parse_stmts(stream)?;
    stream.expect(Token::End)?;

    Ok(FunctionDef {
        name,
        params,
        return_type,
        body,
        span: stream.span_from(start),
    })
}

/// Parse statements until `end`, `elif`, or `else` (not consumed).
fn parse_stmts(stream: &mut TokenStream) -> Result<Vec<Stmt>, ParseError> {
    let mut statements = Vec::new();

    loop {
        stream.skip_separators();
        match stream.peek() {
            None | Some(Token::End) | Some(Token::Elif) | Some(Token::Else) => break,
            Some(Token::If) => statements.push(parse_if(stream)?),
            Some(Token::For) => statements.push(parse_for(stream)?),
            Some(Token::Return) => {
                let start = stream.current_pos();
                stream.advance();
                let value = if stream.at_separator()
                    || matches!(stream.peek(), Some(Token::End) | None)
                {
                    None
                } else {
                    Some(parse_expr(stream)?)
                };
                stream.expect_separator()?;
                statements.push(Stmt::Return {
                    value,
                    span: stream.span_from(start),
                });
            }
            Some(Token::Recordable) => {
                let decl = parse_declaration(stream)?;
                stream.expect_separator()?;
                statements.push(Stmt::Declaration(decl));
            }
            Some(Token::Ident(_)) | Some(Token::DerivedIdent(_)) => {
                statements.push(parse_simple_stmt(stream)?);
            }
            other => {
                return Err(ParseError::unexpected_token(
                    other,
                    "in statement position",
                    stream.current_span(),
                ));
            }
        }
    }

    Ok(statements)
}

/// Parse a statement that starts with an identifier: assignment, local
/// declaration, or expression statement.
fn parse_simple_stmt(stream: &mut TokenStream) -> Result<Stmt, ParseError> {
    let start = stream.current_pos();

    // Assignment: ident or derived ident directly followed by an
    // assignment operator.
    let assign_op = match (stream.peek(), stream.peek_nth(1)) {
        (Some(Token::Ident(_)) | Some(Token::DerivedIdent(_)), Some(op)) => match op {
            Token::Eq => Some(None),
            Token::PlusEq => Some(Some(BinaryOp::Add)),
            Token::MinusEq => Some(Some(BinaryOp::Sub)),
            Token::StarEq => Some(Some(BinaryOp::Mul)),
            Token::SlashEq => Some(Some(BinaryOp::Div)),
            _ => None,
        },
        _ => None,
    };

    if let Some(compound) = assign_op {
        let lhs_span = stream.current_span();
        let (name, order) = match stream.advance() {
            Some(Token::Ident(name)) => (name.clone(), 0),
            Some(Token::DerivedIdent(raw)) => split_primes(raw),
            other => {
                return Err(ParseError::unexpected_token(other, "at assignment", lhs_span));
            }
        };
        let lhs = Expr::new(
            ExprKind::Variable {
                name,
                order,
                symbol: None,
            },
            lhs_span,
        );
        stream.advance(); // assignment operator
        let rhs = parse_expr(stream)?;
        stream.expect_separator()?;

        // `x += e` desugars to `x = x + e`
        let rhs = match compound {
            Some(op) => {
                let span = rhs.span;
                Expr::binary(op, lhs.clone(), rhs, span)
            }
            None => rhs,
        };

        return Ok(Stmt::Assignment {
            lhs,
            rhs,
            span: stream.span_from(start),
        });
    }

    // Local declaration: `name [, name]* datatype [= expr]`
    let is_declaration = match (stream.peek(), stream.peek_nth(1)) {
        (Some(Token::Ident(_)), Some(Token::Comma))
        | (Some(Token::Ident(_)), Some(Token::Ident(_)))
        | (Some(Token::Ident(_)), Some(Token::Integer(1))) => true,
        _ => false,
    };

    if is_declaration {
        let decl = parse_declaration(stream)?;
        stream.expect_separator()?;
        return Ok(Stmt::Declaration(decl));
    }

    // Expression statement (function call)
    let expr = parse_expr(stream)?;
    stream.expect_separator()?;
    Ok(Stmt::Expr(expr))
}

/// Parse an `if`/`elif`/`else` chain.
fn parse_if(stream: &mut TokenStream) -> Result<Stmt, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::If)?;

    let mut branches = Vec::new();
    let condition = parse_expr(stream)?;
    stream.expect(Token::Colon)?;
    stream.skip_separators();
    branches.push((condition, parse_stmts(stream)?));

    let mut else_branch = None;
    loop {
        match stream.peek() {
            Some(Token::Elif) => {
                stream.advance();
                let condition = parse_expr(stream)?;
                stream.expect(Token::Colon)?;
                stream.skip_separators();
                branches.push((condition, parse_stmts(stream)?));
            }
            Some(Token::Else) => {
                stream.advance();
                stream.expect(Token::Colon)?;
                stream.skip_separators();
                else_branch = Some(parse_stmts(stream)?);
                break;
            }
            _ => break,
        }
    }

    stream.expect(Token::End)?;
    stream.expect_separator()?;

    Ok(Stmt::If(IfStmt {
        branches,
        else_branch,
        span: stream.span_from(start),
    }))
}

/// Parse a `for x in a ... b [step s]:` loop.
fn parse_for(stream: &mut TokenStream) -> Result<Stmt, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::For)?;
    let (variable, _) = stream.expect_ident("after 'for'")?;
    stream.expect(Token::In)?;
    let from = parse_expr(stream)?;
    stream.expect(Token::Ellipsis)?;
    let to = parse_expr(stream)?;

    let step = if matches!(stream.peek(), Some(Token::Step)) {
        stream.advance();
        Some(parse_expr(stream)?)
    } else {
        None
    };

    stream.expect(Token::Colon)?;
    stream.skip_separators();
    let body = parse_stmts(stream)?;
    stream.expect(Token::End)?;
    stream.expect_separator()?;

    Ok(Stmt::For(ForStmt {
        variable,
        from,
        to,
        step,
        body,
        span: stream.span_from(start),
    }))
}
