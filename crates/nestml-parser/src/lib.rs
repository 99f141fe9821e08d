//! Hand-written recursive descent parser for NESTML.
//!
//! ## Architecture
//!
//! - [`stream`]: `TokenStream` wrapper with lookahead over
//!   `(Token, byte span)` pairs
//! - [`error`]: `ParseError` and conversion into pipeline diagnostics
//! - [`expr`]: expression parser (Pratt precedence climbing)
//! - [`types`]: datatype and unit expression parsers
//! - [`decl`]: neuron, block, and statement parsers
//!
//! The parser is best-effort: on a malformed construct it records an error
//! and synchronizes to the next `end` or `neuron` keyword, returning the
//! partial AST alongside every error found.

mod decl;
mod error;
mod expr;
mod stream;
mod types;

pub use error::{ParseError, ParseErrorKind};
use stream::TokenStream;

use nestml_ast::{CompilationUnit, Expr, Span};
use nestml_lexer::Token;
use std::ops::Range;
use std::path::Path;

/// Parse a lexed source file into a compilation unit.
///
/// `package_name` and `artifact_name` are derived from `path` relative to
/// the optional model root (see [`derive_unit_names`]). On failure the
/// partial unit is returned together with every recognition error.
pub fn parse_compilation_unit(
    tokens: &[(Token, Range<usize>)],
    file_id: u16,
    path: &Path,
    model_root: Option<&Path>,
) -> (CompilationUnit, Vec<ParseError>) {
    let mut stream = TokenStream::new(tokens, file_id);
    let (neurons, errors) = decl::parse_neurons(&mut stream);

    let (package_name, artifact_name) = derive_unit_names(path, model_root);
    let span = if tokens.is_empty() {
        Span::zero(file_id)
    } else {
        Span::new(
            file_id,
            tokens[0].1.start as u32,
            tokens[tokens.len() - 1].1.end as u32,
        )
    };

    (
        CompilationUnit {
            package_name,
            artifact_name,
            neurons,
            span,
        },
        errors,
    )
}

/// Parse a single expression from tokens.
pub fn parse_expression(
    tokens: &[(Token, Range<usize>)],
    file_id: u16,
) -> Result<Expr, ParseError> {
    let mut stream = TokenStream::new(tokens, file_id);
    let expr = expr::parse_expr(&mut stream)?;
    stream.skip_separators();
    if !stream.at_end() {
        return Err(ParseError::unexpected_token(
            stream.peek(),
            "after expression",
            stream.current_span(),
        ));
    }
    Ok(expr)
}

/// Lex and parse a single expression from a string.
///
/// Used for expressions that arrive as text from outside the source file,
/// such as solver reply update rules. Spans point into `file_id` but are
/// synthetic.
pub fn parse_expression_str(source: &str, file_id: u16) -> Result<Expr, ParseError> {
    let (tokens, invalid) = nestml_lexer::lex_with_spans(source);
    if let Some(bad) = invalid.first() {
        return Err(ParseError::invalid_syntax(
            format!("invalid token in expression '{}'", source),
            Span::new(file_id, bad.start as u32, bad.end as u32),
        ));
    }
    parse_expression(&tokens, file_id)
}

/// Derive `(package_name, artifact_name)` for a source file.
///
/// With a model root, the package is the dotted parent path of the file
/// relative to the root and the artifact is the file stem:
/// `ROOT/a/b/c.nestml` → `("a.b", "c")`.
///
/// Without a root (or for files outside it), the full path stem is used:
/// the package is its longest dotted prefix and the artifact the final
/// segment.
pub fn derive_unit_names(path: &Path, model_root: Option<&Path>) -> (String, String) {
    if let Some(root) = model_root {
        if let Ok(relative) = path.strip_prefix(root) {
            let package = relative
                .parent()
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .unwrap_or_default();
            let artifact = stem_of(path);
            return (package, artifact);
        }
    }

    // No root: treat the whole path stem as a dotted name.
    let without_ext = path.with_extension("");
    let segments: Vec<String> = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|s| s != "/" && !s.is_empty())
        .collect();

    match segments.split_last() {
        Some((artifact, package)) => (package.join("."), artifact.clone()),
        None => (String::new(), String::new()),
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestml_ast::{BinaryOp, ExprKind, LiteralValue};
    use std::path::PathBuf;

    fn parse_expr_ok(source: &str) -> Expr {
        parse_expression_str(source, 0).expect("expression should parse")
    }

    #[test]
    fn test_precedence() {
        let e = parse_expr_ok("a + b * c");
        match &e.kind {
            ExprKind::Binary { op, right, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(
                    &right.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("expected binary add, got {:?}", other),
        }
    }

    #[test]
    fn test_power_right_associative() {
        let e = parse_expr_ok("a ** b ** c");
        match &e.kind {
            ExprKind::Binary { op, right, .. } => {
                assert_eq!(*op, BinaryOp::Pow);
                assert!(matches!(
                    &right.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Pow,
                        ..
                    }
                ));
            }
            other => panic!("expected power, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        // -x**2 parses as -(x**2)
        let e = parse_expr_ok("-x ** 2");
        assert!(matches!(&e.kind, ExprKind::Unary { .. }));
    }

    #[test]
    fn test_unit_literal() {
        let e = parse_expr_ok("55 mV");
        match &e.kind {
            ExprKind::Literal { value, unit } => {
                assert_eq!(*value, LiteralValue::Integer(55));
                assert_eq!(unit.as_deref(), Some("mV"));
            }
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_derivative_reference() {
        let e = parse_expr_ok("V_m''");
        match &e.kind {
            ExprKind::Variable { name, order, .. } => {
                assert_eq!(name, "V_m");
                assert_eq!(*order, 2);
            }
            other => panic!("expected variable, got {:?}", other),
        }
    }

    #[test]
    fn test_convolve_call() {
        let e = parse_expr_ok("convolve(g_ex, spikeExc)");
        match &e.kind {
            ExprKind::Call { name, args } => {
                assert_eq!(name, "convolve");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional() {
        let e = parse_expr_ok("V_m > V_th ? 1 : 0");
        assert!(matches!(&e.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn test_logical_keywords() {
        let e = parse_expr_ok("not a and b or c");
        assert!(matches!(
            &e.kind,
            ExprKind::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_expression() {
        assert!(parse_expression_str("a + ", 0).is_err());
        assert!(parse_expression_str("(a", 0).is_err());
    }

    #[test]
    fn test_unit_names_with_root() {
        let (package, artifact) = derive_unit_names(
            &PathBuf::from("/models/a/b/c.nestml"),
            Some(&PathBuf::from("/models")),
        );
        assert_eq!(package, "a.b");
        assert_eq!(artifact, "c");
    }

    #[test]
    fn test_unit_names_root_level_file() {
        let (package, artifact) = derive_unit_names(
            &PathBuf::from("/models/iaf.nestml"),
            Some(&PathBuf::from("/models")),
        );
        assert_eq!(package, "");
        assert_eq!(artifact, "iaf");
    }

    #[test]
    fn test_unit_names_without_root() {
        let (package, artifact) = derive_unit_names(&PathBuf::from("models/iaf.nestml"), None);
        assert_eq!(package, "models");
        assert_eq!(artifact, "iaf");
    }
}
