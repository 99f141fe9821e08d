//! Lexical analysis for NESTML sources.
//!
//! Tokenization is built on logos. Two points are worth calling out:
//!
//! - NESTML statements are line-delimited while blocks are closed by the
//!   `end` keyword, so the lexer emits an explicit [`Token::Newline`]
//!   instead of skipping line breaks. Spaces, tabs and comments are
//!   stripped here and never reach the parser.
//! - Time derivatives are written with trailing primes (`V_m'`, `g_in''`).
//!   A primed identifier is lexed as a single [`Token::DerivedIdent`]
//!   carrying the raw text; the parser splits name and differential order.

use logos::Logos;
use std::ops::Range;

/// NESTML token.
///
/// Token strings for keywords, operators, and delimiters are defined once
/// in the `TOKEN_STRINGS` table and indexed by discriminant for Display.
///
/// Uses `#[repr(u16)]` to guarantee discriminant values are stable and
/// can be safely used to index into `TOKEN_STRINGS`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[repr(u16)]
#[logos(skip r"[ \t\r]+")] // Skip intra-line whitespace
#[logos(skip r"#[^\n]*")] // Skip # comments
#[logos(skip r"/\*([^*]|\*[^/])*\*/")] // Skip /* */ comments
pub enum Token {
    // === Keywords ===
    /// Keyword `neuron`
    #[token("neuron")]
    Neuron,
    /// Keyword `state`
    #[token("state")]
    State,
    /// Keyword `initial_values`
    #[token("initial_values")]
    InitialValues,
    /// Keyword `parameters`
    #[token("parameters")]
    Parameters,
    /// Keyword `internals`
    #[token("internals")]
    Internals,
    /// Keyword `equations`
    #[token("equations")]
    Equations,
    /// Keyword `input`
    #[token("input")]
    Input,
    /// Keyword `output`
    #[token("output")]
    Output,
    /// Keyword `update`
    #[token("update")]
    Update,
    /// Keyword `function`
    #[token("function")]
    Function,
    /// Keyword `shape`
    #[token("shape")]
    Shape,
    /// Keyword `if`
    #[token("if")]
    If,
    /// Keyword `elif`
    #[token("elif")]
    Elif,
    /// Keyword `else`
    #[token("else")]
    Else,
    /// Keyword `for`
    #[token("for")]
    For,
    /// Keyword `in`
    #[token("in")]
    In,
    /// Keyword `step`
    #[token("step")]
    Step,
    /// Keyword `return`
    #[token("return")]
    Return,
    /// Keyword `end` (closes every block)
    #[token("end")]
    End,
    /// Keyword `recordable`
    #[token("recordable")]
    Recordable,
    /// Keyword `inhibitory`
    #[token("inhibitory")]
    Inhibitory,
    /// Keyword `excitatory`
    #[token("excitatory")]
    Excitatory,
    /// Keyword `spike`
    #[token("spike")]
    Spike,
    /// Keyword `current`
    #[token("current")]
    Current,
    /// Keyword `and` (logical and)
    #[token("and")]
    And,
    /// Keyword `or` (logical or)
    #[token("or")]
    Or,
    /// Keyword `not` (logical not)
    #[token("not")]
    Not,
    /// Boolean literal `true`
    #[token("true")]
    True,
    /// Boolean literal `false`
    #[token("false")]
    False,

    // === Operators ===
    /// Operator `+`
    #[token("+")]
    Plus,
    /// Operator `-`
    #[token("-")]
    Minus,
    /// Operator `*`
    #[token("*")]
    Star,
    /// Operator `/`
    #[token("/")]
    Slash,
    /// Operator `%`
    #[token("%")]
    Percent,
    /// Operator `**` (power)
    #[token("**")]
    StarStar,
    /// Operator `=`
    #[token("=")]
    Eq,
    /// Operator `+=`
    #[token("+=")]
    PlusEq,
    /// Operator `-=`
    #[token("-=")]
    MinusEq,
    /// Operator `*=`
    #[token("*=")]
    StarEq,
    /// Operator `/=`
    #[token("/=")]
    SlashEq,
    /// Operator `==`
    #[token("==")]
    EqEq,
    /// Operator `!=`
    #[token("!=")]
    BangEq,
    /// Operator `<`
    #[token("<")]
    Lt,
    /// Operator `<=`
    #[token("<=")]
    LtEq,
    /// Operator `>`
    #[token(">")]
    Gt,
    /// Operator `>=`
    #[token(">=")]
    GtEq,
    /// Operator `<-` (input port arrow)
    #[token("<-")]
    LeftArrow,
    /// Operator `?` (conditional)
    #[token("?")]
    Question,
    /// Operator `:`
    #[token(":")]
    Colon,
    /// Operator `,`
    #[token(",")]
    Comma,
    /// Delimiter `(`
    #[token("(")]
    LParen,
    /// Delimiter `)`
    #[token(")")]
    RParen,
    /// Delimiter `[`
    #[token("[")]
    LBracket,
    /// Delimiter `]`
    #[token("]")]
    RBracket,
    /// Operator `...` (for-loop range)
    #[token("...")]
    Ellipsis,
    /// Statement separator `;`
    #[token(";")]
    Semicolon,
    /// Statement separator: line break
    #[token("\n")]
    Newline,

    // === Literals ===
    /// Integer literal (e.g., 42, 0, 1000)
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    /// Float literal (e.g., 3.14, 1.0, 5.67e-8)
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    /// String literal (e.g., "spikes")
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    String(String),

    /// Identifier (e.g., V_m, tau_syn_ex, mV)
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    /// Identifier with trailing primes denoting a time derivative
    /// (e.g., `V_m'`, `g_ex''`). The raw text including primes is kept.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*'+", |lex| lex.slice().to_string())]
    DerivedIdent(String),
}

/// Token string lookup table.
///
/// Maps discriminant indices to their string representation. This is the
/// single source of truth for token display strings, indexed by the enum
/// discriminant order.
///
/// NOTE: The `#[token("...")]` attributes above must match these strings.
const TOKEN_STRINGS: &[&str] = &[
    "neuron",
    "state",
    "initial_values",
    "parameters",
    "internals",
    "equations",
    "input",
    "output",
    "update",
    "function",
    "shape", // blocks
    "if",
    "elif",
    "else",
    "for",
    "in",
    "step",
    "return",
    "end", // statements
    "recordable",
    "inhibitory",
    "excitatory",
    "spike",
    "current", // modifiers & ports
    "and",
    "or",
    "not", // logic
    "true",
    "false", // booleans
    "+",
    "-",
    "*",
    "/",
    "%",
    "**", // arithmetic
    "=",
    "+=",
    "-=",
    "*=",
    "/=", // assignment
    "==",
    "!=",
    "<",
    "<=",
    ">",
    ">=", // comparison
    "<-",
    "?",
    ":",
    ",", // other
    "(",
    ")",
    "[",
    "]", // delimiters
    "...",
    ";",
    "newline",
];

impl Token {
    /// Get the index into TOKEN_STRINGS for simple tokens.
    ///
    /// Safe due to `#[repr(u16)]` on Token enum ensuring stable discriminants.
    fn token_string_index(&self) -> usize {
        // Safe: Token has #[repr(u16)] so discriminant values are stable
        let discriminant = unsafe { *(self as *const Token as *const u16) };
        discriminant as usize
    }

    /// True for the tokens the parser treats as statement separators.
    pub fn is_separator(&self) -> bool {
        matches!(self, Token::Newline | Token::Semicolon)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Literals with data (not in TOKEN_STRINGS table)
            Token::Integer(n) => write!(f, "{}", n),
            Token::Float(x) => write!(f, "{}", x),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Ident(id) => write!(f, "{}", id),
            Token::DerivedIdent(id) => write!(f, "{}", id),

            // Simple tokens (keywords, operators, delimiters)
            _ => {
                let idx = self.token_string_index();
                let s = TOKEN_STRINGS
                    .get(idx)
                    .expect("BUG: token discriminant out of bounds for TOKEN_STRINGS");
                write!(f, "{}", s)
            }
        }
    }
}

/// Lexes a source string into tokens paired with their byte spans.
///
/// Invalid byte sequences do not abort lexing; their spans are collected
/// separately so the caller can report every bad token in one pass.
pub fn lex_with_spans(source: &str) -> (Vec<(Token, Range<usize>)>, Vec<Range<usize>>) {
    let mut tokens = Vec::new();
    let mut invalid = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => invalid.push(lexer.span()),
        }
    }

    (tokens, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test helper: lex source and filter out errors and newlines.
    fn lex(source: &str) -> Vec<Token> {
        Token::lexer(source)
            .filter_map(|result| result.ok())
            .filter(|t| !matches!(t, Token::Newline))
            .collect()
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("neuron state parameters update end");
        assert_eq!(
            tokens,
            vec![
                Token::Neuron,
                Token::State,
                Token::Parameters,
                Token::Update,
                Token::End,
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        let tokens = lex("V_m tau_syn_ex g_in x");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("V_m".to_string()),
                Token::Ident("tau_syn_ex".to_string()),
                Token::Ident("g_in".to_string()),
                Token::Ident("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_derived_identifiers() {
        let tokens = lex("V_m' g_ex''");
        assert_eq!(
            tokens,
            vec![
                Token::DerivedIdent("V_m'".to_string()),
                Token::DerivedIdent("g_ex''".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("42 3.14 5.67e-8 1e10");
        assert_eq!(
            tokens,
            vec![
                Token::Integer(42),
                Token::Float(3.14),
                Token::Float(5.67e-8),
                Token::Float(1e10),
            ]
        );
    }

    #[test]
    fn test_unit_literal_tokens() {
        // `55mV` is a number followed by an identifier; the parser pairs them.
        let tokens = lex("55mV 0.1 ms");
        assert_eq!(
            tokens,
            vec![
                Token::Integer(55),
                Token::Ident("mV".to_string()),
                Token::Float(0.1),
                Token::Ident("ms".to_string()),
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens = lex("+ - * / ** == != < <= > >= <-");
        assert_eq!(
            tokens,
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::StarStar,
                Token::EqEq,
                Token::BangEq,
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::LeftArrow,
            ]
        );
    }

    #[test]
    fn test_compound_assignment() {
        let tokens = lex("x += 1 y /= 2");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x".to_string()),
                Token::PlusEq,
                Token::Integer(1),
                Token::Ident("y".to_string()),
                Token::SlashEq,
                Token::Integer(2),
            ]
        );
    }

    #[test]
    fn test_newlines_are_tokens() {
        let tokens: Vec<Token> = Token::lexer("a\nb\n")
            .filter_map(|result| result.ok())
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_string()),
                Token::Newline,
                Token::Ident("b".to_string()),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_hash_comments() {
        let tokens = lex("state # membrane potential\nV_m");
        assert_eq!(tokens, vec![Token::State, Token::Ident("V_m".to_string())]);
    }

    #[test]
    fn test_block_comments() {
        let tokens = lex("state /* multi\nline */ V_m");
        assert_eq!(tokens, vec![Token::State, Token::Ident("V_m".to_string())]);
    }

    #[test]
    fn test_input_port_line() {
        let tokens = lex("spikeExc nS <- excitatory spike");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("spikeExc".to_string()),
                Token::Ident("nS".to_string()),
                Token::LeftArrow,
                Token::Excitatory,
                Token::Spike,
            ]
        );
    }

    #[test]
    fn test_for_range() {
        let tokens = lex("for i in 1 ... 10 step 2:");
        assert_eq!(
            tokens,
            vec![
                Token::For,
                Token::Ident("i".to_string()),
                Token::In,
                Token::Integer(1),
                Token::Ellipsis,
                Token::Integer(10),
                Token::Step,
                Token::Integer(2),
                Token::Colon,
            ]
        );
    }

    #[test]
    fn test_ternary() {
        let tokens = lex("(V_m > 0)? 1 : 0");
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                Token::Ident("V_m".to_string()),
                Token::Gt,
                Token::Integer(0),
                Token::RParen,
                Token::Question,
                Token::Integer(1),
                Token::Colon,
                Token::Integer(0),
            ]
        );
    }

    #[test]
    fn test_lexer_error_detection() {
        let source = "state @ V_m";
        let results: Vec<_> = Token::lexer(source).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err()); // @
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_lex_with_spans() {
        let (tokens, invalid) = lex_with_spans("V_m = 1");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].1, 0..3);
        assert!(invalid.is_empty());

        let (_, invalid) = lex_with_spans("a @ b");
        assert_eq!(invalid, vec![2..3]);
    }

    /// Verify that TOKEN_STRINGS matches token definitions.
    #[test]
    fn test_token_string_consistency() {
        assert_eq!(Token::Neuron.to_string(), "neuron");
        assert_eq!(Token::InitialValues.to_string(), "initial_values");
        assert_eq!(Token::StarStar.to_string(), "**");
        assert_eq!(Token::LeftArrow.to_string(), "<-");
        assert_eq!(Token::End.to_string(), "end");
        assert_eq!(Token::Ellipsis.to_string(), "...");
        assert_eq!(Token::False.to_string(), "false");
        assert_eq!(Token::RBracket.to_string(), "]");
    }
}
