//! Token stream wrapper for the hand-written parser.

use nestml_ast::Span;
use nestml_lexer::Token;
use std::ops::Range;

/// Token stream with lookahead and position tracking.
///
/// Each token is paired with its byte span from the source, so parse
/// errors and AST spans point at real source locations.
pub struct TokenStream<'src> {
    tokens: &'src [(Token, Range<usize>)],
    pos: usize,
    file_id: u16,
}

impl<'src> TokenStream<'src> {
    /// Create a new token stream from tokens with their byte spans.
    pub fn new(tokens: &'src [(Token, Range<usize>)], file_id: u16) -> Self {
        Self {
            tokens,
            pos: 0,
            file_id,
        }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    /// Peek at the nth token ahead without consuming.
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(tok, _)| tok)
    }

    /// Advance to the next token and return it.
    pub fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(tok, _)| tok);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token matches the expected token kind.
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Expect a specific token and advance past it.
    pub fn expect(&mut self, expected: Token) -> Result<Span, super::ParseError> {
        if self.check(&expected) {
            let start = self.pos;
            self.advance();
            Ok(self.span_from(start))
        } else {
            Err(super::ParseError::expected_token(
                &expected,
                self.peek(),
                self.current_span(),
            ))
        }
    }

    /// Expect an identifier and return its name.
    pub fn expect_ident(&mut self, context: &str) -> Result<(String, Span), super::ParseError> {
        let span = self.current_span();
        match self.advance() {
            Some(Token::Ident(name)) => Ok((name.clone(), span)),
            other => Err(super::ParseError::unexpected_token(other, context, span)),
        }
    }

    /// Check if we've reached the end of the token stream.
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Current position in the token stream.
    pub fn current_pos(&self) -> usize {
        self.pos
    }

    /// True if the current token separates statements (newline or `;`).
    pub fn at_separator(&self) -> bool {
        matches!(self.peek(), Some(t) if t.is_separator())
    }

    /// Consume any run of statement separators.
    pub fn skip_separators(&mut self) {
        while self.at_separator() {
            self.advance();
        }
    }

    /// Expect the end of a statement: one or more separators, the `end`
    /// keyword (not consumed), or EOF.
    pub fn expect_separator(&mut self) -> Result<(), super::ParseError> {
        if self.at_separator() {
            self.skip_separators();
            Ok(())
        } else if self.at_end() || matches!(self.peek(), Some(Token::End)) {
            Ok(())
        } else {
            Err(super::ParseError::unexpected_token(
                self.peek(),
                "at end of statement",
                self.current_span(),
            ))
        }
    }

    /// Create a span from a starting token position to the current position.
    pub fn span_from(&self, start: usize) -> Span {
        let start_byte = self
            .tokens
            .get(start.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |(_, span)| span.start);

        let end_byte = if self.pos > 0 {
            self.tokens
                .get((self.pos - 1).min(self.tokens.len().saturating_sub(1)))
                .map_or(start_byte, |(_, span)| span.end)
        } else {
            start_byte
        };

        Span::new(self.file_id, start_byte as u32, end_byte.max(start_byte) as u32)
    }

    /// Get a span for the current token.
    pub fn current_span(&self) -> Span {
        if let Some((_, span)) = self.tokens.get(self.pos) {
            Span::new(self.file_id, span.start as u32, span.end as u32)
        } else if let Some((_, span)) = self.tokens.last() {
            Span::new(self.file_id, span.end as u32, span.end as u32)
        } else {
            Span::zero(self.file_id)
        }
    }

    /// Error recovery: skip forward until just past the next `end`, or to
    /// the next `neuron` keyword, whichever comes first.
    pub fn synchronize(&mut self) {
        while !self.at_end() {
            match self.peek() {
                Some(Token::Neuron) => break,
                Some(Token::End) => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// File id for this token stream.
    pub fn file_id(&self) -> u16 {
        self.file_id
    }
}
