//! Lexer implementation using logos

use super::token::{Token, TokenKind};
use crate::common::{CompileError, CompileResult, Span};
use logos::Logos;

/// Lexer for specification source
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, TokenKind>,
    /// Buffer for peeked tokens (supports 2-token lookahead)
    peeked: Vec<Token>,
    at_eof: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            peeked: Vec::new(),
            at_eof: false,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> CompileResult<Token> {
        if !self.peeked.is_empty() {
            return Ok(self.peeked.remove(0));
        }
        self.scan_token()
    }

    /// Peek at the nth upcoming token (0 = next)
    pub fn peek(&mut self, n: usize) -> CompileResult<&Token> {
        while self.peeked.len() <= n {
            let token = self.scan_token()?;
            self.peeked.push(token);
        }
        Ok(&self.peeked[n])
    }

    fn scan_token(&mut self) -> CompileResult<Token> {
        if self.at_eof {
            return Ok(Token::new(TokenKind::Eof, Span::default()));
        }

        match self.inner.next() {
            Some(Ok(kind)) => {
                let span = self.inner.span();
                Ok(Token::new(kind, Span::new(span.start, span.end)))
            }
            Some(Err(())) => {
                let span = self.inner.span();
                Err(CompileError::lexer(
                    format!("unexpected character '{}'", self.inner.slice()),
                    Span::new(span.start, span.end),
                ))
            }
            None => {
                self.at_eof = true;
                let len = self.inner.source().len();
                Ok(Token::new(TokenKind::Eof, Span::new(len, len)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().expect("lex");
            if token.kind == TokenKind::Eof {
                break;
            }
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn test_keywords_and_idents() {
        let toks = kinds("Msg ::= SEQUENCE { call-id INTEGER }");
        assert_eq!(
            toks,
            vec![
                TokenKind::UpperIdent("Msg".into()),
                TokenKind::Assign,
                TokenKind::Sequence,
                TokenKind::LBrace,
                TokenKind::LowerIdent("call-id".into()),
                TokenKind::Integer,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let toks = kinds("A -- a comment\n::= BOOLEAN -- trailing");
        assert_eq!(
            toks,
            vec![
                TokenKind::UpperIdent("A".into()),
                TokenKind::Assign,
                TokenKind::Boolean,
            ]
        );
    }

    #[test]
    fn test_range_and_ellipsis() {
        let toks = kinds("(1..8, ...)");
        assert_eq!(
            toks,
            vec![
                TokenKind::LParen,
                TokenKind::Number(1),
                TokenKind::DotDot,
                TokenKind::Number(8),
                TokenKind::Comma,
                TokenKind::Ellipsis,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_strings_and_field_refs() {
        let toks = kinds("\"text\" '1010'B 'FF'H &Type-Field");
        assert_eq!(
            toks,
            vec![
                TokenKind::CString("text".into()),
                TokenKind::BString("'1010'B".into()),
                TokenKind::HString("'FF'H".into()),
                TokenKind::FieldRef("Type-Field".into()),
            ]
        );
    }

    #[test]
    fn test_hyphenated_keyword() {
        assert_eq!(kinds("RELATIVE-OID"), vec![TokenKind::RelativeOid]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("A ::= B");
        assert_eq!(
            lexer.peek(1).unwrap().kind,
            TokenKind::Assign,
        );
        assert_eq!(
            lexer.next_token().unwrap().kind,
            TokenKind::UpperIdent("A".into())
        );
    }

    #[test]
    fn test_unexpected_character_errors() {
        let mut lexer = Lexer::new("A ~ B");
        lexer.next_token().expect("ident");
        assert!(lexer.next_token().is_err());
    }
}
