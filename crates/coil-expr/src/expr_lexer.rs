//! Lexer for Coil expressions.
//!
//! Tokenizes the expression language used in directive attributes and
//! `${ }` placeholders. Operates on a single expression string; positions are
//! character offsets into that string.
//!
//! # Examples
//!
//! ```
//! use coil_expr::expr_lexer::{ExprLexer, TokenKind};
//!
//! let tokens = ExprLexer::tokenize("count + 1").unwrap();
//! assert_eq!(tokens[0].kind, TokenKind::Identifier);
//! assert_eq!(tokens[1].kind, TokenKind::Plus);
//! assert_eq!(tokens[2].kind, TokenKind::Number);
//! ```

use crate::ast::ExprSpan;

/// A token produced by the expression lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: ExprSpan,
    pub value: TokenValue,
}

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Number,
    String,
    Boolean,
    Null,

    // Identifiers
    Identifier,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    Lte,
    Gte,

    // Logical
    And,
    Or,
    Not,
    QuestionQuestion,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Punctuation
    Dot,
    Comma,
    Colon,
    Question,

    // End of input
    Eof,
}

/// The value carried by a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number(f64),
    String(String),
    Boolean(bool),
    Identifier(String),
}

/// Expression lexer error.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprLexerError {
    pub message: String,
    pub span: ExprSpan,
}

impl std::fmt::Display for ExprLexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Expression lexer error at position {}: {}",
            self.span.start, self.message
        )
    }
}

impl std::error::Error for ExprLexerError {}

/// Coil expression lexer.
pub struct ExprLexer {
    chars: Vec<char>,
    pos: usize,
}

impl ExprLexer {
    /// Create a new expression lexer for the given source.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprLexerError> {
        let mut lexer = ExprLexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Read the next token from the source.
    pub fn next_token(&mut self) -> Result<Token, ExprLexerError> {
        self.skip_whitespace();

        if self.is_at_end() {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: ExprSpan::new(self.pos, self.pos),
                value: TokenValue::None,
            });
        }

        let start = self.pos;
        let ch = self.current();

        match ch {
            // Numbers
            '0'..='9' => self.read_number(start),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(start),

            // Strings
            '\'' | '"' | '`' => self.read_string(start),

            // Identifiers and keywords
            'a'..='z' | 'A'..='Z' | '_' | '$' => self.read_identifier(start),

            // Multi-character operators (check first)
            '=' if self.peek() == Some('=') => {
                if self.peek_at(2) == Some('=') {
                    Ok(self.operator(TokenKind::StrictEq, start, 3))
                } else {
                    Ok(self.operator(TokenKind::EqEq, start, 2))
                }
            }
            '!' if self.peek() == Some('=') => {
                if self.peek_at(2) == Some('=') {
                    Ok(self.operator(TokenKind::StrictNotEq, start, 3))
                } else {
                    Ok(self.operator(TokenKind::NotEq, start, 2))
                }
            }
            '&' if self.peek() == Some('&') => Ok(self.operator(TokenKind::And, start, 2)),
            '|' if self.peek() == Some('|') => Ok(self.operator(TokenKind::Or, start, 2)),
            '<' if self.peek() == Some('=') => Ok(self.operator(TokenKind::Lte, start, 2)),
            '>' if self.peek() == Some('=') => Ok(self.operator(TokenKind::Gte, start, 2)),
            '?' if self.peek() == Some('?') => {
                Ok(self.operator(TokenKind::QuestionQuestion, start, 2))
            }

            // Single-character tokens
            '+' => Ok(self.operator(TokenKind::Plus, start, 1)),
            '-' => Ok(self.operator(TokenKind::Minus, start, 1)),
            '*' => Ok(self.operator(TokenKind::Star, start, 1)),
            '/' => Ok(self.operator(TokenKind::Slash, start, 1)),
            '%' => Ok(self.operator(TokenKind::Percent, start, 1)),
            '!' => Ok(self.operator(TokenKind::Not, start, 1)),
            '<' => Ok(self.operator(TokenKind::Lt, start, 1)),
            '>' => Ok(self.operator(TokenKind::Gt, start, 1)),
            '(' => Ok(self.operator(TokenKind::LParen, start, 1)),
            ')' => Ok(self.operator(TokenKind::RParen, start, 1)),
            '[' => Ok(self.operator(TokenKind::LBracket, start, 1)),
            ']' => Ok(self.operator(TokenKind::RBracket, start, 1)),
            '{' => Ok(self.operator(TokenKind::LBrace, start, 1)),
            '}' => Ok(self.operator(TokenKind::RBrace, start, 1)),
            '.' => Ok(self.operator(TokenKind::Dot, start, 1)),
            ',' => Ok(self.operator(TokenKind::Comma, start, 1)),
            ':' => Ok(self.operator(TokenKind::Colon, start, 1)),
            '?' => Ok(self.operator(TokenKind::Question, start, 1)),

            _ => Err(ExprLexerError {
                message: format!("Unexpected character: '{ch}'"),
                span: ExprSpan::new(start, start + 1),
            }),
        }
    }

    // --- Private helpers ---

    fn read_number(&mut self, start: usize) -> Result<Token, ExprLexerError> {
        while !self.is_at_end() && (self.current().is_ascii_digit() || self.current() == '.') {
            self.advance();
        }

        let text = self.text(start);
        let value: f64 = text.parse().map_err(|_| ExprLexerError {
            message: format!("Invalid number: '{text}'"),
            span: ExprSpan::new(start, self.pos),
        })?;

        Ok(self.token(TokenKind::Number, start, TokenValue::Number(value)))
    }

    fn read_string(&mut self, start: usize) -> Result<Token, ExprLexerError> {
        let quote = self.current();
        self.advance(); // skip opening quote

        let mut value = String::new();

        while !self.is_at_end() && self.current() != quote {
            if self.current() == '\\' {
                self.advance();
                if self.is_at_end() {
                    return Err(ExprLexerError {
                        message: "Unterminated escape sequence".into(),
                        span: ExprSpan::new(start, self.pos),
                    });
                }
                match self.current() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    c if c == quote => value.push(c),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                }
            } else {
                value.push(self.current());
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(ExprLexerError {
                message: "Unterminated string".into(),
                span: ExprSpan::new(start, self.pos),
            });
        }

        self.advance(); // skip closing quote

        Ok(self.token(TokenKind::String, start, TokenValue::String(value)))
    }

    fn read_identifier(&mut self, start: usize) -> Result<Token, ExprLexerError> {
        while !self.is_at_end()
            && (self.current().is_alphanumeric() || self.current() == '_' || self.current() == '$')
        {
            self.advance();
        }

        let text = self.text(start);

        match text.as_str() {
            "true" => Ok(self.token(TokenKind::Boolean, start, TokenValue::Boolean(true))),
            "false" => Ok(self.token(TokenKind::Boolean, start, TokenValue::Boolean(false))),
            "null" | "undefined" | "nil" => Ok(self.token(TokenKind::Null, start, TokenValue::None)),
            _ => Ok(self.token(TokenKind::Identifier, start, TokenValue::Identifier(text))),
        }
    }

    fn operator(&mut self, kind: TokenKind, start: usize, len: usize) -> Token {
        self.pos += len;
        self.token(kind, start, TokenValue::None)
    }

    fn token(&self, kind: TokenKind, start: usize, value: TokenValue) -> Token {
        Token {
            kind,
            span: ExprSpan::new(start, self.pos),
            value,
        }
    }

    fn text(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn current(&self) -> char {
        self.chars[self.pos]
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current().is_whitespace() {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokenize(source: &str) -> Vec<Token> {
        ExprLexer::tokenize(source).unwrap()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    // --- Basic tokens ---

    #[test]
    fn test_number() {
        let tokens = tokenize("42");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].value, TokenValue::Number(42.0));
    }

    #[test]
    fn test_float() {
        assert_eq!(tokenize("2.75")[0].value, TokenValue::Number(2.75));
        assert_eq!(tokenize(".5")[0].value, TokenValue::Number(0.5));
    }

    #[test]
    fn test_string_quotes() {
        assert_eq!(tokenize("'hello'")[0].value, TokenValue::String("hello".into()));
        assert_eq!(tokenize("\"world\"")[0].value, TokenValue::String("world".into()));
    }

    #[test]
    fn test_string_escape() {
        let tokens = tokenize("'it\\'s\\n'");
        assert_eq!(tokens[0].value, TokenValue::String("it's\n".into()));
    }

    #[test]
    fn test_literals() {
        assert_eq!(tokenize("true")[0].value, TokenValue::Boolean(true));
        assert_eq!(tokenize("false")[0].value, TokenValue::Boolean(false));
        assert_eq!(tokenize("null")[0].kind, TokenKind::Null);
        assert_eq!(tokenize("undefined")[0].kind, TokenKind::Null);
    }

    #[test]
    fn test_identifier() {
        let tokens = tokenize("count");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].value, TokenValue::Identifier("count".into()));
    }

    // --- Operators ---

    #[test]
    fn test_comparison() {
        assert_eq!(
            kinds("a == b != c === d !== e <= f"),
            vec![
                TokenKind::Identifier,
                TokenKind::EqEq,
                TokenKind::Identifier,
                TokenKind::NotEq,
                TokenKind::Identifier,
                TokenKind::StrictEq,
                TokenKind::Identifier,
                TokenKind::StrictNotEq,
                TokenKind::Identifier,
                TokenKind::Lte,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_logical() {
        assert_eq!(
            kinds("a && b || !c ?? d"),
            vec![
                TokenKind::Identifier,
                TokenKind::And,
                TokenKind::Identifier,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Identifier,
                TokenKind::QuestionQuestion,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_nested_object_braces() {
        assert_eq!(
            kinds("{{a: 1}}"),
            vec![
                TokenKind::LBrace,
                TokenKind::LBrace,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Number,
                TokenKind::RBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    // --- Error handling ---

    #[test]
    fn test_unterminated_string() {
        let result = ExprLexer::tokenize("'hello");
        assert!(result.unwrap_err().message.contains("Unterminated string"));
    }

    #[test]
    fn test_unexpected_character() {
        let result = ExprLexer::tokenize("count # 5");
        assert!(result.unwrap_err().message.contains("Unexpected character"));
    }

    #[test]
    fn test_assignment_is_rejected() {
        assert!(ExprLexer::tokenize("a = 1").is_err());
    }

    // --- Span tracking ---

    #[test]
    fn test_span_tracking() {
        let tokens = tokenize("ab + 'ü'");
        assert_eq!(tokens[0].span, ExprSpan::new(0, 2));
        assert_eq!(tokens[1].span, ExprSpan::new(3, 4));
        assert_eq!(tokens[2].span, ExprSpan::new(5, 8));
    }
}
