//! Coil Lexer
//!
//! Tokenizes Coil markup into a stream of tokens: start tags with their
//! attributes, end tags, text runs, comments and doctypes.
//! `${ expr }` placeholders are kept verbatim so that markup-like characters
//! inside an expression never start a tag or end an attribute value.
//!
//! # Example
//!
//! ```
//! use coil_lexer::Scanner;
//!
//! let tokens = Scanner::tokenize("").unwrap();
//! assert_eq!(tokens.len(), 1); // Just EOF
//! ```

pub mod scanner;
pub mod token;

pub use scanner::Scanner;
pub use token::{is_void_element, Attribute, Span, Tag, Token, TokenKind};

/// Lexer error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lexer error at line {line}, column {column}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}
