/// A position in source text, tracking line and column for error reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// Token classification for Coil markup.
///
/// Data-carrying variants embed their value directly (no separate `value` field on Token).
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `<!DOCTYPE html>`: carries the text after the keyword.
    Doctype(String),

    /// `<tag attr="value">` or `<tag/>`.
    StartTag(Tag),

    /// `</tag>`
    EndTag(String),

    /// Character data between tags. Entities are decoded outside `${ }` placeholders;
    /// placeholder source is kept verbatim.
    Text(String),

    /// `<!-- comment -->`
    Comment(String),

    // End of input
    Eof,
}

/// A start tag with its attributes in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub self_closing: bool,
}

/// An attribute on a start tag. `value` is `None` for bare attributes (`<input disabled>`).
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
    pub span: Span,
}

/// A token produced by the Coil scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// HTML5 void elements (self-closing, no children).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content is scanned as raw text up to the matching end tag.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Check if a tag name is an HTML5 void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// Check if a tag name switches the scanner to raw text.
pub fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// Raw-text elements whose content still decodes character references and
/// interpolates placeholders.
pub fn is_escapable_raw_text_element(tag: &str) -> bool {
    ["textarea", "title"].iter().any(|v| v.eq_ignore_ascii_case(tag))
}
