use crate::token::{is_escapable_raw_text_element, is_raw_text_element, Attribute, Span, Tag, Token, TokenKind};
use crate::LexerError;

/// Scanner mode determines how `<` is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerMode {
    /// Default mode: `<` may open markup, text is entity-decoded.
    Data,
    /// Inside a raw-text element (`script`, `style`, ...): everything up to the
    /// matching end tag is text.
    RawText(String),
}

/// Coil markup scanner.
///
/// Tokenizes template source into tags, text, comments and doctypes.
/// Handles quoted and bare attribute values, character references,
/// raw-text elements, and `${ expr }` placeholders whose contents are
/// copied verbatim (nested braces and quoted strings included).
///
/// - `Vec<char>` source for index-based navigation
/// - Mode-aware handling of raw-text element content
/// - Position tracking on every token
pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    mode: ScannerMode,
}

impl Scanner {
    /// Create a new scanner for the given source.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            mode: ScannerMode::Data,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }

    /// Scan all tokens from the source.
    fn scan_tokens(&mut self) -> Result<(), LexerError> {
        while !self.is_at_end() {
            self.scan_token()?;
        }

        let span = Span::new(self.pos, self.pos, self.line, self.column);
        self.tokens.push(Token::new(TokenKind::Eof, span));
        Ok(())
    }

    /// Scan the next token.
    fn scan_token(&mut self) -> Result<(), LexerError> {
        if let ScannerMode::RawText(name) = &self.mode {
            let name = name.clone();
            return self.scan_raw_text(&name);
        }

        if self.peek() != '<' {
            return self.scan_text();
        }

        match self.peek_next() {
            '!' if self.starts_with("<!--") => self.scan_comment(),
            '!' => self.scan_declaration(),
            '/' if is_name_start(self.peek_at(2)) => self.scan_end_tag(),
            c if is_name_start(c) => self.scan_start_tag(),
            // A lone `<` is ordinary text.
            _ => self.scan_text(),
        }
    }

    // --- Text ---

    /// Scan character data up to the next markup. Entities are decoded;
    /// `${ ... }` placeholders are copied through untouched.
    fn scan_text(&mut self) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;

        let mut value = String::new();

        // The first character is always consumed so a lone `<` makes progress.
        let mut first = true;
        while !self.is_at_end() {
            let c = self.peek();
            if c == '<' && !first && self.starts_markup() {
                break;
            }
            first = false;

            if self.opens_placeholder(&value) {
                self.scan_placeholder_into(&mut value)?;
            } else if c == '&' {
                self.scan_entity_into(&mut value);
            } else {
                value.push(c);
                self.advance();
            }
        }

        if !value.is_empty() {
            let span = Span::new(start_pos, self.pos, start_line, start_col);
            self.tokens.push(Token::new(TokenKind::Text(value), span));
        }
        Ok(())
    }

    /// Scan raw text until `</name`. Script and style content is copied as is;
    /// `title` and `textarea` content also decodes entities and keeps placeholders whole.
    fn scan_raw_text(&mut self, name: &str) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        let escapable = is_escapable_raw_text_element(name);

        let mut value = String::new();
        while !self.is_at_end() {
            let c = self.peek();
            if c == '<' && self.peek_next() == '/' && self.matches_name_at(self.pos + 2, name) {
                break;
            }

            if escapable && self.opens_placeholder(&value) {
                self.scan_placeholder_into(&mut value)?;
            } else if escapable && c == '&' {
                self.scan_entity_into(&mut value);
            } else {
                value.push(c);
                self.advance();
            }
        }

        if !value.is_empty() {
            let span = Span::new(start_pos, self.pos, start_line, start_col);
            self.tokens.push(Token::new(TokenKind::Text(value), span));
        }
        self.mode = ScannerMode::Data;
        Ok(())
    }

    /// `${` opens a placeholder unless written `\${`.
    fn opens_placeholder(&self, out: &str) -> bool {
        self.peek() == '$' && self.peek_next() == '{' && !out.ends_with('\\')
    }

    /// Copy a `${ ... }` placeholder verbatim. Tracks brace depth for nesting and
    /// ignores braces inside quoted strings.
    fn scan_placeholder_into(&mut self, out: &mut String) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;

        // consume `${`
        out.push('$');
        self.advance();
        out.push('{');
        self.advance();

        let mut depth = 1;
        let mut quote: Option<char> = None;

        while depth > 0 {
            if self.is_at_end() {
                return Err(LexerError {
                    message: "Unterminated interpolation".into(),
                    line: start_line,
                    column: start_col,
                });
            }

            let c = self.peek();
            out.push(c);
            self.advance();

            match quote {
                Some(q) => {
                    if c == '\\' {
                        if !self.is_at_end() {
                            out.push(self.peek());
                            self.advance();
                        }
                    } else if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' | '`' => quote = Some(c),
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                },
            }
        }

        Ok(())
    }

    /// Decode a character reference at `&`, or keep the ampersand literally.
    fn scan_entity_into(&mut self, out: &mut String) {
        let mut end = self.pos + 1;
        while end < self.chars.len()
            && end - self.pos <= 32
            && (self.chars[end].is_ascii_alphanumeric() || self.chars[end] == '#')
        {
            end += 1;
        }

        if end < self.chars.len() && self.chars[end] == ';' && end > self.pos + 1 {
            let name: String = self.chars[self.pos + 1..end].iter().collect();
            if let Some(decoded) = decode_entity(&name) {
                for _ in self.pos..=end {
                    self.advance();
                }
                self.push_decoded(out, decoded);
                return;
            }
        }

        out.push('&');
        self.advance();
    }

    /// Push a decoded character. A decoded `$` or `{` that would form `${`
    /// is written as the `\${` escape so it stays literal text.
    fn push_decoded(&self, out: &mut String, c: char) {
        match c {
            '$' if self.peek() == '{' => out.push_str("\\$"),
            '{' if out.ends_with('$') && !out.ends_with("\\$") => {
                out.pop();
                out.push_str("\\${");
            }
            c => out.push(c),
        }
    }

    // --- Tags ---

    /// Scan a start tag with its attributes: `<name a="1" b='2' c=bare d>` or `<name/>`.
    fn scan_start_tag(&mut self) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        self.advance(); // consume `<`

        let name = self.read_name();
        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();

            if self.is_at_end() {
                return Err(LexerError {
                    message: format!("Unterminated start tag <{name}>"),
                    line: start_line,
                    column: start_col,
                });
            }

            match self.peek() {
                '>' => {
                    self.advance();
                    break;
                }
                '/' if self.peek_next() == '>' => {
                    self.advance();
                    self.advance();
                    self_closing = true;
                    break;
                }
                '/' => {
                    self.advance(); // stray slash
                }
                _ => attributes.push(self.scan_attribute()?),
            }
        }

        if is_raw_text_element(&name) && !self_closing {
            self.mode = ScannerMode::RawText(name.to_ascii_lowercase());
        }

        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(
            TokenKind::StartTag(Tag {
                name,
                attributes,
                self_closing,
            }),
            span,
        ));
        Ok(())
    }

    /// Scan one attribute: `name`, `name=value`, `name="value"`, `name='value'`.
    fn scan_attribute(&mut self) -> Result<Attribute, LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;

        let mut name = String::new();
        while !self.is_at_end() {
            let c = self.peek();
            if c.is_whitespace() || c == '=' || c == '>' || c == '"' || c == '\'' {
                break;
            }
            if c == '/' && self.peek_next() == '>' {
                break;
            }
            name.push(c);
            self.advance();
        }

        if name.is_empty() {
            return Err(self.error(format!("Unexpected character in tag: '{}'", self.peek())));
        }

        self.skip_whitespace();
        let value = if self.peek() == '=' {
            self.advance(); // consume =
            self.skip_whitespace();
            Some(self.scan_attribute_value()?)
        } else {
            None
        };

        Ok(Attribute {
            name,
            value,
            span: Span::new(start_pos, self.pos, start_line, start_col),
        })
    }

    fn scan_attribute_value(&mut self) -> Result<String, LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let mut value = String::new();

        let quote = match self.peek() {
            q @ ('"' | '\'') => {
                self.advance();
                Some(q)
            }
            _ => None,
        };

        loop {
            if self.is_at_end() {
                if quote.is_some() {
                    return Err(LexerError {
                        message: "Unterminated attribute value".into(),
                        line: start_line,
                        column: start_col,
                    });
                }
                break;
            }

            let c = self.peek();
            match quote {
                Some(q) if c == q => {
                    self.advance(); // consume closing quote
                    break;
                }
                None if c.is_whitespace() || c == '>' => break,
                None if c == '/' && self.peek_next() == '>' => break,
                _ => {}
            }

            if self.opens_placeholder(&value) {
                self.scan_placeholder_into(&mut value)?;
            } else if c == '&' {
                self.scan_entity_into(&mut value);
            } else {
                value.push(c);
                self.advance();
            }
        }

        Ok(value)
    }

    /// Scan an end tag: `</name>`.
    fn scan_end_tag(&mut self) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        self.advance(); // consume `<`
        self.advance(); // consume `/`

        let name = self.read_name();
        self.skip_whitespace();

        if self.peek() != '>' {
            return Err(LexerError {
                message: format!("Expected '>' to close end tag </{name}>"),
                line: start_line,
                column: start_col,
            });
        }
        self.advance();

        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(TokenKind::EndTag(name), span));
        Ok(())
    }

    // --- Comments and declarations ---

    /// Scan a comment (`<!-- ... -->`).
    fn scan_comment(&mut self) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;

        for _ in 0..4 {
            self.advance();
        }

        let mut content = String::new();
        while !self.starts_with("-->") {
            if self.is_at_end() {
                return Err(LexerError {
                    message: "Unterminated comment".into(),
                    line: start_line,
                    column: start_col,
                });
            }
            content.push(self.peek());
            self.advance();
        }
        for _ in 0..3 {
            self.advance();
        }

        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(TokenKind::Comment(content), span));
        Ok(())
    }

    /// Scan `<!DOCTYPE ...>` or a bogus `<!...>` declaration (kept as a comment).
    fn scan_declaration(&mut self) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        self.advance(); // consume `<`
        self.advance(); // consume `!`

        let mut content = String::new();
        while self.peek() != '>' {
            if self.is_at_end() {
                return Err(LexerError {
                    message: "Unterminated declaration".into(),
                    line: start_line,
                    column: start_col,
                });
            }
            content.push(self.peek());
            self.advance();
        }
        self.advance(); // consume `>`

        let kind = match content.get(..7) {
            Some(keyword) if keyword.eq_ignore_ascii_case("doctype") => {
                TokenKind::Doctype(content[7..].trim().to_string())
            }
            _ => TokenKind::Comment(content),
        };

        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    // --- Helpers ---

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while !self.is_at_end() && is_name_char(self.peek()) {
            name.push(self.peek());
            self.advance();
        }
        name
    }

    /// Whether `<` at the current position opens a tag, end tag, comment or declaration.
    fn starts_markup(&self) -> bool {
        match self.peek_next() {
            '!' => true,
            '/' => is_name_start(self.peek_at(2)),
            c => is_name_start(c),
        }
    }

    fn matches_name_at(&self, at: usize, name: &str) -> bool {
        let mut i = at;
        for expected in name.chars() {
            match self.chars.get(i) {
                Some(c) if c.eq_ignore_ascii_case(&expected) => i += 1,
                _ => return false,
            }
        }
        !self.chars.get(i).is_some_and(|c| is_name_char(*c))
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_next(&self) -> char {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.chars.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            if self.chars[self.pos] == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: String) -> LexerError {
        LexerError {
            message,
            line: self.line,
            column: self.column,
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '_' | '.')
}

/// Decode a named or numeric character reference (without `&` and `;`).
fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
