//! Small lexers for directive values that are not plain expressions.
//!
//! - `c:for="item in items"` / `c:for="item, i in items"`
//! - `c:var="name"` / `c:var="name {title: string}"`

use coil_expr::compile::is_identifier;
use coil_expr::{parse_shape_literal, ExprError, Shape};

/// Parsed `c:for` value. `collection_offset` locates the tail expression in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopHeader {
    pub item: String,
    pub index: Option<String>,
    pub collection: String,
    pub collection_offset: usize,
}

/// Parse `item[, index] in expr`.
pub fn parse_loop_header(source: &str) -> Result<LoopHeader, ExprError> {
    let mut lexer = HeaderLexer::new(source);

    let item = lexer.identifier()?;
    let index = if lexer.eat(',') {
        Some(lexer.identifier()?)
    } else {
        None
    };

    lexer.keyword("in")?;

    let collection_offset = lexer.pos;
    let collection: String = lexer.rest();
    if collection.trim().is_empty() {
        return Err(ExprError::new("Expected collection after 'in'", collection_offset));
    }

    Ok(LoopHeader {
        item,
        index,
        collection,
        collection_offset,
    })
}

/// Parse `name [SHAPE]`.
pub fn parse_var_declaration(source: &str) -> Result<(String, Option<Shape>), ExprError> {
    let mut lexer = HeaderLexer::new(source);
    let name = lexer.identifier()?;

    lexer.skip_whitespace();
    let offset = lexer.pos;
    let rest = lexer.rest();
    if rest.trim().is_empty() {
        return Ok((name, None));
    }

    let shape = parse_shape_literal(&rest)
        .map_err(|e| ExprError::new(e.message, e.offset + offset))?;
    Ok((name, Some(shape)))
}

struct HeaderLexer {
    chars: Vec<char>,
    pos: usize,
}

impl HeaderLexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn identifier(&mut self) -> Result<String, ExprError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.chars.len() && is_word_char(self.chars[self.pos]) {
            self.pos += 1;
        }

        let word: String = self.chars[start..self.pos].iter().collect();
        if !is_identifier(&word) {
            return Err(ExprError::new(
                if word.is_empty() {
                    "Expected identifier".to_string()
                } else {
                    format!("Invalid identifier '{word}'")
                },
                start,
            ));
        }
        Ok(word)
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), ExprError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.chars.len() && is_word_char(self.chars[self.pos]) {
            self.pos += 1;
        }

        let word: String = self.chars[start..self.pos].iter().collect();
        if word != keyword {
            return Err(ExprError::new(format!("Expected '{keyword}'"), start));
        }
        Ok(())
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn rest(&mut self) -> String {
        let rest = self.chars[self.pos..].iter().collect();
        self.pos = self.chars.len();
        rest
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_loop_item_only() {
        let header = parse_loop_header("item in items").unwrap();
        assert_eq!(header.item, "item");
        assert_eq!(header.index, None);
        assert_eq!(header.collection.trim(), "items");
        assert_eq!(header.collection_offset, 7);
    }

    #[test]
    fn test_loop_with_index() {
        let header = parse_loop_header("  row , i in data.rows").unwrap();
        assert_eq!(header.item, "row");
        assert_eq!(header.index, Some("i".into()));
        assert_eq!(header.collection.trim(), "data.rows");
    }

    #[test]
    fn test_loop_collection_may_contain_in() {
        let header = parse_loop_header("x in ['in', 'out']").unwrap();
        assert_eq!(header.collection.trim(), "['in', 'out']");
    }

    #[test]
    fn test_loop_errors() {
        assert!(parse_loop_header("in items").is_err());
        assert!(parse_loop_header("item of items").is_err());
        assert!(parse_loop_header("item in").is_err());
        assert!(parse_loop_header("a, b, c in items").is_err());
    }

    #[test]
    fn test_var_without_annotation() {
        assert_eq!(parse_var_declaration(" title ").unwrap(), ("title".into(), None));
    }

    #[test]
    fn test_var_with_annotation() {
        let (name, shape) = parse_var_declaration("user {name: string, age: number}").unwrap();
        assert_eq!(name, "user");
        assert_eq!(
            shape,
            Some(Shape::object([("name", Shape::String), ("age", Shape::Number)]))
        );
    }

    #[test]
    fn test_var_bad_annotation_offset() {
        let err = parse_var_declaration("n numbr").unwrap_err();
        assert_eq!(err.offset, 2);
    }
}
