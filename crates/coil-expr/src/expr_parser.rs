//! Expression parser for Coil.
//!
//! Parses expression token streams (from `expr_lexer`) into `Expression` AST nodes.
//! Handles operator precedence, member access, calls, and literal forms.

use crate::ast::{
    BinaryOp, ExprKind, ExprSpan, Expression, ObjectProperty, PropertyKey, UnaryOp,
};
use crate::expr_lexer::{ExprLexer, Token, TokenKind, TokenValue};
use crate::ExprError;

/// Coil expression parser.
///
/// Converts a flat token stream into a tree of `Expression` nodes
/// using recursive descent with precedence climbing for binary operators.
pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    /// Create a new expression parser for the given tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a complete expression from a source string.
    pub fn parse(source: &str) -> Result<Expression, ExprError> {
        let tokens = ExprLexer::tokenize(source)?;
        let mut parser = ExprParser::new(tokens);

        if parser.peek().kind == TokenKind::Eof {
            return Err(parser.error("Empty expression"));
        }

        let expr = parser.parse_expression()?;
        if parser.peek().kind != TokenKind::Eof {
            return Err(parser.error("Unexpected token after expression"));
        }
        Ok(expr)
    }

    fn parse_expression(&mut self) -> Result<Expression, ExprError> {
        self.parse_ternary()
    }

    /// `cond ? a : b`, right-associative.
    fn parse_ternary(&mut self) -> Result<Expression, ExprError> {
        let condition = self.parse_binary(1)?;

        if self.peek().kind != TokenKind::Question {
            return Ok(condition);
        }
        self.advance(); // consume ?

        let consequent = self.parse_expression()?;
        self.expect(TokenKind::Colon, "Expected ':' in ternary expression")?;
        let alternate = self.parse_expression()?;

        let span = ExprSpan::new(condition.span.start, alternate.span.end);
        Ok(Expression::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    /// Precedence climbing over left-associative binary operators.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, ExprError> {
        let mut left = self.parse_unary()?;

        while let Some(op) = binary_op(self.peek().kind) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();

            let right = self.parse_binary(precedence + 1)?;
            let span = ExprSpan::new(left.span.start, right.span.end);
            left = Expression::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ExprError> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };

        let start = self.peek().span.start;
        self.advance();
        let operand = self.parse_unary()?;
        let span = ExprSpan::new(start, operand.span.end);
        Ok(Expression::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// Member access, indexing and calls: `a.b`, `a[0]`, `f(x)`.
    fn parse_postfix(&mut self) -> Result<Expression, ExprError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let token = self.peek().clone();
                    let name = match token.value {
                        TokenValue::Identifier(name) => name,
                        _ => return Err(self.error("Expected property name after '.'")),
                    };
                    self.advance();

                    let span = ExprSpan::new(expr.span.start, token.span.end);
                    expr = Expression::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: Box::new(Expression::new(
                                ExprKind::Identifier(name),
                                token.span,
                            )),
                            computed: false,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.parse_expression()?;
                    let end = self.expect(TokenKind::RBracket, "Expected ']' after index")?;
                    let span = ExprSpan::new(expr.span.start, end);
                    expr = Expression::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: Box::new(property),
                            computed: true,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let (arguments, end) = self.parse_list(TokenKind::RParen, "Expected ')' after arguments")?;
                    let span = ExprSpan::new(expr.span.start, end);
                    expr = Expression::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            arguments,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ExprError> {
        let token = self.peek().clone();

        let kind = match (token.kind, token.value) {
            (TokenKind::Number, TokenValue::Number(n)) => ExprKind::Number(n),
            (TokenKind::String, TokenValue::String(s)) => ExprKind::String(s),
            (TokenKind::Boolean, TokenValue::Boolean(b)) => ExprKind::Boolean(b),
            (TokenKind::Null, _) => ExprKind::Null,
            (TokenKind::Identifier, TokenValue::Identifier(name)) => ExprKind::Identifier(name),
            (TokenKind::LParen, _) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "Expected ')'")?;
                return Ok(inner);
            }
            (TokenKind::LBracket, _) => {
                self.advance();
                let (items, end) = self.parse_list(TokenKind::RBracket, "Expected ']' after array items")?;
                return Ok(Expression::new(
                    ExprKind::Array(items),
                    ExprSpan::new(token.span.start, end),
                ));
            }
            (TokenKind::LBrace, _) => return self.parse_object(),
            (TokenKind::Eof, _) => return Err(self.error("Unexpected end of expression")),
            (kind, _) => return Err(self.error(&format!("Unexpected token {kind:?}"))),
        };

        self.advance();
        Ok(Expression::new(kind, token.span))
    }

    /// `{ a: 1, 'b': 2, [k]: 3, shorthand }`
    fn parse_object(&mut self) -> Result<Expression, ExprError> {
        let start = self.peek().span.start;
        self.advance(); // consume {

        let mut properties = Vec::new();

        loop {
            if self.peek().kind == TokenKind::RBrace {
                break;
            }

            let token = self.peek().clone();
            let key = match (token.kind, token.value) {
                (TokenKind::Identifier, TokenValue::Identifier(name)) => {
                    self.advance();
                    PropertyKey::Identifier(name)
                }
                (TokenKind::String, TokenValue::String(s)) => {
                    self.advance();
                    PropertyKey::String(s)
                }
                (TokenKind::LBracket, _) => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "Expected ']' after computed key")?;
                    PropertyKey::Computed(Box::new(key))
                }
                _ => return Err(self.error("Expected property key")),
            };

            if self.peek().kind == TokenKind::Colon {
                self.advance();
                let value = self.parse_expression()?;
                properties.push(ObjectProperty {
                    key,
                    value,
                    shorthand: false,
                });
            } else if let PropertyKey::Identifier(name) = &key {
                let value = Expression::new(ExprKind::Identifier(name.clone()), token.span);
                properties.push(ObjectProperty {
                    key,
                    value,
                    shorthand: true,
                });
            } else {
                return Err(self.error("Expected ':' after property key"));
            }

            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }

        let end = self.expect(TokenKind::RBrace, "Expected '}' after object properties")?;
        Ok(Expression::new(
            ExprKind::Object(properties),
            ExprSpan::new(start, end),
        ))
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    /// Returns the items and the end offset of the closing token.
    fn parse_list(
        &mut self,
        close: TokenKind,
        message: &str,
    ) -> Result<(Vec<Expression>, usize), ExprError> {
        let mut items = Vec::new();

        while self.peek().kind != close {
            items.push(self.parse_expression()?);
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }

        let end = self.expect(close, message)?;
        Ok((items, end))
    }

    // --- Token navigation helpers ---

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Consume a token of the given kind, returning its end offset.
    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<usize, ExprError> {
        if self.peek().kind != kind {
            return Err(self.error(message));
        }
        let end = self.peek().span.end;
        self.advance();
        Ok(end)
    }

    fn error(&self, message: &str) -> ExprError {
        ExprError {
            message: message.to_string(),
            offset: self.peek().span.start,
        }
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Neq,
        TokenKind::StrictEq => BinaryOp::StrictEq,
        TokenKind::StrictNotEq => BinaryOp::StrictNeq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Lte => BinaryOp::Lte,
        TokenKind::Gte => BinaryOp::Gte,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        TokenKind::QuestionQuestion => BinaryOp::NullishCoalescing,
        _ => return None,
    };
    Some(op)
}
