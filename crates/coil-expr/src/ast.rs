//! Expression AST.
//!
//! The expression language is a small side-effect-free subset of JavaScript
//! expression syntax: literals, identifiers, member access, calls to built-in
//! functions, operators, ternaries, array and object literals.

use crate::shape::Shape;

/// A position in expression text (relative to the expression string, not the source file).
/// Named `ExprSpan` to distinguish from `coil_lexer::Span` which tracks source file positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExprSpan {
    pub start: usize,
    pub end: usize,
}

impl ExprSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A complete expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: ExprSpan,
}

impl Expression {
    pub fn new(kind: ExprKind, span: ExprSpan) -> Self {
        Self { kind, span }
    }

    /// The identifier name if this is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Numeric literal: `42`, `3.14`
    Number(f64),

    /// String literal: `"hello"`, `'world'`
    String(String),

    /// Boolean literal: `true`, `false`
    Boolean(bool),

    /// `null` / `undefined`
    Null,

    /// Identifier: `count`, `isActive`
    Identifier(String),

    /// Binary operation: `a + b`, `count > 0`
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },

    /// Unary operation: `!active`, `-count`
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Member access: `user.name`, `items[0]`
    Member {
        object: Box<Expression>,
        property: Box<Expression>,
        computed: bool,
    },

    /// Function call: `len(items)`
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },

    /// Ternary: `count > 0 ? 'yes' : 'no'`
    Ternary {
        condition: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },

    /// Object literal: `{ count: 0, 'name': 'test', [key]: 1 }`
    Object(Vec<ObjectProperty>),

    /// Array literal: `[1, 2, 3]`
    Array(Vec<Expression>),

    /// Shape constant embedded by the compiler (the second argument of `cast`).
    Shape(Shape),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperty {
    pub key: PropertyKey,
    pub value: Expression,
    pub shorthand: bool,
}

/// Key of an object literal entry.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Identifier(String),
    String(String),
    /// `[expr]: value`. Disqualifies the literal from being a shape literal.
    Computed(Box<Expression>),
}

impl PropertyKey {
    /// The literal key text, `None` for computed keys.
    pub fn literal(&self) -> Option<&str> {
        match self {
            PropertyKey::Identifier(name) | PropertyKey::String(name) => Some(name),
            PropertyKey::Computed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    NullishCoalescing,
}

impl BinaryOp {
    /// Binding power for precedence climbing (higher binds tighter).
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::NullishCoalescing => 1,
            BinaryOp::Or => 2,
            BinaryOp::And => 3,
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::StrictEq | BinaryOp::StrictNeq => 4,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => 5,
            BinaryOp::Add | BinaryOp::Sub => 6,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}
