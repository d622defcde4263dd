use super::lexer::Span;
use serde::Serialize;

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    // Leaves
    Variable(String),
    Integer(i32),
    Float(f32),
    Bool(bool),
    Str(String),

    /// `name[i][j]...`, indices in declaration order
    ArrayAccess {
        name: String,
        indices: Vec<Expr>,
    },

    // Operators
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Equal(Box<Expr>, Box<Expr>),
    /// Membership test, or a loop source when used as a `@for` condition
    In {
        item: Box<Expr>,
        source: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Half-open `start..end`
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },

    /// `if c then a elseif d then b else e`
    If {
        condition: Box<Expr>,
        body: Box<Expr>,
        else_ifs: Vec<ElseIfArm>,
        else_body: Option<Box<Expr>>,
    },

    Assign {
        name: String,
        value: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElseIfArm {
    pub condition: Expr,
    pub body: Expr,
}
