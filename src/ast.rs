use crate::expr::Expr;
use serde::Serialize;

pub use crate::expr::lexer::{Position, Span};

/// Parsed document body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub blocks: Vec<Block>,
}

impl Template {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }
}

/// Block tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Block {
    Text(TextBlock),
    /// `@{expr}`
    Variable(VariableBlock),
    /// Bare `@name`
    Substitute(SubstituteBlock),
    If(IfBlock),
    For(ForBlock),
}

/// Literal text run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub content: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableBlock {
    pub expr: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstituteBlock {
    pub name: String,
    pub span: Span,
}

/// `@if(cond) ... (@elseif(cond) ...)* (@else ...)? @end`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfBlock {
    pub condition: Expr,
    pub children: Vec<Block>,
    pub else_ifs: Vec<ElseIfBlock>,
    pub else_block: Option<ElseBlock>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElseIfBlock {
    pub condition: Expr,
    pub children: Vec<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElseBlock {
    pub children: Vec<Block>,
    pub span: Span,
}

/// `@for(name in source) ... @end`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForBlock {
    pub source: Expr,
    pub children: Vec<Block>,
    pub span: Span,
}
