//! Embedded expression language: lexer, AST, parser and evaluator

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::{ElseIfArm, Expr, ExprKind};
pub use eval::Evaluator;
pub use lexer::{Lexer, Position, Span, Token, TokenKind, tokenize};
pub use parser::{ExprParser, parse_expression, parse_expression_at};
