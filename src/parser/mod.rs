pub mod header;
mod tree_builder;

pub use header::{Document, Header, SENTINEL, split_header};
use tree_builder::TreeBuilder;

use crate::ast::{Position, Template};
use crate::error::TemplateError;

/// Parser trait - converts a document body to a block tree
pub trait Parser {
    fn parse(&self, source: &str) -> Result<Template, TemplateError>;
}

/// Prism document parser
pub struct DocumentParser {
    // Configuration only, no state
}

impl DocumentParser {
    pub fn new() -> Self {
        Self {}
    }

    /// Parse a body that starts at `origin` in its document, so spans point
    /// into the full document
    pub fn parse_at(&self, body: &str, origin: Position) -> Result<Template, TemplateError> {
        TreeBuilder::new(body, origin).build()
    }
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for DocumentParser {
    fn parse(&self, source: &str) -> Result<Template, TemplateError> {
        self.parse_at(source, Position::new())
    }
}
