//! Prism renders text, typically shader source, from templates that mix
//! literal text with `@`-directives and an embedded expression language.
//!
//! ```text
//! @prism(type='fragment', name='tint')
//!
//! @for(i in 0..count)
//! uniform float weight@{i};
//! @end
//! ```

pub mod ast;
pub mod error;
pub mod expr;
pub mod native;
pub mod parser;
pub mod render;
pub mod value;
pub mod vars;

pub use ast::{Block, Template};
pub use error::{Category, ErrorKind, TemplateError};
pub use native::{Frame, NativeFunction, Slot};
pub use parser::{DocumentParser, Header, Parser};
pub use render::Renderer;
pub use value::{ArrayView, IndexMode, IndexOrder, Range, Symbols, Value};
pub use vars::VarFile;

use log::{debug, warn};
use serde::Serialize;

/// Rendering configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Validate every array index against its dimension (default: true).
    /// Without it only the final offset is checked against the buffer.
    pub bounds_check: bool,
    /// Index count accepted by array accesses (default: full)
    pub index_mode: IndexMode,
    /// Which bracket addresses dimension 0 (default: declared order)
    pub index_order: IndexOrder,
    /// Reject documents without a `@prism(...)` header (default: true).
    /// Turn off to render plain bodies.
    pub require_header: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bounds_check: true,
            index_mode: IndexMode::Full,
            index_order: IndexOrder::Declared,
            require_header: true,
        }
    }
}

/// Result of rendering a full document
#[derive(Debug, Clone, Serialize)]
pub struct RenderResult {
    pub header: Option<Header>,
    pub output: String,
}

/// Populate, load, process.
///
/// The processor keeps the parsed block tree, so one template can be
/// processed repeatedly. Each `process` call renders against a fresh copy of
/// the populated symbols; assignments and loop variables never leak from one
/// call into the next.
#[derive(Debug, Default)]
pub struct Processor<'a> {
    options: Options,
    symbols: Symbols<'a>,
    header: Option<Header>,
    template: Option<Template>,
}

impl<'a> Processor<'a> {
    pub fn new(options: Options) -> Self {
        if !options.bounds_check {
            warn!("array bounds checking is disabled; out-of-range indices alias other elements");
        }
        Self {
            options,
            symbols: Symbols::new(),
            header: None,
            template: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Install the symbol table, rejecting names that collide with keywords
    pub fn populate(&mut self, symbols: Symbols<'a>) -> Result<(), TemplateError> {
        symbols.validate()?;
        debug!("populated {} symbol(s)", symbols.len());
        self.symbols = symbols;
        Ok(())
    }

    /// Parse a document, replacing any previously loaded one
    pub fn load(&mut self, document: &str) -> Result<Option<&Header>, TemplateError> {
        self.template = None;
        self.header = None;

        let split = parser::split_header(document)?;
        if split.header.is_none() && self.options.require_header {
            return Err(TemplateError::bare(
                ErrorKind::MissingHeader,
                "The document has no '@prism(...)' header.",
            )
            .with_help("Start the document with @prism(type='...')"));
        }

        let template = DocumentParser::new().parse_at(split.body, split.origin)?;
        debug!("loaded template with {} top-level block(s)", template.blocks.len());
        self.template = Some(template);
        self.header = split.header;
        Ok(self.header.as_ref())
    }

    /// Render the loaded template
    pub fn process(&self) -> Result<String, TemplateError> {
        let template = self.template.as_ref().ok_or_else(|| {
            TemplateError::bare(ErrorKind::NotLoaded, "Nothing to process; call load() first.")
        })?;
        let mut symbols = self.symbols.clone();
        render(template, &mut symbols, &self.options)
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    pub fn symbols(&self) -> &Symbols<'a> {
        &self.symbols
    }
}

/// Parse a document body (no header) into a block tree
pub fn parse_document(body: &str) -> Result<Template, TemplateError> {
    DocumentParser::new().parse(body)
}

/// Render a block tree; `symbols` keeps any assignments made by the template
pub fn render<'a>(template: &Template, symbols: &mut Symbols<'a>, options: &Options) -> Result<String, TemplateError> {
    Renderer::new(symbols, options).render(template)
}

/// Load and render a full document in one call
pub fn render_document<'a>(
    document: &str,
    symbols: Symbols<'a>,
    options: Options,
) -> Result<RenderResult, TemplateError> {
    let mut processor = Processor::new(options);
    processor.populate(symbols)?;
    processor.load(document)?;
    let output = processor.process()?;
    Ok(RenderResult {
        header: processor.header().cloned(),
        output,
    })
}
