use crate::ast::{Position, Span};
use crate::error::{ErrorKind, TemplateError};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

/// Header directive that opens a template document
pub const SENTINEL: &str = "@prism";

lazy_static! {
    static ref SENTINEL_RE: Regex = Regex::new(r"^\s*@prism\s*\(").unwrap();
    static ref HEADER_RE: Regex = Regex::new(r"^\s*@prism\s*\((.*)\)\s*$").unwrap();
    static ref ARG_SPLIT_RE: Regex = Regex::new(r"\s*,\s*").unwrap();
    static ref ARG_RE: Regex = Regex::new(r"^(\w+)\s*=\s*(.*?)\s*$").unwrap();
}

/// Template metadata from the `@prism(...)` line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            kind: String::new(),
            name: "untitled".to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            author: "unknown".to_string(),
        }
    }
}

/// A document split into its header and the body the block parser sees
#[derive(Debug, Clone, PartialEq)]
pub struct Document<'a> {
    pub header: Option<Header>,
    pub body: &'a str,
    /// Where `body` starts in the full document
    pub origin: Position,
}

/// Strip the header line, and one blank line after it, from `document`.
///
/// A document without a header is returned whole.
pub fn split_header(document: &str) -> Result<Document<'_>, TemplateError> {
    if document.trim().is_empty() {
        return Err(TemplateError::bare(ErrorKind::EmptyDocument, "The document is empty."));
    }

    let mut origin = Position::new();
    let mut lines = document.split_inclusive('\n');

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            skip_line(&mut origin, line);
            continue;
        }
        if !SENTINEL_RE.is_match(line) {
            break;
        }

        let header = parse_header_line(line, origin)?;
        skip_line(&mut origin, line);
        if let Some(next) = lines.next() {
            if next.trim().is_empty() {
                skip_line(&mut origin, next);
            }
        }
        debug!("header: type={} name={} version={}", header.kind, header.name, header.version);
        return Ok(Document {
            header: Some(header),
            body: &document[origin.byte..],
            origin,
        });
    }

    Ok(Document {
        header: None,
        body: document,
        origin: Position::new(),
    })
}

fn skip_line(origin: &mut Position, line: &str) {
    origin.byte += line.len();
    origin.line += 1;
    origin.col = 0;
}

fn parse_header_line(line: &str, start: Position) -> Result<Header, TemplateError> {
    let text = line.trim_end_matches(['\n', '\r']);
    let mut end = start;
    for ch in text.chars() {
        end.advance(ch);
    }
    let span = Span::new(start, end);

    let caps = HEADER_RE.captures(text).ok_or_else(|| {
        TemplateError::new(ErrorKind::MalformedHeader, "The header line is malformed.", span)
            .with_help("Syntax: @prism(type='fragment', name='...', version=1.0)")
    })?;
    let args = caps.get(1).map_or("", |m| m.as_str());

    let mut header = Header::default();
    let mut has_type = false;

    for arg in ARG_SPLIT_RE.split(args.trim()).filter(|a| !a.is_empty()) {
        let caps = ARG_RE.captures(arg).ok_or_else(|| {
            TemplateError::new(
                ErrorKind::MalformedHeader,
                format!("Header argument '{}' is not a key=value pair.", arg),
                span,
            )
        })?;
        let key = &caps[1];
        let value = unquote(&caps[2]).ok_or_else(|| {
            TemplateError::new(
                ErrorKind::MalformedHeader,
                format!("The value of '{}' has an unterminated quote.", key),
                span,
            )
        })?;

        match key {
            "type" => {
                header.kind = value.to_string();
                has_type = true;
            }
            "name" => header.name = value.to_string(),
            "version" => header.version = value.to_string(),
            "description" => header.description = value.to_string(),
            "author" => header.author = value.to_string(),
            other => warn!("ignoring unknown header argument '{}'", other),
        }
    }

    if !has_type {
        return Err(TemplateError::new(
            ErrorKind::MissingHeaderArgument,
            "The header has no 'type' argument.",
            span,
        )
        .with_help("Add type='vertex', type='fragment', ..."));
    }
    Ok(header)
}

/// Strip single quotes; `None` when a quote is opened but never closed
fn unquote(value: &str) -> Option<&str> {
    match value.strip_prefix('\'') {
        Some(rest) => rest.strip_suffix('\''),
        None => Some(value),
    }
}
