use crate::expr::lexer::Span;
use serde::Serialize;
use std::fmt;

/// Broad error class, mirroring how a failure is reported to the caller.
///
/// Type errors (unknown variables, unsupported operand kinds, calling a
/// non-function) are reported as syntax errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Syntax,
    Runtime,
    Config,
}

/// Kind of template error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    // Lexing and parsing
    UnexpectedCharacter,
    UnterminatedString,
    InvalidLiteral,
    UnexpectedToken,
    UnclosedParen,
    UnclosedBracket,
    UnclosedBrace,
    UnclosedBlock,
    UnexpectedEnd,
    OrphanBranch,
    UnknownDirective,
    MalformedHeader,
    MissingElse,

    // Evaluation
    UnknownVariable,
    TypeMismatch,
    NotCallable,
    WrongIndexCount,

    // Runtime
    EmptyDocument,
    MissingHeader,
    MissingHeaderArgument,
    IndexOutOfBounds,
    NativeCall,
    NotLoaded,

    // Configuration
    ReservedName,
    InvalidArray,
    InvalidVars,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnexpectedCharacter => "Unexpected character",
            ErrorKind::UnterminatedString => "Unterminated string",
            ErrorKind::InvalidLiteral => "Invalid literal",
            ErrorKind::UnexpectedToken => "Unexpected token",
            ErrorKind::UnclosedParen => "Unclosed parenthesis",
            ErrorKind::UnclosedBracket => "Unclosed bracket",
            ErrorKind::UnclosedBrace => "Unclosed brace",
            ErrorKind::UnclosedBlock => "Unclosed block",
            ErrorKind::UnexpectedEnd => "Unexpected end",
            ErrorKind::OrphanBranch => "Orphan branch",
            ErrorKind::UnknownDirective => "Unknown directive",
            ErrorKind::MalformedHeader => "Malformed header",
            ErrorKind::MissingElse => "Missing else",
            ErrorKind::UnknownVariable => "Unknown variable",
            ErrorKind::TypeMismatch => "Type mismatch",
            ErrorKind::NotCallable => "Not callable",
            ErrorKind::WrongIndexCount => "Wrong index count",
            ErrorKind::EmptyDocument => "Empty document",
            ErrorKind::MissingHeader => "Missing header",
            ErrorKind::MissingHeaderArgument => "Missing header argument",
            ErrorKind::IndexOutOfBounds => "Index out of bounds",
            ErrorKind::NativeCall => "Native call failed",
            ErrorKind::NotLoaded => "No template loaded",
            ErrorKind::ReservedName => "Reserved name",
            ErrorKind::InvalidArray => "Invalid array",
            ErrorKind::InvalidVars => "Invalid variables",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ErrorKind::EmptyDocument
            | ErrorKind::MissingHeader
            | ErrorKind::MissingHeaderArgument
            | ErrorKind::IndexOutOfBounds
            | ErrorKind::NativeCall
            | ErrorKind::NotLoaded => Category::Runtime,
            ErrorKind::ReservedName | ErrorKind::InvalidArray | ErrorKind::InvalidVars => {
                Category::Config
            }
            _ => Category::Syntax,
        }
    }
}

/// Error raised while loading, parsing or rendering a template
#[derive(Debug, Clone)]
pub struct TemplateError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub related_span: Option<Span>,
    pub related_label: Option<String>,
    pub help: Option<String>,
}

impl TemplateError {
    /// Create a new error pointing at a source span
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
            related_span: None,
            related_label: None,
            help: None,
        }
    }

    /// Create an error with no source location (configuration, host calls)
    pub fn bare(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            related_span: None,
            related_label: None,
            help: None,
        }
    }

    /// Add a related span with a label (e.g., "opened here")
    pub fn with_related(mut self, span: Span) -> Self {
        self.related_span = Some(span);
        self
    }

    /// Set the label for the related span
    pub fn with_related_label(mut self, label: impl Into<String>) -> Self {
        self.related_label = Some(label.into());
        self
    }

    /// Add help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attach a span unless a more precise one is already set
    pub fn or_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    pub fn is_syntax(&self) -> bool {
        self.category() == Category::Syntax
    }

    pub fn is_runtime(&self) -> bool {
        self.category() == Category::Runtime
    }

    pub fn is_config(&self) -> bool {
        self.category() == Category::Config
    }

    /// Render the error with source context
    pub fn render(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, false)
    }

    /// Render the error with ANSI color codes
    pub fn render_color(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, true)
    }

    fn render_inner(&self, source: &str, filename: &str, color: bool) -> String {
        let red = if color { "\x1b[1;31m" } else { "" };
        let dim = if color { "\x1b[2m" } else { "" };
        let cyan = if color { "\x1b[1;38;5;73m" } else { "" };
        let reset = if color { "\x1b[0m" } else { "" };

        let mut output = String::new();
        output.push('\n');

        // Location points at the related span when there is one (where the fix is needed)
        match self.related_span.as_ref().or(self.span.as_ref()) {
            Some(loc) => output.push_str(&format!(
                " {}file:{} {}:{}:{}\n",
                dim,
                reset,
                filename,
                loc.start.line + 1,
                loc.start.col + 1
            )),
            None => output.push_str(&format!(" {}file:{} {}\n", dim, reset, filename)),
        }

        let message = if color { highlight_quoted(&self.message) } else { self.message.clone() };
        output.push_str(&format!("{}error:{} {}\n", red, reset, message));

        if let Some(span) = self.span {
            push_snippet(&mut output, source, &span, None, color);
        }

        if let Some(ref related) = self.related_span {
            let label = self.related_label.as_deref().unwrap_or("opened here");
            push_snippet(&mut output, source, related, Some(label), color);
        }

        if let Some(ref help) = self.help {
            output.push('\n');
            for (i, help_line) in help.lines().enumerate() {
                let content = if color { highlight_quoted(help_line) } else { help_line.to_string() };
                if i == 0 {
                    output.push_str(&format!(" {}help:{} {}\n", cyan, reset, content));
                } else {
                    output.push_str(&format!("       {}\n", content));
                }
            }
        }

        output.push('\n');
        output
    }
}

/// Append one source line with a caret underline below the span.
/// A `label` marks secondary context and is drawn dim instead of red.
fn push_snippet(output: &mut String, source: &str, span: &Span, label: Option<&str>, color: bool) {
    let Some(source_line) = source.lines().nth(span.start.line) else {
        return;
    };

    let red = if color { "\x1b[1;31m" } else { "" };
    let dim = if color { "\x1b[2m" } else { "" };
    let reset = if color { "\x1b[0m" } else { "" };

    let line_no = span.start.line + 1;
    let width = format!("{}", line_no).len().max(2);
    let highlighted = if color { highlight_directives(source_line) } else { source_line.to_string() };

    if label.is_none() {
        output.push_str(&format!("{}{:>width$} |{}\n", dim, "", reset, width = width));
    }
    output.push_str(&format!("{}{:>width$} |{} {}\n", dim, line_no, reset, highlighted, width = width));

    let underline_len = if span.end.line == span.start.line {
        span.end.col.saturating_sub(span.start.col).max(1)
    } else {
        source_line.chars().count().saturating_sub(span.start.col).max(1)
    };
    let spaces = " ".repeat(span.start.col);
    let carets = "^".repeat(underline_len);

    match label {
        Some(label) => output.push_str(&format!(
            "{}{:>width$} |{} {}{}{} {}{}\n",
            dim, "", reset, spaces, dim, carets, label, reset,
            width = width
        )),
        None => output.push_str(&format!(
            "{}{:>width$} |{} {}{}{}{}\n",
            dim, "", reset, spaces, red, carets, reset,
            width = width
        )),
    }
}

/// Render 'quoted' code in messages as `code` with keyword color
fn highlight_quoted(text: &str) -> String {
    const KEYWORD: &str = "\x1b[38;5;173m";
    const RESET: &str = "\x1b[0m";

    let mut result = String::with_capacity(text.len() * 2);
    let mut rest = text;
    while let Some(open) = rest.find('\'') {
        let after = &rest[open + 1..];
        match after.find('\'') {
            Some(close) if close > 0 => {
                result.push_str(&rest[..open]);
                result.push_str(KEYWORD);
                result.push('`');
                result.push_str(&after[..close]);
                result.push('`');
                result.push_str(RESET);
                rest = &after[close + 1..];
            }
            _ => {
                result.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

/// Color `@directive` names in a source line
fn highlight_directives(line: &str) -> String {
    const DIRECTIVE: &str = "\x1b[38;5;173m";
    const RESET: &str = "\x1b[0m";

    let mut result = String::with_capacity(line.len() * 2);
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '@' {
            result.push(ch);
            continue;
        }
        result.push_str(DIRECTIVE);
        result.push('@');
        while let Some(&next) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                result.push(next);
                chars.next();
            } else {
                break;
            }
        }
        result.push_str(RESET);
    }
    result
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TemplateError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::Position;

    fn span(line: usize, start: usize, end: usize) -> Span {
        Span {
            start: Position { byte: 0, line, col: start },
            end: Position { byte: 0, line, col: end },
        }
    }

    #[test]
    fn test_categories() {
        assert_eq!(ErrorKind::UnclosedBlock.category(), Category::Syntax);
        assert_eq!(ErrorKind::TypeMismatch.category(), Category::Syntax);
        assert_eq!(ErrorKind::IndexOutOfBounds.category(), Category::Runtime);
        assert_eq!(ErrorKind::EmptyDocument.category(), Category::Runtime);
        assert_eq!(ErrorKind::ReservedName.category(), Category::Config);
    }

    #[test]
    fn test_render_plain() {
        let source = "first\n@if(x\nlast";
        let err = TemplateError::new(ErrorKind::UnclosedParen, "This '(' is never closed.", span(1, 3, 4))
            .with_help("Add ')'");
        let rendered = err.render(source, "test.prism");

        assert!(rendered.contains(" file: test.prism:2:4"));
        assert!(rendered.contains("error: This '(' is never closed."));
        assert!(rendered.contains(" 2 | @if(x"));
        assert!(rendered.contains("   |    ^"));
        assert!(rendered.contains(" help: Add ')'"));
    }

    #[test]
    fn test_render_related_location_wins() {
        let source = "@for(i in 0..3)\nbody\n";
        let err = TemplateError::new(ErrorKind::UnclosedBlock, "This '@for' block is never closed.", span(1, 4, 4))
            .with_related(span(0, 0, 4));
        let rendered = err.render(source, "t.prism");

        assert!(rendered.contains("t.prism:1:1"));
        assert!(rendered.contains("^^^^ opened here"));
    }

    #[test]
    fn test_render_without_span() {
        let err = TemplateError::bare(ErrorKind::ReservedName, "'if' is reserved.");
        let rendered = err.render("", "vars.json");
        assert!(rendered.contains(" file: vars.json\n"));
        assert!(rendered.contains("error: 'if' is reserved."));
    }

    #[test]
    fn test_highlight_quoted() {
        let out = highlight_quoted("close with '@end' here");
        assert!(out.contains("`@end`"));
        assert!(out.starts_with("close with "));
        assert_eq!(highlight_quoted("don't"), "don't");
    }
}
