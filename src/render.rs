use crate::Options;
use crate::ast::*;
use crate::error::{ErrorKind, TemplateError};
use crate::expr::{Evaluator, Expr};
use crate::expr::eval::truthy;
use crate::value::{ForSource, Symbols, Value};
use log::{debug, trace};

/// Walks a block tree and accumulates output text
pub struct Renderer<'s, 'a> {
    evaluator: Evaluator<'s, 'a>,
    output: String,
}

impl<'s, 'a> Renderer<'s, 'a> {
    pub fn new(symbols: &'s mut Symbols<'a>, options: &'s Options) -> Self {
        Self {
            evaluator: Evaluator::new(symbols, options),
            output: String::new(),
        }
    }

    /// Render the whole template. On error nothing is returned; partial
    /// output is dropped.
    pub fn render(mut self, template: &Template) -> Result<String, TemplateError> {
        self.blocks(&template.blocks)?;
        debug!("rendered {} bytes", self.output.len());
        Ok(self.output)
    }

    fn blocks(&mut self, blocks: &[Block]) -> Result<(), TemplateError> {
        for block in blocks {
            self.block(block)?;
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), TemplateError> {
        match block {
            Block::Text(text) => {
                // Whitespace-only lines are dropped, content lines kept whole
                for line in text.content.split_inclusive('\n') {
                    if !line.trim_start().is_empty() {
                        self.output.push_str(line);
                    }
                }
                Ok(())
            }

            Block::Variable(var) => {
                let value = self.evaluator.evaluate(&var.expr)?;
                match value.stringify() {
                    Ok(Some(text)) => self.output.push_str(&text),
                    Ok(None) => {}
                    Err(kind) => {
                        return Err(TemplateError::new(
                            ErrorKind::TypeMismatch,
                            format!("A {} cannot be written to the output.", kind),
                            var.span,
                        ));
                    }
                }
                Ok(())
            }

            Block::Substitute(sub) => match self.evaluator.symbols().get(&sub.name) {
                Some(Value::String(text)) => {
                    self.output.push_str(text);
                    Ok(())
                }
                Some(other) => Err(TemplateError::new(
                    ErrorKind::TypeMismatch,
                    format!("'@{}' must name a string, but it is a {}.", sub.name, other.kind_name()),
                    sub.span,
                )
                .with_help(format!("Use '@{{{}}}' to write other values", sub.name))),
                None => Err(TemplateError::new(
                    ErrorKind::UnknownVariable,
                    format!("'@{}' is neither a directive nor a defined name.", sub.name),
                    sub.span,
                )
                .with_help("Directives are @if, @elseif, @else, @for and @end")),
            },

            Block::If(block) => {
                if self.condition(&block.condition, "'@if'")? {
                    trace!("@if at line {} taken", block.span.start.line + 1);
                    return self.blocks(&block.children);
                }
                for branch in &block.else_ifs {
                    if self.condition(&branch.condition, "'@elseif'")? {
                        trace!("@elseif at line {} taken", branch.span.start.line + 1);
                        return self.blocks(&branch.children);
                    }
                }
                match &block.else_block {
                    Some(else_block) => self.blocks(&else_block.children),
                    None => Ok(()),
                }
            }

            Block::For(block) => {
                let source = self.evaluator.evaluate_loop_source(&block.source)?;
                let shadowed = self.evaluator.symbols_mut().remove(&source.binding);

                let result = self.iterate(&source, &block.children);

                // The loop variable never outlives the loop, even on error
                let symbols = self.evaluator.symbols_mut();
                symbols.remove(&source.binding);
                if let Some(previous) = shadowed {
                    symbols.insert(source.binding.clone(), previous);
                }
                result
            }
        }
    }

    fn condition(&mut self, expr: &Expr, context: &str) -> Result<bool, TemplateError> {
        let value = self.evaluator.evaluate(expr)?;
        truthy(&value, context, expr.span)
    }

    fn iterate(&mut self, source: &ForSource<'a>, children: &[Block]) -> Result<(), TemplateError> {
        let mut count = 0usize;
        for value in source.values() {
            trace!("@for {} = {:?}", source.binding, value);
            self.evaluator.symbols_mut().insert(source.binding.clone(), value);
            self.blocks(children)?;
            count += 1;
        }
        trace!("@for over '{}' ran {} time(s)", source.binding, count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DocumentParser, Parser};
    use crate::value::ArrayView;

    fn render_with(source: &str, symbols: &mut Symbols) -> Result<String, TemplateError> {
        let template = DocumentParser::new().parse(source)?;
        Renderer::new(symbols, &Options::default()).render(&template)
    }

    #[test]
    fn test_whitespace_only_lines_are_dropped() {
        let mut symbols = Symbols::new();
        assert_eq!(render_with("  keep both  \n", &mut symbols).unwrap(), "  keep both  \n");
        assert_eq!(render_with("   \n\t", &mut symbols).unwrap(), "");
        assert_eq!(render_with("  x\ny\n   \nz\n", &mut symbols).unwrap(), "  x\ny\nz\n");
    }

    #[test]
    fn test_indentation_survives_after_blocks() {
        let mut symbols = Symbols::new().with("on", true);
        let out = render_with("@if(on)\n    enabled();\n\n@end\n  done\n", &mut symbols).unwrap();
        assert_eq!(out, "    enabled();\n  done\n");
    }

    #[test]
    fn test_interpolation() {
        let mut symbols = Symbols::new().with("n", 3).with("f", 0.5f32).with("b", false).with("s", "vec4");
        let out = render_with("@{n},@{f},@{b},@{s}", &mut symbols).unwrap();
        assert_eq!(out, "3,0.5,false,vec4");
        // whitespace-only runs between blocks are dropped
        assert_eq!(render_with("@{n} @{n}", &mut symbols).unwrap(), "33");
    }

    #[test]
    fn test_assignment_renders_nothing() {
        let mut symbols = Symbols::new();
        let out = render_with("@{x = 4}@{x}", &mut symbols).unwrap();
        assert_eq!(out, "4");
        assert_eq!(symbols.get("x"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_unrenderable_values() {
        let data = [1, 2];
        let mut symbols = Symbols::new().with("a", ArrayView::ints(&data, &[2]).unwrap());
        let err = render_with("@{a}", &mut symbols).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(render_with("@{0..2}", &mut symbols).unwrap_err().kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_substitute_requires_string() {
        let mut symbols = Symbols::new().with("precision", "highp").with("n", 1);
        assert_eq!(render_with("uniform @precision;", &mut symbols).unwrap(), "uniform highp;");
        assert_eq!(render_with("@n", &mut symbols).unwrap_err().kind, ErrorKind::TypeMismatch);
        assert_eq!(render_with("@nope", &mut symbols).unwrap_err().kind, ErrorKind::UnknownVariable);
    }

    #[test]
    fn test_branch_selection() {
        let source = "@if(x == 1)one@elseif(x == 2)two@else;other@end";
        for (x, expected) in [(1, "one"), (2, "two"), (3, "other")] {
            let mut symbols = Symbols::new().with("x", x);
            assert_eq!(render_with(source, &mut symbols).unwrap(), expected);
        }
    }

    #[test]
    fn test_if_without_else_renders_nothing() {
        let mut symbols = Symbols::new().with("x", 0);
        assert_eq!(render_with("@if(x)yes@end", &mut symbols).unwrap(), "");
    }

    #[test]
    fn test_float_condition_is_an_error() {
        let mut symbols = Symbols::new().with("x", 1.0f32);
        assert_eq!(render_with("@if(x)yes@end", &mut symbols).unwrap_err().kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_for_over_array() {
        let data = [0.5f32, 1.5, 2.5];
        let mut symbols = Symbols::new().with("w", ArrayView::floats(&data, &[3]).unwrap());
        assert_eq!(render_with("@for(v in w)[@{v}]@end", &mut symbols).unwrap(), "[0.5][1.5][2.5]");
        assert!(!symbols.contains("v"));
    }

    #[test]
    fn test_loop_variable_is_removed_on_error() {
        let mut symbols = Symbols::new();
        let err = render_with("@for(i in 0..3)@{i}@{missing}@end", &mut symbols).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownVariable);
        assert!(!symbols.contains("i"));
    }

    #[test]
    fn test_loop_restores_shadowed_value() {
        let mut symbols = Symbols::new().with("i", 42);
        assert_eq!(render_with("@for(i in 0..2)@{i}@end", &mut symbols).unwrap(), "01");
        assert_eq!(symbols.get("i"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_empty_range() {
        let mut symbols = Symbols::new();
        assert_eq!(render_with("@for(i in 3..1)x@end", &mut symbols).unwrap(), "");
        assert!(!symbols.contains("i"));
    }
}
