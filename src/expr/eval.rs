//! Expression evaluation against a symbol table.
//!
//! Coercions are strict: Bool and Int mix only through `==` and truthiness
//! (an Int is true exactly when it equals 1), and Float never mixes with
//! either.

use super::ast::{Expr, ExprKind};
use super::lexer::Span;
use crate::Options;
use crate::error::{ErrorKind, TemplateError};
use crate::value::{ElementType, ForSource, IndexOrder, Iterable, Range, Scalar, Symbols, Value};
use log::trace;

/// Evaluates expressions, reading and writing one symbol table
pub struct Evaluator<'s, 'a> {
    symbols: &'s mut Symbols<'a>,
    options: &'s Options,
}

impl<'s, 'a> Evaluator<'s, 'a> {
    pub fn new(symbols: &'s mut Symbols<'a>, options: &'s Options) -> Self {
        Self { symbols, options }
    }

    pub fn symbols(&self) -> &Symbols<'a> {
        &*self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut Symbols<'a> {
        &mut *self.symbols
    }

    /// Evaluate an expression in value (condition or interpolation) position
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value<'a>, TemplateError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Integer(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Str(s) => Ok(Value::String(s.clone())),

            ExprKind::Variable(name) => self.lookup(name, span),

            ExprKind::Or(left, right) => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                let l = truthy(&l, "'||'", left.span)?;
                let r = truthy(&r, "'||'", right.span)?;
                Ok(Value::Bool(l || r))
            }

            ExprKind::And(left, right) => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                let l = truthy(&l, "'&&'", left.span)?;
                let r = truthy(&r, "'&&'", right.span)?;
                Ok(Value::Bool(l && r))
            }

            ExprKind::Equal(left, right) => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                Ok(Value::Bool(equal(&l, &r, span)?))
            }

            ExprKind::Not(operand) => match self.evaluate(operand)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                Value::Int(i) => Ok(Value::Bool(i == 0)),
                other => Err(TemplateError::new(
                    ErrorKind::TypeMismatch,
                    format!("'!' expects a bool or int, got a {}.", other.kind_name()),
                    operand.span,
                )),
            },

            ExprKind::In { item, source } => {
                let needle = self.evaluate(item)?;
                let haystack = self.evaluate(source)?;
                Ok(Value::Bool(contains(&haystack, &needle, source.span, span)?))
            }

            ExprKind::Range { start, end } => {
                let start = self.int_operand(start, "range start")?;
                let end = self.int_operand(end, "range end")?;
                Ok(Value::Range(Range::new(start, end)))
            }

            ExprKind::If { condition, body, else_ifs, else_body } => {
                let value = self.evaluate(condition)?;
                if truthy(&value, "'if'", condition.span)? {
                    return self.evaluate(body);
                }
                for arm in else_ifs {
                    let value = self.evaluate(&arm.condition)?;
                    if truthy(&value, "'elseif'", arm.condition.span)? {
                        return self.evaluate(&arm.body);
                    }
                }
                match else_body {
                    Some(else_body) => self.evaluate(else_body),
                    None => Err(TemplateError::new(
                        ErrorKind::MissingElse,
                        "No branch of this 'if' expression matched and it has no 'else'.",
                        span,
                    )),
                }
            }

            ExprKind::ArrayAccess { name, indices } => self.array_access(name, indices, span),

            ExprKind::Call { name, args } => {
                let func = match self.symbols.get(name) {
                    Some(Value::Function(func)) => func.clone(),
                    Some(other) => {
                        return Err(TemplateError::new(
                            ErrorKind::NotCallable,
                            format!("'{}' is a {}, not a function.", name, other.kind_name()),
                            span,
                        ));
                    }
                    None => return Err(unknown_variable(name, span)),
                };

                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                trace!("call {}({} args)", name, values.len());
                func.call(&values).map_err(|err| err.or_span(span))
            }

            ExprKind::Assign { name, value } => {
                let result = self.evaluate(value)?;
                if matches!(result, Value::Range(_) | Value::String(_) | Value::ForSource(_)) {
                    return Err(TemplateError::new(
                        ErrorKind::TypeMismatch,
                        format!("A {} cannot be assigned to '{}'.", result.kind_name(), name),
                        value.span,
                    ));
                }
                trace!("assign {} = {:?}", name, result);
                self.symbols.insert(name.clone(), result);
                Ok(Value::Void)
            }
        }
    }

    /// Evaluate the header of a `@for` block: `name in source`, where the
    /// source is a range or an array
    pub fn evaluate_loop_source(&mut self, expr: &Expr) -> Result<ForSource<'a>, TemplateError> {
        let ExprKind::In { item, source } = &expr.kind else {
            return Err(TemplateError::new(
                ErrorKind::TypeMismatch,
                "A loop header must have the form 'name in source'.",
                expr.span,
            )
            .with_help("Example: @for(i in 0..4)"));
        };
        let ExprKind::Variable(binding) = &item.kind else {
            return Err(TemplateError::new(
                ErrorKind::TypeMismatch,
                "The loop variable must be a plain name.",
                item.span,
            ));
        };

        let iterable = match self.evaluate(source)? {
            Value::Range(range) => Iterable::Range(range),
            Value::Array(view) => Iterable::Array(view),
            other => {
                return Err(TemplateError::new(
                    ErrorKind::TypeMismatch,
                    format!("Cannot loop over a {}; expected a range or an array.", other.kind_name()),
                    source.span,
                ));
            }
        };
        Ok(ForSource { binding: binding.clone(), iterable })
    }

    fn lookup(&self, name: &str, span: Span) -> Result<Value<'a>, TemplateError> {
        match self.symbols.get(name) {
            Some(value @ (Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) | Value::Array(_))) => {
                Ok(value.clone())
            }
            Some(other) => Err(TemplateError::new(
                ErrorKind::TypeMismatch,
                format!("'{}' holds a {}, which cannot be used as a value.", name, other.kind_name()),
                span,
            )),
            None => Err(unknown_variable(name, span)),
        }
    }

    fn int_operand(&mut self, expr: &Expr, what: &str) -> Result<i32, TemplateError> {
        match self.evaluate(expr)? {
            Value::Int(i) => Ok(i),
            other => Err(TemplateError::new(
                ErrorKind::TypeMismatch,
                format!("The {} must be an int, got a {}.", what, other.kind_name()),
                expr.span,
            )),
        }
    }

    fn array_access(&mut self, name: &str, indices: &[Expr], span: Span) -> Result<Value<'a>, TemplateError> {
        let view = match self.symbols.get(name) {
            Some(Value::Array(view)) => *view,
            Some(other) => {
                return Err(TemplateError::new(
                    ErrorKind::TypeMismatch,
                    format!("'{}' is a {} and cannot be indexed.", name, other.kind_name()),
                    span,
                ));
            }
            None => return Err(unknown_variable(name, span)),
        };

        let mut offsets = Vec::with_capacity(indices.len());
        for index in indices {
            let value = self.int_operand(index, "array index")?;
            let offset = usize::try_from(value).map_err(|_| {
                TemplateError::new(
                    ErrorKind::IndexOutOfBounds,
                    format!("Array index {} is negative.", value),
                    index.span,
                )
            })?;
            offsets.push(offset);
        }
        if self.options.index_order == IndexOrder::Reversed {
            offsets.reverse();
        }

        let scalar = view
            .get(&offsets, self.options.index_mode, self.options.bounds_check)
            .map_err(|err| err.or_span(span))?;
        Ok(Value::from(scalar))
    }
}

fn unknown_variable(name: &str, span: Span) -> TemplateError {
    TemplateError::new(
        ErrorKind::UnknownVariable,
        format!("'{}' is not defined.", name),
        span,
    )
    .with_help("Pass it to the processor before rendering")
}

/// Truth value of a condition operand: Bool as is, Int when it equals 1
pub(crate) fn truthy(value: &Value<'_>, context: &str, span: Span) -> Result<bool, TemplateError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(*i == 1),
        Value::Float(_) => Err(TemplateError::new(
            ErrorKind::TypeMismatch,
            format!("Floats are not supported by {}.", context),
            span,
        )),
        other => Err(TemplateError::new(
            ErrorKind::TypeMismatch,
            format!("{} expects a bool or int, got a {}.", context, other.kind_name()),
            span,
        )),
    }
}

fn scalar_of(value: &Value<'_>) -> Option<Scalar> {
    match value {
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Int(i) => Some(Scalar::Int(*i)),
        Value::Float(f) => Some(Scalar::Float(*f)),
        _ => None,
    }
}

/// Equality table; `None` when the pair cannot be compared
fn scalar_equal(left: Scalar, right: Scalar) -> Option<bool> {
    match (left, right) {
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a == b),
        (Scalar::Int(a), Scalar::Int(b)) => Some(a == b),
        (Scalar::Int(i), Scalar::Bool(b)) | (Scalar::Bool(b), Scalar::Int(i)) => Some(i == b as i32),
        (Scalar::Float(a), Scalar::Float(b)) => Some(a == b),
        _ => None,
    }
}

fn equal(left: &Value<'_>, right: &Value<'_>, span: Span) -> Result<bool, TemplateError> {
    let mismatch = || {
        TemplateError::new(
            ErrorKind::TypeMismatch,
            format!("Cannot compare a {} with a {}.", left.kind_name(), right.kind_name()),
            span,
        )
    };
    match (scalar_of(left), scalar_of(right)) {
        (Some(l), Some(r)) => scalar_equal(l, r).ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

/// Membership test for `item in source`
fn contains(haystack: &Value<'_>, needle: &Value<'_>, source_span: Span, span: Span) -> Result<bool, TemplateError> {
    match haystack {
        Value::Range(range) => match needle {
            Value::Int(i) => Ok(range.contains(*i)),
            other => Err(TemplateError::new(
                ErrorKind::TypeMismatch,
                format!("Only ints can be tested against a range, got a {}.", other.kind_name()),
                span,
            )),
        },
        Value::Array(view) => {
            let mismatch = || {
                TemplateError::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "Cannot look for a {} in an array of {}.",
                        needle.kind_name(),
                        view.element_type()
                    ),
                    span,
                )
            };
            let needle = scalar_of(needle).ok_or_else(mismatch)?;
            let probe = match view.element_type() {
                ElementType::Bool => Scalar::Bool(false),
                ElementType::Int => Scalar::Int(0),
                ElementType::Float => Scalar::Float(0.0),
            };
            if scalar_equal(needle, probe).is_none() {
                return Err(mismatch());
            }
            Ok(view.first_axis().any(|element| scalar_equal(needle, element) == Some(true)))
        }
        other => Err(TemplateError::new(
            ErrorKind::TypeMismatch,
            format!("'in' needs an array or a range on the right, got a {}.", other.kind_name()),
            source_span,
        )),
    }
}
