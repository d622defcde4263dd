//! Runtime values, array views and the symbol table

pub mod array;
pub mod symbols;

pub use array::{ArrayView, ElementType, Elements, IndexMode, IndexOrder, MAX_DIMENSIONS, Scalar};
pub use symbols::{RESERVED_NAMES, Symbols, is_reserved};

use crate::native::NativeFunction;

/// Value produced by evaluation or stored in the symbol table
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    Array(ArrayView<'a>),
    Range(Range),
    /// Loop descriptor from an `in` expression in a `@for` header
    ForSource(ForSource<'a>),
    /// Result of an assignment
    Void,
    Function(NativeFunction),
}

impl<'a> Value<'a> {
    /// Name used in type errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Range(_) => "range",
            Value::ForSource(_) => "loop source",
            Value::Void => "void",
            Value::Function(_) => "function",
        }
    }

    /// Text written to the output for `@{...}`.
    ///
    /// `Ok(None)` means the value renders as nothing; `Err` carries the kind
    /// name of a value that cannot be written.
    pub fn stringify(&self) -> Result<Option<String>, &'static str> {
        match self {
            Value::Bool(b) => Ok(Some(b.to_string())),
            Value::Int(i) => Ok(Some(i.to_string())),
            // Debug keeps the decimal point on whole floats (1.0, not 1)
            Value::Float(f) => Ok(Some(format!("{:?}", f))),
            Value::String(s) => Ok(Some(s.clone())),
            Value::Void => Ok(None),
            Value::Array(_) | Value::Range(_) | Value::ForSource(_) | Value::Function(_) => Err(self.kind_name()),
        }
    }
}

impl From<Scalar> for Value<'_> {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i),
            Scalar::Float(f) => Value::Float(f),
        }
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value<'_> {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f32> for Value<'_> {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value<'_> {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<'a> From<ArrayView<'a>> for Value<'a> {
    fn from(view: ArrayView<'a>) -> Self {
        Value::Array(view)
    }
}

impl From<NativeFunction> for Value<'_> {
    fn from(func: NativeFunction) -> Self {
        Value::Function(func)
    }
}

/// Half-open integer interval `[start, end)`, iterated lazily
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i32,
    pub end: i32,
}

impl Range {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Ascending values; empty when `start >= end`
    pub fn iter(&self) -> std::ops::Range<i32> {
        self.start..self.end
    }

    pub fn contains(&self, value: i32) -> bool {
        self.start <= value && value < self.end
    }

    pub fn len(&self) -> usize {
        if self.end > self.start {
            (self.end as i64 - self.start as i64) as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a `@for` loop walks over
#[derive(Debug, Clone, PartialEq)]
pub enum Iterable<'a> {
    Range(Range),
    Array(ArrayView<'a>),
}

/// Loop variable name paired with its iterable
#[derive(Debug, Clone, PartialEq)]
pub struct ForSource<'a> {
    pub binding: String,
    pub iterable: Iterable<'a>,
}

impl<'a> ForSource<'a> {
    /// Values bound to the loop variable, in iteration order
    pub fn values(&self) -> Box<dyn Iterator<Item = Value<'a>> + 'a> {
        match self.iterable {
            Iterable::Range(range) => Box::new(range.iter().map(Value::Int)),
            Iterable::Array(view) => Box::new(view.first_axis().map(Value::from)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_scalars() {
        assert_eq!(Value::Bool(true).stringify(), Ok(Some("true".to_string())));
        assert_eq!(Value::Int(-3).stringify(), Ok(Some("-3".to_string())));
        assert_eq!(Value::Float(1.0).stringify(), Ok(Some("1.0".to_string())));
        assert_eq!(Value::Float(0.25).stringify(), Ok(Some("0.25".to_string())));
        assert_eq!(Value::from("vec3").stringify(), Ok(Some("vec3".to_string())));
        assert_eq!(Value::Void.stringify(), Ok(None));
    }

    #[test]
    fn test_stringify_rejects_aggregates() {
        assert_eq!(Value::Range(Range::new(0, 2)).stringify(), Err("range"));
        let data = [1, 2];
        let view = ArrayView::ints(&data, &[2]).unwrap();
        assert_eq!(Value::Array(view).stringify(), Err("array"));
    }

    #[test]
    fn test_range() {
        let range = Range::new(2, 5);
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(range.len(), 3);
        assert!(range.contains(2));
        assert!(!range.contains(5));

        let empty = Range::new(4, 1);
        assert!(empty.is_empty());
        assert_eq!(empty.iter().count(), 0);
    }

    #[test]
    fn test_for_source_values() {
        let data = [0.5f32, 1.5, 2.5, 3.5];
        let view = ArrayView::floats(&data, &[2, 2]).unwrap();
        let source = ForSource { binding: "v".into(), iterable: Iterable::Array(view) };
        let values: Vec<Value> = source.values().collect();
        assert_eq!(values, vec![Value::Float(0.5), Value::Float(1.5)]);
    }
}
