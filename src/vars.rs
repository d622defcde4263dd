//! Symbol files: a JSON object mapping names to scalars, strings or nested
//! numeric arrays.
//!
//! `VarFile` owns the flattened array buffers and lends them to a
//! [`Symbols`] table as array views.

use crate::error::{ErrorKind, TemplateError};
use crate::value::{ArrayView, Elements, MAX_DIMENSIONS, Symbols, Value};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
enum Buffer {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Float(Vec<f32>),
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
    Array { buffer: Buffer, dims: Vec<usize> },
}

/// Owned variables loaded from JSON
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarFile {
    entries: Vec<(String, Entry)>,
}

impl VarFile {
    pub fn from_json(text: &str) -> Result<Self, TemplateError> {
        let json: Json = serde_json::from_str(text)
            .map_err(|e| invalid(format!("Variables are not valid JSON: {}", e)))?;
        let Json::Object(map) = json else {
            return Err(invalid("Variables must be a JSON object."));
        };

        let mut entries = Vec::with_capacity(map.len());
        for (name, value) in map {
            let entry = entry(&name, &value)?;
            entries.push((name, entry));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Symbol table borrowing this file's buffers
    pub fn symbols(&self) -> Result<Symbols<'_>, TemplateError> {
        let mut symbols = Symbols::new();
        for (name, entry) in &self.entries {
            let value = match entry {
                Entry::Bool(b) => Value::Bool(*b),
                Entry::Int(i) => Value::Int(*i),
                Entry::Float(f) => Value::Float(*f),
                Entry::Str(s) => Value::String(s.clone()),
                Entry::Array { buffer, dims } => {
                    let elements = match buffer {
                        Buffer::Bool(data) => Elements::Bool(data),
                        Buffer::Int(data) => Elements::Int(data),
                        Buffer::Float(data) => Elements::Float(data),
                    };
                    Value::Array(ArrayView::new(elements, dims)?)
                }
            };
            symbols.insert(name.as_str(), value);
        }
        Ok(symbols)
    }
}

fn invalid(message: impl Into<String>) -> TemplateError {
    TemplateError::bare(ErrorKind::InvalidVars, message)
}

fn entry(name: &str, value: &Json) -> Result<Entry, TemplateError> {
    match value {
        Json::Bool(b) => Ok(Entry::Bool(*b)),
        Json::Number(_) => match number(value) {
            Some(Number::Int(i)) => Ok(Entry::Int(i)),
            Some(Number::Float(f)) => Ok(Entry::Float(f)),
            None => Err(invalid(format!("'{}' does not fit in a 32-bit int.", name))),
        },
        Json::String(s) => Ok(Entry::Str(s.clone())),
        Json::Array(_) => array(name, value),
        Json::Null | Json::Object(_) => Err(invalid(format!(
            "'{}' must be a bool, number, string or array.",
            name
        ))),
    }
}

enum Number {
    Int(i32),
    Float(f32),
}

fn number(value: &Json) -> Option<Number> {
    if let Some(i) = value.as_i64() {
        return i32::try_from(i).ok().map(Number::Int);
    }
    if value.is_u64() {
        return None;
    }
    value.as_f64().map(|f| Number::Float(f as f32))
}

/// Nested rectangular array with homogeneous leaves, flattened row-major
fn array(name: &str, value: &Json) -> Result<Entry, TemplateError> {
    let mut dims = Vec::new();
    let mut cursor = value;
    while let Json::Array(items) = cursor {
        dims.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    if dims.len() > MAX_DIMENSIONS {
        return Err(invalid(format!(
            "'{}' has {} dimensions; at most {} are supported.",
            name,
            dims.len(),
            MAX_DIMENSIONS
        )));
    }

    let mut leaves = Vec::new();
    collect(name, value, 0, &dims, &mut leaves)?;

    let buffer = if leaves.iter().all(|leaf| leaf.is_boolean()) && !leaves.is_empty() {
        Buffer::Bool(leaves.iter().filter_map(|leaf| leaf.as_bool()).collect())
    } else if leaves.iter().all(|leaf| leaf.is_i64()) {
        let mut ints = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            match number(leaf) {
                Some(Number::Int(i)) => ints.push(i),
                _ => return Err(invalid(format!("'{}' holds an int that does not fit in 32 bits.", name))),
            }
        }
        Buffer::Int(ints)
    } else if leaves.iter().all(|leaf| leaf.is_number()) {
        Buffer::Float(leaves.iter().filter_map(|leaf| leaf.as_f64()).map(|f| f as f32).collect())
    } else {
        return Err(invalid(format!(
            "'{}' must hold only bools, only ints, or only numbers.",
            name
        )));
    };

    Ok(Entry::Array { buffer, dims })
}

fn collect<'j>(
    name: &str,
    value: &'j Json,
    depth: usize,
    dims: &[usize],
    leaves: &mut Vec<&'j Json>,
) -> Result<(), TemplateError> {
    if depth == dims.len() {
        if value.is_array() {
            return Err(invalid(format!("'{}' is not rectangular.", name)));
        }
        leaves.push(value);
        return Ok(());
    }

    match value {
        Json::Array(items) if items.len() == dims[depth] => {
            for item in items {
                collect(name, item, depth + 1, dims, leaves)?;
            }
            Ok(())
        }
        _ => Err(invalid(format!("'{}' is not rectangular.", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{IndexMode, Scalar};

    #[test]
    fn test_scalars() {
        let vars = VarFile::from_json(r#"{"on": true, "n": 3, "f": 0.5, "s": "highp"}"#).unwrap();
        let symbols = vars.symbols().unwrap();
        assert_eq!(symbols.get("on"), Some(&Value::Bool(true)));
        assert_eq!(symbols.get("n"), Some(&Value::Int(3)));
        assert_eq!(symbols.get("f"), Some(&Value::Float(0.5)));
        assert_eq!(symbols.get("s"), Some(&Value::String("highp".to_string())));
    }

    #[test]
    fn test_nested_array() {
        let vars = VarFile::from_json(r#"{"a": [[1, 2, 3], [4, 5, 6]]}"#).unwrap();
        let symbols = vars.symbols().unwrap();
        let Some(Value::Array(view)) = symbols.get("a") else {
            panic!("expected array");
        };
        assert_eq!(view.dimensions(), &[2, 3]);
        assert_eq!(view.get(&[1, 0], IndexMode::Full, true).unwrap(), Scalar::Int(4));
    }

    #[test]
    fn test_mixed_numbers_become_floats() {
        let vars = VarFile::from_json(r#"{"w": [1, 2.5]}"#).unwrap();
        let symbols = vars.symbols().unwrap();
        let Some(Value::Array(view)) = symbols.get("w") else {
            panic!("expected array");
        };
        assert_eq!(view.get_flat(0).unwrap(), Scalar::Float(1.0));
    }

    #[test]
    fn test_rejects_bad_input() {
        let cases = [
            "[1, 2]",
            "{\"x\": null}",
            "{\"x\": {\"y\": 1}}",
            "{\"x\": [[1, 2], [3]]}",
            "{\"x\": [true, 1]}",
            "{\"x\": [[[[[1]]]]]}",
            "{\"x\": 3000000000}",
            "not json",
        ];
        for case in cases {
            let err = VarFile::from_json(case).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidVars, "{}", case);
            assert!(err.is_config());
        }
    }
}
