use super::Value;
use crate::error::{ErrorKind, TemplateError};
use std::collections::HashMap;

/// Names a caller may not bind: the directive keywords, the header sentinel,
/// and the expression keywords that could never be referenced
pub const RESERVED_NAMES: &[&str] = &[
    "if", "elseif", "else", "for", "end", "prism", "in", "then", "true", "false",
];

/// True when `name` (with or without a leading `@`) collides with a keyword
pub fn is_reserved(name: &str) -> bool {
    let bare = name.strip_prefix('@').unwrap_or(name);
    RESERVED_NAMES.contains(&bare)
}

/// Name to value mapping read and written during a render.
///
/// Entries are replaced wholesale; nothing is mutated in place.
#[derive(Debug, Clone, Default)]
pub struct Symbols<'a> {
    entries: HashMap<String, Value<'a>>,
}

impl<'a> Symbols<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value<'a>>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind `name`, returning the value it replaced
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value<'a>>) -> Option<Value<'a>> {
        self.entries.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value<'a>> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<'a>)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Reject names that collide with directive or expression keywords
    pub fn validate(&self) -> Result<(), TemplateError> {
        let mut clashes: Vec<&str> = self
            .entries
            .keys()
            .map(String::as_str)
            .filter(|name| is_reserved(name))
            .collect();
        if clashes.is_empty() {
            return Ok(());
        }

        clashes.sort_unstable();
        Err(TemplateError::bare(
            ErrorKind::ReservedName,
            format!("Reserved name(s) cannot be used as variables: {}.", clashes.join(", ")),
        )
        .with_help(format!("Reserved names: {}", RESERVED_NAMES.join(", "))))
    }
}

impl<'a, K: Into<String>> FromIterator<(K, Value<'a>)> for Symbols<'a> {
    fn from_iter<I: IntoIterator<Item = (K, Value<'a>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("if"));
        assert!(is_reserved("@end"));
        assert!(is_reserved("prism"));
        assert!(is_reserved("true"));
        assert!(!is_reserved("iff"));
        assert!(!is_reserved("End"));
    }

    #[test]
    fn test_validate_reports_every_clash() {
        let symbols = Symbols::new().with("@for", 1).with("else", true).with("count", 2);
        let err = symbols.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReservedName);
        assert!(err.is_config());
        assert!(err.message.contains("@for, else"));
    }

    #[test]
    fn test_insert_replaces() {
        let mut symbols = Symbols::new();
        assert_eq!(symbols.insert("x", 1), None);
        assert_eq!(symbols.insert("x", 2.5f32), Some(Value::Int(1)));
        assert_eq!(symbols.get("x"), Some(&Value::Float(2.5)));
        assert_eq!(symbols.len(), 1);
        assert!(symbols.validate().is_ok());
    }

    #[test]
    fn test_from_iter() {
        let mut symbols: Symbols = vec![("a", Value::Int(1)), ("b", Value::Bool(false))].into_iter().collect();
        assert!(symbols.contains("a"));
        assert_eq!(symbols.remove("b"), Some(Value::Bool(false)));
        assert!(!symbols.contains("b"));
    }
}
