//! Argument collection passed to kernel functions.
//!
//! Arguments are a mutable string-to-JSON mapping. Filters may rewrite them
//! before the function body (or the prompt template) sees them.

use std::collections::HashMap;

use serde_json::Value;

/// Named arguments for a kernel function invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelArguments {
    entries: HashMap<String, Value>,
}

impl KernelArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an argument, replacing any existing value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// The argument as a string slice, if present and a JSON string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(Value::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, Value)> for KernelArguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(&str, Value); N]> for KernelArguments {
    fn from(pairs: [(&str, Value); N]) -> Self {
        pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}
