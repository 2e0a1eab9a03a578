//! Schema-less settings container with typed, default-coalescing accessors.
//!
//! Profiles, machine data, arcade settings and play statistics are stored as
//! JSON objects. [`ValidatedDict`] wraps such an object and never fails on
//! read: a missing key or a value of the wrong shape yields the caller's
//! default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedDict(Map<String, Value>);

impl ValidatedDict {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value, keeping it only if it is an object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Stores an arbitrary value, overwriting any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Copies every entry of `other` over this one.
    pub fn update(&mut self, other: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in other {
            self.0.insert(key, value);
        }
    }

    /// Integer under `key`. Booleans are not integers here.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    /// Integer array of exactly `len` elements, or `len` zeros.
    pub fn get_int_array(&self, key: &str, len: usize) -> Vec<i64> {
        let fallback = || vec![0; len];
        let Some(Value::Array(items)) = self.0.get(key) else {
            return fallback();
        };
        if items.len() != len {
            return fallback();
        }
        items
            .iter()
            .map(Value::as_i64)
            .collect::<Option<Vec<_>>>()
            .unwrap_or_else(fallback)
    }

    /// Nested mapping under `key`, or an empty one.
    pub fn get_dict(&self, key: &str) -> ValidatedDict {
        match self.0.get(key) {
            Some(Value::Object(map)) => Self(map.clone()),
            _ => Self::new(),
        }
    }

    pub fn replace_int(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_string(), Value::from(value));
    }

    pub fn replace_bool(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_string(), Value::Bool(value));
    }

    pub fn replace_str(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), Value::String(value.into()));
    }

    /// Stores an integer array; ignored unless `values` has `len` elements.
    pub fn replace_int_array(&mut self, key: &str, len: usize, values: &[i64]) {
        if values.len() != len {
            return;
        }
        self.0.insert(
            key.to_string(),
            Value::Array(values.iter().copied().map(Value::from).collect()),
        );
    }

    pub fn replace_dict(&mut self, key: &str, value: ValidatedDict) {
        self.0.insert(key.to_string(), Value::Object(value.0));
    }
}

impl From<Map<String, Value>> for ValidatedDict {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl IntoIterator for ValidatedDict {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
