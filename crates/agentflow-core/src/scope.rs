use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};

/// Shared state for one workflow execution.
///
/// Every node of a workflow reads its inputs from and writes its output to
/// the same scope. The last write to a name is the one every later step sees.
/// Names are kept in first-write order for diagnostics; lookup does not depend
/// on it.
///
/// Writing JSON `null` clears a name, so a null value and an absent one are
/// indistinguishable to readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    state: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope from initial values, dropping nulls.
    pub fn from_map<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut scope = Self::new();
        scope.write_all(values);
        scope
    }

    /// Write a value, overwriting any previous one.
    pub fn write(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match value.into() {
            Value::Null => {
                self.state.shift_remove(&name);
            }
            value => {
                self.state.insert(name, value);
            }
        }
    }

    /// Serialize and write a typed value.
    pub fn write_as<T: Serialize>(&mut self, name: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.write(name, value);
        Ok(())
    }

    /// Write several values in order.
    pub fn write_all<I, K>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in values {
            self.write(name, value);
        }
    }

    /// Read a value, failing when it is absent.
    pub fn read(&self, name: &str) -> Result<&Value> {
        self.state
            .get(name)
            .ok_or_else(|| FlowError::MissingState(name.to_string()))
    }

    /// Read a value, or `default` when it is absent.
    pub fn read_or(&self, name: &str, default: impl Into<Value>) -> Value {
        match self.state.get(name) {
            Some(value) => value.clone(),
            None => default.into(),
        }
    }

    /// Read and deserialize a value.
    pub fn read_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.read(name)?;
        T::deserialize(value).map_err(|e| FlowError::StateType {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Read and deserialize a value, or `default` when it is absent or has
    /// another type.
    pub fn read_as_or<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        self.state
            .get(name)
            .and_then(|v| T::deserialize(v).ok())
            .unwrap_or(default)
    }

    /// Get a value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.state.get(name)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.state.get(name).and_then(|v| v.as_str())
    }

    /// Get a value as a number, if it's numeric.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.state.get(name).and_then(|v| v.as_f64())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.contains_key(name)
    }

    /// Remove a value, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.state.shift_remove(name)
    }

    /// Names in first-write order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.state.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.state.clone()
    }

    /// Get the underlying state map.
    pub fn data(&self) -> &IndexMap<String, Value> {
        &self.state
    }
}
