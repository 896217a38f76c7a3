use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{FlowError, Result};

/// Unique identifier of one top-level workflow invocation.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values bound from the scope for a single agent call.
///
/// Holds exactly the agent's declared inputs, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    agent: String,
    values: IndexMap<String, Value>,
}

impl Arguments {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            values: IndexMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Name of the agent these arguments were bound for.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    /// Get a value, reporting a missing argument for this agent when absent.
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.values.get(name).ok_or_else(|| FlowError::MissingArgument {
            agent: self.agent.clone(),
            argument: name.to_string(),
        })
    }

    /// Get a string value, reporting a missing argument when absent.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| FlowError::StateType {
            name: name.to_string(),
            message: format!("expected a string, got {}", value),
        })
    }

    /// Deserialize a value into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        T::deserialize(self.require(name)?).map_err(|e| FlowError::StateType {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_ids_are_unique() {
        assert_ne!(ExecutionId::new(), ExecutionId::new());
    }

    #[test]
    fn test_arguments_accessors() {
        let args = Arguments::new("writer")
            .with("topic", "dragons")
            .with("length", 3);

        assert_eq!(args.agent(), "writer");
        assert_eq!(args.get_str("topic"), Some("dragons"));
        assert_eq!(args.require("length").unwrap(), &json!(3));
        assert_eq!(args.get_as::<u32>("length").unwrap(), 3);
        assert_eq!(args.names().collect::<Vec<_>>(), vec!["topic", "length"]);
    }

    #[test]
    fn test_require_reports_agent_and_argument() {
        let args = Arguments::new("writer");
        let err = args.require_str("style").unwrap_err();
        assert!(matches!(
            err,
            FlowError::MissingArgument { ref agent, ref argument }
                if agent == "writer" && argument == "style"
        ));
    }

    #[test]
    fn test_require_str_rejects_non_strings() {
        let args = Arguments::new("scorer").with("score", 0.4);
        assert!(matches!(
            args.require_str("score"),
            Err(FlowError::StateType { .. })
        ));
    }
}
