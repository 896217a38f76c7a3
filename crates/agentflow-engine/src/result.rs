use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentflow_core::{ExecutionId, FlowError, Result, Scope};

/// A workflow's terminal output together with the scope it finished with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultWithScope {
    result: Value,
    scope: Scope,
    execution_id: ExecutionId,
}

impl ResultWithScope {
    pub fn new(result: Value, scope: Scope, execution_id: ExecutionId) -> Self {
        Self {
            result,
            scope,
            execution_id,
        }
    }

    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Deserialize the result into `T`.
    pub fn result_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.result).map_err(|e| FlowError::StateType {
            name: "<result>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn into_parts(self) -> (Value, Scope) {
        (self.result, self.scope)
    }
}
