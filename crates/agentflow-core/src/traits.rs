use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::BoxError;
use crate::types::Arguments;

/// Outcome of a single agent call.
pub type AgentResult = std::result::Result<Value, BoxError>;

type AgentFn = Arc<dyn Fn(Arguments) -> BoxFuture<'static, AgentResult> + Send + Sync>;

/// A named unit of work over bound inputs.
///
/// The engine binds `required_inputs` from the scope, calls `invoke`, and
/// writes the returned value under `output_name`. What backs `invoke` (a
/// model call, a deterministic computation) is opaque to the engine.
pub trait Agent: Send + Sync + 'static {
    /// Agent name (used in error contexts and events).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Scope names that must be present before the agent runs.
    fn required_inputs(&self) -> &[String];

    /// Scope name the result is written to.
    fn output_name(&self) -> &str;

    /// Run the agent with its bound inputs.
    fn invoke(&self, args: Arguments) -> BoxFuture<'_, AgentResult>;
}

/// An agent backed by a closure.
#[derive(Clone)]
pub struct FnAgent {
    name: String,
    description: String,
    inputs: Vec<String>,
    output: String,
    func: AgentFn,
}

impl FnAgent {
    /// Create an agent from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, output: impl Into<String>, func: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult> + Send + 'static,
    {
        let func: AgentFn = Arc::new(move |args| -> BoxFuture<'static, AgentResult> {
            Box::pin(func(args))
        });
        Self {
            name: name.into(),
            description: String::new(),
            inputs: vec![],
            output: output.into(),
            func,
        }
    }

    /// Create an agent from a blocking closure.
    pub fn sync<F>(name: impl Into<String>, output: impl Into<String>, func: F) -> Self
    where
        F: Fn(Arguments) -> AgentResult + Send + Sync + 'static,
    {
        Self::new(name, output, move |args| {
            let result = func(args);
            async move { result }
        })
    }

    /// Set the required inputs.
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl std::fmt::Debug for FnAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAgent")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl Agent for FnAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn required_inputs(&self) -> &[String] {
        &self.inputs
    }

    fn output_name(&self) -> &str {
        &self.output
    }

    fn invoke(&self, args: Arguments) -> BoxFuture<'_, AgentResult> {
        (self.func)(args)
    }
}
