use thiserror::Error;

/// Boxed failure raised by an agent function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum FlowError {
    // Binding errors
    #[error("Missing argument '{argument}' for agent {agent}")]
    MissingArgument { agent: String, argument: String },

    // Agent errors
    #[error("Agent {agent} failed: {source}")]
    AgentInvocation {
        agent: String,
        #[source]
        source: BoxError,
    },

    #[error("Agent {agent} gave up after {retries} retries: {last}")]
    RetryLimitExceeded {
        agent: String,
        retries: usize,
        #[source]
        last: Box<FlowError>,
    },

    // Scope errors
    #[error("No value in scope for '{0}'")]
    MissingState(String),

    #[error("Scope value '{name}' has unexpected type: {message}")]
    StateType { name: String, message: String },

    // Descriptor errors
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Wrap a failure raised by an agent function.
    ///
    /// Engine failures are passed through as they are, so an agent that
    /// reports a missing argument itself is seen by recovery handlers the same
    /// way a binder failure is.
    pub fn invocation(agent: impl Into<String>, source: BoxError) -> Self {
        match source.downcast::<FlowError>() {
            Ok(flow) => *flow,
            Err(source) => FlowError::AgentInvocation {
                agent: agent.into(),
                source,
            },
        }
    }

    /// The missing argument name, if this is a binding failure.
    pub fn missing_argument(&self) -> Option<&str> {
        match self {
            FlowError::MissingArgument { argument, .. } => Some(argument),
            _ => None,
        }
    }

    /// The agent this failure is attributed to, if any.
    pub fn agent(&self) -> Option<&str> {
        match self {
            FlowError::MissingArgument { agent, .. }
            | FlowError::AgentInvocation { agent, .. }
            | FlowError::RetryLimitExceeded { agent, .. } => Some(agent),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
