use std::sync::Arc;

use agentflow_core::{FlowError, RecoveryAction, Scope};
use serde_json::Value;

/// What to do with a failed agent call.
#[derive(Debug)]
pub enum ErrorRecoveryResult {
    /// Run the same agent again against the (possibly repaired) scope.
    Retry,
    /// Fail the workflow with the original error, or with the given one.
    ThrowException(Option<FlowError>),
    /// Use this value as the agent's output and carry on.
    Fallback(Value),
}

impl ErrorRecoveryResult {
    pub fn retry() -> Self {
        Self::Retry
    }

    pub fn throw_exception() -> Self {
        Self::ThrowException(None)
    }

    /// Fail with a different error than the one raised.
    pub fn throw(error: FlowError) -> Self {
        Self::ThrowException(Some(error))
    }

    pub fn fallback(value: impl Into<Value>) -> Self {
        Self::Fallback(value.into())
    }

    pub fn action(&self) -> RecoveryAction {
        match self {
            Self::Retry => RecoveryAction::Retry,
            Self::ThrowException(_) => RecoveryAction::Throw,
            Self::Fallback(_) => RecoveryAction::Fallback,
        }
    }
}

/// Everything a handler gets to see about a failure.
///
/// The scope is writable so a handler can repair state before retrying.
pub struct ErrorContext<'a> {
    agent_name: &'a str,
    error: &'a FlowError,
    scope: &'a mut Scope,
    attempt: usize,
}

impl<'a> ErrorContext<'a> {
    pub fn new(
        agent_name: &'a str,
        error: &'a FlowError,
        scope: &'a mut Scope,
        attempt: usize,
    ) -> Self {
        Self {
            agent_name,
            error,
            scope,
            attempt,
        }
    }

    /// Name of the agent whose call failed.
    pub fn agent_name(&self) -> &str {
        self.agent_name
    }

    pub fn error(&self) -> &FlowError {
        self.error
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        self.scope
    }

    /// Retries already made for this call (0 on the first failure).
    pub fn attempt(&self) -> usize {
        self.attempt
    }
}

/// A user-supplied recovery handler.
pub type ErrorHandler = Arc<dyn Fn(ErrorContext<'_>) -> ErrorRecoveryResult + Send + Sync>;

/// Outcome of dispatching one failure.
#[derive(Debug)]
pub enum Recovery {
    Retry,
    Fallback(Value),
    Fail(FlowError),
}

/// Routes agent failures through the workflow's error handler.
#[derive(Clone, Default)]
pub struct RecoveryDispatcher {
    handler: Option<ErrorHandler>,
    retry_limit: Option<usize>,
}

impl RecoveryDispatcher {
    /// `retry_limit` of `None` allows unbounded retries.
    pub fn new(handler: Option<ErrorHandler>, retry_limit: Option<usize>) -> Self {
        Self {
            handler,
            retry_limit,
        }
    }

    /// Create a dispatcher around a handler closure.
    pub fn with_handler<F>(handler: F, retry_limit: Option<usize>) -> Self
    where
        F: Fn(ErrorContext<'_>) -> ErrorRecoveryResult + Send + Sync + 'static,
    {
        Self::new(Some(Arc::new(handler)), retry_limit)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Decide what happens after `agent` failed with `error`.
    ///
    /// `retries` is the number of retries already made for this call.
    pub fn dispatch(
        &self,
        agent: &str,
        error: FlowError,
        scope: &mut Scope,
        retries: usize,
    ) -> (Recovery, Option<RecoveryAction>) {
        let Some(handler) = &self.handler else {
            return (Recovery::Fail(error), None);
        };

        let decision = handler(ErrorContext::new(agent, &error, scope, retries));
        let action = decision.action();

        let recovery = match decision {
            ErrorRecoveryResult::Retry => match self.retry_limit {
                Some(limit) if retries >= limit => Recovery::Fail(FlowError::RetryLimitExceeded {
                    agent: agent.to_string(),
                    retries,
                    last: Box::new(error),
                }),
                _ => Recovery::Retry,
            },
            ErrorRecoveryResult::ThrowException(None) => Recovery::Fail(error),
            ErrorRecoveryResult::ThrowException(Some(substitute)) => Recovery::Fail(substitute),
            ErrorRecoveryResult::Fallback(value) => Recovery::Fallback(value),
        };
        (recovery, Some(action))
    }
}

impl std::fmt::Debug for RecoveryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryDispatcher")
            .field("has_handler", &self.handler.is_some())
            .field("retry_limit", &self.retry_limit)
            .finish()
    }
}
