//! Workflow engine that composes agents into sequences, bounded loops, and
//! conditional branches.
//!
//! A workflow is an immutable tree of [`WorkflowNode`]s. Each top-level
//! invocation creates a fresh [`Scope`](agentflow_core::Scope), writes the
//! call-site arguments into it, and walks the tree. Agents read their inputs
//! from the scope and write their output back to it, so the scope is the only
//! channel data flows through between steps.
//!
//! Agent failures pass through an optional error handler that may retry the
//! agent, substitute a fallback output, or let the failure propagate.

pub mod binder;
pub mod executor;
pub mod invoker;
pub mod node;
pub mod predicate;
pub mod recovery;
pub mod result;
pub mod workflow;

pub use binder::bind_arguments;
pub use node::{Branch, BranchMode, Conditional, ExitCheck, Loop, Sequence, WorkflowNode};
pub use predicate::{evaluate_expr, Predicate};
pub use recovery::{ErrorContext, ErrorHandler, ErrorRecoveryResult, RecoveryDispatcher};
pub use result::ResultWithScope;
pub use workflow::{Workflow, WorkflowBuilder};
