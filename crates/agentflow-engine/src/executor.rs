use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use agentflow_core::{EventBus, ExecutionId, FlowEvent, FlowEventKind, Result, Scope};

use crate::invoker::invoke_agent;
use crate::node::{BranchMode, Conditional, ExitCheck, Loop, WorkflowNode};
use crate::recovery::RecoveryDispatcher;

/// Per-execution settings threaded through every node.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub execution_id: ExecutionId,
    pub recovery: RecoveryDispatcher,
    pub events: Option<Arc<EventBus>>,
}

impl RunContext {
    /// Publish an event if an event bus is attached.
    pub fn emit(&self, kind: FlowEventKind) {
        if let Some(bus) = &self.events {
            bus.publish(FlowEvent::new(&self.execution_id, kind));
        }
    }
}

/// Execute a node against the scope, returning its result.
///
/// Failures are never caught here; whatever the agent invoker returns
/// propagates up through every enclosing composer.
pub fn execute<'a>(
    node: &'a WorkflowNode,
    scope: &'a mut Scope,
    run: &'a RunContext,
) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        match node {
            WorkflowNode::Agent(agent) => invoke_agent(agent, scope, run).await,
            WorkflowNode::Sequence(seq) => {
                let last = run_steps(&seq.steps, scope, run).await?;
                Ok(settle_output(seq.output_name.as_deref(), last, scope))
            }
            WorkflowNode::Loop(lp) => {
                let last = run_loop(lp, scope, run).await?;
                Ok(settle_output(lp.output_name.as_deref(), last, scope))
            }
            WorkflowNode::Conditional(cond) => {
                let last = run_conditional(cond, scope, run).await?;
                Ok(settle_output(cond.output_name.as_deref(), last, scope))
            }
        }
    })
}

/// Run steps in order; the result is the last step's output.
async fn run_steps(steps: &[WorkflowNode], scope: &mut Scope, run: &RunContext) -> Result<Value> {
    let mut last = Value::Null;
    for (index, step) in steps.iter().enumerate() {
        debug!(step = index, kind = step.kind(), "Running sequence step");
        last = execute(step, scope, run).await?;
    }
    Ok(last)
}

async fn run_loop(lp: &Loop, scope: &mut Scope, run: &RunContext) -> Result<Value> {
    // Resolved when the workflow is built; 1 only guards hand-built trees.
    let max_iterations = lp.max_iterations.unwrap_or(1);
    let mut last = Value::Null;
    let mut iterations = 0;
    let mut satisfied = false;

    'iterations: while iterations < max_iterations {
        iterations += 1;
        debug!(iteration = iterations, max_iterations, "Starting loop iteration");
        run.emit(FlowEventKind::LoopIteration {
            iteration: iterations,
            max_iterations,
        });

        for step in &lp.body {
            last = execute(step, scope, run).await?;
            if lp.exit_check == ExitCheck::AfterEachStep && lp.exit.test(scope) {
                satisfied = true;
                break 'iterations;
            }
        }

        if lp.exit_check == ExitCheck::AfterIteration && lp.exit.test(scope) {
            satisfied = true;
            break;
        }
    }

    info!(
        iterations,
        satisfied,
        exit = %lp.exit.label(),
        "Loop finished"
    );
    run.emit(FlowEventKind::LoopExited {
        iterations,
        satisfied,
    });
    Ok(last)
}

async fn run_conditional(cond: &Conditional, scope: &mut Scope, run: &RunContext) -> Result<Value> {
    let mut last = Value::Null;
    let mut activated = 0;

    for (index, branch) in cond.branches.iter().enumerate() {
        if !branch.activation.test(scope) {
            debug!(branch = index, condition = %branch.activation.label(), "Branch inactive");
            continue;
        }

        debug!(branch = index, condition = %branch.activation.label(), "Branch activated");
        run.emit(FlowEventKind::BranchActivated { branch: index });
        last = execute(&branch.node, scope, run).await?;
        activated += 1;

        if cond.mode == BranchMode::First {
            break;
        }
    }

    if activated == 0 {
        debug!("No conditional branch activated");
    }
    Ok(last)
}

/// Resolve a composite's result against its declared output name.
///
/// With an output name, the scope value under it wins over the last child
/// output, and the result is written back. A null result writes nothing.
fn settle_output(output_name: Option<&str>, last: Value, scope: &mut Scope) -> Value {
    let Some(name) = output_name else {
        return last;
    };
    let result = scope.get(name).cloned().unwrap_or(last);
    if !result.is_null() {
        scope.write(name, result.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agentflow_core::{FlowError, FnAgent};
    use serde_json::json;

    use crate::node::{Conditional, Loop, Sequence};
    use crate::predicate::Predicate;

    fn constant(name: &str, output: &str, value: Value) -> WorkflowNode {
        WorkflowNode::agent(FnAgent::sync(name, output, move |_| Ok(value.clone())))
    }

    fn counting(name: &str, output: &str, calls: Arc<AtomicUsize>) -> WorkflowNode {
        WorkflowNode::agent(FnAgent::sync(name, output, move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!(n))
        }))
    }

    #[tokio::test]
    async fn test_sequence_returns_last_output() {
        let seq: WorkflowNode = Sequence::new([
            constant("a", "x", json!(1)),
            constant("b", "y", json!(2)),
        ])
        .into();
        let mut scope = Scope::new();
        let out = execute(&seq, &mut scope, &RunContext::default()).await.unwrap();
        assert_eq!(out, json!(2));
        assert_eq!(scope.read("x").unwrap(), &json!(1));
        assert_eq!(scope.read("y").unwrap(), &json!(2));
    }

    #[tokio::test]
    async fn test_sequence_stops_at_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seq: WorkflowNode = Sequence::new([
            WorkflowNode::agent(FnAgent::sync("broken", "x", |_| Err("boom".into()))),
            counting("after", "y", calls.clone()),
        ])
        .into();
        let err = execute(&seq, &mut Scope::new(), &RunContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::AgentInvocation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_runs_to_cap() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lp: WorkflowNode = Loop::new([counting("tick", "n", calls.clone())], Predicate::never())
            .with_max_iterations(4)
            .into();
        let mut scope = Scope::new();
        let out = execute(&lp, &mut scope, &RunContext::default()).await.unwrap();
        assert_eq!(out, json!(4));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_loop_exit_after_each_step() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let lp: WorkflowNode = Loop::new(
            [
                counting("first", "n", first.clone()),
                counting("second", "m", second.clone()),
            ],
            Predicate::expr("n >= 2"),
        )
        .with_max_iterations(5)
        .with_exit_check(ExitCheck::AfterEachStep)
        .into();
        execute(&lp, &mut Scope::new(), &RunContext::default())
            .await
            .unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conditional_first_mode() {
        let cond: WorkflowNode = Conditional::new()
            .branch(constant("a", "out", json!("a")), Predicate::always())
            .branch(constant("b", "out", json!("b")), Predicate::always())
            .with_mode(BranchMode::First)
            .into();
        let mut scope = Scope::new();
        let out = execute(&cond, &mut scope, &RunContext::default()).await.unwrap();
        assert_eq!(out, json!("a"));
    }

    #[tokio::test]
    async fn test_conditional_all_mode_last_write_wins() {
        let cond: WorkflowNode = Conditional::new()
            .branch(constant("a", "out", json!("a")), Predicate::always())
            .branch(constant("b", "out", json!("b")), Predicate::always())
            .with_output("out")
            .into();
        let mut scope = Scope::new();
        let out = execute(&cond, &mut scope, &RunContext::default()).await.unwrap();
        assert_eq!(out, json!("b"));
        assert_eq!(scope.get_str("out"), Some("b"));
    }

    #[tokio::test]
    async fn test_conditional_no_branch_is_not_an_error() {
        let cond: WorkflowNode = Conditional::new()
            .branch(constant("a", "out", json!("a")), Predicate::never())
            .with_output("out")
            .into();
        let mut scope = Scope::new();
        let out = execute(&cond, &mut scope, &RunContext::default()).await.unwrap();
        assert!(out.is_null());
        assert!(!scope.contains("out"));
    }

    #[test]
    fn test_settle_output_prefers_scope_value() {
        let mut scope = Scope::new();
        scope.write("story", "from scope");
        assert_eq!(
            settle_output(Some("story"), json!("last"), &mut scope),
            json!("from scope")
        );
        assert_eq!(settle_output(None, json!("last"), &mut scope), json!("last"));

        let out = settle_output(Some("summary"), json!("last"), &mut scope);
        assert_eq!(out, json!("last"));
        assert_eq!(scope.get_str("summary"), Some("last"));
    }

    #[tokio::test]
    async fn test_events_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let run = RunContext {
            events: Some(bus.clone()),
            ..RunContext::default()
        };
        let node = constant("a", "x", json!(1));
        execute(&node, &mut Scope::new(), &run).await.unwrap();

        let started = rx.recv().await.unwrap();
        assert_eq!(
            started.kind,
            FlowEventKind::AgentStarted {
                agent: "a".into(),
                attempt: 0
            }
        );
        let done = rx.recv().await.unwrap();
        assert!(matches!(done.kind, FlowEventKind::AgentSucceeded { ref agent, .. } if agent == "a"));
        assert_eq!(done.execution_id, run.execution_id);
    }
}
