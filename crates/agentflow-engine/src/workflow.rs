use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, info_span, Instrument};

use agentflow_core::config::EngineConfig;
use agentflow_core::{EventBus, ExecutionId, FlowError, FlowEventKind, Result, Scope};

use crate::executor::{execute, RunContext};
use crate::node::WorkflowNode;
use crate::recovery::{ErrorContext, ErrorHandler, ErrorRecoveryResult, RecoveryDispatcher};
use crate::result::ResultWithScope;

/// A built, validated workflow.
///
/// Cheap to share behind an `Arc`: every invocation gets its own scope, so
/// concurrent invocations never see each other's state.
pub struct Workflow {
    name: String,
    root: WorkflowNode,
    recovery: RecoveryDispatcher,
    events: Option<Arc<EventBus>>,
}

impl Workflow {
    /// Start building a workflow around a root node.
    pub fn builder(name: impl Into<String>, root: impl Into<WorkflowNode>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            root: root.into(),
            handler: None,
            config: EngineConfig::default(),
            events: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &WorkflowNode {
        &self.root
    }

    /// Invoke the workflow and return its terminal output.
    ///
    /// Arguments are written into a fresh scope before the root node runs;
    /// null arguments count as absent.
    pub async fn invoke<I, K, V>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut scope = scope_from(args);
        self.run(&mut scope, ExecutionId::new()).await
    }

    /// Invoke the workflow and return its output with the final scope.
    pub async fn invoke_with_scope<I, K, V>(&self, args: I) -> Result<ResultWithScope>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut scope = scope_from(args);
        let execution_id = ExecutionId::new();
        let result = self.run(&mut scope, execution_id.clone()).await?;
        Ok(ResultWithScope::new(result, scope, execution_id))
    }

    /// Run the workflow against a caller-owned scope.
    pub async fn invoke_in(&self, scope: &mut Scope) -> Result<Value> {
        self.run(scope, ExecutionId::new()).await
    }

    async fn run(&self, scope: &mut Scope, execution_id: ExecutionId) -> Result<Value> {
        let span = info_span!("workflow", workflow = %self.name, execution_id = %execution_id);
        let run = RunContext {
            execution_id,
            recovery: self.recovery.clone(),
            events: self.events.clone(),
        };

        async {
            info!(
                root = self.root.kind(),
                arguments = scope.len(),
                "Workflow started"
            );
            run.emit(FlowEventKind::ExecutionStarted {
                arguments: scope.names().map(String::from).collect(),
            });
            let start = Instant::now();

            let result = execute(&self.root, scope, &run).await;

            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => info!(elapsed_ms, "Workflow complete"),
                Err(e) => error!(elapsed_ms, error = %e, "Workflow failed"),
            }
            run.emit(FlowEventKind::ExecutionFinished {
                succeeded: result.is_ok(),
                elapsed_ms,
            });
            result
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("recovery", &self.recovery)
            .finish()
    }
}

fn scope_from<I, K, V>(args: I) -> Scope
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    Scope::from_map(args.into_iter().map(|(k, v)| (k, v.into())))
}

/// Builder for [`Workflow`].
pub struct WorkflowBuilder {
    name: String,
    root: WorkflowNode,
    handler: Option<ErrorHandler>,
    config: EngineConfig,
    events: Option<Arc<EventBus>>,
}

impl WorkflowBuilder {
    /// Register the workflow's error handler, replacing any previous one.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ErrorContext<'_>) -> ErrorRecoveryResult + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Use engine settings (retry ceiling, default loop cap).
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the retry ceiling (0 = unlimited).
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Publish execution events to this bus.
    pub fn events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Validate the tree and build the workflow.
    pub fn build(mut self) -> Result<Workflow> {
        prepare(&mut self.root, &self.config, "root")?;
        Ok(Workflow {
            name: self.name,
            root: self.root,
            recovery: RecoveryDispatcher::new(self.handler, self.config.retry_limit()),
            events: self.events,
        })
    }
}

/// Check a node tree and fill in loop caps left to the engine default.
fn prepare(node: &mut WorkflowNode, config: &EngineConfig, path: &str) -> Result<()> {
    let invalid = |what: &str| Err(FlowError::InvalidWorkflow(format!("{} at {}", what, path)));

    match node {
        WorkflowNode::Agent(agent) => {
            if agent.name().is_empty() {
                return invalid("agent with empty name");
            }
            if agent.output_name().is_empty() {
                return invalid(&format!("agent {} with empty output name", agent.name()));
            }
        }
        WorkflowNode::Sequence(seq) => {
            if seq.steps.is_empty() {
                return invalid("sequence with no steps");
            }
            for (i, step) in seq.steps.iter_mut().enumerate() {
                prepare(step, config, &format!("{}/sequence[{}]", path, i))?;
            }
        }
        WorkflowNode::Loop(lp) => {
            if lp.body.is_empty() {
                return invalid("loop with empty body");
            }
            match lp.max_iterations {
                Some(0) => return invalid("loop with max_iterations = 0"),
                Some(_) => {}
                None => {
                    if config.default_max_iterations == 0 {
                        return invalid("loop relying on a zero default_max_iterations");
                    }
                    lp.max_iterations = Some(config.default_max_iterations);
                }
            }
            for (i, step) in lp.body.iter_mut().enumerate() {
                prepare(step, config, &format!("{}/loop[{}]", path, i))?;
            }
        }
        WorkflowNode::Conditional(cond) => {
            if cond.branches.is_empty() {
                return invalid("conditional with no branches");
            }
            for (i, branch) in cond.branches.iter_mut().enumerate() {
                prepare(&mut branch.node, config, &format!("{}/branch[{}]", path, i))?;
            }
        }
    }
    Ok(())
}
