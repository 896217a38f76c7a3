use std::sync::Arc;

use agentflow_core::Agent;

use crate::predicate::Predicate;

/// A node in a workflow tree.
///
/// Leaves are agents; the other variants compose child nodes. A tree is
/// immutable once the workflow is built and may be shared by any number of
/// concurrent executions.
#[derive(Clone)]
pub enum WorkflowNode {
    /// A single agent call.
    Agent(Arc<dyn Agent>),
    /// Children run in order.
    Sequence(Sequence),
    /// A body repeated until an exit condition holds.
    Loop(Loop),
    /// Branches gated by activation conditions.
    Conditional(Conditional),
}

impl WorkflowNode {
    /// Wrap an agent as a leaf node.
    pub fn agent(agent: impl Agent) -> Self {
        Self::Agent(Arc::new(agent))
    }

    /// Wrap a shared agent as a leaf node.
    pub fn shared(agent: Arc<dyn Agent>) -> Self {
        Self::Agent(agent)
    }

    /// Name of the scope entry this node's result ends up in, if known.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Self::Agent(agent) => Some(agent.output_name()),
            Self::Sequence(seq) => seq.output_name.as_deref(),
            Self::Loop(lp) => lp.output_name.as_deref(),
            Self::Conditional(cond) => cond.output_name.as_deref(),
        }
    }

    /// Short description for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Agent(_) => "agent",
            Self::Sequence(_) => "sequence",
            Self::Loop(_) => "loop",
            Self::Conditional(_) => "conditional",
        }
    }
}

impl std::fmt::Debug for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent(agent) => f.debug_tuple("Agent").field(&agent.name()).finish(),
            Self::Sequence(seq) => std::fmt::Debug::fmt(seq, f),
            Self::Loop(lp) => std::fmt::Debug::fmt(lp, f),
            Self::Conditional(cond) => std::fmt::Debug::fmt(cond, f),
        }
    }
}

/// Runs its steps one after another against the shared scope.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub steps: Vec<WorkflowNode>,
    /// Scope name holding the sequence's result.
    pub output_name: Option<String>,
}

impl Sequence {
    pub fn new(steps: impl IntoIterator<Item = WorkflowNode>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            output_name: None,
        }
    }

    /// Set the output name.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

/// When a loop tests its exit condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitCheck {
    /// After the whole body has run.
    #[default]
    AfterIteration,
    /// After every body step, stopping mid-iteration once it holds.
    AfterEachStep,
}

/// Repeats its body until `exit` holds or `max_iterations` is reached.
///
/// Reaching the cap is a normal way for a loop to end.
#[derive(Debug, Clone)]
pub struct Loop {
    pub body: Vec<WorkflowNode>,
    pub exit: Predicate,
    /// Iteration cap; the engine default is used when unset.
    pub max_iterations: Option<usize>,
    pub exit_check: ExitCheck,
    /// Scope name holding the loop's result.
    pub output_name: Option<String>,
}

impl Loop {
    pub fn new(body: impl IntoIterator<Item = WorkflowNode>, exit: Predicate) -> Self {
        Self {
            body: body.into_iter().collect(),
            exit,
            max_iterations: None,
            exit_check: ExitCheck::default(),
            output_name: None,
        }
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// Set when the exit condition is tested.
    pub fn with_exit_check(mut self, check: ExitCheck) -> Self {
        self.exit_check = check;
        self
    }

    /// Set the output name.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

/// A conditional branch.
#[derive(Debug, Clone)]
pub struct Branch {
    pub node: WorkflowNode,
    pub activation: Predicate,
}

/// How many active branches a conditional runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BranchMode {
    /// Every branch whose condition holds, in declaration order.
    #[default]
    All,
    /// Only the first branch whose condition holds.
    First,
}

/// Runs the branches whose activation condition holds.
///
/// Conditions are tested in declaration order, each one right before its
/// branch would run, so a branch sees the writes of earlier active branches.
#[derive(Debug, Clone)]
pub struct Conditional {
    pub branches: Vec<Branch>,
    pub mode: BranchMode,
    /// Scope name holding the conditional's result.
    pub output_name: Option<String>,
}

impl Conditional {
    pub fn new() -> Self {
        Self {
            branches: vec![],
            mode: BranchMode::default(),
            output_name: None,
        }
    }

    /// Add a branch.
    pub fn branch(mut self, node: impl Into<WorkflowNode>, activation: Predicate) -> Self {
        self.branches.push(Branch {
            node: node.into(),
            activation,
        });
        self
    }

    /// Set the branch mode.
    pub fn with_mode(mut self, mode: BranchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the output name.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

impl Default for Conditional {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Sequence> for WorkflowNode {
    fn from(seq: Sequence) -> Self {
        Self::Sequence(seq)
    }
}

impl From<Loop> for WorkflowNode {
    fn from(lp: Loop) -> Self {
        Self::Loop(lp)
    }
}

impl From<Conditional> for WorkflowNode {
    fn from(cond: Conditional) -> Self {
        Self::Conditional(cond)
    }
}

impl From<Arc<dyn Agent>> for WorkflowNode {
    fn from(agent: Arc<dyn Agent>) -> Self {
        Self::Agent(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::FnAgent;
    use serde_json::json;

    fn leaf(name: &str, output: &str) -> WorkflowNode {
        WorkflowNode::agent(FnAgent::sync(name, output, |_| Ok(json!(null))))
    }

    #[test]
    fn test_sequence_builder() {
        let seq = Sequence::new([leaf("writer", "story"), leaf("editor", "story")])
            .with_output("story");
        assert_eq!(seq.steps.len(), 2);

        let node: WorkflowNode = seq.into();
        assert_eq!(node.kind(), "sequence");
        assert_eq!(node.output_name(), Some("story"));
    }

    #[test]
    fn test_loop_builder() {
        let lp = Loop::new([leaf("scorer", "score")], Predicate::expr("score >= 0.8"))
            .with_max_iterations(5)
            .with_exit_check(ExitCheck::AfterEachStep);
        assert_eq!(lp.max_iterations, Some(5));
        assert_eq!(lp.exit_check, ExitCheck::AfterEachStep);
        assert!(lp.output_name.is_none());
        assert_eq!(WorkflowNode::from(lp).output_name(), None);
    }

    #[test]
    fn test_conditional_builder() {
        let cond = Conditional::new()
            .branch(leaf("medical", "response"), Predicate::expr(r#"category == "MEDICAL""#))
            .branch(leaf("legal", "response"), Predicate::expr(r#"category == "LEGAL""#))
            .with_mode(BranchMode::First)
            .with_output("response");
        assert_eq!(cond.branches.len(), 2);
        assert_eq!(cond.mode, BranchMode::First);
        assert_eq!(cond.branches[1].activation.label(), r#"category == "LEGAL""#);
    }

    #[test]
    fn test_agent_leaf() {
        let node = leaf("writer", "story");
        assert_eq!(node.kind(), "agent");
        assert_eq!(node.output_name(), Some("story"));
        assert_eq!(format!("{:?}", node), r#"Agent("writer")"#);
    }
}
