//! Built-in demo workflows over deterministic agents.
//!
//! The agents here stand in for model-backed ones: they transform their
//! inputs with plain string rules so runs are reproducible.

use std::sync::Arc;

use serde_json::{json, Value};

use agentflow_core::config::EngineConfig;
use agentflow_core::{Arguments, EventBus, FlowError, FnAgent, Result};
use agentflow_engine::{
    Conditional, ErrorRecoveryResult, Loop, Predicate, Sequence, Workflow, WorkflowNode,
};

/// Topic substituted by the recovering story workflow.
pub const DEFAULT_TOPIC: &str = "dragons and wizards";

/// Score at which the style review loop stops.
pub const STYLE_THRESHOLD: f64 = 0.8;

pub fn creative_writer() -> WorkflowNode {
    WorkflowNode::agent(
        FnAgent::sync("generateStory", "story", |args| {
            let topic = args.require_str("topic")?;
            Ok(json!(format!("Once upon a time there was a tale of {}.", topic)))
        })
        .with_inputs(["topic"])
        .with_description("Writes a first draft about the topic"),
    )
}

pub fn audience_editor() -> WorkflowNode {
    WorkflowNode::agent(
        FnAgent::sync("editStoryForAudience", "story", |args| {
            let story = args.require_str("story")?;
            let audience = args.require_str("audience")?;
            Ok(json!(format!("{} It was told for {}.", story, audience)))
        })
        .with_inputs(["story", "audience"])
        .with_description("Adapts the story to its audience"),
    )
}

pub fn style_editor() -> WorkflowNode {
    WorkflowNode::agent(
        FnAgent::sync("editStoryForStyle", "story", |args| {
            let story = args.require_str("story")?;
            let style = args.require_str("style")?;
            Ok(json!(format!("{} It was retold in a {} style.", story, style)))
        })
        .with_inputs(["story", "style"])
        .with_description("Rewrites the story in the requested style"),
    )
}

/// Scores 0.3 per mention of the style, capped at 1.0.
pub fn style_scorer() -> WorkflowNode {
    WorkflowNode::agent(
        FnAgent::sync("scoreStyle", "score", |args| {
            let story = args.require_str("story")?.to_lowercase();
            let style = args.require_str("style")?.to_lowercase();
            Ok(json!(style_score(&story, &style)))
        })
        .with_inputs(["story", "style"])
        .with_description("Scores how well the story matches the style"),
    )
}

fn style_score(story: &str, style: &str) -> f64 {
    if style.is_empty() {
        return 0.0;
    }
    let mentions = story.matches(style).count() as f64;
    ((mentions * 0.3) * 10.0).round().min(10.0) / 10.0
}

pub fn category_router() -> WorkflowNode {
    WorkflowNode::agent(
        FnAgent::sync("classify", "category", |args| {
            let request = args.require_str("request")?;
            Ok(json!(classify(request)))
        })
        .with_inputs(["request"])
        .with_description("Categorizes a user request"),
    )
}

fn classify(request: &str) -> &'static str {
    const MEDICAL: &[&str] = &["pain", "doctor", "sick", "leg", "fever", "medicine"];
    const TECHNICAL: &[&str] = &["server", "laptop", "crash", "wifi", "software", "bug"];
    const LEGAL: &[&str] = &["lawyer", "contract", "sue", "court", "law", "legal"];

    let words: Vec<String> = request
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    let hits = |keywords: &[&str]| {
        words
            .iter()
            .filter(|w| keywords.iter().any(|k| *k == w.as_str()))
            .count()
    };

    [
        ("MEDICAL", hits(MEDICAL)),
        ("TECHNICAL", hits(TECHNICAL)),
        ("LEGAL", hits(LEGAL)),
    ]
    .into_iter()
    .filter(|(_, n)| *n > 0)
    .max_by_key(|(_, n)| *n)
    .map(|(category, _)| category)
    .unwrap_or("UNKNOWN")
}

fn expert(name: &str, field: &'static str) -> WorkflowNode {
    WorkflowNode::agent(
        FnAgent::sync(name, "response", move |args: Arguments| {
            let request = args.require_str("request")?;
            Ok(json!(format!("As a {} expert, regarding \"{}\": ", field, request)
                + advice(field)))
        })
        .with_inputs(["request"]),
    )
}

fn advice(field: &str) -> &'static str {
    match field {
        "medical" => "rest, and see a doctor if it persists.",
        "technical" => "check the logs, then restart the service.",
        _ => "keep records, and consult a lawyer before acting.",
    }
}

/// Writer, audience editor, and style editor in sequence.
pub fn story_creator(config: &EngineConfig, events: Option<Arc<EventBus>>) -> Result<Workflow> {
    let root = Sequence::new([creative_writer(), audience_editor(), style_editor()])
        .with_output("story");
    with_events(Workflow::builder("story-creator", root).config(config.clone()), events).build()
}

/// The story workflow with a handler that supplies a missing topic.
pub fn story_creator_with_recovery(
    config: &EngineConfig,
    events: Option<Arc<EventBus>>,
) -> Result<Workflow> {
    let root = Sequence::new([creative_writer(), audience_editor(), style_editor()])
        .with_output("story");
    with_events(
        Workflow::builder("story-creator-recovering", root)
            .config(config.clone())
            .error_handler(|mut ctx| {
                let missing_topic = ctx.agent_name() == "generateStory"
                    && ctx.error().missing_argument() == Some("topic");
                if !missing_topic {
                    return ErrorRecoveryResult::throw_exception();
                }
                ctx.scope_mut().write("topic", DEFAULT_TOPIC);
                ErrorRecoveryResult::retry()
            }),
        events,
    )
    .build()
}

/// Score then edit until the style score reaches the threshold.
pub fn style_review_loop() -> Loop {
    Loop::new(
        [style_scorer(), style_editor()],
        Predicate::new(|scope| scope.read_as_or("score", 0.0_f64) >= STYLE_THRESHOLD)
            .labelled(format!("score >= {}", STYLE_THRESHOLD)),
    )
    .with_max_iterations(5)
    .with_output("story")
}

/// Draft a story, then review its style in a loop.
pub fn story_with_review(config: &EngineConfig, events: Option<Arc<EventBus>>) -> Result<Workflow> {
    let root = Sequence::new([creative_writer(), style_review_loop().into()]).with_output("story");
    with_events(Workflow::builder("story-with-review", root).config(config.clone()), events).build()
}

/// Classify a request, then hand it to the matching expert.
pub fn expert_router(config: &EngineConfig, events: Option<Arc<EventBus>>) -> Result<Workflow> {
    let experts = Conditional::new()
        .branch(expert("medicalExpert", "medical"), Predicate::expr("category == MEDICAL"))
        .branch(expert("technicalExpert", "technical"), Predicate::expr("category == TECHNICAL"))
        .branch(expert("legalExpert", "legal"), Predicate::expr("category == LEGAL"))
        .with_output("response");
    let root = Sequence::new([category_router(), experts.into()]).with_output("response");
    with_events(Workflow::builder("expert-router", root).config(config.clone()), events).build()
}

fn with_events(
    builder: agentflow_engine::WorkflowBuilder,
    events: Option<Arc<EventBus>>,
) -> agentflow_engine::WorkflowBuilder {
    match events {
        Some(bus) => builder.events(bus),
        None => builder,
    }
}

/// Render a result value for the terminal.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(no result)".to_string(),
        other => other.to_string(),
    }
}

/// Whether `err` means a required input was not supplied.
pub fn is_missing_input(err: &FlowError) -> bool {
    err.missing_argument().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn test_story_creator() {
        let wf = story_creator(&config(), None).unwrap();
        let story = wf
            .invoke([
                ("topic", "dragons and wizards"),
                ("style", "fantasy"),
                ("audience", "young adults"),
            ])
            .await
            .unwrap();
        let story = story.as_str().unwrap();
        assert!(story.contains("dragons"));
        assert!(story.contains("wizards"));
        assert!(story.contains("young adults"));
        assert!(story.ends_with("retold in a fantasy style."));
    }

    #[tokio::test]
    async fn test_story_creator_missing_topic() {
        let wf = story_creator(&config(), None).unwrap();
        let err = wf
            .invoke([("style", "fantasy"), ("audience", "young adults")])
            .await
            .unwrap_err();
        assert!(is_missing_input(&err));
        assert!(err.to_string().contains("topic"));
    }

    #[tokio::test]
    async fn test_story_creator_recovers_topic() {
        let wf = story_creator_with_recovery(&config(), None).unwrap();
        let recovered = wf
            .invoke([("style", "fantasy"), ("audience", "young adults")])
            .await
            .unwrap();
        let preset = story_creator(&config(), None)
            .unwrap()
            .invoke([
                ("topic", DEFAULT_TOPIC),
                ("style", "fantasy"),
                ("audience", "young adults"),
            ])
            .await
            .unwrap();
        assert_eq!(recovered, preset);
    }

    #[tokio::test]
    async fn test_story_with_review() {
        let wf = story_with_review(&config(), None).unwrap();
        let result = wf
            .invoke_with_scope([("topic", "dragons and wizards"), ("style", "comedy")])
            .await
            .unwrap();

        let scope = result.scope();
        assert_eq!(scope.get_str("topic"), Some("dragons and wizards"));
        assert_eq!(scope.get_str("style"), Some("comedy"));
        assert_eq!(result.result().as_str(), scope.get_str("story"));
        assert!(scope.read_as_or("score", 0.0_f64) >= STYLE_THRESHOLD);
        // The fourth score reaches 0.9; its iteration still finishes with an edit.
        assert_eq!(scope.get_f64("score"), Some(0.9));
        assert_eq!(result.result().as_str().unwrap().matches("comedy").count(), 4);
    }

    #[tokio::test]
    async fn test_expert_router() {
        let wf = expert_router(&config(), None).unwrap();
        let result = wf
            .invoke_with_scope([("request", "I broke my leg, what should I do?")])
            .await
            .unwrap();
        assert_eq!(result.scope().get_str("category"), Some("MEDICAL"));
        assert!(result.result().as_str().unwrap().starts_with("As a medical expert"));
    }

    #[tokio::test]
    async fn test_expert_router_unknown_category() {
        let wf = expert_router(&config(), None).unwrap();
        let result = wf
            .invoke_with_scope([("request", "what is the weather like?")])
            .await
            .unwrap();
        assert_eq!(result.scope().get_str("category"), Some("UNKNOWN"));
        assert!(result.result().is_null());
        assert!(!result.scope().contains("response"));
    }

    #[test]
    fn test_style_score() {
        assert_eq!(style_score("a tale", "comedy"), 0.0);
        assert_eq!(style_score("comedy comedy", "comedy"), 0.6);
        assert_eq!(style_score("comedy comedy comedy comedy", "comedy"), 1.0);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("My server keeps crashing with a software bug"), "TECHNICAL");
        assert_eq!(classify("Can I sue over a broken contract?"), "LEGAL");
        assert_eq!(classify("hello"), "UNKNOWN");
    }
}
