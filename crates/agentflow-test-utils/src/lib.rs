//! Mock agents and fixtures shared by agentflow tests.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use tempfile::NamedTempFile;

use agentflow_core::{Agent, AgentResult, Arguments, BoxError};

/// Agent that records every call's bound arguments and answers from a
/// closure over the arguments.
#[derive(Clone)]
pub struct RecordingAgent {
    name: String,
    inputs: Vec<String>,
    output: String,
    reply: Arc<dyn Fn(&Arguments) -> Value + Send + Sync>,
    calls: Arc<Mutex<Vec<Arguments>>>,
}

impl RecordingAgent {
    pub fn new<F>(name: &str, inputs: &[&str], output: &str, reply: F) -> Self
    where
        F: Fn(&Arguments) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output: output.to_string(),
            reply: Arc::new(reply),
            calls: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Agent that always returns `value`.
    pub fn constant(name: &str, inputs: &[&str], output: &str, value: Value) -> Self {
        Self::new(name, inputs, output, move |_| value.clone())
    }

    /// Agent whose reply is `"<name>(<input values joined by ', '>)"`.
    pub fn echo(name: &str, inputs: &[&str], output: &str) -> Self {
        let label = name.to_string();
        let order: Vec<String> = inputs.iter().map(|s| s.to_string()).collect();
        Self::new(name, inputs, output, move |args| {
            let parts: Vec<String> = order
                .iter()
                .map(|n| match args.get(n) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                })
                .collect();
            Value::String(format!("{}({})", label, parts.join(", ")))
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Arguments of every call so far, in call order.
    pub fn calls(&self) -> Vec<Arguments> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Agent for RecordingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_inputs(&self) -> &[String] {
        &self.inputs
    }

    fn output_name(&self) -> &str {
        &self.output
    }

    fn invoke(&self, args: Arguments) -> BoxFuture<'_, AgentResult> {
        Box::pin(async move {
            let value = (self.reply)(&args);
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(args);
            }
            Ok(value)
        })
    }
}

/// Agent that replays a script of results, one per call.
///
/// Once the script runs out the last entry repeats.
#[derive(Clone)]
pub struct ScriptedAgent {
    name: String,
    inputs: Vec<String>,
    output: String,
    script: Arc<Mutex<VecDeque<Result<Value, String>>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedAgent {
    pub fn new(
        name: &str,
        inputs: &[&str],
        output: &str,
        script: Vec<Result<Value, String>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output: output.to_string(),
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }

    fn next(&self) -> Result<Value, String> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        let mut script = match self.script.lock() {
            Ok(script) => script,
            Err(_) => return Err("script poisoned".to_string()),
        };
        if script.len() > 1 {
            script.pop_front().unwrap_or(Ok(Value::Null))
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err("script empty".to_string()))
        }
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_inputs(&self) -> &[String] {
        &self.inputs
    }

    fn output_name(&self) -> &str {
        &self.output
    }

    fn invoke(&self, _args: Arguments) -> BoxFuture<'_, AgentResult> {
        let next = self.next();
        Box::pin(async move { next.map_err(BoxError::from) })
    }
}

/// Agent that fails on every call with `message`.
pub fn failing_agent(name: &str, inputs: &[&str], output: &str, message: &str) -> ScriptedAgent {
    ScriptedAgent::new(name, inputs, output, vec![Err(message.to_string())])
}

/// Write a TOML config to a temp file that lives as long as the handle.
pub fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(toml.as_bytes()).expect("write temp config");
    file
}
