use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use agentflow_core::{Agent, FlowError, FlowEventKind, Result, Scope};

use crate::binder::bind_arguments;
use crate::executor::RunContext;
use crate::recovery::Recovery;

/// Call one agent: bind its inputs, invoke it, and write its output.
///
/// Failures (binding failures included) go through the recovery dispatcher,
/// which may retry the same agent, substitute a fallback output, or return the
/// failure to the caller.
pub async fn invoke_agent(
    agent: &Arc<dyn Agent>,
    scope: &mut Scope,
    run: &RunContext,
) -> Result<Value> {
    let name = agent.name();
    let output_name = agent.output_name();
    let mut retries = 0;

    loop {
        run.emit(FlowEventKind::AgentStarted {
            agent: name.to_string(),
            attempt: retries,
        });
        let start = Instant::now();

        let attempt = match bind_arguments(agent.as_ref(), scope) {
            Ok(args) => agent
                .invoke(args)
                .await
                .map_err(|e| FlowError::invocation(name, e)),
            Err(e) => Err(e),
        };

        let error = match attempt {
            Ok(value) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                scope.write(output_name, value.clone());
                debug!(agent = %name, output = %output_name, elapsed_ms, "Agent call complete");
                run.emit(FlowEventKind::AgentSucceeded {
                    agent: name.to_string(),
                    output_name: output_name.to_string(),
                    elapsed_ms,
                });
                return Ok(value);
            }
            Err(e) => e,
        };

        warn!(agent = %name, attempt = retries, error = %error, "Agent call failed");
        run.emit(FlowEventKind::AgentFailed {
            agent: name.to_string(),
            attempt: retries,
            error: error.to_string(),
        });

        let (recovery, action) = run.recovery.dispatch(name, error, scope, retries);
        if let Some(action) = action {
            run.emit(FlowEventKind::RecoveryDecided {
                agent: name.to_string(),
                action,
            });
        }

        match recovery {
            Recovery::Retry => {
                retries += 1;
                debug!(agent = %name, retries, "Retrying agent call");
            }
            Recovery::Fallback(value) => {
                debug!(agent = %name, output = %output_name, "Using fallback output");
                scope.write(output_name, value.clone());
                return Ok(value);
            }
            Recovery::Fail(e) => return Err(e),
        }
    }
}
