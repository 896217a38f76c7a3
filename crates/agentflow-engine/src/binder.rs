use agentflow_core::{Agent, Arguments, FlowError, Result, Scope};

/// Bind an agent's required inputs from the scope.
///
/// Inputs are resolved in declaration order and binding stops at the first
/// one that is absent, so a caller sees one missing argument at a time.
pub fn bind_arguments(agent: &dyn Agent, scope: &Scope) -> Result<Arguments> {
    let mut args = Arguments::new(agent.name());
    for input in agent.required_inputs() {
        match scope.get(input) {
            Some(value) => args.insert(input.clone(), value.clone()),
            None => {
                return Err(FlowError::MissingArgument {
                    agent: agent.name().to_string(),
                    argument: input.clone(),
                })
            }
        }
    }
    Ok(args)
}
