//! Discord command implementations and the hooks every command runs with.

#![allow(clippy::too_long_first_doc_paragraph)]

/// General utility commands
pub mod general;

// Export commands
pub use general::*;

use crate::{
    di::{BoxError, Parameter, Signature},
    errors::Result,
    execution::{ExecutionHook, ExecutionSteps, Invocation, hook},
};
use tracing::info;

/// Hooks attached to every command pipeline.
///
/// # Errors
/// Returns an error if a hook is attached to a reserved step.
pub fn standard_hooks() -> Result<Vec<ExecutionHook>> {
    let signature = Signature::new()
        .param(Parameter::positional_only("status"))
        .param(Parameter::positional_only("invocation"));

    let log_invocation = hook(ExecutionSteps::PRE_INVOKE, true, signature, |args| async move {
        let invocation = args.get::<Invocation>("invocation")?;
        info!(
            command = %invocation.command,
            user_id = invocation.user_id,
            guild_id = ?invocation.guild_id,
            "Running command"
        );
        Ok::<(), BoxError>(())
    })?;

    Ok(vec![log_invocation])
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_standard_hooks_avoid_invoke_step() {
        let hooks = standard_hooks().unwrap();
        assert!(!hooks.is_empty());
        assert!(hooks.iter().all(|h| h.step() != &ExecutionSteps::INVOKE));
    }
}
