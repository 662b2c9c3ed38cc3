use super::{ExecutionHook, ExecutionStep, ExecutionSteps, Invocation, Invoke};
use crate::{
    di::{Arguments, Value},
    errors::{Error, Result},
};
use std::{
    collections::{HashMap, VecDeque},
    mem,
    sync::Arc,
};
use tracing::{debug, instrument, warn};

/// A hook that returned an error, and the step it ran at.
#[derive(Debug)]
pub struct HookFailure {
    /// Step the hook was attached to
    pub step: ExecutionStep,
    /// What the hook returned
    pub error: Error,
}

/// Snapshot of pipeline state handed to each hook.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStatus {
    /// Whether any hook has failed so far
    pub any_hook_failed: bool,
    /// Whether the command itself failed
    pub invocation_failed: bool,
}

impl PipelineStatus {
    /// Whether anything has failed.
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.any_hook_failed || self.invocation_failed
    }
}

/// Runs the steps of a single command invocation.
///
/// Every hook of a step runs even if an earlier one failed, unless it asked to be skipped on
/// failure. The command itself only runs if nothing has failed before the invoke step.
#[derive(Debug)]
pub struct ExecutionPipeline {
    invocation: Arc<Invocation>,
    remaining: VecDeque<ExecutionStep>,
    hooks: HashMap<ExecutionStep, Vec<ExecutionHook>>,
    hook_failures: Vec<HookFailure>,
    invocation_failure: Option<Error>,
    /// Named values handed to the command alongside the invocation.
    invoke_arguments: Arguments,
}

impl ExecutionPipeline {
    /// A pipeline running `order`, with `hooks` grouped by the step they are attached to.
    ///
    /// Hooks attached to a step that is not in `order` never run.
    #[must_use]
    pub fn new(
        invocation: Invocation,
        order: Vec<ExecutionStep>,
        hooks: impl IntoIterator<Item = ExecutionHook>,
    ) -> Self {
        let mut grouped: HashMap<ExecutionStep, Vec<ExecutionHook>> = HashMap::new();
        for hook in hooks {
            grouped.entry(hook.step().clone()).or_default().push(hook);
        }

        Self {
            invocation: Arc::new(invocation),
            remaining: order.into(),
            hooks: grouped,
            hook_failures: Vec::new(),
            invocation_failure: None,
            invoke_arguments: Arguments::new(),
        }
    }

    /// Passes `value` to the command as the argument `name`.
    ///
    /// Supplied arguments are never injected, which lets commands run without a container.
    #[must_use]
    pub fn with_argument<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.with_argument_value(name, Arc::new(value))
    }

    /// Like [`ExecutionPipeline::with_argument`], for an already shared value.
    #[must_use]
    pub fn with_argument_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.invoke_arguments = self.invoke_arguments.with_value(name, value);
        self
    }

    /// The invocation this pipeline runs.
    #[must_use]
    pub const fn invocation(&self) -> &Arc<Invocation> {
        &self.invocation
    }

    /// Current failure state.
    #[must_use]
    pub const fn status(&self) -> PipelineStatus {
        PipelineStatus {
            any_hook_failed: !self.hook_failures.is_empty(),
            invocation_failed: self.invocation_failure.is_some(),
        }
    }

    /// Whether anything has failed so far.
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.status().failed()
    }

    /// Runs every remaining step, with `invoke` as the command body.
    ///
    /// # Errors
    /// [`Error::PipelineFailed`] carrying every hook failure and the command's own error, if
    /// anything failed.
    #[instrument(skip_all, fields(command = %self.invocation.command))]
    pub async fn run(mut self, invoke: &Invoke) -> Result<()> {
        let invocation: Value = Arc::clone(&self.invocation) as Value;

        while let Some(step) = self.remaining.pop_front() {
            if step == ExecutionSteps::INVOKE {
                if self.failed() {
                    debug!("skipping command invocation after a failure");
                } else if let Err(e) = invoke
                    .call(mem::take(&mut self.invoke_arguments).push_value(Arc::clone(&invocation)))
                    .await
                {
                    warn!(error = %e, "command invocation failed");
                    self.invocation_failure = Some(e);
                }
                continue;
            }

            let hooks = self.hooks.remove(&step).unwrap_or_default();
            for hook in hooks {
                if hook.skip_when_failed() && self.failed() {
                    continue;
                }

                let args = Arguments::new()
                    .push(self.status())
                    .push_value(Arc::clone(&invocation));
                if let Err(error) = hook.call(args).await {
                    warn!(step = %step, error = %error, "execution hook failed");
                    self.hook_failures.push(HookFailure {
                        step: step.clone(),
                        error,
                    });
                }
            }
        }

        if self.failed() {
            return Err(Error::PipelineFailed {
                hook_failures: self.hook_failures,
                invocation_failure: self.invocation_failure.map(Box::new),
            });
        }
        Ok(())
    }
}
