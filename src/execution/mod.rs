//! Command execution pipeline.
//!
//! A command invocation runs through an ordered list of [`ExecutionStep`]s. Hooks attached to
//! each step run in turn; the [`ExecutionSteps::INVOKE`] step runs the command itself. The
//! whole pipeline runs inside a [`Contexts::COMMAND`] container, so hooks and the command
//! can have their dependencies injected.

/// Hooks and invokers
pub mod hooks;
/// The pipeline state machine
pub mod pipeline;

pub use hooks::{ExecutionHook, Invoke, hook};
pub use pipeline::{ExecutionPipeline, HookFailure, PipelineStatus};

use crate::{
    di::{Container, Contexts, DependencyInjectionManager, DiResult, Key},
    errors::Result,
};
use std::{borrow::Cow, fmt, sync::Arc};
use tracing::instrument;

/// A named stage of command execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecutionStep(Cow<'static, str>);

impl ExecutionStep {
    /// A step with a fixed name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// A step with a name chosen at runtime.
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The built-in steps.
pub struct ExecutionSteps;

impl ExecutionSteps {
    /// Limits how many invocations of a command may run at once.
    pub const MAX_CONCURRENCY: ExecutionStep = ExecutionStep::new("MAX_CONCURRENCY");
    /// Permission and other precondition checks.
    pub const CHECKS: ExecutionStep = ExecutionStep::new("CHECKS");
    /// Rate limiting.
    pub const COOLDOWNS: ExecutionStep = ExecutionStep::new("COOLDOWNS");
    /// Runs just before the command.
    pub const PRE_INVOKE: ExecutionStep = ExecutionStep::new("PRE_INVOKE");
    /// The command itself. Hooks cannot be attached to it.
    pub const INVOKE: ExecutionStep = ExecutionStep::new("INVOKE");
    /// Runs after the command.
    pub const POST_INVOKE: ExecutionStep = ExecutionStep::new("POST_INVOKE");

    /// Every built-in step, in execution order.
    #[must_use]
    pub fn default_order() -> Vec<ExecutionStep> {
        vec![
            Self::MAX_CONCURRENCY,
            Self::CHECKS,
            Self::COOLDOWNS,
            Self::PRE_INVOKE,
            Self::INVOKE,
            Self::POST_INVOKE,
        ]
    }
}

/// Who ran which command, and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Fully qualified command name
    pub command: String,
    /// Discord id of the invoking user
    pub user_id: u64,
    /// Discord id of the guild, if not invoked in a direct message
    pub guild_id: Option<u64>,
}

/// Runs `pipeline` inside a new command container.
///
/// The [`Invocation`] is added to the container so hooks and the command can inject it.
///
/// # Errors
/// [`crate::errors::Error::PipelineFailed`] if a hook or the command failed, or any error from
/// entering or closing the command context.
pub async fn execute(
    manager: &DependencyInjectionManager,
    pipeline: ExecutionPipeline,
    invoke: &Invoke,
) -> Result<()> {
    execute_with(manager, pipeline, invoke, |_| Ok(())).await
}

/// Like [`execute`], with `setup` run against the command container before the pipeline starts.
///
/// # Errors
/// See [`execute`]. Errors from `setup` are returned as-is.
#[instrument(skip_all, fields(command = %pipeline.invocation().command))]
pub async fn execute_with<S>(
    manager: &DependencyInjectionManager,
    pipeline: ExecutionPipeline,
    invoke: &Invoke,
    setup: S,
) -> Result<()>
where
    S: FnOnce(&Container) -> DiResult<()>,
{
    let invocation = Arc::clone(pipeline.invocation());
    manager
        .enter_context(&Contexts::COMMAND, |container| async move {
            if let Some(container) = container {
                container.add_value(Key::<Invocation>::new(), (*invocation).clone(), None)?;
                setup(&container)?;
            }
            pipeline.run(invoke).await
        })
        .await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::{
        di::{BoxError, Parameter, Signature},
        errors::Error,
        test_utils::{init_test_tracing, sample_invocation},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Audit(AtomicUsize);

    #[test]
    fn test_default_order_ends_with_invoke_then_post() {
        let order = ExecutionSteps::default_order();
        assert_eq!(order.len(), 6);
        assert_eq!(order[4], ExecutionSteps::INVOKE);
        assert_eq!(order[5].name(), "POST_INVOKE");
    }

    #[tokio::test]
    async fn test_execute_injects_invocation_and_dependencies() {
        init_test_tracing();
        let manager = DependencyInjectionManager::with_enabled(true);
        manager
            .registry_for(&Contexts::DEFAULT)
            .register_value(Key::<Audit>::new(), Audit(AtomicUsize::new(0)), None)
            .unwrap();

        let invoke = Invoke::new(
            Signature::new()
                .param(Parameter::positional_only("invocation"))
                .param(Parameter::new("audit").annotated(Key::<Audit>::new()).injected())
                .param(Parameter::keyword_only("caller").annotated(Key::<Invocation>::new()).injected()),
            |args| async move {
                let audit = args.get::<Audit>("audit")?;
                let caller = args.get::<Invocation>("caller")?;
                let invocation = args.get::<Invocation>("invocation")?;
                assert_eq!(caller, invocation);
                audit.0.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            },
        );

        for _ in 0..2 {
            let pipeline =
                ExecutionPipeline::new(sample_invocation("ping"), ExecutionSteps::default_order(), Vec::new());
            execute(&manager, pipeline, &invoke).await.unwrap();
        }

        let root = manager.default_container().unwrap();
        assert_eq!(root.get::<Audit>().await.unwrap().0.load(Ordering::SeqCst), 2);
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_reports_failures() {
        let manager = DependencyInjectionManager::with_enabled(true);
        let invoke = Invoke::new(Signature::new(), |_| async {
            Err::<(), BoxError>("command broke".into())
        });

        let pipeline =
            ExecutionPipeline::new(sample_invocation("broken"), ExecutionSteps::default_order(), Vec::new());
        let result = execute(&manager, pipeline, &invoke).await;

        match result {
            Err(Error::PipelineFailed {
                hook_failures,
                invocation_failure,
            }) => {
                assert!(hook_failures.is_empty());
                assert!(matches!(invocation_failure.as_deref(), Some(Error::Handler(_))));
            }
            other => panic!("expected a pipeline failure, got {other:?}"),
        }
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_runs_against_command_container() {
        let manager = DependencyInjectionManager::with_enabled(true);
        let invoke = Invoke::new(
            Signature::new().param(Parameter::new("audit").annotated(Key::<Audit>::new()).injected()),
            |args| async move {
                args.get::<Audit>("audit")?.0.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            },
        );

        let pipeline =
            ExecutionPipeline::new(sample_invocation("setup"), ExecutionSteps::default_order(), Vec::new());
        execute_with(&manager, pipeline, &invoke, |container| {
            container.add_value(Key::<Audit>::new(), Audit(AtomicUsize::new(0)), None)
        })
        .await
        .unwrap();

        manager.close().await.unwrap();
    }
}
