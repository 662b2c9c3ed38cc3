use super::{ExecutionStep, ExecutionSteps};
use crate::{
    di::{Arguments, AutoInjecting, BoxError, Signature, with_di},
    errors::{Error, Result},
};
use futures::{FutureExt, future::BoxFuture};
use std::{fmt, future::Future};

type Handler = Box<dyn Fn(Arguments) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

fn boxed_handler<F, Fut>(func: F) -> Handler
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    Box::new(move |args: Arguments| func(args).boxed())
}

/// A function run at one step of the execution pipeline.
///
/// Hooks receive the [`super::PipelineStatus`] and the [`super::Invocation`] as their first two
/// positional arguments; any other declared parameters are injected.
#[derive(Clone)]
pub struct ExecutionHook {
    step: ExecutionStep,
    skip_when_failed: bool,
    func: AutoInjecting<Handler>,
}

impl ExecutionHook {
    /// The step this hook runs at.
    #[must_use]
    pub const fn step(&self) -> &ExecutionStep {
        &self.step
    }

    /// Whether the hook is skipped once the pipeline has failed.
    #[must_use]
    pub const fn skip_when_failed(&self) -> bool {
        self.skip_when_failed
    }

    pub(crate) async fn call(&self, args: Arguments) -> Result<()> {
        self.func.call(args).await?.map_err(Error::Handler)
    }
}

impl fmt::Debug for ExecutionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHook")
            .field("step", &self.step)
            .field("skip_when_failed", &self.skip_when_failed)
            .finish_non_exhaustive()
    }
}

/// Creates a hook for `step`.
///
/// # Errors
/// [`Error::InvalidHook`] if `step` is [`ExecutionSteps::INVOKE`], which is reserved for the
/// command itself.
pub fn hook<F, Fut>(
    step: ExecutionStep,
    skip_when_failed: bool,
    signature: Signature,
    func: F,
) -> Result<ExecutionHook>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    if step == ExecutionSteps::INVOKE {
        return Err(Error::InvalidHook(format!(
            "hooks cannot be attached to the {step} step"
        )));
    }

    Ok(ExecutionHook {
        step,
        skip_when_failed,
        func: with_di(signature, boxed_handler(func)),
    })
}

/// The command body run at the [`ExecutionSteps::INVOKE`] step.
///
/// Receives the [`super::Invocation`] as its first positional argument; any other declared
/// parameters are injected.
#[derive(Clone)]
pub struct Invoke {
    func: AutoInjecting<Handler>,
}

impl Invoke {
    /// Wraps a command body declared with `signature`.
    #[must_use]
    pub fn new<F, Fut>(signature: Signature, func: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        Self {
            func: with_di(signature, boxed_handler(func)),
        }
    }

    pub(crate) async fn call(&self, args: Arguments) -> Result<()> {
        self.func.call(args).await?.map_err(Error::Handler)
    }
}

impl fmt::Debug for Invoke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoke").field("func", &self.func).finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_hook_rejects_invoke_step() {
        let result = hook(ExecutionSteps::INVOKE, false, Signature::new(), |_| async {
            Ok::<(), BoxError>(())
        });
        assert!(matches!(result, Err(Error::InvalidHook(_))));
    }

    #[test]
    fn test_hook_records_step_and_policy() {
        let created = hook(ExecutionSteps::CHECKS, true, Signature::new(), |_| async {
            Ok::<(), BoxError>(())
        })
        .unwrap();
        assert_eq!(created.step(), &ExecutionSteps::CHECKS);
        assert!(created.skip_when_failed());
    }
}
