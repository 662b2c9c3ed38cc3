//! Automatic injection of dependencies into callables.
//!
//! [`with_di`] wraps a callable together with its declared [`Signature`]. When called, the
//! wrapper fills every injectable parameter the caller did not supply from the ambient
//! container before invoking the callable.

use super::{
    conditions::DependencyExpression,
    manager::current_container,
    params::{Arguments, ParamDefault, ParameterKind, Signature},
};
use crate::{
    config,
    errors::{Error, Result},
};
use std::{
    fmt,
    future::Future,
    ops::Deref,
    sync::{Arc, OnceLock},
};
use tracing::trace;

#[derive(Debug)]
struct InjectionSlot {
    name: String,
    expression: Option<DependencyExpression>,
}

/// Parameters split the way callers can supply them.
#[derive(Debug, Default)]
struct InjectionPlan {
    /// Every positional-capable parameter, in order; skipped by the number of positional values.
    positional: Vec<InjectionSlot>,
    /// Injectable keyword-only parameters.
    keyword_only: Vec<InjectionSlot>,
}

impl InjectionPlan {
    fn from_signature(signature: &Signature) -> Self {
        let mut plan = Self::default();
        for param in signature.params() {
            let injectable = !matches!(param.param_default(), ParamDefault::Value(_));
            let slot = InjectionSlot {
                name: param.name().to_string(),
                expression: param.annotation().filter(|_| injectable).cloned(),
            };

            match param.kind() {
                ParameterKind::PositionalOnly => plan.positional.push(InjectionSlot {
                    expression: None,
                    ..slot
                }),
                ParameterKind::PositionalOrKeyword => plan.positional.push(slot),
                ParameterKind::KeywordOnly => {
                    if slot.expression.is_some() {
                        plan.keyword_only.push(slot);
                    }
                }
                ParameterKind::VarPositional | ParameterKind::VarKeyword => {}
            }
        }
        plan
    }
}

/// A callable whose annotated parameters are injected from the ambient container.
///
/// Cloning shares the wrapped callable.
pub struct AutoInjecting<F> {
    func: Arc<F>,
    signature: Arc<Signature>,
    plan: Arc<OnceLock<InjectionPlan>>,
    enabled: bool,
}

/// Wraps `func` so that calls inject its annotated parameters.
#[must_use]
pub fn with_di<F>(signature: Signature, func: F) -> AutoInjecting<F> {
    AutoInjecting::new(signature, func)
}

impl<F> AutoInjecting<F> {
    /// Wraps `func`, honouring the process-wide dependency injection switch.
    #[must_use]
    pub fn new(signature: Signature, func: F) -> Self {
        Self {
            func: Arc::new(func),
            signature: Arc::new(signature),
            plan: Arc::new(OnceLock::new()),
            enabled: config::di_enabled(),
        }
    }

    /// Overrides whether injection happens; a disabled wrapper passes arguments through.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The declared signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Binds the wrapper to `receiver`, which is passed ahead of the arguments on every call.
    #[must_use]
    pub fn bind<S>(&self, receiver: Arc<S>) -> BoundInjecting<S, F> {
        BoundInjecting {
            receiver,
            wrapper: self.clone(),
        }
    }

    /// Injects dependencies into `args` and binds them to the declared signature.
    ///
    /// # Errors
    /// [`Error::NoDiContext`] if a parameter needs injecting and no container is ambient, and
    /// [`Error::Di`] if a dependency cannot be resolved.
    pub async fn prepare(&self, mut args: Arguments) -> Result<Arguments> {
        if self.enabled {
            let plan = self.plan.get_or_init(|| InjectionPlan::from_signature(&self.signature));
            let pending = plan
                .positional
                .iter()
                .skip(args.positional_len())
                .chain(&plan.keyword_only);

            let mut container = None;
            for slot in pending {
                let Some(expression) = &slot.expression else {
                    continue;
                };
                if args.has_keyword(&slot.name) {
                    continue;
                }

                if container.is_none() {
                    container = Some(current_container().ok_or(Error::NoDiContext)?);
                }
                let Some(container) = container.as_ref() else {
                    continue;
                };

                trace!(param = %slot.name, "injecting parameter");
                if let Some(value) = container.resolve(expression).await? {
                    args.insert(slot.name.clone(), value);
                }
            }
        }

        Ok(args.bind(Arc::clone(&self.signature)))
    }

    /// Injects dependencies and calls the wrapped callable.
    ///
    /// # Errors
    /// See [`AutoInjecting::prepare`].
    pub async fn call<Fut>(&self, args: Arguments) -> Result<Fut::Output>
    where
        F: Fn(Arguments) -> Fut,
        Fut: Future,
    {
        let args = self.prepare(args).await?;
        Ok((*self.func)(args).await)
    }
}

impl<F> Clone for AutoInjecting<F> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            signature: Arc::clone(&self.signature),
            plan: Arc::clone(&self.plan),
            enabled: self.enabled,
        }
    }
}

impl<F> Deref for AutoInjecting<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.func
    }
}

impl<F> fmt::Debug for AutoInjecting<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoInjecting")
            .field("signature", &self.signature)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// An [`AutoInjecting`] callable bound to a receiver.
pub struct BoundInjecting<S, F> {
    receiver: Arc<S>,
    wrapper: AutoInjecting<F>,
}

impl<S, F> BoundInjecting<S, F> {
    /// The bound receiver.
    #[must_use]
    pub const fn receiver(&self) -> &Arc<S> {
        &self.receiver
    }

    /// Injects dependencies and calls the wrapped callable with the receiver.
    ///
    /// # Errors
    /// See [`AutoInjecting::prepare`].
    pub async fn call<Fut>(&self, args: Arguments) -> Result<Fut::Output>
    where
        F: Fn(Arc<S>, Arguments) -> Fut,
        Fut: Future,
    {
        let args = self.wrapper.prepare(args).await?;
        Ok((*self.wrapper.func)(Arc::clone(&self.receiver), args).await)
    }
}

impl<S, F> Clone for BoundInjecting<S, F> {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
            wrapper: self.wrapper.clone(),
        }
    }
}

impl<S, F> Deref for BoundInjecting<S, F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.wrapper.func
    }
}
