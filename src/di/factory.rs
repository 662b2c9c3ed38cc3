//! Factories and teardowns.
//!
//! A factory builds a dependency from the arguments resolved for its declared parameters;
//! a teardown releases it when the owning container closes. Both come in a synchronous and
//! an asynchronous flavour and are stored type-erased inside the dependency graph.

use super::{
    BoxError, DiError, DiResult,
    conditions::DependencyExpression,
    graph::DependencyData,
    key::{DependencyId, Value},
    params::{Arguments, Parameter, ParameterKind},
};
use futures::{FutureExt, future::BoxFuture};
use std::{collections::HashSet, fmt, future::Future, marker::PhantomData, sync::Arc};

type SyncBuild = dyn Fn(&Arguments) -> Result<Value, BoxError> + Send + Sync;
type AsyncBuild = dyn Fn(Arguments) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;
type SyncRelease = dyn Fn(Value) -> Result<(), BoxError> + Send + Sync;
type AsyncRelease = dyn Fn(Value) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

/// Type-erased factory as stored in the dependency graph.
#[derive(Clone)]
pub enum ErasedFactory {
    /// Runs to completion on the calling task.
    Sync(Arc<SyncBuild>),
    /// Awaited by the resolving task.
    Async(Arc<AsyncBuild>),
}

impl ErasedFactory {
    /// Factory that always returns a clone of `value`.
    pub(crate) fn value(value: Value) -> Self {
        Self::Sync(Arc::new(move |_: &Arguments| Ok(Arc::clone(&value))))
    }

    pub(crate) async fn call(&self, args: Arguments) -> Result<Value, BoxError> {
        match self {
            Self::Sync(build) => build(&args),
            Self::Async(build) => build(args).await,
        }
    }
}

impl fmt::Debug for ErasedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("ErasedFactory::Sync"),
            Self::Async(_) => f.write_str("ErasedFactory::Async"),
        }
    }
}

/// Type-erased teardown as stored in the dependency graph.
#[derive(Clone)]
pub enum ErasedTeardown {
    /// Runs to completion on the closing task.
    Sync(Arc<SyncRelease>),
    /// Awaited by the closing task.
    Async(Arc<AsyncRelease>),
}

impl ErasedTeardown {
    pub(crate) async fn call(&self, value: Value) -> Result<(), BoxError> {
        match self {
            Self::Sync(release) => release(value),
            Self::Async(release) => release(value).await,
        }
    }
}

impl fmt::Debug for ErasedTeardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("ErasedTeardown::Sync"),
            Self::Async(_) => f.write_str("ErasedTeardown::Async"),
        }
    }
}

/// Builds dependencies of type `T`.
///
/// The parameter list declares what the factory needs; each annotated parameter becomes an
/// edge in the dependency graph and is resolved before the factory runs.
///
/// ```ignore
/// let factory = Factory::sync(|args| {
///     let config = args.get::<Config>("config")?;
///     Ok(Client::new(&config.url))
/// })
/// .param("config", Key::<Config>::new());
/// ```
pub struct Factory<T> {
    build: ErasedFactory,
    params: Vec<Parameter>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Factory<T> {
    /// Factory backed by a synchronous closure.
    #[must_use]
    pub fn sync<F>(build: F) -> Self
    where
        F: Fn(&Arguments) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::erased(ErasedFactory::Sync(Arc::new(move |args: &Arguments| {
            build(args).map(|value| Arc::new(value) as Value)
        })))
    }

    /// Factory backed by an asynchronous closure.
    #[must_use]
    pub fn from_async<F, Fut>(build: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::erased(ErasedFactory::Async(Arc::new(move |args: Arguments| {
            let fut = build(args);
            async move { fut.await.map(|value| Arc::new(value) as Value) }.boxed()
        })))
    }

    /// Factory that hands out a shared instance of `value`.
    pub(crate) fn value(value: T) -> Self {
        Self::erased(ErasedFactory::value(Arc::new(value)))
    }

    const fn erased(build: ErasedFactory) -> Self {
        Self {
            build,
            params: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Declares an injected parameter named `name`, satisfied by `expression`.
    #[must_use]
    pub fn param(self, name: impl Into<String>, expression: impl Into<DependencyExpression>) -> Self {
        self.parameter(Parameter::new(name).annotated(expression))
    }

    /// Declares a parameter in full. Parameters that cannot be injected are rejected at
    /// registration.
    #[must_use]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.params.push(parameter);
        self
    }

    /// Checks the declared parameters and converts into graph node data.
    pub(crate) fn into_data(
        self,
        id: &DependencyId,
        teardown: Option<Teardown<T>>,
    ) -> DiResult<DependencyData> {
        let invalid = |message: String| DiError::InvalidFactory {
            id: id.to_string(),
            message,
        };

        let mut seen = HashSet::new();
        let mut params = Vec::with_capacity(self.params.len());
        for parameter in self.params {
            match parameter.kind() {
                ParameterKind::PositionalOnly => {
                    return Err(invalid(format!(
                        "positional-only parameter {:?} cannot be injected",
                        parameter.name()
                    )));
                }
                ParameterKind::VarPositional | ParameterKind::VarKeyword => {
                    return Err(invalid(format!(
                        "variadic parameter {:?} cannot be injected",
                        parameter.name()
                    )));
                }
                ParameterKind::PositionalOrKeyword | ParameterKind::KeywordOnly => {}
            }

            if !seen.insert(parameter.name().to_string()) {
                return Err(invalid(format!(
                    "parameter {:?} is declared more than once",
                    parameter.name()
                )));
            }

            let Some(expression) = parameter.annotation().cloned() else {
                return Err(invalid(format!(
                    "parameter {:?} has no dependency annotation",
                    parameter.name()
                )));
            };
            params.push((parameter.name().to_string(), expression));
        }

        Ok(DependencyData::new(
            self.build,
            params,
            teardown.map(Teardown::into_erased),
        ))
    }
}

impl<T> fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("build", &self.build)
            .field("params", &self.params.len())
            .finish()
    }
}

/// Releases dependencies of type `T` when their container closes.
pub struct Teardown<T> {
    release: ErasedTeardown,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + Sync + 'static> Teardown<T> {
    /// Teardown backed by a synchronous closure.
    #[must_use]
    pub fn sync<F>(release: F) -> Self
    where
        F: Fn(Arc<T>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            release: ErasedTeardown::Sync(Arc::new(move |value: Value| {
                release(downcast_instance(value)?)
            })),
            _marker: PhantomData,
        }
    }

    /// Teardown backed by an asynchronous closure.
    #[must_use]
    pub fn from_async<F, Fut>(release: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let release = Arc::new(release);
        Self {
            release: ErasedTeardown::Async(Arc::new(move |value: Value| {
                let release = Arc::clone(&release);
                async move { release(downcast_instance(value)?).await }.boxed()
            })),
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_erased(self) -> ErasedTeardown {
        self.release
    }
}

impl<T> fmt::Debug for Teardown<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Teardown").field(&self.release).finish()
    }
}

fn downcast_instance<T: Send + Sync + 'static>(value: Value) -> Result<Arc<T>, BoxError> {
    value.downcast::<T>().map_err(|_| {
        format!(
            "teardown expected an instance of {}",
            std::any::type_name::<T>()
        )
        .into()
    })
}
