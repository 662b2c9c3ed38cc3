//! Per-context registries and the ambient container.
//!
//! Each [`DiContext`] owns a registry. Entering a context creates a container from that
//! registry, parented to whichever container is currently ambient (or the lazily built root
//! container), and makes it ambient for the duration of the body. Ambient state is task-local,
//! so concurrent commands never observe each other's containers.

use super::{container::CloseOnDrop, lock, Container, Key, Registry};
use crate::{
    config,
    errors::{Error, Result},
};
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    future::Future,
    sync::Mutex,
};
use tracing::{debug, error, instrument};

tokio::task_local! {
    static DI_CONTAINER: Container;
}

/// The container made ambient by the innermost enclosing [`DependencyInjectionManager::enter_context`].
#[must_use]
pub fn current_container() -> Option<Container> {
    DI_CONTAINER.try_with(Clone::clone).ok()
}

/// Name of a dependency injection context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiContext(Cow<'static, str>);

impl DiContext {
    /// A context with a fixed name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// A context with a name chosen at runtime.
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The context name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Key under which containers created for this context can be resolved.
    #[must_use]
    pub fn container_key(&self) -> Key<Container> {
        Key::tagged(self.0.clone())
    }
}

impl fmt::Display for DiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The built-in contexts.
pub struct Contexts;

impl Contexts {
    /// Root context, alive for the lifetime of the application.
    pub const DEFAULT: DiContext = DiContext::new("lantern:di:default");
    /// Entered for every command invocation.
    pub const COMMAND: DiContext = DiContext::new("lantern:di:command");
    /// Entered for every autocomplete request.
    pub const AUTOCOMPLETE: DiContext = DiContext::new("lantern:di:autocomplete");
    /// Entered for every event listener call.
    pub const LISTENER: DiContext = DiContext::new("lantern:di:listener");
    /// Entered for every background task run.
    pub const TASK: DiContext = DiContext::new("lantern:di:task");
}

/// Owns the registry for every context and the application's root container.
pub struct DependencyInjectionManager {
    registries: Mutex<HashMap<DiContext, Registry>>,
    default_container: Mutex<Option<Container>>,
    enabled: bool,
}

impl DependencyInjectionManager {
    /// A manager honouring the process-wide dependency injection switch.
    #[must_use]
    pub fn new() -> Self {
        Self::with_enabled(config::di_enabled())
    }

    /// A manager that is explicitly enabled or disabled.
    #[must_use]
    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            registries: Mutex::new(HashMap::new()),
            default_container: Mutex::new(None),
            enabled,
        }
    }

    /// Whether containers are created at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The registry for `context`, created on first use.
    #[must_use]
    pub fn registry_for(&self, context: &DiContext) -> Registry {
        lock(&self.registries)
            .entry(context.clone())
            .or_default()
            .clone()
    }

    /// The root container, if it has been created.
    #[must_use]
    pub fn default_container(&self) -> Option<Container> {
        lock(&self.default_container).clone()
    }

    fn root_container(&self) -> Container {
        let mut slot = lock(&self.default_container);
        if let Some(existing) = slot.as_ref().filter(|c| !c.is_closed()) {
            return existing.clone();
        }

        let registry = self.registry_for(&Contexts::DEFAULT);
        let root = Container::for_context(&registry, None, Contexts::DEFAULT);
        debug!("created default container");
        *slot = Some(root.clone());
        root
    }

    /// Runs `body` inside a new container for `context`.
    ///
    /// The container's parent is the ambient container, or the root container when nothing is
    /// ambient. It is ambient while `body` runs and is closed afterwards. When dependency
    /// injection is disabled `body` receives `None` and no container is created.
    ///
    /// # Errors
    /// [`Error::InvalidContext`] for [`Contexts::DEFAULT`], whatever `body` returns, and
    /// [`Error::Di`] if closing the container fails.
    #[instrument(skip(self, context, body), fields(context = %context))]
    pub async fn enter_context<F, Fut, T>(&self, context: &DiContext, body: F) -> Result<T>
    where
        F: FnOnce(Option<Container>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.enabled {
            return body(None).await;
        }
        if *context == Contexts::DEFAULT {
            return Err(Error::InvalidContext(context.to_string()));
        }

        let parent = current_container().unwrap_or_else(|| self.root_container());
        let registry = self.registry_for(context);
        let container = Container::for_context(&registry, Some(&parent), context.clone());

        let guard = CloseOnDrop::new(container.clone());
        let outcome = DI_CONTAINER
            .scope(container.clone(), body(Some(container.clone())))
            .await;
        guard.disarm();

        match (outcome, container.close().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(teardown)) => Err(teardown.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                error!(error = %teardown, "teardown failed after the context body failed");
                Err(e)
            }
        }
    }

    /// Closes the root container, if one was created.
    ///
    /// # Errors
    /// [`Error::Di`] if a teardown fails.
    pub async fn close(&self) -> Result<()> {
        let root = lock(&self.default_container).take();
        if let Some(root) = root {
            root.close().await?;
        }
        Ok(())
    }
}

impl Default for DependencyInjectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyInjectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyInjectionManager")
            .field("enabled", &self.enabled)
            .field("contexts", &lock(&self.registries).len())
            .field("default_container", &self.default_container())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::di::{DiError, Factory};
    use crate::test_utils::{counting_teardown, init_test_tracing};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Debug, PartialEq)]
    struct AppName(&'static str);

    #[derive(Debug)]
    struct RequestId(usize);

    fn manager() -> DependencyInjectionManager {
        init_test_tracing();
        DependencyInjectionManager::with_enabled(true)
    }

    #[tokio::test]
    async fn test_registry_for_is_stable() {
        let manager = manager();
        let first = manager.registry_for(&Contexts::COMMAND);
        first
            .register_value(Key::<AppName>::new(), AppName("lantern"), None)
            .unwrap();

        assert!(manager.registry_for(&Contexts::COMMAND).contains(&Key::<AppName>::new()));
        assert!(!manager.registry_for(&Contexts::TASK).contains(&Key::<AppName>::new()));
    }

    #[tokio::test]
    async fn test_no_ambient_container_outside_context() {
        assert!(current_container().is_none());
    }

    #[tokio::test]
    async fn test_enter_context_creates_child_of_root() {
        let manager = manager();
        manager
            .registry_for(&Contexts::DEFAULT)
            .register_value(Key::<AppName>::new(), AppName("lantern"), None)
            .unwrap();

        manager
            .enter_context(&Contexts::COMMAND, |container| async move {
                let container = container.unwrap();
                assert_eq!(current_container().as_ref(), Some(&container));
                assert_eq!(container.context(), Some(&Contexts::COMMAND));

                let root = container.parent().unwrap();
                assert_eq!(root.context(), Some(&Contexts::DEFAULT));
                assert_eq!(*container.get::<AppName>().await?, AppName("lantern"));

                let own = container.get_key(&Contexts::COMMAND.container_key()).await?;
                assert_eq!(*own, container);
                let default = container.get_key(&Contexts::DEFAULT.container_key()).await?;
                assert_eq!(&*default, root);
                Ok(())
            })
            .await
            .unwrap();

        assert!(current_container().is_none());
        assert!(manager.default_container().is_some());
        manager.close().await.unwrap();
        assert!(manager.default_container().is_none());
    }

    #[tokio::test]
    async fn test_nested_contexts_chain_containers() {
        let manager = manager();
        let handle = &manager;

        manager
            .enter_context(&Contexts::COMMAND, |outer| async move {
                let outer = outer.unwrap();
                handle
                    .enter_context(&Contexts::TASK, |inner| async move {
                        let inner = inner.unwrap();
                        assert_eq!(inner.parent(), Some(&outer));
                        let command = inner.get_key(&Contexts::COMMAND.container_key()).await?;
                        assert_eq!(*command, outer);
                        Ok(())
                    })
                    .await
            })
            .await
            .unwrap();

        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_entering_default_is_rejected() {
        let manager = manager();
        let result = manager
            .enter_context(&Contexts::DEFAULT, |_| async { Ok(()) })
            .await;

        assert!(matches!(result, Err(Error::InvalidContext(_))));
    }

    #[tokio::test]
    async fn test_disabled_manager_creates_no_containers() {
        let manager = DependencyInjectionManager::with_enabled(false);

        let saw_container = manager
            .enter_context(&Contexts::COMMAND, |container| async move {
                Ok(container.is_some() || current_container().is_some())
            })
            .await
            .unwrap();

        assert!(!saw_container);
        assert!(manager.default_container().is_none());
    }

    #[tokio::test]
    async fn test_context_container_is_closed_after_body() {
        let manager = manager();
        let released = Arc::new(AtomicUsize::new(0));
        let next = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&next);
        manager
            .registry_for(&Contexts::COMMAND)
            .register_factory(
                Key::<RequestId>::new(),
                Factory::sync(move |_| Ok(RequestId(counter.fetch_add(1, Ordering::SeqCst)))),
                Some(counting_teardown(&released)),
            )
            .unwrap();

        for expected in 0..2 {
            let escaped = manager
                .enter_context(&Contexts::COMMAND, |container| async move {
                    let container = container.unwrap();
                    assert_eq!(container.get::<RequestId>().await?.0, expected);
                    Ok(container)
                })
                .await
                .unwrap();
            assert!(escaped.is_closed());
        }

        assert_eq!(released.load(Ordering::SeqCst), 2);
        // Command containers are closed, so the command registry accepts changes again
        assert!(!manager.registry_for(&Contexts::COMMAND).is_frozen());
        assert!(manager.registry_for(&Contexts::DEFAULT).is_frozen());
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_body_error_still_closes_container() {
        let manager = manager();

        let result: Result<()> = manager
            .enter_context(&Contexts::COMMAND, |container| async move {
                let container = container.unwrap();
                container.get::<AppName>().await?;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(Error::Di(DiError::DependencyNotSatisfiable { .. }))
        ));
        assert!(!manager.registry_for(&Contexts::COMMAND).is_frozen());
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_contexts_are_isolated() {
        let manager = Arc::new(manager());

        let run = |value: usize| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .enter_context(&Contexts::COMMAND, |container| async move {
                        let container = container.unwrap();
                        container.add_value(Key::<RequestId>::new(), RequestId(value), None)?;
                        tokio::task::yield_now().await;
                        let ambient = current_container().unwrap();
                        Ok(ambient.get::<RequestId>().await?.0)
                    })
                    .await
            })
        };

        let (a, b) = tokio::join!(run(1), run(2));
        assert_eq!(a.unwrap().unwrap(), 1);
        assert_eq!(b.unwrap().unwrap(), 2);
        manager.close().await.unwrap();
    }
}
