//! Registries: where dependencies are declared before any container exists.

use super::{
    DiError, DiResult, lock,
    factory::{Factory, Teardown},
    graph::{DiGraph, populate_for_dependency},
    key::{DependencyId, Key},
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tracing::debug;

#[derive(Default)]
struct RegistryInner {
    graph: Mutex<DiGraph>,
    active_containers: Mutex<HashSet<u64>>,
}

/// Dependency registry storing the graph of known dependencies.
///
/// A registry is frozen while any container built from it is open; registration fails with
/// [`DiError::RegistryFrozen`] until every such container has been closed. Cloning produces
/// another handle to the same registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pre-existing value as a dependency.
    ///
    /// # Errors
    /// [`DiError::RegistryFrozen`] while a container built from this registry is open.
    pub fn register_value<T: Send + Sync + 'static>(
        &self,
        key: Key<T>,
        value: T,
        teardown: Option<Teardown<T>>,
    ) -> DiResult<()> {
        self.register_factory(key, Factory::value(value), teardown)
    }

    /// Registers a factory for creating a dependency.
    ///
    /// Registering the same key again replaces the previous factory and its edges.
    ///
    /// # Errors
    /// [`DiError::RegistryFrozen`] while a container built from this registry is open,
    /// [`DiError::InvalidFactory`] for parameters that cannot be injected, and
    /// [`DiError::CircularDependency`] if the factory requires its own key.
    pub fn register_factory<T: Send + Sync + 'static>(
        &self,
        key: Key<T>,
        factory: Factory<T>,
        teardown: Option<Teardown<T>>,
    ) -> DiResult<()> {
        if self.is_frozen() {
            return Err(DiError::RegistryFrozen);
        }

        let id = key.id();
        let data = factory.into_data(id, teardown)?;
        populate_for_dependency(&mut lock(&self.inner.graph), id, data)?;

        debug!(dependency = %id, "registered dependency");
        Ok(())
    }

    /// Whether a factory or value has been registered for `key`.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self, key: &Key<T>) -> bool {
        self.contains_id(key.id())
    }

    /// Whether a factory or value has been registered for `id`.
    ///
    /// Ids that are only referenced by other factories do not count.
    #[must_use]
    pub fn contains_id(&self, id: &DependencyId) -> bool {
        matches!(lock(&self.inner.graph).node(id), Some(Some(_)))
    }

    /// Whether any container built from this registry is still open.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        !lock(&self.inner.active_containers).is_empty()
    }

    pub(crate) fn freeze(&self, container: u64) {
        lock(&self.inner.active_containers).insert(container);
    }

    pub(crate) fn unfreeze(&self, container: u64) {
        lock(&self.inner.active_containers).remove(&container);
    }

    /// Snapshot of the dependency graph.
    pub(crate) fn graph(&self) -> DiGraph {
        lock(&self.inner.graph).clone()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("dependencies", &lock(&self.inner.graph).len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::di::Container;

    struct Database;
    struct Cache;

    #[test]
    fn test_register_value_is_contained() {
        let registry = Registry::new();
        registry
            .register_value(Key::<Database>::new(), Database, None)
            .unwrap();

        assert!(registry.contains(&Key::<Database>::new()));
        assert!(!registry.contains(&Key::<Cache>::new()));
    }

    #[test]
    fn test_referenced_dependency_is_not_contained() {
        let registry = Registry::new();
        registry
            .register_factory(
                Key::<Cache>::new(),
                Factory::sync(|_| Ok(Cache)).param("db", Key::<Database>::new()),
                None,
            )
            .unwrap();

        assert!(registry.contains(&Key::<Cache>::new()));
        assert!(!registry.contains(&Key::<Database>::new()));
        assert!(registry.graph().contains(Key::<Database>::new().id()));
    }

    #[test]
    fn test_reregistration_replaces_edges() {
        let registry = Registry::new();
        registry
            .register_factory(
                Key::<Cache>::new(),
                Factory::sync(|_| Ok(Cache)).param("db", Key::<Database>::new()),
                None,
            )
            .unwrap();
        registry
            .register_factory(Key::<Cache>::new(), Factory::sync(|_| Ok(Cache)), None)
            .unwrap();

        assert!(registry.graph().out_edges(Key::<Cache>::new().id()).is_empty());
    }

    #[test]
    fn test_self_dependency_is_rejected() {
        let registry = Registry::new();
        let result = registry.register_factory(
            Key::<Cache>::new(),
            Factory::sync(|_| Ok(Cache)).param("me", Key::<Cache>::new()),
            None,
        );

        assert!(matches!(result, Err(DiError::CircularDependency { .. })));
        assert!(!registry.contains(&Key::<Cache>::new()));
    }

    #[tokio::test]
    async fn test_frozen_while_container_open() {
        let registry = Registry::new();
        let container = Container::new(&registry);
        assert!(registry.is_frozen());

        let result = registry.register_value(Key::<Database>::new(), Database, None);
        assert!(matches!(result, Err(DiError::RegistryFrozen)));

        container.close().await.unwrap();
        assert!(!registry.is_frozen());
        registry
            .register_value(Key::<Database>::new(), Database, None)
            .unwrap();
    }

    #[tokio::test]
    async fn test_frozen_until_every_container_closes() {
        let registry = Registry::new();
        let first = Container::new(&registry);
        let second = Container::new(&registry);

        first.close().await.unwrap();
        assert!(registry.is_frozen());
        second.close().await.unwrap();
        assert!(!registry.is_frozen());
    }
}
