//! Containers: per-scope instance caches resolving dependencies from a registry.
//!
//! A container snapshots the graph of its parent (if any) and merges its registry's graph on
//! top. Every id that the container itself registers is *defined* by it; everything else is
//! delegated up the parent chain. A dependency is therefore always cached, and later torn
//! down, by the container that defines it, and a parent dependency can never see an override
//! made by a child.

use super::{
    DiError, DiResult, lock,
    conditions::DependencyExpression,
    factory::{ErasedFactory, ErasedTeardown, Factory, Teardown},
    graph::{DependencyData, DiGraph, populate_for_dependency},
    key::{DependencyId, Key, Value},
    manager::DiContext,
    params::Arguments,
    registry::Registry,
};
use futures::{FutureExt, future::BoxFuture};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    future::Future,
    mem,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tracing::{debug, error, instrument, warn};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct ContainerState {
    graph: DiGraph,
    defined: HashSet<DependencyId>,
    /// Ids that resolve to this container itself.
    aliases: HashSet<DependencyId>,
    instances: HashMap<DependencyId, Value>,
    creation_order: Vec<DependencyId>,
}

struct ContainerInner {
    id: u64,
    registry: Registry,
    parent: Option<Container>,
    tag: Option<DiContext>,
    closed: AtomicBool,
    state: Mutex<ContainerState>,
    construction: Mutex<HashMap<DependencyId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!(
                container = self.id,
                "container dropped without being closed - skipping teardowns"
            );
            self.registry.unfreeze(self.id);
        }
    }
}

/// A container for dependencies.
///
/// Cloning produces another handle to the same container.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// A root container built from `registry`.
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        Self::build(registry, None, None)
    }

    /// A child container that falls back to `parent` for dependencies it does not define.
    #[must_use]
    pub fn with_parent(registry: &Registry, parent: &Self) -> Self {
        Self::build(registry, Some(parent), None)
    }

    /// Like [`Container::with_parent`], labelled with the context it was created for.
    #[must_use]
    pub fn for_context(registry: &Registry, parent: Option<&Self>, context: DiContext) -> Self {
        let container = Self::build(registry, parent, Some(context.clone()));
        lock(&container.inner.state)
            .aliases
            .insert(context.container_key().id().clone());
        container
    }

    fn build(registry: &Registry, parent: Option<&Self>, tag: Option<DiContext>) -> Self {
        let id = NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed);
        registry.freeze(id);

        let mut graph = parent.map(|p| lock(&p.inner.state).graph.clone()).unwrap_or_default();
        let own = registry.graph();
        let mut defined = HashSet::new();
        for node in own.nodes() {
            match own.node(node).flatten() {
                Some(data) => {
                    // Inherited edges describe the parent's factory, not ours
                    graph.clear_out_edges(node);
                    graph.replace_node(node.clone(), Some(Arc::clone(data)));
                    defined.insert(node.clone());
                }
                None => graph.add_node(node.clone(), None),
            }
        }
        for (from, to) in own.edges() {
            // Both endpoints were merged above
            let _ = graph.add_edge(&from, &to);
        }

        let state = ContainerState {
            graph,
            defined,
            aliases: HashSet::from([Key::<Self>::new().id().clone()]),
            ..ContainerState::default()
        };

        debug!(container = id, context = ?tag, "created container");
        Self {
            inner: Arc::new(ContainerInner {
                id,
                registry: registry.clone(),
                parent: parent.cloned(),
                tag,
                closed: AtomicBool::new(false),
                state: Mutex::new(state),
                construction: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The parent container, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.inner.parent.as_ref()
    }

    /// The context this container was created for, if any.
    #[must_use]
    pub fn context(&self) -> Option<&DiContext> {
        self.inner.tag.as_ref()
    }

    /// Whether [`Container::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, ContainerState> {
        lock(&self.inner.state)
    }

    fn ensure_open(&self) -> DiResult<()> {
        if self.is_closed() {
            return Err(DiError::ContainerClosed);
        }
        Ok(())
    }

    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The nearest container in the chain, starting with this one, that defines `id`.
    fn definer_of(&self, id: &DependencyId) -> Option<Self> {
        let mut current = Some(self);
        while let Some(container) = current {
            let state = container.state();
            if state.defined.contains(id) || state.aliases.contains(id) {
                return Some(container.clone());
            }
            drop(state);
            current = container.parent();
        }
        None
    }

    /// Whether this container or any of its parents can provide `id`.
    #[must_use]
    pub fn contains(&self, id: &DependencyId) -> bool {
        self.definer_of(id).is_some()
    }

    /// Adds a dependency value to this container only.
    ///
    /// The value is treated as already created, so `teardown` runs when this container closes.
    ///
    /// # Errors
    /// [`DiError::ContainerClosed`] if the container has been closed.
    pub fn add_value<T: Send + Sync + 'static>(
        &self,
        key: Key<T>,
        value: T,
        teardown: Option<Teardown<T>>,
    ) -> DiResult<()> {
        self.ensure_open()?;

        let id = key.id().clone();
        let value: Value = Arc::new(value);
        let data = DependencyData::new(
            ErasedFactory::value(Arc::clone(&value)),
            Vec::new(),
            teardown.map(Teardown::into_erased),
        );

        let mut state = self.state();
        state.graph.clear_out_edges(&id);
        state.graph.replace_node(id.clone(), Some(Arc::new(data)));
        state.defined.insert(id.clone());
        state.creation_order.retain(|existing| *existing != id);
        state.creation_order.push(id.clone());
        state.instances.insert(id, value);
        Ok(())
    }

    /// Adds a factory to this container only.
    ///
    /// # Errors
    /// [`DiError::ContainerClosed`] if the container has been closed, otherwise the same
    /// validation errors as [`Registry::register_factory`].
    pub fn add_factory<T: Send + Sync + 'static>(
        &self,
        key: Key<T>,
        factory: Factory<T>,
        teardown: Option<Teardown<T>>,
    ) -> DiResult<()> {
        self.ensure_open()?;

        let id = key.id();
        let data = factory.into_data(id, teardown)?;
        let mut state = self.state();
        populate_for_dependency(&mut state.graph, id, data)?;
        state.defined.insert(id.clone());
        Ok(())
    }

    /// Resolves the dependency of type `T`.
    ///
    /// # Errors
    /// See [`Container::get_key`].
    pub async fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.get_key(&Key::<T>::new()).await
    }

    /// Resolves the dependency named by `key`.
    ///
    /// # Errors
    /// [`DiError::ContainerClosed`] if this container (or the one defining the dependency) is
    /// closed, [`DiError::DependencyNotSatisfiable`] if it or a sub-dependency is unknown or
    /// fails to build, and [`DiError::CircularDependency`] if its sub-graph contains a cycle.
    pub async fn get_key<T: Send + Sync + 'static>(&self, key: &Key<T>) -> DiResult<Arc<T>> {
        let value = self.resolve_id(key.id()).await?;
        key.downcast(value)
    }

    /// Resolves an arbitrary dependency expression.
    ///
    /// # Errors
    /// [`DiError::ContainerClosed`] if the container is closed, otherwise see
    /// [`DependencyExpression::resolve`].
    pub async fn resolve(&self, expression: &DependencyExpression) -> DiResult<Option<Value>> {
        self.ensure_open()?;
        expression.resolve(self).await
    }

    pub(crate) fn resolve_id<'a>(&'a self, id: &'a DependencyId) -> BoxFuture<'a, DiResult<Value>> {
        async move {
            self.ensure_open()?;

            let Some(definer) = self.definer_of(id) else {
                return Err(DiError::not_satisfiable(format!(
                    "cannot create dependency {id} - not provided by this or a parent container"
                )));
            };
            if !definer.same_as(self) {
                return definer.resolve_id(id).await;
            }

            self.resolve_defined(id).await
        }
        .boxed()
    }

    /// Resolves an id this container defines, creating it and its sub-dependencies as needed.
    async fn resolve_defined(&self, id: &DependencyId) -> DiResult<Value> {
        if let Some(found) = self.cached(id) {
            return Ok(found);
        }

        let (order, required) = {
            let state = self.state();
            let members = owned_reach(&state, id);
            let order = state.graph.subgraph(&members).topological_order();
            (order, required_closure(&state, id))
        };
        let order = order.ok_or_else(|| {
            DiError::circular(format!(
                "cannot provide {id} - circular dependency found during creation"
            ))
        })?;

        for dependency in order.iter().filter(|d| required.contains(*d)) {
            self.ensure_dependency(dependency).await.map_err(|e| match e {
                DiError::DependencyNotSatisfiable { .. } if dependency != id => {
                    DiError::not_satisfiable_from(
                        format!("could not create dependency {id} - failed creating sub-dependency {dependency}"),
                        e,
                    )
                }
                other => other,
            })?;
        }

        self.cached(id).ok_or_else(|| {
            DiError::not_satisfiable(format!("could not create dependency {id}"))
        })
    }

    fn cached(&self, id: &DependencyId) -> Option<Value> {
        let state = self.state();
        if state.aliases.contains(id) {
            return Some(Arc::new(self.clone()));
        }
        state.instances.get(id).cloned()
    }

    /// Makes sure `id` has an instance somewhere in the chain.
    async fn ensure_dependency(&self, id: &DependencyId) -> DiResult<()> {
        match self.definer_of(id) {
            None => Err(DiError::not_satisfiable(format!(
                "could not create dependency {id} - do not know how to instantiate"
            ))),
            Some(definer) if !definer.same_as(self) => definer.resolve_id(id).await.map(drop),
            Some(_) => self.construct(id).await,
        }
    }

    /// Runs the factory for `id` unless an instance already exists.
    async fn construct(&self, id: &DependencyId) -> DiResult<()> {
        let gate = Arc::clone(
            lock(&self.inner.construction)
                .entry(id.clone())
                .or_default(),
        );
        let _guard = gate.lock().await;
        if self.cached(id).is_some() {
            return Ok(());
        }

        let data = self.state().graph.node(id).flatten().cloned();
        let Some(data) = data else {
            return Err(DiError::not_satisfiable(format!(
                "could not create dependency {id} - do not know how to instantiate"
            )));
        };

        let mut args = Arguments::new();
        for (name, expression) in data.params() {
            match expression.resolve(self).await {
                Ok(Some(value)) => args.insert(name.clone(), value),
                Ok(None) => {}
                Err(e @ DiError::DependencyNotSatisfiable { .. }) => {
                    return Err(DiError::not_satisfiable_from(
                        format!("could not create dependency {id} - failed creating sub-dependency"),
                        e,
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        let value = data.factory.call(args).await.map_err(|e| {
            DiError::not_satisfiable_from(
                format!("could not create dependency {id} - factory raised an error"),
                e,
            )
        })?;

        let mut state = self.state();
        state.instances.insert(id.clone(), value);
        state.creation_order.push(id.clone());
        debug!(dependency = %id, container = self.inner.id, "created dependency");
        Ok(())
    }

    /// Closes the container, running teardowns for every instance it created.
    ///
    /// Teardowns run in reverse creation order. Every teardown is attempted even if an
    /// earlier one fails. Closing twice is a no-op.
    ///
    /// # Errors
    /// [`DiError::Teardown`] for the first teardown that failed.
    #[instrument(skip(self), fields(container = self.inner.id, context = ?self.inner.tag))]
    pub async fn close(&self) -> DiResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let pending: Vec<(DependencyId, Value, Option<ErasedTeardown>)> = {
            let mut state = self.state();
            let order = mem::take(&mut state.creation_order);
            let mut instances = mem::take(&mut state.instances);
            order
                .into_iter()
                .rev()
                .filter_map(|id| {
                    let value = instances.remove(&id)?;
                    let teardown = state
                        .graph
                        .node(&id)
                        .flatten()
                        .and_then(|data| data.teardown.clone());
                    Some((id, value, teardown))
                })
                .collect()
        };

        let mut first_failure = None;
        for (id, value, teardown) in pending {
            let Some(teardown) = teardown else { continue };
            if let Err(source) = teardown.call(value).await {
                error!(dependency = %id, error = %source, "teardown failed");
                if first_failure.is_none() {
                    first_failure = Some(DiError::Teardown {
                        id: id.to_string(),
                        source,
                    });
                }
            }
        }

        self.inner.registry.unfreeze(self.inner.id);
        debug!("closed container");
        first_failure.map_or(Ok(()), Err)
    }

    /// Runs `body` with this container, closing it when `body` completes.
    ///
    /// If the returned future is dropped before completion, closing is handed to the current
    /// tokio runtime.
    ///
    /// # Errors
    /// [`DiError::Teardown`] if closing fails; the output of `body` is discarded in that case.
    pub async fn scope<F, Fut>(self, body: F) -> DiResult<Fut::Output>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future,
    {
        let guard = CloseOnDrop::new(self.clone());
        let output = body(self.clone()).await;
        guard.disarm();
        self.close().await?;
        Ok(output)
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Container {}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("context", &self.inner.tag)
            .field("closed", &self.is_closed())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Ids reachable from `id`, without looking past dependencies this container does not define.
///
/// A dependency owned further up the chain is built by its owner against the owner's graph,
/// so its own requirements never belong to this container's walk.
fn owned_reach(state: &ContainerState, id: &DependencyId) -> HashSet<DependencyId> {
    let mut reached = HashSet::from([id.clone()]);
    let mut stack = vec![id.clone()];
    while let Some(current) = stack.pop() {
        if !state.defined.contains(&current) {
            continue;
        }
        for (_, next) in state.graph.out_edges(&current) {
            if reached.insert(next.clone()) {
                stack.push(next);
            }
        }
    }
    reached
}

/// Ids reachable from `id` through lone required parameters of dependencies this container
/// defines.
///
/// Dependencies requested through conditional expressions are left out; they are resolved
/// lazily, when the expression is evaluated.
fn required_closure(state: &ContainerState, id: &DependencyId) -> HashSet<DependencyId> {
    let mut required = HashSet::from([id.clone()]);
    let mut stack = vec![id.clone()];
    while let Some(current) = stack.pop() {
        if !state.defined.contains(&current) {
            continue;
        }
        let Some(Some(data)) = state.graph.node(&current) else {
            continue;
        };
        for (_, expression) in data.params() {
            if let Some(next) = expression.required_ids() {
                if required.insert(next.clone()) {
                    stack.push(next.clone());
                }
            }
        }
    }
    required
}

/// Closes a container on drop unless disarmed.
pub(crate) struct CloseOnDrop(Option<Container>);

impl CloseOnDrop {
    pub(crate) const fn new(container: Container) -> Self {
        Self(Some(container))
    }

    pub(crate) fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(container) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = container.close().await {
                        error!(error = %e, "failed to close abandoned container");
                    }
                });
            }
            Err(_) => warn!("container abandoned outside of a tokio runtime - teardowns skipped"),
        }
    }
}
