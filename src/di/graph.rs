//! Directed dependency graph.
//!
//! Nodes are keyed by [`DependencyId`] and optionally carry the data needed to create and
//! destroy the dependency. A node without data is a placeholder: it was referenced by some
//! factory but has not been registered in this graph. An edge `(a, b)` means the factory
//! for `a` requires `b`.

use super::{
    DiError, DiResult,
    conditions::DependencyExpression,
    factory::{ErasedFactory, ErasedTeardown},
    key::DependencyId,
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    sync::Arc,
};

/// Everything required to create (and optionally destroy) a single dependency.
pub struct DependencyData {
    pub(crate) factory: ErasedFactory,
    pub(crate) params: Vec<(String, DependencyExpression)>,
    pub(crate) teardown: Option<ErasedTeardown>,
}

impl DependencyData {
    pub(crate) fn new(
        factory: ErasedFactory,
        params: Vec<(String, DependencyExpression)>,
        teardown: Option<ErasedTeardown>,
    ) -> Self {
        Self {
            factory,
            params,
            teardown,
        }
    }

    /// Parameter name to dependency expression, in declaration order.
    #[must_use]
    pub fn params(&self) -> &[(String, DependencyExpression)] {
        &self.params
    }

    /// Whether a teardown callable was registered alongside the factory.
    #[must_use]
    pub const fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }
}

impl fmt::Debug for DependencyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyData")
            .field("factory", &self.factory)
            .field("params", &self.params)
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Directed graph used to track dependencies and the relationships between them.
#[derive(Clone, Default, Debug)]
pub struct DiGraph {
    nodes: HashMap<DependencyId, Option<Arc<DependencyData>>>,
    adjacency: HashMap<DependencyId, HashSet<DependencyId>>,
}

impl DiGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a node (placeholder or not) exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &DependencyId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The data for `id`. Outer `None` if the node is absent, inner `None` for placeholders.
    #[must_use]
    pub fn node(&self, id: &DependencyId) -> Option<Option<&Arc<DependencyData>>> {
        self.nodes.get(id).map(Option::as_ref)
    }

    /// All node ids in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyId> {
        self.nodes.keys()
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every edge as `(dependent, dependency)`.
    #[must_use]
    pub fn edges(&self) -> HashSet<(DependencyId, DependencyId)> {
        self.adjacency
            .iter()
            .flat_map(|(from, to)| to.iter().map(move |t| (from.clone(), t.clone())))
            .collect()
    }

    /// The direct dependencies of `id`, as edges.
    #[must_use]
    pub fn out_edges(&self, id: &DependencyId) -> HashSet<(DependencyId, DependencyId)> {
        self.adjacency
            .get(id)
            .map(|to| to.iter().map(|t| (id.clone(), t.clone())).collect())
            .unwrap_or_default()
    }

    /// Adds a node. Does nothing if a node for `id` already exists.
    pub fn add_node(&mut self, id: DependencyId, data: Option<Arc<DependencyData>>) {
        self.nodes.entry(id).or_insert(data);
    }

    /// Sets the data for `id`, adding the node if needed. Existing edges are preserved.
    pub fn replace_node(&mut self, id: DependencyId, data: Option<Arc<DependencyData>>) {
        self.nodes.insert(id, data);
    }

    /// Removes a node and every edge touching it. Does nothing if the node is absent.
    pub fn remove_node(&mut self, id: &DependencyId) {
        self.nodes.remove(id);
        self.adjacency.remove(id);
        for to in self.adjacency.values_mut() {
            to.remove(id);
        }
    }

    /// Adds the edge `from -> to`.
    ///
    /// # Errors
    /// Returns [`DiError::UnknownNode`] if either endpoint is not in the graph.
    pub fn add_edge(&mut self, from: &DependencyId, to: &DependencyId) -> DiResult<()> {
        for id in [from, to] {
            if !self.nodes.contains_key(id) {
                return Err(DiError::UnknownNode { id: id.to_string() });
            }
        }

        self.adjacency
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        Ok(())
    }

    /// Removes the edge `from -> to` if present.
    pub fn remove_edge(&mut self, from: &DependencyId, to: &DependencyId) {
        if let Some(edges) = self.adjacency.get_mut(from) {
            edges.remove(to);
        }
    }

    /// Removes every outbound edge of `id`.
    pub fn clear_out_edges(&mut self, id: &DependencyId) {
        self.adjacency.remove(id);
    }

    /// Every node reachable from `of` by following edges, directly or indirectly.
    ///
    /// `of` itself is only included when a cycle leads back to it.
    #[must_use]
    pub fn children(&self, of: &DependencyId) -> HashSet<DependencyId> {
        let mut children = HashSet::new();

        let mut to_process: Vec<&DependencyId> = self
            .adjacency
            .get(of)
            .map(|to| to.iter().collect())
            .unwrap_or_default();
        let mut index = 0;
        while index < to_process.len() {
            let current = to_process[index];
            if children.insert(current.clone()) {
                if let Some(next) = self.adjacency.get(current) {
                    to_process.extend(next.iter());
                }
            }
            index += 1;
        }

        children
    }

    /// A new graph containing only the given nodes and the edges between them.
    #[must_use]
    pub fn subgraph<'a>(&self, of: impl IntoIterator<Item = &'a DependencyId>) -> Self {
        let keep: HashSet<&DependencyId> = of
            .into_iter()
            .filter(|id| self.nodes.contains_key(*id))
            .collect();

        let mut subgraph = Self::new();
        for id in &keep {
            subgraph.add_node((*id).clone(), self.nodes[*id].clone());
            if let Some(to) = self.adjacency.get(*id) {
                let edges: HashSet<DependencyId> =
                    to.iter().filter(|t| keep.contains(t)).cloned().collect();
                if !edges.is_empty() {
                    subgraph.adjacency.insert((*id).clone(), edges);
                }
            }
        }

        subgraph
    }

    /// Orders every node so that dependencies come before the nodes that require them.
    ///
    /// Returns `None` if the graph contains a cycle.
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<DependencyId>> {
        // Kahn's algorithm over dependent -> dependency edges, reversed at the end
        let mut in_degree: HashMap<&DependencyId, usize> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        for to in self.adjacency.values() {
            for id in to {
                *in_degree.entry(id).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&DependencyId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id.clone());
            if let Some(to) = self.adjacency.get(id) {
                for next in to {
                    if let Some(degree) = in_degree.get_mut(next) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return None;
        }

        sorted.reverse();
        Some(sorted)
    }
}

/// Installs `data` as the node for `id`, replacing any previous definition, and adds the
/// edges to every dependency its parameters may request.
///
/// # Errors
/// Returns [`DiError::CircularDependency`] if the factory requests `id` itself. The graph
/// is left untouched in that case.
pub fn populate_for_dependency(
    graph: &mut DiGraph,
    id: &DependencyId,
    data: DependencyData,
) -> DiResult<()> {
    if data
        .params
        .iter()
        .flat_map(|(_, expr)| expr.candidates())
        .any(|candidate| candidate == id)
    {
        return Err(DiError::circular(format!(
            "factory for {id} requires itself as a dependency"
        )));
    }

    graph.clear_out_edges(id);
    let candidates: Vec<DependencyId> = data
        .params
        .iter()
        .flat_map(|(_, expr)| expr.candidates().cloned())
        .collect();
    graph.replace_node(id.clone(), Some(Arc::new(data)));

    for candidate in &candidates {
        graph.add_node(candidate.clone(), None);
        graph.add_edge(id, candidate)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::di::factory::ErasedFactory;

    fn id(tag: &'static str) -> DependencyId {
        DependencyId::tagged::<()>(tag)
    }

    fn graph_with(nodes: &[&'static str], edges: &[(&'static str, &'static str)]) -> DiGraph {
        let mut graph = DiGraph::new();
        for node in nodes {
            graph.add_node(id(node), None);
        }
        for (from, to) in edges {
            graph.add_edge(&id(from), &id(to)).unwrap();
        }
        graph
    }

    fn data_requiring(deps: &[&'static str]) -> DependencyData {
        let params = deps
            .iter()
            .map(|d| ((*d).to_string(), DependencyExpression::from_id(id(d))))
            .collect();
        DependencyData::new(ErasedFactory::value(Arc::new(())), params, None)
    }

    #[test]
    fn test_add_node_is_first_write_wins() {
        let mut graph = DiGraph::new();
        graph.add_node(id("a"), Some(Arc::new(data_requiring(&[]))));
        graph.add_node(id("a"), None);

        assert!(matches!(graph.node(&id("a")), Some(Some(_))));
        graph.replace_node(id("a"), None);
        assert!(matches!(graph.node(&id("a")), Some(None)));
    }

    #[test]
    fn test_add_edge_requires_both_nodes() {
        let mut graph = graph_with(&["a"], &[]);

        assert!(matches!(
            graph.add_edge(&id("a"), &id("b")),
            Err(DiError::UnknownNode { .. })
        ));
        assert!(matches!(
            graph.add_edge(&id("b"), &id("a")),
            Err(DiError::UnknownNode { .. })
        ));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_remove_node_removes_touching_edges() {
        let mut graph = graph_with(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        graph.remove_node(&id("b"));

        assert!(!graph.contains(&id("b")));
        assert!(graph.edges().is_empty());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_children_includes_indirect_dependencies() {
        let graph = graph_with(
            &["a", "b", "c", "d", "e"],
            &[("a", "b"), ("b", "c"), ("b", "d"), ("e", "a")],
        );

        let children = graph.children(&id("a"));
        assert_eq!(children, HashSet::from([id("b"), id("c"), id("d")]));
        assert!(graph.children(&id("c")).is_empty());
    }

    #[test]
    fn test_children_contains_self_when_cyclic() {
        let graph = graph_with(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);

        let children = graph.children(&id("a"));
        assert!(children.contains(&id("a")));
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn test_subgraph_keeps_only_internal_edges() {
        let graph = graph_with(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("a", "c")]);

        let sub = graph.subgraph([&id("a"), &id("b"), &id("missing")]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.edges(), HashSet::from([(id("a"), id("b"))]));
    }

    #[test]
    fn test_copy_does_not_alias() {
        let original = graph_with(&["a"], &[]);
        let mut copy = original.clone();
        copy.add_node(id("b"), None);

        assert!(!original.contains(&id("b")));
    }

    #[test]
    fn test_topological_order_puts_dependencies_first() {
        let graph = graph_with(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );

        let order = graph.topological_order().unwrap();
        let pos = |tag| order.iter().position(|i| *i == id(tag)).unwrap();
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[test]
    fn test_topological_order_detects_cycle() {
        let graph = graph_with(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert!(graph.topological_order().is_none());
    }

    #[test]
    fn test_populate_adds_placeholders_and_edges() {
        let mut graph = DiGraph::new();
        populate_for_dependency(&mut graph, &id("a"), data_requiring(&["b", "c"])).unwrap();

        assert!(matches!(graph.node(&id("b")), Some(None)));
        assert_eq!(
            graph.out_edges(&id("a")),
            HashSet::from([(id("a"), id("b")), (id("a"), id("c"))])
        );

        // Re-populating drops edges the new factory no longer needs
        populate_for_dependency(&mut graph, &id("a"), data_requiring(&["c"])).unwrap();
        assert_eq!(graph.out_edges(&id("a")), HashSet::from([(id("a"), id("c"))]));
    }

    #[test]
    fn test_populate_rejects_self_dependency() {
        let mut graph = DiGraph::new();
        let result = populate_for_dependency(&mut graph, &id("a"), data_requiring(&["a"]));

        assert!(matches!(result, Err(DiError::CircularDependency { .. })));
        assert!(graph.is_empty());
    }
}
