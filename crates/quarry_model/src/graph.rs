//! The scheduled work graph.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use quarry_codec::PayloadValue;
use quarry_common::ProjectPath;

/// One schedulable unit of build work.
///
/// The payload is an opaque host value (a task action, an artifact
/// transform, a lifecycle hook); the cache engine only routes it through
/// the payload codec selected by its type tag. A node may belong to one
/// project, or to none for build-wide lifecycle work.
#[derive(Debug)]
pub struct WorkNode {
    /// The opaque work payload.
    pub payload: Box<dyn PayloadValue>,
    /// The project that owns this node, if any.
    pub project: Option<ProjectPath>,
}

impl WorkNode {
    /// Creates a work node owned by the given project.
    pub fn new(payload: Box<dyn PayloadValue>, project: Option<ProjectPath>) -> Self {
        Self { payload, project }
    }
}

/// The dependency graph of scheduled work nodes.
///
/// Nodes keep their insertion order, which the codec relies on for
/// deterministic wire layout. An edge from A to B means "A depends on
/// B" (B must run first).
#[derive(Debug, Default)]
pub struct WorkGraph {
    graph: DiGraph<WorkNode, ()>,
}

impl WorkGraph {
    /// Creates an empty work graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its index.
    pub fn add_node(&mut self, node: WorkNode) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// Records that `dependent` depends on `dependency`.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        self.graph.add_edge(dependent, dependency, ());
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the node at the given index.
    pub fn node(&self, index: NodeIndex) -> &WorkNode {
        &self.graph[index]
    }

    /// Iterates nodes in insertion order with their indices.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &WorkNode)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx, &self.graph[idx]))
    }

    /// Iterates dependency edges as (dependent, dependency) index pairs.
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.graph.edge_references().map(|e| (e.source(), e.target()))
    }

    /// Returns the indices of the nodes `index` depends on.
    pub fn dependencies(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(index, petgraph::Direction::Outgoing)
            .collect()
    }
}
