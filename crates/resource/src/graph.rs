//! The resource dependency graph.
//!
//! Nodes are keyed by fully-qualified [`Name`]; an edge `u -> v` means
//! `u` depends on `v`. The graph is acyclic at every point a caller can
//! observe it: edge insertion refuses cycles up front.
//!
//! Topological order is deterministic (ties within a level break on the
//! rendered name string), so reconfiguration walks, teardown order, and
//! test output are stable run to run.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use chassis_config::{Config, ResourceConfig};
use chassis_core::Name;

use crate::node::{Node, NodeRef, NodeState};

/// Structural graph errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A node with this name is already present.
    #[error("node {name} already exists")]
    NodeExists {
        /// The duplicate name.
        name: Name,
    },

    /// No node with this name.
    #[error("node {name} not in graph")]
    NodeMissing {
        /// The requested name.
        name: Name,
    },

    /// Inserting the edge would create a cycle.
    #[error("edge {parent} -> {child} would create a cycle")]
    WouldCycle {
        /// The depending node.
        parent: Name,
        /// The dependency.
        child: Name,
    },

    /// The node still has live dependents.
    #[error("node {name} still has dependents: {dependents:?}")]
    HasDependents {
        /// The node that cannot be removed.
        name: Name,
        /// Names still depending on it.
        dependents: Vec<String>,
    },
}

/// Directed dependency graph over lifecycle nodes.
///
/// Cloning is a shallow structural snapshot: topology and key maps are
/// copied, node records are shared. A snapshot taken before a
/// reconfiguration therefore observes node state transitions but not
/// topology changes.
#[derive(Clone, Default)]
pub struct Graph {
    topology: StableDiGraph<Name, ()>,
    indices: HashMap<Name, NodeIndex>,
    nodes: HashMap<Name, NodeRef>,
}

impl Graph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a node exists.
    #[must_use]
    pub fn contains(&self, name: &Name) -> bool {
        self.nodes.contains_key(name)
    }

    /// All names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names whose node is currently in the given state, sorted.
    #[must_use]
    pub fn names_in_state(&self, state: NodeState) -> Vec<Name> {
        let mut names: Vec<Name> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.read().state() == state)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Names whose node should be retried by the completion worker.
    #[must_use]
    pub fn names_needing_retry(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.read().needs_retry())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Shared handle to a node.
    #[must_use]
    pub fn node(&self, name: &Name) -> Option<NodeRef> {
        self.nodes.get(name).cloned()
    }

    /// Create a node from a declared config.
    pub fn add_node(&mut self, name: Name, config: ResourceConfig) -> Result<NodeRef, GraphError> {
        let node = Node::new(name.clone(), config).into_ref();
        self.add_node_ref(name, node.clone())?;
        Ok(node)
    }

    /// Insert an existing node record (shared with another graph).
    pub fn add_node_ref(&mut self, name: Name, node: NodeRef) -> Result<(), GraphError> {
        if self.nodes.contains_key(&name) {
            return Err(GraphError::NodeExists { name });
        }
        let index = self.topology.add_node(name.clone());
        self.indices.insert(name.clone(), index);
        self.nodes.insert(name, node);
        Ok(())
    }

    /// Swap in a new declared config for an existing node.
    pub fn replace_declared(
        &self,
        name: &Name,
        config: ResourceConfig,
    ) -> Result<(), GraphError> {
        let node = self.nodes.get(name).ok_or_else(|| GraphError::NodeMissing {
            name: name.clone(),
        })?;
        node.write().set_declared(config);
        Ok(())
    }

    fn index_of(&self, name: &Name) -> Result<NodeIndex, GraphError> {
        self.indices
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::NodeMissing { name: name.clone() })
    }

    /// Record that `parent` depends on `child`. Refuses cycles.
    pub fn add_child(&mut self, parent: &Name, child: &Name) -> Result<(), GraphError> {
        let parent_idx = self.index_of(parent)?;
        let child_idx = self.index_of(child)?;
        if self.topology.find_edge(parent_idx, child_idx).is_some() {
            return Ok(());
        }
        // A cycle appears iff the child can already reach the parent.
        if parent_idx == child_idx || has_path_connecting(&self.topology, child_idx, parent_idx, None)
        {
            return Err(GraphError::WouldCycle {
                parent: parent.clone(),
                child: child.clone(),
            });
        }
        self.topology.add_edge(parent_idx, child_idx, ());
        Ok(())
    }

    /// Drop all of `parent`'s dependency edges (re-resolution pass).
    pub fn remove_children(&mut self, parent: &Name) {
        if let Some(&idx) = self.indices.get(parent) {
            let edges: Vec<_> = self
                .topology
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| petgraph::visit::EdgeRef::id(&e))
                .collect();
            for edge in edges {
                self.topology.remove_edge(edge);
            }
        }
    }

    /// The names `parent` depends on, sorted.
    #[must_use]
    pub fn children(&self, parent: &Name) -> Vec<Name> {
        self.neighbors(parent, Direction::Outgoing)
    }

    /// The names depending on `child`, sorted.
    #[must_use]
    pub fn parents(&self, child: &Name) -> Vec<Name> {
        self.neighbors(child, Direction::Incoming)
    }

    fn neighbors(&self, name: &Name, direction: Direction) -> Vec<Name> {
        let Some(&idx) = self.indices.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<Name> = self
            .topology
            .neighbors_directed(idx, direction)
            .map(|n| self.topology[n].clone())
            .collect();
        out.sort();
        out
    }

    /// Remove a node that nothing depends on anymore.
    pub fn remove_node(&mut self, name: &Name) -> Result<NodeRef, GraphError> {
        let idx = self.index_of(name)?;
        let dependents: Vec<String> = self
            .topology
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.topology[n].to_string())
            .collect();
        if !dependents.is_empty() {
            return Err(GraphError::HasDependents {
                name: name.clone(),
                dependents,
            });
        }
        self.detach(name, idx)
    }

    /// Remove a node regardless of dependents (merge subtraction,
    /// forced teardown). Dangling edges are dropped with it.
    pub fn force_remove(&mut self, name: &Name) -> Option<NodeRef> {
        let idx = *self.indices.get(name)?;
        self.detach(name, idx).ok()
    }

    fn detach(&mut self, name: &Name, idx: NodeIndex) -> Result<NodeRef, GraphError> {
        self.topology.remove_node(idx);
        self.indices.remove(name);
        self.nodes
            .remove(name)
            .ok_or_else(|| GraphError::NodeMissing { name: name.clone() })
    }

    /// Deterministic topological order, dependencies first.
    ///
    /// Kahn's algorithm with a name-ordered frontier: nodes on the same
    /// level come out alphabetically.
    #[must_use]
    pub fn topological_sort(&self) -> Vec<Name> {
        let mut remaining_deps: HashMap<Name, usize> = HashMap::new();
        for (name, &idx) in &self.indices {
            let deps = self
                .topology
                .neighbors_directed(idx, Direction::Outgoing)
                .count();
            remaining_deps.insert(name.clone(), deps);
        }

        let mut frontier: BTreeSet<Name> = remaining_deps
            .iter()
            .filter(|&(_, &deps)| deps == 0)
            .map(|(name, _)| name.clone())
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(name) = frontier.pop_first() {
            order.push(name.clone());
            let idx = self.indices[&name];
            for parent in self.topology.neighbors_directed(idx, Direction::Incoming) {
                let parent_name = self.topology[parent].clone();
                let deps = remaining_deps
                    .get_mut(&parent_name)
                    .expect("parent tracked");
                *deps -= 1;
                if *deps == 0 {
                    frontier.insert(parent_name);
                }
            }
        }

        debug_assert_eq!(order.len(), self.nodes.len(), "graph must stay acyclic");
        order
    }

    /// Deterministic reverse-topological order, dependents first. This
    /// is teardown order.
    #[must_use]
    pub fn reverse_topological_sort(&self) -> Vec<Name> {
        let mut order = self.topological_sort();
        order.reverse();
        order
    }

    /// The closure of nodes depending on `name`, transitively, plus
    /// `name` itself, in teardown (dependents-first) order.
    #[must_use]
    pub fn reverse_reachable(&self, name: &Name) -> Vec<Name> {
        let Some(&start) = self.indices.get(name) else {
            return Vec::new();
        };
        let mut seen: HashSet<Name> = HashSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            let node_name = self.topology[idx].clone();
            if !seen.insert(node_name) {
                continue;
            }
            stack.extend(self.topology.neighbors_directed(idx, Direction::Incoming));
        }
        self.reverse_topological_sort()
            .into_iter()
            .filter(|n| seen.contains(n))
            .collect()
    }

    /// Absorb another graph: its nodes (shared records) and edges are
    /// added to this one. Same-name nodes are replaced.
    pub fn merge_add(&mut self, other: Self) -> Result<(), GraphError> {
        for (name, node) in &other.nodes {
            if self.contains(name) {
                self.force_remove(name);
            }
            self.add_node_ref(name.clone(), node.clone())?;
        }
        for edge in other.topology.edge_indices() {
            let (a, b) = other
                .topology
                .edge_endpoints(edge)
                .expect("edge endpoints exist");
            let parent = other.topology[a].clone();
            let child = other.topology[b].clone();
            self.add_child(&parent, &child)?;
        }
        Ok(())
    }

    /// Subtract another graph's nodes from this one, dependents first.
    pub fn merge_remove(&mut self, other: &Self) {
        for name in other.reverse_topological_sort() {
            self.force_remove(&name);
        }
    }

    /// The sub-graph containing exactly the resources a config declares,
    /// with edges among them. Node records are shared.
    #[must_use]
    pub fn subgraph_from_config(&self, config: &Config) -> Self {
        let mut wanted: HashSet<Name> = HashSet::new();
        for resource in config.resources() {
            if let Ok(name) = resource.resource_name() {
                wanted.insert(name);
            }
        }

        let mut sub = Self::new();
        for name in self.names() {
            if wanted.contains(&name) {
                if let Some(node) = self.node(&name) {
                    // Fresh graph, insertion cannot collide.
                    let _ = sub.add_node_ref(name, node);
                }
            }
        }
        for name in sub.names() {
            for child in self.children(&name) {
                if sub.contains(&child) {
                    let _ = sub.add_child(&name, &child);
                }
            }
        }
        sub
    }

    /// Candidate nodes for a dependency string as written in a config.
    ///
    /// A remote-qualified entry (`foo:pieceArm`) matches on the full
    /// short name. A bare entry matches local nodes first; only when no
    /// local node has that name does it fall through to remote imports,
    /// where more than one candidate means the dependency is ambiguous.
    #[must_use]
    pub fn resolve_dependency(&self, dep: &str) -> Vec<Name> {
        if dep.contains(':') {
            let mut matches: Vec<Name> = self
                .nodes
                .keys()
                .filter(|name| name.short_name() == dep)
                .cloned()
                .collect();
            matches.sort();
            return matches;
        }

        let mut local: Vec<Name> = self
            .nodes
            .keys()
            .filter(|name| !name.is_remote() && name.name == dep)
            .cloned()
            .collect();
        if !local.is_empty() {
            local.sort();
            return local;
        }

        let mut remote: Vec<Name> = self
            .nodes
            .keys()
            .filter(|name| name.is_remote() && name.name == dep)
            .cloned()
            .collect();
        remote.sort();
        remote
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.names())
            .field("edges", &self.topology.edge_count())
            .finish()
    }
}
