//! Task graph construction and storage.
//!
//! A [`TaskGraph`] owns the job nodes for one tick configuration: a flat
//! arena of [`JobNode`]s plus the set of initially runnable nodes (those
//! with no predecessors). Graphs are assembled through [`GraphBuilder`],
//! which rejects cycles at edge-insertion time, and are immutable once
//! handed to the interpreter.

mod builder;
mod node;

pub use builder::GraphBuilder;
pub use node::JobNode;

use std::fmt;

use crate::job::Job;

/// Identifier for a node in a task graph.
///
/// Node ids are dense indices into the owning graph's node arena and are
/// only meaningful for the builder/graph that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Get the underlying index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The per-tick collection of job nodes.
///
/// Owns all nodes; successor edges are index-based back-references into
/// the arena, never owning (a node may be the successor of many
/// predecessors). A graph is installed into the interpreter at tick
/// boundaries only and never mutated during a tick.
pub struct TaskGraph<J> {
    nodes: Vec<JobNode<J>>,
    initial: Vec<NodeId>,
}

impl<J: Job> TaskGraph<J> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            initial: Vec::new(),
        }
    }

    /// Takes ownership of a node, appending it to the arena.
    pub(crate) fn add_node(&mut self, node: JobNode<J>) -> NodeId {
        debug_assert!(self.nodes.len() < u32::MAX as usize);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Records a node as initially runnable.
    pub(crate) fn add_initial(&mut self, id: NodeId) {
        debug_assert_eq!(self.nodes[id.index()].activation_limit(), 0);
        self.initial.push(id);
    }

    pub(crate) fn node(&self, id: NodeId) -> &JobNode<J> {
        &self.nodes[id.index()]
    }

    pub(crate) fn initial(&self) -> &[NodeId] {
        &self.initial
    }

    /// Number of nodes in the graph.
    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Store every node's activation limit back into its activation counter.
    ///
    /// Called on each graph install; during a tick each node rearms itself
    /// at the end of its own run.
    pub fn reset_activation_counts(&self) {
        for node in &self.nodes {
            node.reset_activation_count();
        }
    }

    /// Access the job payload of a node.
    pub fn job(&self, id: NodeId) -> Option<&J> {
        self.nodes.get(id.index()).map(JobNode::job)
    }
}

impl<J: Job> fmt::Debug for TaskGraph<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("nodes", &self.nodes.len())
            .field("initial", &self.initial.len())
            .finish()
    }
}
