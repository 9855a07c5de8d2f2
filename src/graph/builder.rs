//! Incremental, validated construction of task graphs.

use daggy::Dag;
use smallvec::SmallVec;

use super::node::SuccessorList;
use crate::error::{Error, Result};
use crate::graph::{JobNode, NodeId, TaskGraph};
use crate::job::Job;

/// Builder for [`TaskGraph`]s.
///
/// Jobs are added first, then dependency edges; [`build`](Self::build)
/// produces the flat graph consumed by the interpreter. Edges are
/// validated on insertion: an edge that would close a cycle is rejected
/// (the executor's completion protocol relies on acyclicity), as is a node
/// whose predecessor count would overflow the 16-bit activation limit.
///
/// The builder keeps a [`daggy`] mirror of the edge set purely for cycle
/// detection; the hot path never touches it.
pub struct GraphBuilder<J> {
    dag: Dag<(), ()>,
    jobs: Vec<J>,
    successors: Vec<SuccessorList>,
    activation_limits: Vec<u16>,
}

impl<J: Job> GraphBuilder<J> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            dag: Dag::new(),
            jobs: Vec::new(),
            successors: Vec::new(),
            activation_limits: Vec::new(),
        }
    }

    /// Number of jobs added so far.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True if no jobs have been added.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Add a job, returning its node id.
    pub fn add_job(&mut self, job: J) -> NodeId {
        debug_assert!(self.jobs.len() < u32::MAX as usize);
        let index = self.dag.add_node(());
        debug_assert_eq!(index.index(), self.jobs.len());
        self.jobs.push(job);
        self.successors.push(SmallVec::new());
        self.activation_limits.push(0);
        NodeId(index.index() as u32)
    }

    /// Add a dependency edge: in every tick, `to` runs only after `from`.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from.index() >= self.jobs.len() {
            return Err(Error::UnknownNode(from));
        }
        if to.index() >= self.jobs.len() {
            return Err(Error::UnknownNode(to));
        }

        let limit = self.activation_limits[to.index()]
            .checked_add(1)
            .ok_or(Error::PredecessorOverflow(to))?;

        self.dag
            .add_edge(
                daggy::NodeIndex::new(from.index()),
                daggy::NodeIndex::new(to.index()),
                (),
            )
            .map_err(|_| Error::WouldCycle { from, to })?;

        self.activation_limits[to.index()] = limit;
        self.successors[from.index()].push(to);
        Ok(())
    }

    /// Build the task graph.
    ///
    /// Nodes with no predecessors form the initially runnable set that
    /// seeds every tick.
    pub fn build(self) -> TaskGraph<J> {
        let edge_total: usize = self.successors.iter().map(|s| s.len()).sum();
        let limit_total: usize = self
            .activation_limits
            .iter()
            .map(|&limit| limit as usize)
            .sum();
        debug_assert_eq!(edge_total, limit_total);

        let mut graph = TaskGraph::new();
        let limits = self.activation_limits;

        for ((job, successors), &limit) in self
            .jobs
            .into_iter()
            .zip(self.successors)
            .zip(limits.iter())
        {
            graph.add_node(JobNode::new(job, successors, limit));
        }

        for (index, &limit) in limits.iter().enumerate() {
            if limit == 0 {
                graph.add_initial(NodeId(index as u32));
            }
        }

        graph
    }
}

impl<J: Job> Default for GraphBuilder<J> {
    fn default() -> Self {
        Self::new()
    }
}
