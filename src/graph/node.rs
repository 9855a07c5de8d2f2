//! A single schedulable unit of DSP work.

use std::sync::atomic::{AtomicU16, Ordering};

use smallvec::SmallVec;

use crate::graph::{NodeId, TaskGraph};
use crate::job::Job;
use crate::sched::TickInterpreter;

/// Inline capacity for successor lists; audio graphs fan out narrowly at
/// most nodes.
pub(crate) type SuccessorList = SmallVec<[NodeId; 4]>;

/// A job plus its scheduling state: successor wiring and the per-tick
/// activation counter.
///
/// The counter starts each tick at `activation_limit` (the node's
/// predecessor count) and is decremented once by each finishing
/// predecessor; the decrement that reaches zero makes the node runnable.
/// Outside of ticks the counter always equals the limit.
pub struct JobNode<J> {
    job: J,
    successors: SuccessorList,
    activation_limit: u16,
    activation_count: AtomicU16,
}

impl<J: Job> JobNode<J> {
    pub(crate) fn new(job: J, successors: SuccessorList, activation_limit: u16) -> Self {
        Self {
            job,
            successors,
            activation_limit,
            activation_count: AtomicU16::new(0),
        }
    }

    /// The wrapped job payload.
    pub fn job(&self) -> &J {
        &self.job
    }

    /// Static predecessor count, fixed at graph build time.
    pub fn activation_limit(&self) -> u16 {
        self.activation_limit
    }

    /// Run the job, release successors, and rearm the activation counter.
    ///
    /// Returns the first successor whose counter reached zero during the
    /// walk, for the caller to run next on the same worker; every other
    /// newly runnable successor goes through the interpreter's queue.
    ///
    /// The caller holds the only in-flight reference to this node: it was
    /// obtained from the runnable queue or a hand-off, and the node's
    /// successors have not been released yet.
    pub(crate) fn run(
        &self,
        interpreter: &TickInterpreter<J>,
        graph: &TaskGraph<J>,
        worker_index: usize,
    ) -> Option<NodeId> {
        debug_assert_eq!(self.activation_count.load(Ordering::Relaxed), 0);

        self.job.run(worker_index);

        let next = self.release_successors(interpreter, graph);
        self.reset_activation_count();
        next
    }

    /// Walk the successor list, decrementing each activation counter.
    ///
    /// The first successor that becomes runnable is returned instead of
    /// enqueued; the rest are marked runnable. Successors whose counter
    /// stays above zero are some later predecessor's responsibility.
    fn release_successors(
        &self,
        interpreter: &TickInterpreter<J>,
        graph: &TaskGraph<J>,
    ) -> Option<NodeId> {
        let mut successors = self.successors.iter().copied();

        let mut next = None;
        for succ in successors.by_ref() {
            if graph.node(succ).release_one() {
                next = Some(succ);
                break;
            }
        }

        for succ in successors {
            if graph.node(succ).release_one() {
                interpreter.mark_runnable(succ);
            }
        }

        next
    }

    /// Returns true when this decrement made the node runnable.
    ///
    /// The release half of the fetch-sub publishes the finishing
    /// predecessor's effects; the acquire half pairs with predecessors
    /// that decremented earlier, so the worker that observes zero sees all
    /// of them.
    fn release_one(&self) -> bool {
        let previous = self.activation_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "activation count underflow");
        previous == 1
    }

    /// Rearm the counter to the activation limit with release ordering.
    ///
    /// Called at the end of the node's own run, while it still has
    /// exclusive access (its successors were released, but nothing
    /// decrements *this* counter again until the next tick), and for every
    /// node on graph install.
    pub(crate) fn reset_activation_count(&self) {
        let current = self.activation_count.load(Ordering::Relaxed);
        debug_assert!(
            current == 0 || current == self.activation_limit,
            "activation counter reset during a tick"
        );
        self.activation_count
            .store(self.activation_limit, Ordering::Release);
    }
}
