//! The tick interpreter: per-tick execution of an installed task graph.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::graph::{NodeId, TaskGraph};
use crate::job::Job;
use crate::sched::queue::RunnableQueue;

/// Upper bound on the configured worker count (master included).
pub const MAX_THREAD_COUNT: usize = 256;

/// Queue capacity before any graph has been installed; covers typical
/// audio graphs without a regrow.
const INITIAL_QUEUE_CAPACITY: usize = 1024;

/// Outcome of draining one chain from the queue.
#[derive(Debug, PartialEq, Eq)]
enum Drain {
    /// This worker's subtraction drove the remaining count to zero.
    Complete,
    /// Queue empty; any remaining nodes are in other workers' hands.
    Empty,
    /// Nodes remain; go around again.
    Remaining,
}

/// Cumulative runnable-queue traffic counters.
///
/// Enqueues are `mark_runnable` calls (tick seeding included); dequeues
/// count successful pops only. Direct hand-offs bypass the queue entirely,
/// so a linear chain moves through it exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Total ids enqueued since the interpreter was created.
    pub enqueued: u64,
    /// Total ids dequeued since the interpreter was created.
    pub dequeued: u64,
}

// ============================================================================
// Tick Interpreter
// ============================================================================

/// Executes an installed [`TaskGraph`] once per tick across the master
/// thread and a set of helper threads.
///
/// The interpreter does not create threads. The master drives the tick
/// lifecycle (`begin_tick`, `run_master`); externally managed helpers call
/// [`run_worker`](Self::run_worker) with their own index after being woken
/// and park again when it returns. [`crate::sched::WorkerPool`] packages
/// that protocol.
///
/// # External serialization
///
/// [`install_graph`](Self::install_graph) and
/// [`release_graph`](Self::release_graph) must only be called while no
/// tick is in progress and no worker is still inside
/// [`run_worker`](Self::run_worker). The interpreter deliberately takes no
/// lock for this (the real-time tick path must stay free of blocking
/// synchronization), so the guarantee is the caller's. Violations are
/// undefined behavior; the worker pool discharges the contract by
/// quiescing its helpers before swapping graphs.
pub struct TickInterpreter<J> {
    /// Current graph; written only by install/release under the external
    /// serialization contract.
    graph: UnsafeCell<Option<TaskGraph<J>>>,
    /// Runnable queue; replaced (regrown) only at install time.
    queue: UnsafeCell<RunnableQueue>,
    /// Nodes still to run in the current tick; zero between ticks.
    node_count: AtomicU32,
    /// Configured worker count (master included).
    thread_count: AtomicUsize,
    /// Helpers actually useful for the installed graph.
    used_helpers: AtomicUsize,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

// SAFETY: the `UnsafeCell`s are written only by `install_graph` /
// `release_graph`, which callers serialize against ticks and against each
// other; every access during a tick is read-only or goes through atomics
// and the lock-free queue.
unsafe impl<J: Send> Send for TickInterpreter<J> {}
unsafe impl<J: Send + Sync> Sync for TickInterpreter<J> {}

impl<J: Job> TickInterpreter<J> {
    /// Create an interpreter with the given worker count (clamped to
    /// `[1, MAX_THREAD_COUNT]`). No graph is installed.
    pub fn new(thread_count: usize) -> Self {
        let interpreter = Self {
            graph: UnsafeCell::new(None),
            queue: UnsafeCell::new(RunnableQueue::with_capacity(INITIAL_QUEUE_CAPACITY)),
            node_count: AtomicU32::new(0),
            thread_count: AtomicUsize::new(1),
            used_helpers: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
        };
        interpreter.set_thread_count(thread_count);
        interpreter
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Set the worker count, clamped to `[1, MAX_THREAD_COUNT]`.
    ///
    /// Takes effect when the next graph is installed; the helper clamp for
    /// the current graph is unchanged.
    pub fn set_thread_count(&self, count: usize) {
        let count = count.clamp(1, MAX_THREAD_COUNT);
        self.thread_count.store(count, Ordering::Relaxed);
        tracing::debug!(thread_count = count, "thread count configured");
    }

    /// Configured worker count, master included.
    pub fn thread_count(&self) -> usize {
        self.thread_count.load(Ordering::Relaxed)
    }

    /// Helpers worth waking for the installed graph:
    /// `min(thread_count, total_nodes) - 1`.
    ///
    /// Purely an optimization: a surplus helper that wakes anyway finds
    /// an empty queue and exits.
    pub fn used_helpers(&self) -> usize {
        self.used_helpers.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Graph lifecycle (tick boundaries only)
    // ------------------------------------------------------------------

    /// Install a graph, returning the previous one.
    ///
    /// Rearms every activation counter, sizes the runnable queue to the
    /// graph, and recomputes the helper clamp. Must not race a tick; see
    /// the type-level contract.
    pub fn install_graph(&self, new_graph: TaskGraph<J>) -> Option<TaskGraph<J>> {
        debug_assert_eq!(
            self.node_count.load(Ordering::Relaxed),
            0,
            "graph installed mid-tick"
        );

        new_graph.reset_activation_counts();
        let total = new_graph.total_nodes();

        // SAFETY: no tick in progress (caller contract), so no worker is
        // touching the queue.
        let queue = unsafe { &mut *self.queue.get() };
        if queue.capacity() < total {
            *queue = RunnableQueue::with_capacity(total);
        }

        let used = self.thread_count().min(total).saturating_sub(1);
        self.used_helpers.store(used, Ordering::Relaxed);
        tracing::debug!(
            total_nodes = total,
            used_helpers = used,
            "task graph installed"
        );

        // SAFETY: as above; nothing reads the graph cell concurrently.
        unsafe { (*self.graph.get()).replace(new_graph) }
    }

    /// Remove and return the current graph, if any.
    ///
    /// Must not race a tick; see the type-level contract.
    pub fn release_graph(&self) -> Option<TaskGraph<J>> {
        debug_assert_eq!(
            self.node_count.load(Ordering::Relaxed),
            0,
            "graph released mid-tick"
        );
        self.used_helpers.store(0, Ordering::Relaxed);
        tracing::debug!("task graph released");
        // SAFETY: no tick in progress (caller contract).
        unsafe { (*self.graph.get()).take() }
    }

    /// True when a graph is installed.
    pub fn has_graph(&self) -> bool {
        self.graph_ref().is_some()
    }

    /// Node count of the installed graph, or zero.
    pub fn total_nodes(&self) -> usize {
        self.graph_ref().map_or(0, TaskGraph::total_nodes)
    }

    // ------------------------------------------------------------------
    // Tick lifecycle
    // ------------------------------------------------------------------

    /// Arm a tick: publish the remaining-node count and seed the queue
    /// with the initially runnable nodes.
    ///
    /// Returns false, touching nothing, when no graph is installed or the
    /// graph is empty; the caller skips the tick. After a true return,
    /// helpers may start draining.
    pub fn begin_tick(&self) -> bool {
        let Some(graph) = self.graph_ref() else {
            return false;
        };
        let total = graph.total_nodes();
        if total == 0 {
            return false;
        }

        debug_assert_eq!(
            self.node_count.load(Ordering::Relaxed),
            0,
            "tick begun before the previous one completed"
        );
        debug_assert!(self.queue().is_empty(), "runnable queue dirty at tick start");

        self.node_count.store(total as u32, Ordering::Release);

        for &id in graph.initial() {
            self.mark_runnable(id);
        }
        true
    }

    /// Drain runnable nodes as worker `worker_index` until the tick is
    /// complete or the queue runs dry.
    ///
    /// A worker that finds the queue empty while nodes remain exits rather
    /// than spinning: the missing nodes are inside other workers' chains
    /// and will be discovered by them. The master's terminal wait in
    /// [`run_master`](Self::run_master) covers the gap.
    pub fn run_worker(&self, worker_index: usize) {
        debug_assert!(worker_index < self.thread_count(), "worker index out of range");
        let Some(graph) = self.graph_ref() else {
            return;
        };

        loop {
            if self.node_count.load(Ordering::Acquire) == 0 {
                return;
            }
            match self.run_chain(graph, worker_index) {
                Drain::Remaining => continue,
                Drain::Complete | Drain::Empty => return,
            }
        }
    }

    /// Run the master's share of the tick, then busy-wait until every node
    /// has run.
    ///
    /// The spin is bounded by the longest chain still in flight on the
    /// helpers; for an audio tick that tail is sub-microsecond, so a
    /// blocking wait would cost more than it saves.
    pub fn run_master(&self) {
        self.run_worker(0);
        while self.node_count.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
        debug_assert!(self.queue().is_empty(), "queue not drained at tick end");
    }

    /// Enqueue a node that became runnable.
    ///
    /// Called from any worker as jobs finish, and by
    /// [`begin_tick`](Self::begin_tick) for the seed set.
    pub fn mark_runnable(&self, node: NodeId) {
        let pushed = self.queue().enqueue(node);
        // The queue is sized to the graph at install time, so a full queue
        // means the graph lied about its node count.
        debug_assert!(pushed, "runnable queue overflow");
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Nodes still to run in the current tick; zero between ticks.
    pub fn remaining_nodes(&self) -> usize {
        self.node_count.load(Ordering::Acquire) as usize
    }

    /// Snapshot of the queue traffic counters.
    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Pop one node and run the chain it starts: each finished node may
    /// hand its first newly runnable successor straight back, keeping the
    /// chain on this worker without a queue round-trip.
    ///
    /// The chain's length is subtracted from the remaining-node count once
    /// at the end, with release ordering, so counter contention scales
    /// with chains rather than nodes.
    fn run_chain(&self, graph: &TaskGraph<J>, worker_index: usize) -> Drain {
        let Some(first) = self.queue().try_dequeue() else {
            return Drain::Empty;
        };
        self.dequeued.fetch_add(1, Ordering::Relaxed);

        let mut consumed: u32 = 0;
        let mut current = Some(first);
        while let Some(id) = current {
            current = graph.node(id).run(self, graph, worker_index);
            consumed += 1;
        }

        let remaining = self.node_count.fetch_sub(consumed, Ordering::Release);
        debug_assert!(remaining >= consumed, "remaining-node count underflow");

        if remaining == consumed {
            Drain::Complete
        } else {
            Drain::Remaining
        }
    }

    fn graph_ref(&self) -> Option<&TaskGraph<J>> {
        // SAFETY: the cell is written only at tick boundaries under the
        // external serialization contract; during a tick all access is
        // shared and read-only.
        unsafe { (*self.graph.get()).as_ref() }
    }

    fn queue(&self) -> &RunnableQueue {
        // SAFETY: the cell is replaced only by `install_graph` under the
        // external serialization contract.
        unsafe { &*self.queue.get() }
    }
}

// ============================================================================
// Tests
// ============================================================================
