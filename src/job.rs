//! The job contract consumed by the executor.

/// A unit of DSP work executed by the task-graph interpreter.
///
/// Implementations are invoked with the executing worker's index, exactly
/// once per tick, after all of the node's predecessors have run. The
/// executor guarantees that no two invocations of the same node ever
/// overlap (within a tick a node runs once; a new tick begins only after
/// the previous one completed), so payloads may keep per-node DSP state
/// behind interior mutability without locking.
///
/// The executor neither inspects nor alters the payload; it only calls
/// [`run`](Job::run).
///
/// Closures of the form `Fn(usize)` implement `Job` directly:
///
/// ```rust,ignore
/// let mut builder = GraphBuilder::new();
/// let voice = builder.add_job(|worker: usize| render_voice(worker));
/// ```
pub trait Job: Send + Sync + 'static {
    /// Execute the job on the worker with the given index.
    ///
    /// `worker_index` is in `[0, thread_count)`; index 0 is the master.
    fn run(&self, worker_index: usize);
}

impl<F> Job for F
where
    F: Fn(usize) + Send + Sync + 'static,
{
    fn run(&self, worker_index: usize) {
        self(worker_index)
    }
}
