//! Helper-thread pool driving a [`TickInterpreter`].
//!
//! The interpreter core never creates threads; this module is the
//! collaborator that does. One pool owns `threads - 1` helper threads,
//! parked on a [`WakeSignal`] between ticks. The master thread calls
//! [`WorkerPool::tick`] once per audio period: it arms the tick, releases
//! the helpers the installed graph can use, and runs the master drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::graph::TaskGraph;
use crate::job::Job;
use crate::sched::interpreter::TickInterpreter;
use crate::sched::wake::{TickSemaphore, WakeSignal};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Total worker count, master included. Clamped to the interpreter's
    /// `[1, MAX_THREAD_COUNT]` range; `threads - 1` helper threads are
    /// spawned.
    pub threads: usize,

    /// `SCHED_FIFO` priority for helper threads (Linux; range 1-99).
    ///
    /// Requires `CAP_SYS_NICE` or root. `None` keeps default scheduling.
    pub rt_priority: Option<i32>,

    /// Prefix for helper thread names; the worker index is appended.
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            rt_priority: None,
            thread_name: String::from("cadence-worker"),
        }
    }
}

impl WorkerConfig {
    /// Set the total worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the helper RT priority.
    pub fn with_rt_priority(mut self, priority: i32) -> Self {
        self.rt_priority = Some(priority);
        self
    }

    /// Set the helper thread-name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

/// Owns the helper threads for one interpreter.
///
/// Helpers park on the wake signal between ticks; surplus helpers (beyond
/// the installed graph's clamp) are simply not woken, and one that wakes
/// anyway finds nothing to do and parks again.
///
/// Graph swaps must not race a tick. [`install_graph`](Self::install_graph)
/// and [`release_graph`](Self::release_graph) uphold that by spinning, off
/// the tick path, until every woken helper has finished its drain and
/// parked.
///
/// Dropping the pool stops and joins all helpers.
pub struct WorkerPool<J: Job> {
    interpreter: Arc<TickInterpreter<J>>,
    wake: Arc<dyn WakeSignal>,
    stop: Arc<AtomicBool>,
    /// Helpers woken for the current tick that have not parked yet.
    active: Arc<AtomicUsize>,
    helpers: Vec<JoinHandle<()>>,
}

impl<J: Job> WorkerPool<J> {
    /// Spawn a pool with the default wake primitive.
    pub fn new(interpreter: Arc<TickInterpreter<J>>, config: WorkerConfig) -> Result<Self> {
        let wake = Arc::new(TickSemaphore::new()?);
        Self::with_wake_signal(interpreter, config, wake)
    }

    /// Spawn a pool parking on a caller-provided wake primitive.
    pub fn with_wake_signal(
        interpreter: Arc<TickInterpreter<J>>,
        config: WorkerConfig,
        wake: Arc<dyn WakeSignal>,
    ) -> Result<Self> {
        interpreter.set_thread_count(config.threads);
        let threads = interpreter.thread_count();

        let stop = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));

        let mut helpers = Vec::with_capacity(threads - 1);
        for index in 1..threads {
            let interpreter = interpreter.clone();
            let wake = wake.clone();
            let stop = stop.clone();
            let active = active.clone();
            let rt_priority = config.rt_priority;

            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || helper_loop(interpreter, wake, stop, active, index, rt_priority))
                .map_err(Error::Io)?;
            helpers.push(handle);
        }

        tracing::info!(helpers = helpers.len(), "worker pool started");
        Ok(Self {
            interpreter,
            wake,
            stop,
            active,
            helpers,
        })
    }

    /// The driven interpreter.
    pub fn interpreter(&self) -> &Arc<TickInterpreter<J>> {
        &self.interpreter
    }

    /// Execute one tick: arm it, wake the helpers the graph can use, and
    /// run the master drain to completion.
    ///
    /// Returns false without waking anyone when no graph is installed or
    /// the graph is empty.
    pub fn tick(&self) -> bool {
        if !self.interpreter.begin_tick() {
            return false;
        }

        // Never post more wakes than helpers exist, even if the thread
        // count was reconfigured upward after spawn.
        let wanted = self.interpreter.used_helpers().min(self.helpers.len());
        self.active.fetch_add(wanted, Ordering::Relaxed);
        self.wake.post(wanted);

        self.interpreter.run_master();
        true
    }

    /// Install a graph once all helpers have parked; returns the previous
    /// graph. See [`TickInterpreter::install_graph`].
    pub fn install_graph(&self, graph: TaskGraph<J>) -> Option<TaskGraph<J>> {
        self.quiesce();
        self.interpreter.install_graph(graph)
    }

    /// Release the current graph once all helpers have parked.
    pub fn release_graph(&self) -> Option<TaskGraph<J>> {
        self.quiesce();
        self.interpreter.release_graph()
    }

    /// Wait for every helper woken this tick to finish draining and park.
    ///
    /// By the time this is called the tick itself has completed (the
    /// master observed the node count at zero), so stragglers are at most
    /// a few instructions from parking.
    fn quiesce(&self) {
        while self.active.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
    }
}

impl<J: Job> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.wake.post(self.helpers.len());
        for handle in self.helpers.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("worker pool stopped");
    }
}

/// Body of one helper thread: park, drain, repeat.
fn helper_loop<J: Job>(
    interpreter: Arc<TickInterpreter<J>>,
    wake: Arc<dyn WakeSignal>,
    stop: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    index: usize,
    rt_priority: Option<i32>,
) {
    if let Some(priority) = rt_priority {
        if let Err(e) = set_rt_priority(priority) {
            tracing::warn!(
                "helper {} keeping default priority: {} (SCHED_FIFO needs CAP_SYS_NICE or root)",
                index,
                e
            );
        }
    }

    loop {
        wake.wait();
        if stop.load(Ordering::Acquire) {
            break;
        }
        interpreter.run_worker(index);
        active.fetch_sub(1, Ordering::Release);
    }
}

/// Promote the current thread to `SCHED_FIFO` at the given priority.
#[cfg(target_os = "linux")]
fn set_rt_priority(priority: i32) -> std::io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };

    // SAFETY: plain syscall on the current thread (tid 0) with a valid
    // param struct.
    let result = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if result == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_rt_priority(_priority: i32) -> std::io::Result<()> {
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
