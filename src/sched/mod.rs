//! Tick scheduling: interpreter, runnable queue, wake primitive, worker
//! pool.
//!
//! [`TickInterpreter`] is the core. It holds the installed task graph, the
//! lock-free runnable queue, and the remaining-node counter, and exposes
//! the tick lifecycle to the master thread and the per-worker drain loop
//! to helpers. [`WorkerPool`] supplies those helpers, parking them on a
//! [`WakeSignal`] between ticks.

mod interpreter;
mod queue;
mod wake;
mod workers;

pub use interpreter::{MAX_THREAD_COUNT, QueueStats, TickInterpreter};
pub use wake::{TickSemaphore, WakeSignal};
pub use workers::{WorkerConfig, WorkerPool};
