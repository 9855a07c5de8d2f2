//! # Cadence
//!
//! A tick-scoped parallel task-graph executor for real-time DSP.
//!
//! Every audio tick, a directed acyclic graph of DSP jobs runs exactly
//! once per node, each node after all of its predecessors, spread across a
//! fixed set of worker threads. The hot path allocates nothing and blocks
//! on nothing: runnable nodes flow through a lock-free queue, dependency
//! release is an atomic counter decrement, and the only wait is the master
//! thread's terminal spin on the remaining-node counter.
//!
//! # Architecture
//!
//! ```text
//!                       ┌────────────────────────────┐
//!  audio driver ──────▶ │       TickInterpreter      │
//!  (one call per tick)  │  graph · queue · node_count│
//!                       └──────┬──────────────┬──────┘
//!                              │              │
//!                      run_master()    run_worker(k)
//!                              │              │
//!                       ┌──────▼─────┐ ┌──────▼──────┐
//!                       │   master   │ │  helpers    │
//!                       │ (thread 0) │ │ (WorkerPool)│
//!                       └────────────┘ └─────────────┘
//! ```
//!
//! Finishing jobs decrement their successors' activation counters; a
//! successor whose counter reaches zero is either handed straight back to
//! the same worker (the first one found, so the data stays in cache with
//! no queue round-trip) or enqueued for whichever worker grabs it first.
//! The tick is
//! complete when the remaining-node counter hits zero.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use cadence::prelude::*;
//! use std::sync::Arc;
//!
//! let mut builder = GraphBuilder::new();
//! let input = builder.add_job(|worker: usize| read_input(worker));
//! let reverb = builder.add_job(|worker: usize| run_reverb(worker));
//! let mix = builder.add_job(|worker: usize| mix_output(worker));
//! builder.add_edge(input, reverb)?;
//! builder.add_edge(reverb, mix)?;
//!
//! let interpreter = Arc::new(TickInterpreter::new(4));
//! let pool = WorkerPool::new(interpreter, WorkerConfig::default().with_threads(4))?;
//! pool.install_graph(builder.build());
//!
//! // From the audio callback, once per period:
//! pool.tick();
//! ```
//!
//! Graphs are installed and released at tick boundaries only; the
//! interpreter takes no lock for the swap and relies on the caller (or the
//! [`sched::WorkerPool`] wrappers) to keep it off a running tick.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod graph;
pub mod job;
pub mod sched;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::graph::{GraphBuilder, NodeId, TaskGraph};
    pub use crate::job::Job;
    pub use crate::sched::{TickInterpreter, TickSemaphore, WakeSignal, WorkerConfig, WorkerPool};
}

pub use error::{Error, Result};
