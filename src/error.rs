//! Error types for cadence.

use thiserror::Error;

use crate::graph::NodeId;

/// Result type alias using cadence's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for graph construction and worker management.
///
/// The tick path itself has no recoverable failures: precondition
/// violations there (activation-count underflow, a non-empty queue at tick
/// start) are graph-construction bugs and are caught by debug assertions,
/// and job failures are the caller's concern.
#[derive(Error, Debug)]
pub enum Error {
    /// Adding the edge would close a dependency cycle.
    #[error("edge {from} -> {to} would create a cycle")]
    WouldCycle {
        /// Source node of the rejected edge.
        from: NodeId,
        /// Target node of the rejected edge.
        to: NodeId,
    },

    /// An edge endpoint does not name a node in the builder.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A node's predecessor count overflowed the 16-bit activation limit.
    #[error("node {0} has too many predecessors")]
    PredecessorOverflow(NodeId),

    /// I/O error (wake-primitive creation, thread spawn).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
