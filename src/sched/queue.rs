//! Lock-free multi-producer/multi-consumer queue of runnable nodes.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::graph::NodeId;

/// Cache-line-sized wrapper to keep the enqueue and dequeue cursors off
/// each other's line.
#[repr(align(64))]
struct CacheAligned<T>(T);

/// One queue slot.
///
/// The sequence counter tags the slot with the cursor generation that may
/// touch it next: `pos` for the producer that owns position `pos`,
/// `pos + 1` once a value is published, `pos + capacity` once consumed.
/// Because a recycled slot never repeats a sequence value within a cursor
/// lap, stale producers and consumers can always tell a reused slot from
/// their own, which is what defuses the ABA problem here.
struct Slot {
    sequence: AtomicUsize,
    value: UnsafeCell<NodeId>,
}

// SAFETY: slot values are only written by the producer that won the slot's
// sequence handshake and only read by the consumer that won the follow-up
// handshake; the sequence atomics order those accesses.
unsafe impl Send for Slot {}
unsafe impl Sync for Slot {}

// ============================================================================
// Runnable Queue
// ============================================================================

/// A bounded lock-free MPMC FIFO of node ids.
///
/// Any worker may enqueue (a finishing job releasing successors) and any
/// worker may dequeue. Ordering is FIFO per producer; inter-producer
/// ordering is unspecified. Both operations are non-blocking: `enqueue`
/// reports a full queue instead of waiting and `try_dequeue` reports an
/// empty one.
///
/// Capacity is fixed at construction (rounded up to a power of 2). The
/// interpreter sizes the queue to the installed graph's node count, which
/// makes in-tick enqueues infallible: at most `total_nodes` ids are ever
/// live at once.
pub(crate) struct RunnableQueue {
    slots: Box<[Slot]>,
    mask: usize,
    enqueue_pos: CacheAligned<AtomicUsize>,
    dequeue_pos: CacheAligned<AtomicUsize>,
}

impl RunnableQueue {
    /// Create a queue with at least `capacity` slots.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let slots: Vec<Slot> = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(NodeId(0)),
            })
            .collect();

        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            enqueue_pos: CacheAligned(AtomicUsize::new(0)),
            dequeue_pos: CacheAligned(AtomicUsize::new(0)),
        }
    }

    /// Number of slots.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// True when no ids are queued.
    ///
    /// Exact only while no producers or consumers are in flight; used for
    /// tick-boundary assertions.
    pub(crate) fn is_empty(&self) -> bool {
        let head = self.enqueue_pos.0.load(Ordering::Acquire);
        let tail = self.dequeue_pos.0.load(Ordering::Acquire);
        head == tail
    }

    /// Append an id. Returns false if the queue is full.
    pub(crate) fn enqueue(&self, id: NodeId) -> bool {
        let mut pos = self.enqueue_pos.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let lag = sequence as isize - pos as isize;

            if lag == 0 {
                // The slot is free for this position; claim it.
                match self.enqueue_pos.0.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the claim gives this producer
                        // exclusive access to the slot until the sequence
                        // store below publishes it.
                        unsafe { *slot.value.get() = id };
                        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
                        return true;
                    }
                    Err(current) => pos = current,
                }
            } else if lag < 0 {
                // A whole lap behind: the slot still holds an unconsumed
                // value, so the queue is full.
                return false;
            } else {
                pos = self.enqueue_pos.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Remove the oldest id, or `None` when the queue is empty.
    pub(crate) fn try_dequeue(&self) -> Option<NodeId> {
        let mut pos = self.dequeue_pos.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let lag = sequence as isize - pos.wrapping_add(1) as isize;

            if lag == 0 {
                match self.dequeue_pos.0.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the claim gives this consumer
                        // exclusive access until the sequence store
                        // recycles the slot for the next lap.
                        let id = unsafe { *slot.value.get() };
                        slot.sequence
                            .store(pos.wrapping_add(self.mask).wrapping_add(1), Ordering::Release);
                        return Some(id);
                    }
                    Err(current) => pos = current,
                }
            } else if lag < 0 {
                // No producer has published this position yet.
                return None;
            } else {
                pos = self.dequeue_pos.0.load(Ordering::Relaxed);
            }
        }
    }
}

// SAFETY: all shared state is either atomic or guarded by the slot
// sequence handshake described on `Slot`.
unsafe impl Send for RunnableQueue {}
unsafe impl Sync for RunnableQueue {}

// ============================================================================
// Tests
// ============================================================================
