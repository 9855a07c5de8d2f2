//! The tick path must never touch the heap.
//!
//! A counting wrapper around the system allocator verifies that, once a
//! graph is installed and warmed, `begin_tick` + `run_master` perform zero
//! allocations. This file holds a single test so no sibling test can
//! allocate concurrently and pollute the counter.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

use cadence::graph::GraphBuilder;
use cadence::job::Job;
use cadence::sched::TickInterpreter;

struct CountingAllocator {
    allocations: AtomicU64,
}

impl CountingAllocator {
    fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::SeqCst)
    }
}

// SAFETY: defers entirely to the system allocator; only counts.
unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator {
    allocations: AtomicU64::new(0),
};

struct NopJob;

impl Job for NopJob {
    fn run(&self, _worker_index: usize) {}
}

#[test]
fn steady_state_ticks_do_not_allocate() {
    let mut builder = GraphBuilder::new();
    let mut previous = None;
    for _ in 0..200 {
        let id = builder.add_job(NopJob);
        if let Some(prev) = previous {
            builder.add_edge(prev, id).unwrap();
        }
        previous = Some(id);
    }

    let interpreter = TickInterpreter::new(1);
    interpreter.install_graph(builder.build());

    // Warm-up tick (paths exercised, nothing left to allocate lazily).
    assert!(interpreter.begin_tick());
    interpreter.run_master();

    let before = ALLOCATOR.allocations();
    for _ in 0..8 {
        assert!(interpreter.begin_tick());
        interpreter.run_master();
    }
    let after = ALLOCATOR.allocations();

    assert_eq!(after, before, "tick path allocated");
}
