/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Worker pool, topology, and round barrier (`spec.md` §4.8).
//!
//! A fixed-size pool of threads, pinned one-to-a-core where the platform
//! supports it, grouped into sockets so that per-socket storage (gather
//! queue advertisement, chunk pools) and a designated "socket leader" for
//! cross-thread coordination are both possible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;

use log::warn;

/// Thread-to-socket layout.
///
/// True NUMA/package topology enumeration is platform-specific and not
/// exposed by any crate in this dependency stack; `detect` instead assumes
/// up to 8 physical cores share a socket, which is the right order of
/// magnitude for server-class NUMA nodes without needing OS-specific
/// syscalls. This is a deliberate simplification, not a discovered fact.
#[derive(Debug, Clone, Copy)]
pub struct Topology {
    pub num_threads: u32,
    pub num_sockets: u32,
}

impl Topology {
    pub fn detect(num_threads: u32) -> Self {
        let num_threads = num_threads.max(1);
        let physical = num_cpus::get_physical().max(1) as u32;
        let assumed_sockets = physical.div_ceil(8).max(1);
        let num_sockets = assumed_sockets.min(num_threads);
        Self {
            num_threads,
            num_sockets,
        }
    }

    /// Assigns thread `tid` to a socket by splitting `[0, num_threads)` into
    /// `num_sockets` contiguous, roughly-equal blocks.
    pub fn socket_of(&self, tid: u32) -> u32 {
        let per_socket = self.num_threads.div_ceil(self.num_sockets);
        (tid / per_socket).min(self.num_sockets - 1)
    }

    /// A thread is its socket's leader iff it is the lowest-numbered thread
    /// on that socket.
    pub fn is_leader(&self, tid: u32) -> bool {
        tid == 0 || self.socket_of(tid) != self.socket_of(tid - 1)
    }
}

/// Per-round distributed termination detector (`spec.md` §4.6 steps 10-11).
struct TerminationDetector {
    any_work_seen: AtomicBool,
}

impl TerminationDetector {
    fn new() -> Self {
        Self {
            any_work_seen: AtomicBool::new(false),
        }
    }

    fn publish_work_seen(&self) {
        self.any_work_seen.store(true, Ordering::Release);
    }

    fn global_quiescence(&self) -> bool {
        !self.any_work_seen.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.any_work_seen.store(false, Ordering::Relaxed);
    }
}

/// The reusable round boundary: every worker calls [`RoundBarrier::end_round`]
/// once per outer round, reporting whether it still has locally-owned work.
pub struct RoundBarrier {
    barrier: Barrier,
    detector: TerminationDetector,
}

impl RoundBarrier {
    pub fn new(num_threads: u32) -> Self {
        Self {
            barrier: Barrier::new(num_threads as usize),
            detector: TerminationDetector::new(),
        }
    }

    /// Publishes this thread's quiescence status, waits for every other
    /// worker to do the same, and reports whether the run should continue.
    ///
    /// Three barrier waits implement the "two-phase" round boundary of
    /// `spec.md` §4.8 plus the detector reset: phase 1 makes every publish
    /// visible before anyone reads; phase 2 makes sure every thread has read
    /// the shared verdict before the (single) leader resets it for the next
    /// round; phase 3 makes that reset visible before any thread starts
    /// publishing again.
    pub fn end_round(&self, is_leader: bool, had_local_work: bool) -> bool {
        if had_local_work {
            self.detector.publish_work_seen();
        }
        self.barrier.wait();
        let should_continue = !self.detector.global_quiescence();
        self.barrier.wait();
        if is_leader {
            self.detector.reset();
        }
        self.barrier.wait();
        should_continue
    }
}

/// What a worker closure passed to [`Pool::on_each`] receives.
pub struct WorkerContext<'a> {
    pub tid: u32,
    pub socket: u32,
    pub is_leader: bool,
    pub barrier: &'a RoundBarrier,
}

/// A fixed-size pool of pinned worker threads (`spec.md` §4.8, §6
/// `ThreadPool.onEach`).
pub struct Pool {
    topology: Topology,
}

impl Pool {
    pub fn new(num_threads: u32) -> Self {
        Self {
            topology: Topology::detect(num_threads),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Runs `f` once on each worker thread, pinned to a distinct core where
    /// `core_affinity` can enumerate them, and blocks until every worker
    /// returns.
    pub fn on_each<F>(&self, f: F)
    where
        F: Fn(&WorkerContext) + Sync,
    {
        let core_ids = core_affinity::get_core_ids().unwrap_or_default();
        if core_ids.is_empty() {
            warn!("core_affinity could not enumerate cores; worker threads will run unpinned");
        }
        let barrier = RoundBarrier::new(self.topology.num_threads);
        let topology = &self.topology;
        std::thread::scope(|scope| {
            for tid in 0..topology.num_threads {
                let f = &f;
                let barrier = &barrier;
                let core = if core_ids.is_empty() {
                    None
                } else {
                    Some(core_ids[tid as usize % core_ids.len()])
                };
                scope.spawn(move || {
                    if let Some(core) = core {
                        core_affinity::set_for_current(core);
                    }
                    let ctx = WorkerContext {
                        tid,
                        socket: topology.socket_of(tid),
                        is_leader: topology.is_leader(tid),
                        barrier,
                    };
                    f(&ctx);
                });
            }
        });
    }
}

/// Memory-budget preallocation hint (`spec.md` §5): `activeThreads +
/// (numV × perVertexBytesHint) / pagePoolSize`, logged against actual
/// available memory so an undersized `pagePoolSize` shows up in the logs
/// before it causes an allocation failure.
pub fn estimate_preallocation_pages(
    active_threads: u32,
    num_v: u32,
    per_vertex_bytes_hint: u32,
    page_pool_size: u32,
) -> u64 {
    let page_pool_size = page_pool_size.max(1) as u64;
    let estimate = active_threads as u64
        + (num_v as u64 * per_vertex_bytes_hint as u64) / page_pool_size;

    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let available_pages = sys.available_memory() / page_pool_size.max(1);
    if available_pages != 0 && estimate > available_pages {
        warn!(
            "preallocation estimate ({estimate} pages) exceeds available memory \
             ({available_pages} pages at pagePoolSize={page_pool_size})"
        );
    }
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_splits_threads_into_contiguous_socket_blocks() {
        let t = Topology {
            num_threads: 8,
            num_sockets: 2,
        };
        assert_eq!(t.socket_of(0), 0);
        assert_eq!(t.socket_of(3), 0);
        assert_eq!(t.socket_of(4), 1);
        assert_eq!(t.socket_of(7), 1);
        assert!(t.is_leader(0));
        assert!(t.is_leader(4));
        assert!(!t.is_leader(1));
        assert!(!t.is_leader(5));
    }

    #[test]
    fn single_socket_has_one_leader() {
        let t = Topology {
            num_threads: 4,
            num_sockets: 1,
        };
        assert!(t.is_leader(0));
        for tid in 1..4 {
            assert!(!t.is_leader(tid));
        }
    }

    #[test]
    fn round_barrier_reports_continue_iff_work_was_published() {
        let barrier = RoundBarrier::new(1);
        assert!(barrier.end_round(true, true));
        assert!(!barrier.end_round(true, false));
    }

    #[test]
    fn preallocation_estimate_is_deterministic_in_its_inputs() {
        let estimate = estimate_preallocation_pages(4, 1_000_000, 64, 4096);
        assert_eq!(estimate, 4 + (1_000_000u64 * 64) / 4096);
    }
}
