/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The algorithm capability set the executor is parameterized by
//! (`spec.md` §4.7), and the shared per-vertex state array it mutates.

use std::sync::atomic::{AtomicU32, Ordering};

/// Per-vertex algorithm value. Both shipped algorithms ([`crate::algorithms::sssp`]
/// and [`crate::algorithms::connected_components`]) use a 32-bit monotone
/// quantity (distance, component id), so the executor is not generic over it;
/// `spec.md` §9 allows implementers to fix concrete types where the spec
/// itself stays abstract.
pub type Value = u32;

/// Sentinel for "unreached" (`spec.md` §8: "`MAX_NUM` for all unreachable
/// vertices").
pub const MAX_VALUE: Value = u32::MAX;

/// A frontier item: a vertex whose value changed and should be scattered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierItem {
    pub vid: u32,
    pub val: Value,
}

/// An update produced by Scatter, destined for Gather at `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateItem {
    pub dst: u32,
    pub val: Value,
}

/// The shared, lock-free per-vertex state array (`spec.md` §5: "must be
/// atomic min (or equivalent monotonic atomic)").
pub struct VertexState {
    values: Box<[AtomicU32]>,
}

impl VertexState {
    pub fn new(num_v: u32, initial: Value) -> Self {
        Self {
            values: (0..num_v).map(|_| AtomicU32::new(initial)).collect(),
        }
    }

    #[inline]
    pub fn get(&self, v: u32) -> Value {
        self.values[v as usize].load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_plain(&self, v: u32, val: Value) {
        self.values[v as usize].store(val, Ordering::Release);
    }

    /// Software-prefetches vertex `v`'s state cell (`spec.md` §4.6 step 8).
    #[inline]
    pub fn prefetch(&self, v: u32) {
        let ptr = &self.values[v as usize] as *const AtomicU32 as *const i8;
        crate::partitioned_graph::prefetch_t0(ptr);
    }

    /// Applies `candidate` to vertex `v` iff it strictly improves (decreases)
    /// the current value, via compare-and-swap retry. Returns whether it did.
    ///
    /// This is the "atomic min" primitive every `gatherFunc` implementation
    /// in this crate is built on; it is what lets two workers race to update
    /// the same vertex (possible when partitions are reassigned across
    /// rounds, `spec.md` §4.6) without ever losing the smaller value.
    #[inline]
    pub fn atomic_min(&self, v: u32, candidate: Value) -> bool {
        let cell = &self.values[v as usize];
        let mut current = cell.load(Ordering::Relaxed);
        while candidate < current {
            match cell.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    pub fn num_v(&self) -> u32 {
        self.values.len() as u32
    }

    /// Snapshots the whole array (for handing results back to the caller).
    pub fn to_vec(&self) -> Vec<Value> {
        self.values.iter().map(|a| a.load(Ordering::Acquire)).collect()
    }
}

/// The capability set an algorithm supplies to the executor (`spec.md` §4.7).
///
/// `filter` and `gather` have default implementations matching the monotone
/// atomic-min pattern shared by every algorithm this crate ships; algorithms
/// with different semantics (there are none yet) would override them.
pub trait Algorithm: Sync {
    /// `filterFunc(src, candidateVal) -> bool`: `true` means skip this
    /// frontier item as stale (its value is worse than the vertex's current
    /// state).
    fn filter(&self, state: &VertexState, item: &FrontierItem) -> bool {
        item.val > state.get(item.vid)
    }

    /// `applyWeight(edgeWeight, srcVal) -> destCandidateVal`.
    fn apply_weight(&self, edge_weight: u32, src_val: Value) -> Value;

    /// `gatherFunc(destCandidateVal, destVid) -> bool`: apply if better,
    /// return whether it changed the state. Monotonicity (`spec.md` §4.7)
    /// is the caller's responsibility to preserve if this is overridden.
    fn gather(&self, state: &VertexState, update: &UpdateItem) -> bool {
        state.atomic_min(update.dst, update.val)
    }

    /// `pushFunc(dst, newVal) -> FrontierItem`.
    fn push(&self, dst: u32, new_val: Value) -> FrontierItem {
        FrontierItem {
            vid: dst,
            val: new_val,
        }
    }
}
