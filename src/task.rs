/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The prefetch-pipelined cooperative-task primitive (`spec.md` §4.5).
//!
//! A [`PrefetchTask`] is a tiny stackless state machine: each call to
//! [`PrefetchTask::step`] issues software prefetches for the *next* lane of
//! items and, if a previous lane's prefetches have already been issued,
//! processes that now-(hopefully)-hot lane. This is the "manual two-phase
//! loop (prefetch-lane followed by process-lane)" collapse the design notes
//! (`spec.md` §9) explicitly sanction in place of a true stackless-coroutine
//! facility: Rust has no native one that meets the "suspension must be
//! genuinely cheap" bar without an async runtime, which would be the wrong
//! tool for a single-threaded, never-migrating, no-I/O task.
//!
//! The task never migrates between threads (`spec.md` §4.5): callers own a
//! `PrefetchTask` on the stack of the worker driving it and never send it
//! across a thread boundary.

/// A batch of items to be processed lane-by-lane, prefetching each lane one
/// step ahead of processing it.
///
/// `step` is called repeatedly by the executor (`spec.md` §4.6) until it
/// returns `true` ("batch done"); each call performs at most one prefetch
/// issue and one lane's worth of processing, so the caller can interleave
/// other work between steps if it wants to (the executor in this crate does
/// not need to, but the primitive does not preclude it).
pub struct PrefetchTask<'a, T, Prefetch, Process>
where
    Prefetch: Fn(&T),
    Process: FnMut(&T),
{
    items: &'a [T],
    lane_size: usize,
    next_lane_start: usize,
    pending: Option<std::ops::Range<usize>>,
    prefetch: Prefetch,
    process: Process,
}

impl<'a, T, Prefetch, Process> PrefetchTask<'a, T, Prefetch, Process>
where
    Prefetch: Fn(&T),
    Process: FnMut(&T),
{
    pub fn new(items: &'a [T], lane_size: usize, prefetch: Prefetch, process: Process) -> Self {
        Self {
            items,
            lane_size: lane_size.max(1),
            next_lane_start: 0,
            pending: None,
            prefetch,
            process,
        }
    }

    /// Advances the task by one suspend/resume cycle.
    ///
    /// Returns `false` ("more to do") while there is a lane left to prefetch
    /// or process; returns `true` ("batch done") once every item has been
    /// processed.
    pub fn step(&mut self) -> bool {
        // Resume: consume the lane prefetched on the previous step.
        if let Some(range) = self.pending.take() {
            for item in &self.items[range] {
                (self.process)(item);
            }
        }

        if self.next_lane_start >= self.items.len() {
            return true;
        }

        let end = (self.next_lane_start + self.lane_size).min(self.items.len());
        let lane = self.next_lane_start..end;
        for item in &self.items[lane.clone()] {
            (self.prefetch)(item);
        }
        self.pending = Some(lane);
        self.next_lane_start = end;
        false
    }

    /// Drives the task to completion. Equivalent to calling [`step`](Self::step)
    /// in a loop; provided because the executor in this crate always runs a
    /// task to completion before moving to the next phase (`spec.md` §4.6
    /// collapses scheduling onto one task per worker, so there is nothing
    /// else for the worker to interleave with).
    pub fn run_to_completion(mut self) {
        while !self.step() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn processes_every_item_exactly_once() {
        let items: Vec<u32> = (0..10).collect();
        let seen = RefCell::new(Vec::new());
        let task = PrefetchTask::new(
            &items,
            3,
            |_item| {},
            |item| seen.borrow_mut().push(*item),
        );
        task.run_to_completion();
        assert_eq!(*seen.borrow(), items);
    }

    #[test]
    fn step_returns_false_until_done() {
        let items = [1, 2, 3];
        let prefetched = RefCell::new(0usize);
        let processed = RefCell::new(0usize);
        let mut task = PrefetchTask::new(
            &items,
            2,
            |_| *prefetched.borrow_mut() += 1,
            |_| *processed.borrow_mut() += 1,
        );
        // Lane 1: [1, 2] — prefetch issued, nothing processed yet.
        assert!(!task.step());
        assert_eq!(*prefetched.borrow(), 2);
        assert_eq!(*processed.borrow(), 0);
        // Lane 2: [3] — lane 1 processed, lane 2 prefetched.
        assert!(!task.step());
        assert_eq!(*prefetched.borrow(), 3);
        assert_eq!(*processed.borrow(), 2);
        // Final step: lane 2 processed, nothing left to prefetch.
        assert!(task.step());
        assert_eq!(*processed.borrow(), 3);
    }

    #[test]
    fn empty_batch_completes_immediately() {
        let items: [u32; 0] = [];
        let mut task = PrefetchTask::new(&items, 64, |_| {}, |_| {});
        assert!(task.step());
    }
}
