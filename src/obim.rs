/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! OBIM — the ordered-by-integer-metric priority work queue (`spec.md` §4.4).
//!
//! OBIM stores two logically separate queue systems under one name:
//!
//! - the **scatter side**: priority buckets keyed by an algorithm-supplied
//!   index, synchronized across threads by a lazily-replayed append-only
//!   log rather than a shared lock on the hot path;
//! - the **gather side**: one queue per graph partition, advertised through
//!   per-socket `gatherQ`s so idle gather workers can find work without
//!   polling every partition.
//!
//! Buckets and partition queues are never freed once created (`spec.md`
//! §4.4, "Failure / edge cases") — callers only ever grow the set of known
//! indices, so there is no reclamation path to get wrong.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::chunk::{Chunk, ChunkQueue};

/// The shared, append-only record of which priority indices have a bucket.
///
/// Mutating the log (creating a bucket) takes `lock` — spec's "short
/// critical section, only on new-bucket creation" (`spec.md` §5). Reading it
/// does not: a thread with a stale mirror notices via `version` and replays
/// only the entries it is missing.
struct MasterLog<T> {
    log: Mutex<Vec<(u32, Arc<ChunkQueue<T>>)>>,
    version: AtomicUsize,
}

impl<T> MasterLog<T> {
    fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            version: AtomicUsize::new(0),
        }
    }

    fn version(&self) -> usize {
        self.version.load(Ordering::Acquire)
    }

    fn snapshot_from(&self, from: usize) -> Vec<(u32, Arc<ChunkQueue<T>>)> {
        let log = self.log.lock().unwrap();
        let from = from.min(log.len());
        log[from..].to_vec()
    }

    /// Returns the bucket for `index`, creating it if this is the first
    /// thread to ever push to it.
    fn get_or_create(&self, index: u32) -> Arc<ChunkQueue<T>> {
        let mut log = self.log.lock().unwrap();
        if let Some((_, queue)) = log.iter().find(|(i, _)| *i == index) {
            return queue.clone();
        }
        let queue = Arc::new(ChunkQueue::new());
        log.push((index, queue.clone()));
        self.version.fetch_add(1, Ordering::Release);
        queue
    }
}

/// One worker's view of the scatter-side bucket map (`spec.md` §4.4: "each
/// thread has a local map `index → local bucket pointer`").
///
/// Never shared across threads. A worker keeps one of these for the whole
/// run and passes it to every [`Obim`] scatter-side call it makes.
pub struct LocalBucketMap<T> {
    mirror: Vec<(u32, Arc<ChunkQueue<T>>)>,
    last_master_version: usize,
    /// The lowest index this thread has ever published work to.
    pub scan_start: u32,
    /// The bucket this thread is currently draining.
    pub cur_index: u32,
}

impl<T> LocalBucketMap<T> {
    pub fn new() -> Self {
        Self {
            mirror: Vec::new(),
            last_master_version: 0,
            scan_start: u32::MAX,
            cur_index: 0,
        }
    }

    fn sync(&mut self, master: &MasterLog<T>) {
        let v = master.version();
        if v != self.last_master_version {
            let fresh = master.snapshot_from(self.mirror.len());
            self.mirror.extend(fresh);
            self.last_master_version = v;
        }
    }

    fn find(&self, index: u32) -> Option<&Arc<ChunkQueue<T>>> {
        self.mirror.iter().find(|(i, _)| *i == index).map(|(_, q)| q)
    }

    /// Lowest index `>= from` with a non-empty bucket, among those this
    /// thread's mirror currently knows about. Call [`Obim::sync_scan`] first
    /// if the mirror might be behind.
    fn lowest_nonempty_from(&self, from: u32) -> Option<u32> {
        self.mirror
            .iter()
            .filter(|(i, _)| *i >= from)
            .filter(|(_, q)| !q.is_empty())
            .map(|(i, _)| *i)
            .min()
    }
}

impl<T> Default for LocalBucketMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A lock-free-ish queue of advertised partition ids, local to one socket.
///
/// Built directly on [`crossbeam_channel`] rather than [`ChunkQueue`]: the
/// items here are bare partition ids (one word), not bulk payload chunks, so
/// there is no batching benefit to chunking them.
struct GatherAdvert {
    sender: Sender<u32>,
    receiver: Receiver<u32>,
}

impl GatherAdvert {
    fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    fn push(&self, partition: u32) {
        self.sender
            .send(partition)
            .expect("GatherAdvert receiver dropped while a producer is live");
    }

    fn try_pop(&self) -> Option<u32> {
        self.receiver.try_recv().ok()
    }
}

/// The OBIM work queue: scatter-side priority buckets over items of type
/// `F` (frontier items), gather-side partition queues over items of type
/// `U` (update items).
pub struct Obim<F, U> {
    master: MasterLog<F>,
    partitions: Vec<ChunkQueue<U>>,
    gather_adverts: Vec<GatherAdvert>,
    /// A running lower bound on `min(scanStart over all threads)` (`spec.md`
    /// §4.4). Only ever moves down: once every low-index thread has drained
    /// its work the floor does not rise back up, which costs a little
    /// wasted scanning of now-permanently-empty low buckets rather than
    /// risking a scan that starts too high and misses work — recomputing a
    /// precise per-round minimum would need the socket leader to poll every
    /// thread's `scan_start`, which this crate does not implement.
    scan_floor: AtomicUsize,
}

impl<F, U> Obim<F, U> {
    pub fn new(num_part: u32, num_sockets: u32) -> Self {
        let num_sockets = num_sockets.max(1);
        Self {
            master: MasterLog::new(),
            partitions: (0..num_part).map(|_| ChunkQueue::new()).collect(),
            gather_adverts: (0..num_sockets).map(|_| GatherAdvert::new()).collect(),
            scan_floor: AtomicUsize::new(u32::MAX as usize),
        }
    }

    /// The current scan floor, or `0` if no thread has published to any
    /// bucket yet.
    pub fn scan_floor(&self) -> u32 {
        let v = self.scan_floor.load(Ordering::Acquire);
        if v == u32::MAX as usize {
            0
        } else {
            v as u32
        }
    }

    pub fn num_part(&self) -> u32 {
        self.partitions.len() as u32
    }

    // ---- Scatter side -------------------------------------------------

    /// Returns the shared bucket queue for `index`, creating it on first
    /// use, and records `index` as a publish target in `local.scan_start`.
    pub fn scatter_bucket(&self, local: &mut LocalBucketMap<F>, index: u32) -> Arc<ChunkQueue<F>> {
        local.sync(&self.master);
        let queue = match local.find(index) {
            Some(q) => q.clone(),
            None => {
                let q = self.master.get_or_create(index);
                local.sync(&self.master);
                q
            }
        };
        local.scan_start = local.scan_start.min(index);
        self.scan_floor.fetch_min(index as usize, Ordering::AcqRel);
        queue
    }

    /// Brings `local`'s mirror up to date with every bucket any thread has
    /// created so far, without creating one itself.
    pub fn sync_scan(&self, local: &mut LocalBucketMap<F>) {
        local.sync(&self.master);
    }

    /// Lowest non-empty bucket index `>= from`, after refreshing the local
    /// mirror. `spec.md` §4.4: threads scan "starting from `min(scanStart
    /// over all threads)`" upward; the caller (the executor, which tracks
    /// every thread's `scan_start`) supplies that minimum as `from`.
    pub fn lowest_nonempty_bucket(&self, local: &mut LocalBucketMap<F>, from: u32) -> Option<u32> {
        self.sync_scan(local);
        local.lowest_nonempty_from(from)
    }

    // ---- Gather side ----------------------------------------------------

    /// Publishes `chunk` onto partition `partition`'s queue; if that queue
    /// was empty, advertises the partition on socket `socket`'s `gatherQ`
    /// (`spec.md` §4.4b).
    pub fn scatter_update(&self, partition: u32, socket: u32, chunk: Box<Chunk<U>>) {
        let became_non_empty = self.partitions[partition as usize].push(chunk);
        if became_non_empty {
            self.gather_adverts[socket as usize % self.gather_adverts.len()].push(partition);
        }
    }

    /// Claims a partition to drain: first from `socket`'s own `gatherQ`,
    /// falling back to a wrapping linear scan of every other socket's
    /// `gatherQ` (`spec.md` §4.4b, "work stealing").
    pub fn claim_partition(&self, socket: u32) -> Option<u32> {
        let n = self.gather_adverts.len() as u32;
        let socket = socket % n;
        if let Some(p) = self.gather_adverts[socket as usize].try_pop() {
            return Some(p);
        }
        for offset in 1..n {
            let s = (socket + offset) % n;
            if let Some(p) = self.gather_adverts[s as usize].try_pop() {
                return Some(p);
            }
        }
        None
    }

    /// Drains one published chunk from `partition`'s queue, if any.
    pub fn drain_partition(&self, partition: u32) -> Option<Box<Chunk<U>>> {
        self.partitions[partition as usize].pop()
    }

    pub fn partition_is_empty(&self, partition: u32) -> bool {
        self.partitions[partition as usize].is_empty()
    }
}
