/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Fixed-capacity chunks and the two queue disciplines built on top of them
//! (`spec.md` §4.3).
//!
//! A [`Chunk`] is a capacity-bounded buffer; filling one past capacity is a
//! caller error signalled by returning the rejected item (the caller then
//! publishes the full chunk and starts a fresh one — see
//! [`ChunkedAppender`]). [`ChunkQueue`] is the multi-producer/single-consumer
//! "linked chunk queue" used as the contents of one OBIM priority bucket or
//! one partition's gather queue; [`Bag`] is the never-shared per-thread
//! chunk stack.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};

/// Default capacity for chunks of frontier items (`spec.md` §4.3: "a small
/// chunk (512/1024 elements) for frontier items").
pub const FRONTIER_CHUNK_CAPACITY: usize = 1024;

/// Default capacity for chunks of update items (`spec.md` §4.3: "a larger
/// chunk (1024/4096) for update items").
pub const UPDATE_CHUNK_CAPACITY: usize = 4096;

/// A fixed-capacity, single-producer buffer with a head/tail cursor.
///
/// Implemented over [`VecDeque`] rather than a raw array: this keeps the
/// head/tail bookkeeping (and `Drop` of partially-consumed elements) safe,
/// while preserving the fixed-capacity, trivially-relocatable shape the
/// spec calls for.
#[derive(Debug)]
pub struct Chunk<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> Chunk<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Appends `item`, or returns it back if the chunk is already full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            Err(item)
        } else {
            self.items.push_back(item);
            Ok(())
        }
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, T> {
        self.items.drain(..)
    }
}

/// Allocates fresh chunks, recycling exhausted ones.
///
/// Models the "per-socket pool; fallback to global pool" allocation scheme
/// of `spec.md` §4.3/§5 as a simple recycling free list: a socket-local
/// producer draws from its own pool and falls back to allocating a new
/// chunk when the pool is empty. Genuine exhaustion (the process is
/// actually out of memory) is fatal via Rust's global allocator, matching
/// the "fatal" propagation policy of `spec.md` §7 without the engine having
/// to detect it itself.
pub struct ChunkPool<T> {
    capacity: usize,
    free: std::sync::Mutex<Vec<Box<Chunk<T>>>>,
}

impl<T> ChunkPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(&self) -> Box<Chunk<T>> {
        if let Some(mut chunk) = self.free.lock().unwrap().pop() {
            debug_assert!(chunk.is_empty());
            chunk.items.clear();
            return chunk;
        }
        Box::new(Chunk::new(self.capacity))
    }

    pub fn recycle(&self, chunk: Box<Chunk<T>>) {
        self.free.lock().unwrap().push(chunk);
    }
}

/// A multi-producer/single-consumer-ish queue of chunks ("linked chunk
/// queue", `spec.md` §4.3). Built over [`crossbeam_channel`]'s lock-free MPMC
/// channel with an explicit length counter, since the channel alone cannot
/// tell a producer whether its push was the one that made the queue
/// non-empty.
pub struct ChunkQueue<T> {
    sender: Sender<Box<Chunk<T>>>,
    receiver: Receiver<Box<Chunk<T>>>,
    len: AtomicUsize,
}

impl<T> ChunkQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            len: AtomicUsize::new(0),
        }
    }

    /// Publishes a full (or partial, at shutdown) chunk.
    ///
    /// Returns `true` iff the queue was empty immediately before this push —
    /// the signal the Gather side uses to decide whether to advertise the
    /// partition queue on a `gatherQ` (`spec.md` §4.3, §4.6 step 5).
    pub fn push(&self, chunk: Box<Chunk<T>>) -> bool {
        let was_empty = self.len.fetch_add(1, Ordering::AcqRel) == 0;
        self.sender
            .send(chunk)
            .expect("ChunkQueue receiver dropped while a producer is live");
        was_empty
    }

    /// Pops a full chunk, if any is queued.
    pub fn pop(&self) -> Option<Box<Chunk<T>>> {
        match self.receiver.try_recv() {
            Ok(chunk) => {
                self.len.fetch_sub(1, Ordering::AcqRel);
                Some(chunk)
            }
            Err(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }
}

impl<T> Default for ChunkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A never-shared, per-thread stack of chunk pointers (`spec.md` §4.3).
pub struct Bag<T> {
    chunks: Vec<Box<Chunk<T>>>,
}

impl<T> Bag<T> {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub fn push(&mut self, chunk: Box<Chunk<T>>) {
        self.chunks.push(chunk);
    }

    pub fn pop(&mut self) -> Option<Box<Chunk<T>>> {
        self.chunks.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}

impl<T> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills chunks of capacity `capacity` one item at a time, publishing each
/// full chunk into `queue` and drawing its replacement from `pool`
/// (`spec.md` §4.3, "Contract").
pub struct ChunkedAppender<'a, T> {
    pool: &'a ChunkPool<T>,
    queue: &'a ChunkQueue<T>,
    current: Box<Chunk<T>>,
}

impl<'a, T> ChunkedAppender<'a, T> {
    pub fn new(pool: &'a ChunkPool<T>, queue: &'a ChunkQueue<T>) -> Self {
        Self {
            pool,
            queue,
            current: pool.acquire(),
        }
    }

    /// Appends `item`, publishing the current chunk and drawing a fresh one
    /// if it was already full. Returns `true` if a publish made the queue
    /// transition from empty to non-empty.
    pub fn push(&mut self, item: T) -> bool {
        if let Err(item) = self.current.push(item) {
            let full = std::mem::replace(&mut self.current, self.pool.acquire());
            let became_non_empty = self.queue.push(full);
            self.current
                .push(item)
                .unwrap_or_else(|_| unreachable!("freshly acquired chunk cannot be full"));
            became_non_empty
        } else {
            false
        }
    }

    /// Publishes whatever is left in the current chunk, if non-empty.
    /// Returns `true` if that publish made the queue transition from empty
    /// to non-empty.
    pub fn flush(&mut self) -> bool {
        if self.current.is_empty() {
            return false;
        }
        let full = std::mem::replace(&mut self.current, self.pool.acquire());
        self.queue.push(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_rejects_push_past_capacity() {
        let mut c = Chunk::new(2);
        assert!(c.push(1).is_ok());
        assert!(c.push(2).is_ok());
        assert_eq!(c.push(3), Err(3));
    }

    #[test]
    fn chunk_queue_reports_empty_to_non_empty_transition() {
        let q: ChunkQueue<i32> = ChunkQueue::new();
        let mut c = Box::new(Chunk::new(4));
        c.push(1).unwrap();
        assert!(q.push(c));

        let mut c2 = Box::new(Chunk::new(4));
        c2.push(2).unwrap();
        assert!(!q.push(c2));
    }

    #[test]
    fn chunk_queue_pop_returns_full_chunk_at_once() {
        let q: ChunkQueue<i32> = ChunkQueue::new();
        let mut c = Box::new(Chunk::new(4));
        c.push(1).unwrap();
        c.push(2).unwrap();
        q.push(c);

        let mut popped = q.pop().unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(popped.pop_front(), Some(1));
        assert_eq!(popped.pop_front(), Some(2));
        assert!(q.is_empty());
    }

    #[test]
    fn chunked_appender_publishes_on_overflow() {
        let pool = ChunkPool::new(2);
        let queue = ChunkQueue::new();
        let mut appender = ChunkedAppender::new(&pool, &queue);
        assert!(!appender.push(1));
        assert!(!appender.push(2));
        // Third push overflows the first chunk, publishing it.
        assert!(appender.push(3));
        assert!(appender.flush());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn bag_is_lifo() {
        let mut bag = Bag::new();
        bag.push(Box::new(Chunk::<i32>::new(4)));
        bag.push(Box::new(Chunk::<i32>::new(4)));
        assert_eq!(bag.len(), 2);
        assert!(bag.pop().is_some());
        assert!(bag.pop().is_some());
        assert!(bag.is_empty());
    }
}
