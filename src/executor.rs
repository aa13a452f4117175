/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Scatter → Sync → Gather executor (`spec.md` §4.6) and the `run` entry
//! point (`spec.md` §6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info};

use crate::algorithm::{Algorithm, FrontierItem, UpdateItem, VertexState, MAX_VALUE};
use crate::chunk::{Chunk, ChunkPool, FRONTIER_CHUNK_CAPACITY, UPDATE_CHUNK_CAPACITY};
use crate::error::EngineError;
use crate::obim::{LocalBucketMap, Obim};
use crate::options::Options;
use crate::partitioned_graph::PartitionedGraph;
use crate::pool::Pool;
use crate::task::PrefetchTask;

/// Result of a completed [`run`]: the final per-vertex state and a little
/// run-level telemetry, useful for tests and for callers who want to report
/// on engine behavior without re-deriving it.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Final value of every vertex, indexed by vertex id.
    pub state: Vec<u32>,
    /// Number of outer Scatter/Sync/Gather rounds executed before global
    /// quiescence.
    pub rounds: u32,
}

/// Per-thread accumulator of not-yet-full chunks bound for OBIM's partition
/// queues, one slot per partition (`spec.md` §4.6, the `facing` buffer).
///
/// This crate does not implement the `facing`/`facing2` double-buffer the
/// spec allows for overlapping round *k*+1 Scatter with round *k* Sync:
/// `Facing` is owned entirely by one worker thread and never shared, so
/// there is nothing else contending for it between rounds. It starts each
/// round with nothing in flight and flushes everything it holds during
/// Sync, fully handing off to the next round's Scatter.
struct Facing<T> {
    partials: Vec<Option<Box<Chunk<T>>>>,
}

impl<T> Facing<T> {
    fn new(num_part: u32) -> Self {
        Self {
            partials: (0..num_part).map(|_| None).collect(),
        }
    }

    /// Appends `item` to partition `partition`'s in-flight chunk, returning
    /// a full chunk to be published if this push caused one.
    fn push(&mut self, pool: &ChunkPool<T>, partition: u32, item: T) -> Option<Box<Chunk<T>>> {
        let slot = &mut self.partials[partition as usize];
        if slot.is_none() {
            *slot = Some(pool.acquire());
        }
        let chunk = slot.as_mut().unwrap();
        match chunk.push(item) {
            Ok(()) => None,
            Err(item) => {
                let full = std::mem::replace(chunk, pool.acquire());
                chunk
                    .push(item)
                    .unwrap_or_else(|_| unreachable!("freshly acquired chunk cannot be full"));
                Some(full)
            }
        }
    }

    /// Publishes every non-empty partial chunk (the Sync step), recycling
    /// empty slots instead.
    fn flush_all(&mut self, pool: &ChunkPool<T>) -> Vec<(u32, Box<Chunk<T>>)> {
        let mut out = Vec::new();
        for (p, slot) in self.partials.iter_mut().enumerate() {
            if let Some(chunk) = slot.take() {
                if chunk.is_empty() {
                    pool.recycle(chunk);
                } else {
                    out.push((p as u32, chunk));
                }
            }
        }
        out
    }
}

/// Appends `item` to its priority bucket's thread-local partial chunk,
/// publishing to OBIM on overflow. Shared between seeding the initial
/// frontier and pushing `newFrontier` items after Gather (`spec.md` §4.6
/// step 9).
fn push_frontier(
    obim: &Obim<FrontierItem, UpdateItem>,
    local: &mut LocalBucketMap<FrontierItem>,
    pool: &ChunkPool<FrontierItem>,
    partials: &mut HashMap<u32, Box<Chunk<FrontierItem>>>,
    index: u32,
    item: FrontierItem,
) {
    let chunk = partials.entry(index).or_insert_with(|| pool.acquire());
    if let Err(item) = chunk.push(item) {
        let full = std::mem::replace(chunk, pool.acquire());
        let bucket = obim.scatter_bucket(local, index);
        bucket.push(full);
        chunk
            .push(item)
            .unwrap_or_else(|_| unreachable!("freshly acquired chunk cannot be full"));
    }
}

/// Publishes every bucket's non-empty partial chunk, so other threads can
/// observe this round's work before the round barrier.
fn flush_frontier(
    obim: &Obim<FrontierItem, UpdateItem>,
    local: &mut LocalBucketMap<FrontierItem>,
    partials: &mut HashMap<u32, Box<Chunk<FrontierItem>>>,
) {
    for (index, chunk) in partials.drain() {
        if !chunk.is_empty() {
            let bucket = obim.scatter_bucket(local, index);
            bucket.push(chunk);
        }
    }
}

/// Runs `algorithm` to completion over `graph`, starting from
/// `initial_frontier` (`spec.md` §6: `run(graph, initialFrontier, algorithm,
/// indexer, options)`).
///
/// `indexer` computes each frontier item's OBIM priority bucket; it is kept
/// separate from [`Algorithm`] because the quantization it performs is
/// genuinely different per algorithm (SSSP: `val >> stepShift`; connected
/// components: a saturating shift) and the spec treats it as opaque
/// (`spec.md` §9, Open Question).
pub fn run<A: Algorithm>(
    graph: &PartitionedGraph,
    initial_frontier: &[FrontierItem],
    algorithm: &A,
    indexer: impl Fn(&FrontierItem) -> u32 + Sync,
    options: Options,
) -> Result<RunReport, EngineError> {
    let validated = options.validate(graph.num_v())?;
    let pool = Pool::new(validated.threads as u32);
    let topology = *pool.topology();

    let obim: Obim<FrontierItem, UpdateItem> = Obim::new(validated.num_part, topology.num_sockets);
    let state = VertexState::new(graph.num_v(), MAX_VALUE);
    let frontier_pool = ChunkPool::new(FRONTIER_CHUNK_CAPACITY);
    let update_pool = ChunkPool::new(UPDATE_CHUNK_CAPACITY);
    let lane_size = validated.lane_size;

    info!(
        "starting run: numV={} numPart={} threads={} sockets={}",
        graph.num_v(),
        validated.num_part,
        validated.threads,
        topology.num_sockets
    );

    let total_rounds = AtomicU32::new(0);

    pool.on_each(|ctx| {
        let mut local: LocalBucketMap<FrontierItem> = LocalBucketMap::new();
        let mut bucket_partials: HashMap<u32, Box<Chunk<FrontierItem>>> = HashMap::new();
        let mut facing: Facing<UpdateItem> = Facing::new(validated.num_part);

        if ctx.tid == 0 {
            for &item in initial_frontier {
                state.atomic_min(item.vid, item.val);
                let index = indexer(&item);
                push_frontier(&obim, &mut local, &frontier_pool, &mut bucket_partials, index, item);
            }
            flush_frontier(&obim, &mut local, &mut bucket_partials);
        }
        // Synchronize every worker on the seeded state before round 1; a
        // genuinely empty initial frontier correctly reports immediate
        // quiescence here, covering the `numV=1, numE=0` boundary case.
        if !ctx.barrier.end_round(ctx.is_leader, !initial_frontier.is_empty()) {
            return;
        }

        let mut rounds: u32 = 0;
        loop {
            rounds += 1;
            let mut did_work = false;

            // --- Scatter ---
            let scan_from = obim.scan_floor();
            if let Some(index) = obim.lowest_nonempty_bucket(&mut local, scan_from) {
                local.cur_index = index;
                let bucket = obim.scatter_bucket(&mut local, index);
                if let Some(mut chunk) = bucket.pop() {
                    let items: Vec<FrontierItem> = chunk.drain().collect();
                    frontier_pool.recycle(chunk);
                    let alive: Vec<FrontierItem> = items
                        .into_iter()
                        .filter(|item| !algorithm.filter(&state, item))
                        .collect();
                    if !alive.is_empty() {
                        did_work = true;
                        let mut task = PrefetchTask::new(
                            &alive,
                            lane_size,
                            |item| graph.prefetch_vertex(item.vid),
                            |item| {
                                for group in graph.neighbors(item.vid) {
                                    for (dst, weight) in group.edges() {
                                        let candidate = algorithm.apply_weight(weight, item.val);
                                        if let Some(full) = facing.push(
                                            &update_pool,
                                            group.partition_id,
                                            UpdateItem { dst, val: candidate },
                                        ) {
                                            obim.scatter_update(group.partition_id, ctx.socket, full);
                                        }
                                    }
                                }
                            },
                        );
                        task.run_to_completion();
                    }
                }
            }

            // --- Sync ---
            for (partition, chunk) in facing.flush_all(&update_pool) {
                obim.scatter_update(partition, ctx.socket, chunk);
            }

            // --- Gather ---
            // A claimed partition is only advertised again on its queue's
            // next empty-to-non-empty transition, so every chunk already
            // queued for it must be drained here before moving on — leaving
            // any behind would silently strand their updates.
            if let Some(partition) = obim.claim_partition(ctx.socket) {
                while let Some(mut chunk) = obim.drain_partition(partition) {
                    let updates: Vec<UpdateItem> = chunk.drain().collect();
                    update_pool.recycle(chunk);
                    if updates.is_empty() {
                        continue;
                    }
                    did_work = true;
                    let mut new_frontier: Vec<FrontierItem> = Vec::new();
                    let mut task = PrefetchTask::new(
                        &updates,
                        lane_size,
                        |u| state.prefetch(u.dst),
                        |u| {
                            if algorithm.gather(&state, u) {
                                new_frontier.push(algorithm.push(u.dst, u.val));
                            }
                        },
                    );
                    task.run_to_completion();
                    for item in new_frontier {
                        let index = indexer(&item);
                        push_frontier(&obim, &mut local, &frontier_pool, &mut bucket_partials, index, item);
                    }
                }
            }
            flush_frontier(&obim, &mut local, &mut bucket_partials);

            debug!(
                "thread {tid} round {rounds} did_work={did_work}",
                tid = ctx.tid
            );
            if !ctx.barrier.end_round(ctx.is_leader, did_work) {
                break;
            }
        }
        total_rounds.fetch_max(rounds, Ordering::Relaxed);
    });

    let rounds = total_rounds.load(Ordering::Relaxed);
    info!("run complete after {rounds} rounds");
    Ok(RunReport {
        state: state.to_vec(),
        rounds,
    })
}
