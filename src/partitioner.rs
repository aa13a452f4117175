/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Two-pass parallel build of a [`PartitionedGraph`] from a [`Csr`]
//! (`spec.md` §4.2).

use crate::csr::Csr;
use crate::error::EngineError;
use crate::partitioned_graph::{
    pack_header, pack_pair, pack_single, part_size, PartitionedGraph, VertexRecord, INLINE_GROUPS,
};
use crate::sync_unsafe_slice::SyncUnsafeSlice;
use dsi_progress_logger::prelude::*;
use rayon::prelude::*;

/// One destination-partition group computed while scanning a vertex's
/// CSR out-edges, before it is written into the partitioned representation.
struct ScannedGroup {
    partition_id: u32,
    edges: Vec<(u32, u32)>,
}

/// Whether a group's edges fit one of the two inline encodings, and if not,
/// how many `highedge[]` entries it needs.
enum Encoding {
    InlineSingle(u32),
    InlinePair(u32),
    Spilled,
}

fn classify(group: &ScannedGroup) -> Encoding {
    match group.edges.as_slice() {
        [(dst, weight)] => match pack_single(*dst, *weight) {
            Some(word) => Encoding::InlineSingle(word),
            None => Encoding::Spilled,
        },
        [e0, e1] => match pack_pair(*e0, *e1) {
            Some(word) => Encoding::InlinePair(word),
            None => Encoding::Spilled,
        },
        _ => Encoding::Spilled,
    }
}

/// Groups `v`'s out-edges by destination partition, in ascending partition-id
/// order (`spec.md` §3, "Invariants": "Each vertex's out-edges appear in the
/// new representation exactly once, sorted by destination partition.").
///
/// Pass 1 and Pass 2 both call this so that sizing and filling see exactly
/// the same group list.
fn scan_vertex(csr: &Csr, v: u32, part_size: u32) -> Vec<ScannedGroup> {
    let range = csr.range_of(v);
    let mut tagged: Vec<(u32, u32, u32)> = range
        .map(|i| {
            let dst = csr.edge()[i];
            (dst / part_size, dst, csr.weight(i))
        })
        .collect();
    // Stable sort: preserves each group's original edge order, which keeps
    // the build deterministic given a fixed CSR.
    tagged.sort_by_key(|&(p, _, _)| p);

    let mut groups: Vec<ScannedGroup> = Vec::new();
    for (p, dst, w) in tagged {
        match groups.last_mut() {
            Some(last) if last.partition_id == p => last.edges.push((dst, w)),
            _ => groups.push(ScannedGroup {
                partition_id: p,
                edges: vec![(dst, w)],
            }),
        }
    }
    groups
}

struct VertexSizing {
    overflow_groups: u32,
    highedge_entries: u32,
}

fn size_vertex(groups: &[ScannedGroup]) -> VertexSizing {
    let overflow_groups = groups.len().saturating_sub(INLINE_GROUPS) as u32;
    let highedge_entries = groups
        .iter()
        .map(|g| match classify(g) {
            Encoding::Spilled => g.edges.len() as u32,
            _ => 0,
        })
        .sum();
    VertexSizing {
        overflow_groups,
        highedge_entries,
    }
}

/// Builds a [`PartitionedGraph`] from `csr` with `num_part` partitions
/// (`spec.md` §4.2).
pub fn build(csr: &Csr, num_part: u32) -> Result<PartitionedGraph, EngineError> {
    let num_v = csr.num_v();
    if num_v == 0 {
        return Err(EngineError::InvalidConfig {
            reason: "numV == 0".to_string(),
        });
    }
    if num_part == 0 {
        return Err(EngineError::InvalidConfig {
            reason: "numPart == 0".to_string(),
        });
    }
    let ps = part_size(num_v, num_part);

    // Pass 1 (sizing, parallel over vertices): for each vertex, compute how
    // many overflow-array group-slots and highedge-array entries it needs.
    let mut pl = progress_logger![
        item_name = "node",
        expected_updates = Some(num_v as usize)
    ];
    pl.start("Sizing partitioned graph...");
    let groups_per_vertex: Vec<Vec<ScannedGroup>> = (0..num_v)
        .into_par_iter()
        .map(|v| scan_vertex(csr, v, ps))
        .collect();
    let sizing: Vec<VertexSizing> = groups_per_vertex.par_iter().map(|g| size_vertex(g)).collect();
    pl.done();

    // Prefix-sum per-thread^H^H^H per-vertex counters into global offsets.
    let mut overflow_offsets = vec![0u32; num_v as usize + 1];
    let mut highedge_offsets = vec![0u32; num_v as usize + 1];
    for v in 0..num_v as usize {
        overflow_offsets[v + 1] = overflow_offsets[v] + 2 * sizing[v].overflow_groups;
        highedge_offsets[v + 1] = highedge_offsets[v] + sizing[v].highedge_entries;
    }
    let total_overflow_words = overflow_offsets[num_v as usize] as usize;
    let total_highedge_entries = highedge_offsets[num_v as usize] as usize;

    let mut overflow = vec![0u32; total_overflow_words];
    let mut highedge = vec![(0u32, 0u32); total_highedge_entries];

    // Pass 2 (fill, parallel over vertices): re-scan and write the group
    // list into PE (first INLINE_GROUPS groups) and overflow[]/highedge[]
    // for the rest. Each vertex owns a disjoint region of overflow[] and
    // highedge[], precomputed above, so concurrent writes never alias.
    let mut pl = progress_logger![
        item_name = "node",
        expected_updates = Some(num_v as usize)
    ];
    pl.start("Filling partitioned graph...");
    let overflow_slice = SyncUnsafeSlice::new(&mut overflow);
    let highedge_slice = SyncUnsafeSlice::new(&mut highedge);
    let vtx: Vec<VertexRecord> = (0..num_v as usize)
        .into_par_iter()
        .map(|v| {
            let groups = &groups_per_vertex[v];
            let mut record = VertexRecord::default();
            let deg1 = groups.len().min(INLINE_GROUPS);
            let deg2 = groups.len() - deg1;
            record.set_degrees(deg1 as u16, deg2 as u16, overflow_offsets[v]);

            let mut highedge_cursor = highedge_offsets[v] as usize;
            for (i, group) in groups.iter().enumerate() {
                let encoding = classify(group);
                let spilled = matches!(encoding, Encoding::Spilled);
                let header = pack_header(group.partition_id, group.edges.len() as u32, spilled);
                let payload = match encoding {
                    Encoding::InlineSingle(w) | Encoding::InlinePair(w) => w,
                    Encoding::Spilled => {
                        let start = highedge_cursor;
                        for (j, edge) in group.edges.iter().enumerate() {
                            unsafe {
                                *highedge_slice.get_mut_unchecked(start + j) = *edge;
                            }
                        }
                        highedge_cursor += group.edges.len();
                        start as u32
                    }
                };
                if i < INLINE_GROUPS {
                    record.set_inline(i, header, payload);
                } else {
                    let base = overflow_offsets[v] as usize + 2 * (i - INLINE_GROUPS);
                    unsafe {
                        *overflow_slice.get_mut_unchecked(base) = header;
                        *overflow_slice.get_mut_unchecked(base + 1) = payload;
                    }
                }
            }
            record
        })
        .collect();
    pl.done();

    Ok(PartitionedGraph::from_parts(
        num_v,
        num_part,
        ps,
        vtx.into_boxed_slice(),
        overflow.into_boxed_slice(),
        highedge.into_boxed_slice(),
    ))
}
