//! Partitioning round-trip and invariant properties (`spec.md` §3/§4.2).

use priograph::partitioner;
use priograph::Csr;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Walks every group of every vertex back out through the public
/// `neighbors()` API and returns the full edge multiset as `(src, dst,
/// weight)` triples, for comparison against the CSR it was built from.
fn collect_edges(csr: &Csr, graph: &priograph::PartitionedGraph) -> Vec<(u32, u32, u32)> {
    let mut out = Vec::new();
    for v in 0..csr.num_v() {
        for group in graph.neighbors(v) {
            for (dst, weight) in group.edges() {
                assert_eq!(graph.partition_of(dst), group.partition_id);
                out.push((v, dst, weight));
            }
        }
    }
    out
}

fn csr_edges(csr: &Csr) -> Vec<(u32, u32, u32)> {
    let mut out = Vec::new();
    for v in 0..csr.num_v() {
        let start = csr.offset()[v as usize] as usize;
        let end = csr.offset()[v as usize + 1] as usize;
        for i in start..end {
            out.push((v, csr.edge()[i], csr.weight(i)));
        }
    }
    out
}

fn sorted(mut v: Vec<(u32, u32, u32)>) -> Vec<(u32, u32, u32)> {
    v.sort_unstable();
    v
}

#[test]
fn partitioning_preserves_every_edge() -> anyhow::Result<()> {
    let csr = Csr::new(
        6,
        vec![0, 2, 4, 6, 8, 10, 12],
        vec![1, 2, 0, 2, 0, 1, 4, 5, 3, 5, 3, 4],
        Some(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]),
    );
    let graph = partitioner::build(&csr, 3)?;
    assert_eq!(sorted(csr_edges(&csr)), sorted(collect_edges(&csr, &graph)));
    Ok(())
}

#[test]
fn rebuilding_the_same_csr_is_deterministic() -> anyhow::Result<()> {
    let csr = Csr::new(
        6,
        vec![0, 2, 4, 6, 8, 10, 12],
        vec![1, 2, 0, 2, 0, 1, 4, 5, 3, 5, 3, 4],
        None,
    );
    let first = partitioner::build(&csr, 3)?;
    let second = partitioner::build(&csr, 3)?;
    assert_eq!(
        sorted(collect_edges(&csr, &first)),
        sorted(collect_edges(&csr, &second))
    );
    Ok(())
}

#[test]
fn vertex_with_exactly_two_edges_to_one_partition_uses_inline_pair() -> anyhow::Result<()> {
    // Partition size 4: vertices 0..3 in partition 0. Vertex 0 has exactly
    // two out-edges, both landing in partition 0.
    let csr = Csr::new(4, vec![0, 2, 2, 2, 2], vec![1, 2], Some(vec![5, 6]));
    let graph = partitioner::build(&csr, 1)?;
    let groups: Vec<_> = graph.neighbors(0).collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 2);
    assert!(matches!(
        groups[0].edges,
        priograph::partitioned_graph::EdgeSource::Inline2(_)
    ));
    Ok(())
}

/// Random CSRs, rebuilt under several partition counts, must always preserve
/// every edge and keep `partition_of` consistent with each group's header.
#[test]
fn randomized_partitioning_preserves_edges_across_seeds() -> anyhow::Result<()> {
    for seed in 0u64..20 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let num_v = rng.gen_range(1..40);
        let mut offset = vec![0u32];
        let mut edge = Vec::new();
        let mut weight = Vec::new();
        for _ in 0..num_v {
            let out_degree = rng.gen_range(0..12);
            let mut seen = HashSet::new();
            for _ in 0..out_degree {
                let dst = rng.gen_range(0..num_v);
                if seen.insert(dst) {
                    edge.push(dst);
                    weight.push(rng.gen_range(1..1000));
                }
            }
            offset.push(edge.len() as u32);
        }
        let csr = Csr::new(num_v, offset, edge, Some(weight));
        let num_part = rng.gen_range(1..=num_v);
        let graph = partitioner::build(&csr, num_part)?;

        assert_eq!(sorted(csr_edges(&csr)), sorted(collect_edges(&csr, &graph)));
        assert_eq!(graph.num_v(), num_v);
        assert_eq!(graph.num_part(), num_part);
    }
    Ok(())
}
