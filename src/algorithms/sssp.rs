/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Single-source shortest paths — the representative algorithm `spec.md`
//! names throughout §4.6/§4.7.

use crate::algorithm::{Algorithm, FrontierItem, Value};
use crate::error::EngineError;
use crate::executor::{self, RunReport};
use crate::options::Options;
use crate::partitioned_graph::PartitionedGraph;

/// Delta-stepping SSSP: `applyWeight` adds the edge weight, `filter`/`gather`
/// use [`Algorithm`]'s default monotone atomic-min behavior.
pub struct Sssp {
    step_shift: u32,
}

impl Sssp {
    pub fn new(step_shift: u32) -> Self {
        Self { step_shift }
    }

    /// `Index = val >> stepShift` (`spec.md` §4.4a).
    pub fn index(&self, item: &FrontierItem) -> u32 {
        item.val >> self.step_shift
    }
}

impl Algorithm for Sssp {
    fn apply_weight(&self, edge_weight: u32, src_val: Value) -> Value {
        src_val.saturating_add(edge_weight)
    }
}

/// Runs SSSP from `source`, seeding `distance[source] = 0` and leaving every
/// other vertex at `MAX_VALUE` until Gather relaxes it (`spec.md` §8,
/// "startNode isolated" boundary case falls directly out of this).
pub fn run(graph: &PartitionedGraph, source: u32, options: Options) -> Result<RunReport, EngineError> {
    let algorithm = Sssp::new(options.step_shift);
    let initial = [FrontierItem { vid: source, val: 0 }];
    executor::run(graph, &initial, &algorithm, |item| algorithm.index(item), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::Csr;
    use crate::partitioner;

    fn path_csr() -> Csr {
        // 0 -(1)-> 1 -(2)-> 2 -(3)-> 3
        Csr::new(
            4,
            vec![0, 1, 2, 3, 3],
            vec![1, 2, 3],
            Some(vec![1, 2, 3]),
        )
    }

    #[test]
    fn distances_accumulate_along_a_path() {
        let csr = path_csr();
        let graph = partitioner::build(&csr, 2).unwrap();
        let report = run(&graph, 0, Options::default()).unwrap();
        assert_eq!(report.state, vec![0, 1, 3, 6]);
    }

    #[test]
    fn isolated_source_leaves_everyone_else_unreached() {
        let csr = Csr::new(3, vec![0, 0, 0, 0], vec![], None);
        let graph = partitioner::build(&csr, 1).unwrap();
        let report = run(&graph, 0, Options::default()).unwrap();
        assert_eq!(report.state[0], 0);
        assert_eq!(report.state[1], crate::algorithm::MAX_VALUE);
        assert_eq!(report.state[2], crate::algorithm::MAX_VALUE);
    }

    #[test]
    fn running_twice_is_idempotent() {
        let csr = path_csr();
        let graph = partitioner::build(&csr, 2).unwrap();
        let first = run(&graph, 0, Options::default()).unwrap();
        let second = run(&graph, 0, Options::default()).unwrap();
        assert_eq!(first.state, second.state);
    }
}
