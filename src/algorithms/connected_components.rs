/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Connected components via label propagation — `spec.md` §1's "synchronous
//! `do_all`-style algorithms reduce to a trivial case" over this engine's
//! priority-ordered machinery.
//!
//! Every vertex starts as its own label; `gatherFunc`'s atomic min takes the
//! smallest label seen at each vertex, so every vertex in a component
//! converges to that component's minimum vertex id.

use crate::algorithm::{Algorithm, FrontierItem, Value};
use crate::error::EngineError;
use crate::executor::{self, RunReport};
use crate::options::Options;
use crate::partitioned_graph::PartitionedGraph;

pub struct ConnectedComponents {
    step_shift: u32,
}

impl ConnectedComponents {
    pub fn new(step_shift: u32) -> Self {
        Self { step_shift }
    }

    /// `spec.md` §9's open-question note gives this exact quantization for
    /// CC: `dist < 10 ? dist >> shift : 10`, capping the bucket count so a
    /// graph with large vertex ids (used directly as labels) does not blow
    /// up OBIM's bucket range the way SSSP's `val >> stepShift` alone would.
    pub fn index(&self, item: &FrontierItem) -> u32 {
        if item.val < 10 {
            item.val >> self.step_shift
        } else {
            10
        }
    }
}

impl Algorithm for ConnectedComponents {
    /// Labels propagate unchanged along edges; edge weight is irrelevant to
    /// component membership.
    fn apply_weight(&self, _edge_weight: u32, src_val: Value) -> Value {
        src_val
    }
}

/// Runs label-propagation connected components, seeding every vertex with
/// its own id as its initial label.
pub fn run(graph: &PartitionedGraph, options: Options) -> Result<RunReport, EngineError> {
    let algorithm = ConnectedComponents::new(options.step_shift);
    let initial: Vec<FrontierItem> = (0..graph.num_v())
        .map(|v| FrontierItem { vid: v, val: v })
        .collect();
    executor::run(graph, &initial, &algorithm, |item| algorithm.index(item), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::Csr;
    use crate::partitioner;

    #[test]
    fn two_triangles_form_two_components() {
        // Triangle A: 0-1-2. Triangle B: 3-4-5. No edges between them.
        let csr = Csr::new(
            6,
            vec![0, 2, 4, 6, 8, 10, 12],
            vec![1, 2, 0, 2, 0, 1, 4, 5, 3, 5, 3, 4],
            None,
        );
        let graph = partitioner::build(&csr, 3).unwrap();
        let report = run(&graph, Options::default()).unwrap();

        assert_eq!(report.state[0], report.state[1]);
        assert_eq!(report.state[1], report.state[2]);
        assert_eq!(report.state[3], report.state[4]);
        assert_eq!(report.state[4], report.state[5]);
        assert_ne!(report.state[0], report.state[3]);
        assert_eq!(report.state[0], 0);
        assert_eq!(report.state[3], 3);
    }

    #[test]
    fn isolated_vertex_is_its_own_component() {
        let csr = Csr::new(2, vec![0, 0, 0], vec![], None);
        let graph = partitioner::build(&csr, 1).unwrap();
        let report = run(&graph, Options::default()).unwrap();
        assert_eq!(report.state, vec![0, 1]);
    }
}
