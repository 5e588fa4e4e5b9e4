//! The information-flow graph: a directed graph whose nodes are step indexes
//! (including the [`PRESTATE`] and [`TEST_DEFAULT`] sentinels) and whose
//! edges record "this step's output depended on that step's output".
//!
//! Built from the [`StorageAccesses`] every parsed [`Instruction`] carries;
//! see [`StorageAccesses::get_dependencies`] for how one access becomes one
//! or more edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::instructions::Instruction;
use crate::step_index::{is_sentinel, StepIndex};

/// One dependency edge: `consumer` read a byte range last produced by `producer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub consumer: StepIndex,
    pub producer: StepIndex,
}

/// The full instruction-level data-dependency graph for one trace.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    nodes: BTreeSet<StepIndex>,
    edges: BTreeSet<Edge>,
}

impl FlowGraph {
    pub fn new() -> Self {
        FlowGraph::default()
    }

    /// Walks every instruction's recorded accesses and adds one edge per
    /// provenance-contiguous slice, per section 4.9.
    pub fn build(instructions: &[Instruction]) -> FlowGraph {
        let mut graph = FlowGraph::new();
        for instr in instructions {
            graph.nodes.insert(instr.step_index);
            for (producer, _byte_subgroup) in instr.flow.accesses.get_dependencies() {
                graph.nodes.insert(producer);
                graph.edges.insert(Edge { consumer: instr.step_index, producer });
            }
        }
        graph
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StepIndex> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// The set of step indexes `step`'s instruction directly depended on.
    pub fn dependencies_of(&self, step: StepIndex) -> BTreeSet<StepIndex> {
        self.edges
            .iter()
            .filter(|e| e.consumer == step)
            .map(|e| e.producer)
            .collect()
    }

    /// The set of step indexes that directly depend on `step`'s output.
    pub fn dependents_of(&self, step: StepIndex) -> BTreeSet<StepIndex> {
        self.edges
            .iter()
            .filter(|e| e.producer == step)
            .map(|e| e.consumer)
            .collect()
    }

    /// True if every edge strictly decreases step index (sentinels always
    /// count as "earlier" than any real step), i.e. the graph cannot contain
    /// a cycle among real steps.
    pub fn is_acyclic(&self) -> bool {
        self.edges.iter().all(|e| {
            if is_sentinel(e.producer) {
                true
            } else {
                e.producer < e.consumer
            }
        })
    }

    /// Counts edges grouped by producer, for a quick "what fed the most
    /// downstream steps" summary.
    pub fn fan_out_counts(&self) -> BTreeMap<StepIndex, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.producer).or_insert(0) += 1;
        }
        counts
    }
}
