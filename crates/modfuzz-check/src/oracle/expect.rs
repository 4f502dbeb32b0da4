//! Expected observations for a graph.
//!
//! When a graph has no cycle and nothing evaluates asynchronously, the
//! host's evaluation order is fully determined and [`ExpectedTrace`] predicts
//! it exactly. Otherwise only [`Invariants`] can be checked.
//!
//! # Exact order
//!
//! Classic children of the root run first, in declared order, during
//! document parsing. Then each module the root imports is evaluated, in
//! declared order, by a post-order search that shares one visited set across
//! all of them:
//!
//! - a node is recorded (started, appended to the order) when the search
//!   finishes it, so dependencies come before their importers;
//! - an erroring node marks its search as failed. Nodes still on the search
//!   path above it are recorded as started but not finished, and their
//!   remaining imports are skipped;
//! - nodes recorded without finishing are poisoned. A later search reaching a
//!   poisoned node fails the same way without recording it again;
//! - a root module whose static closure contains a not-found node fails to
//!   fetch, so nothing in that closure is recorded for it.

use std::collections::HashSet;

use serde::Serialize;

use modfuzz_core::edge::Import;
use modfuzz_core::graph::{Graph, Visitor};
use modfuzz_core::id::NodeId;

/// The exact observation a correct host produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedTrace {
    pub order: Vec<NodeId>,
    pub started: Vec<bool>,
    pub finished: Vec<bool>,
    pub errored: Vec<bool>,
}

/// Weaker checks for graphs whose order cannot be predicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invariants {
    /// Nodes that must start and finish.
    pub must_finish: Vec<NodeId>,
    /// Nodes that must not finish (erroring scripts).
    pub must_not_finish: Vec<NodeId>,
    /// Nodes that must neither start nor finish (missing resources).
    pub must_not_start: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    Exact(ExpectedTrace),
    Inexact(Invariants),
}

impl Expectation {
    pub fn for_graph(graph: &Graph) -> Self {
        if is_exact(graph) {
            Expectation::Exact(ExpectedTrace::for_graph(graph))
        } else {
            Expectation::Inexact(Invariants::for_graph(graph))
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Expectation::Exact(_))
    }
}

/// Whether the graph's evaluation order is fully determined.
pub fn is_exact(graph: &Graph) -> bool {
    !graph.has_async_evaluation() && !graph.has_cycle()
}

struct ExactSearch<'a> {
    graph: &'a Graph,
    trace: &'a mut ExpectedTrace,
    poisoned: &'a mut HashSet<NodeId>,
    failed: bool,
}

impl Visitor for ExactSearch<'_> {
    fn follow(&mut self, import: &Import) -> bool {
        if self.failed {
            return false;
        }
        if self.poisoned.contains(&import.target) {
            self.failed = true;
            return false;
        }
        true
    }

    fn finish(&mut self, node: NodeId) {
        let is_error = self.graph.node(node).is_some_and(|n| n.is_error());
        self.trace.record_start(node, is_error);
        if is_error {
            self.failed = true;
        }
        if self.failed {
            self.poisoned.insert(node);
        } else {
            self.trace.finished[node.index()] = true;
        }
    }
}

impl ExpectedTrace {
    fn empty(size: usize) -> Self {
        ExpectedTrace {
            order: Vec::new(),
            started: vec![false; size],
            finished: vec![false; size],
            errored: vec![false; size],
        }
    }

    fn record_start(&mut self, node: NodeId, is_error: bool) {
        self.order.push(node);
        self.started[node.index()] = true;
        self.errored[node.index()] = is_error;
    }

    /// Computes the exact trace. Only meaningful when [`is_exact`] holds.
    pub fn for_graph(graph: &Graph) -> Self {
        let mut trace = ExpectedTrace::empty(graph.size());
        let roots = graph.out_edges(NodeId::ROOT);

        for import in &roots {
            let Some(script) = graph.node(import.target) else {
                continue;
            };
            if script.is_module() || script.is_not_found() {
                continue;
            }
            trace.record_start(script.index(), script.is_error());
            trace.finished[script.index().index()] = !script.is_error();
        }

        let mut visited = HashSet::new();
        let mut poisoned = HashSet::new();
        for import in &roots {
            let target = import.target;
            if !graph.node(target).is_some_and(|n| n.is_module()) {
                continue;
            }
            if closure_has_not_found(graph, target) {
                continue;
            }
            let mut search = ExactSearch {
                graph,
                trace: &mut trace,
                poisoned: &mut poisoned,
                failed: false,
            };
            graph.depth_first_search_with(target, &mut visited, &mut search);
        }

        trace
    }
}

fn closure_has_not_found(graph: &Graph, start: NodeId) -> bool {
    let mut found = false;
    graph.depth_first_search(
        start,
        &mut HashSet::new(),
        |import: &Import| !import.is_dynamic(),
        |id| found |= graph.node(id).is_some_and(|n| n.is_not_found()),
    );
    found
}

/// Non-root nodes a correct host evaluates despite missing resources: every
/// node reachable from the root through nodes whose static closure fetches
/// completely.
fn loadable(graph: &Graph) -> Vec<NodeId> {
    let complete: HashSet<NodeId> = graph
        .node_ids()
        .filter(|&id| !closure_has_not_found(graph, id))
        .collect();
    let mut reached = Vec::new();
    graph.depth_first_search(
        NodeId::ROOT,
        &mut HashSet::new(),
        |import: &Import| complete.contains(&import.target),
        |id| {
            if !id.is_root() {
                reached.push(id);
            }
        },
    );
    reached.sort();
    reached
}

impl Invariants {
    pub fn for_graph(graph: &Graph) -> Self {
        let scripts = || graph.nodes().filter(|node| !node.is_root());
        let must_finish = if graph.has_error() {
            Vec::new()
        } else {
            loadable(graph)
        };
        Invariants {
            must_finish,
            must_not_finish: scripts()
                .filter(|node| node.is_error())
                .map(|node| node.index())
                .collect(),
            must_not_start: scripts()
                .filter(|node| node.is_not_found())
                .map(|node| node.index())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(text: &str) -> ExpectedTrace {
        let graph: Graph = text.parse().unwrap();
        match Expectation::for_graph(&graph) {
            Expectation::Exact(trace) => trace,
            Expectation::Inexact(_) => panic!("{text} should be exact"),
        }
    }

    fn ids(raw: &[u32]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId).collect()
    }

    #[test]
    fn static_chain_runs_dependencies_first() {
        let trace = exact("3;1,1;m1,2;m0");
        assert_eq!(trace.order, ids(&[2, 1]));
        assert_eq!(trace.started, [false, true, true]);
        assert_eq!(trace.finished, [false, true, true]);
    }

    #[test]
    fn error_stops_the_importing_chain() {
        let trace = exact("3;1,1;m1,2;me0");
        assert_eq!(trace.order, ids(&[2, 1]));
        assert_eq!(trace.started, [false, true, true]);
        assert_eq!(trace.finished, [false, false, false]);
        assert_eq!(trace.errored, [false, false, true]);
    }

    #[test]
    fn not_found_module_never_starts() {
        let trace = exact("2;1,1;mn0");
        assert!(trace.order.is_empty());
        assert_eq!(trace.started, [false, false]);
        assert_eq!(trace.finished, [false, false]);
    }

    #[test]
    fn not_found_dependency_blocks_whole_root_script() {
        // 0 -> 1 -> 2(missing), 0 -> 3
        let trace = exact("4;2,1,3;m1,2;mn0;m0");
        assert_eq!(trace.order, ids(&[3]));
        assert_eq!(trace.started, [false, false, false, true]);
    }

    #[test]
    fn classic_scripts_run_before_modules() {
        // 0 -> 1 (module), 0 -> 2 (classic), 0 -> 3 (classic, error)
        let trace = exact("4;3,1,2,3;m0;0;e0");
        assert_eq!(trace.order, ids(&[2, 3, 1]));
        assert_eq!(trace.finished, [false, true, true, false]);
    }

    #[test]
    fn failure_skips_later_siblings() {
        // 0 -> 1, 1 -> 2 (error), 1 -> 3
        let trace = exact("4;1,1;m2,2,3;me0;m0");
        assert_eq!(trace.order, ids(&[2, 1]));
        assert!(!trace.started[3]);
    }

    #[test]
    fn poisoned_node_fails_later_root_script() {
        // 0 -> 1 -> 3 (error), 0 -> 2 -> 3
        let trace = exact("4;2,1,2;m1,3;m1,3;me0");
        assert_eq!(trace.order, ids(&[3, 1, 2]));
        assert_eq!(trace.started, [false, true, true, true]);
        assert_eq!(trace.finished, [false, false, false, false]);
        assert_eq!(trace.errored, [false, false, false, true]);
    }

    #[test]
    fn shared_dependency_is_recorded_once() {
        // 0 -> 1 -> 3, 0 -> 2 -> 3
        let trace = exact("4;2,1,2;m1,3;m1,3;m0");
        assert_eq!(trace.order, ids(&[3, 1, 2]));
        assert_eq!(trace.finished, [false, true, true, true]);
    }

    #[test]
    fn cycles_and_async_fall_back_to_invariants() {
        let graph: Graph = "4;1,1;m1,2;m1,3;m1,1".parse().unwrap();
        assert!(graph.has_cycle());
        assert_eq!(
            Expectation::for_graph(&graph),
            Expectation::Inexact(Invariants {
                must_finish: ids(&[1, 2, 3]),
                must_not_finish: vec![],
                must_not_start: vec![],
            })
        );

        let graph: Graph = "3;2,1,2;mte0;mn0".parse().unwrap();
        assert_eq!(
            Expectation::for_graph(&graph),
            Expectation::Inexact(Invariants {
                must_finish: vec![],
                must_not_finish: ids(&[1]),
                must_not_start: ids(&[2]),
            })
        );
    }

    #[test]
    fn missing_module_does_not_excuse_unrelated_nodes() {
        // 0 -> 1 (awaits), 0 -> 2 (missing)
        let graph: Graph = "3;2,1,2;mt0;mn0".parse().unwrap();
        assert_eq!(
            Expectation::for_graph(&graph),
            Expectation::Inexact(Invariants {
                must_finish: ids(&[1]),
                must_not_finish: vec![],
                must_not_start: ids(&[2]),
            })
        );
    }

    #[test]
    fn nodes_behind_a_missing_fetch_are_excused() {
        // 0 -> 1 (awaits) -> 2 -> 3 (missing), 1 -> 4, 0 -> 4
        let graph: Graph = "5;2,1,4;mt2,2,4;m1,3;mn0;m0".parse().unwrap();
        let Expectation::Inexact(invariants) = Expectation::for_graph(&graph) else {
            panic!("awaiting graph should be inexact");
        };
        assert_eq!(invariants.must_finish, ids(&[4]));
        assert_eq!(invariants.must_not_start, ids(&[3]));
    }
}
