use std::collections::HashSet;

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use modfuzz_check::oracle::{ExpectedTrace, Expectation, OracleConfig, TestRun, Verdict};
use modfuzz_check::{generate, Probabilities};
use modfuzz_core::graph::Graph;
use modfuzz_core::id::NodeId;

fn arb_probability() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), Just(1.0), 0.0f64..=1.0]
}

fn arb_probabilities() -> impl Strategy<Value = Probabilities> {
    (
        (
            arb_probability(),
            arb_probability(),
            arb_probability(),
            arb_probability(),
            arb_probability(),
            arb_probability(),
        ),
        (
            arb_probability(),
            arb_probability(),
            arb_probability(),
            arb_probability(),
            arb_probability(),
            arb_probability(),
        ),
    )
        .prop_map(
            |(
                (import_map, static_import_map, module, multi_parent, cyclic, not_found),
                (error, top_level_await, slow, preload, dynamic, bare),
            )| Probabilities {
                import_map,
                static_import_map,
                module,
                multi_parent,
                cyclic,
                not_found,
                error,
                top_level_await,
                slow,
                preload,
                dynamic,
                bare,
            },
        )
}

fn arb_graph() -> impl Strategy<Value = Graph> {
    (2usize..16, arb_probabilities(), any::<u64>()).prop_map(|(size, probabilities, seed)| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        generate(size, &probabilities, &mut rng).unwrap()
    })
}

/// Static closure of `start`, `start` included.
fn closure(graph: &Graph, start: NodeId) -> Vec<NodeId> {
    let mut reached = Vec::new();
    graph.depth_first_search(
        start,
        &mut HashSet::new(),
        |import: &modfuzz_core::edge::Import| !import.is_dynamic(),
        |id| reached.push(id),
    );
    reached
}

/// The event lines a correct host would post for an exact graph.
fn events_for(trace: &ExpectedTrace) -> Vec<String> {
    let mut lines = Vec::new();
    for &node in &trace.order {
        lines.push(format!("start {node}"));
        if trace.errored[node.index()] {
            lines.push(format!("error GeneratedError {node}"));
        }
        if trace.finished[node.index()] {
            lines.push(format!("finish {node}"));
        }
    }
    lines.push("loaded".to_string());
    lines
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn serialized_form_round_trips(graph in arb_graph()) {
        let text = graph.to_string();
        let back: Graph = text.parse().unwrap();
        prop_assert_eq!(&back, &graph);
        prop_assert_eq!(back.to_string(), text);
    }

    #[test]
    fn cycles_never_suspend(graph in arb_graph()) {
        for component in graph.cyclic_components() {
            for id in component {
                let node = graph.node(id).unwrap();
                prop_assert!(!node.has_top_level_await(), "{}", graph.describe());
                prop_assert!(graph.out_edges(id).iter().all(|i| !i.is_dynamic()));
            }
        }
    }

    #[test]
    fn classic_scripts_hang_off_the_root(graph in arb_graph()) {
        for node in graph.nodes().filter(|n| !n.is_root() && !n.is_module()) {
            let parents = graph.in_edges(node.index());
            prop_assert_eq!(parents.len(), 1);
            prop_assert!(parents[0].source.is_root());
            prop_assert!(!parents[0].is_dynamic() && !parents[0].is_bare());
        }
    }

    #[test]
    fn generated_graphs_validate(graph in arb_graph()) {
        prop_assert!(graph.validate().is_ok());
        for import in graph.imports() {
            prop_assert!(!import.target.is_root());
            if import.is_bare() {
                prop_assert!(graph.has_import_map());
            }
        }
    }

    #[test]
    fn exact_expectation_is_deterministic_and_self_consistent(graph in arb_graph()) {
        let Expectation::Exact(expected) = Expectation::for_graph(&graph) else {
            return Ok(());
        };
        prop_assert_eq!(&ExpectedTrace::for_graph(&graph), &expected);

        let mut seen = HashSet::new();
        prop_assert!(expected.order.iter().all(|id| seen.insert(*id)));

        let mut run = TestRun::new(graph.clone(), OracleConfig::default());
        let verdict = run.feed(events_for(&expected)).unwrap();
        prop_assert_eq!(verdict, &Verdict::Ok);
    }

    #[test]
    fn nothing_depending_on_an_error_finishes(graph in arb_graph()) {
        let Expectation::Exact(expected) = Expectation::for_graph(&graph) else {
            return Ok(());
        };
        for id in graph.node_ids().skip(1) {
            let depends_on_error = closure(&graph, id)
                .into_iter()
                .any(|dep| graph.node(dep).is_some_and(|n| n.is_error()));
            if depends_on_error {
                prop_assert!(!expected.finished[id.index()], "{}", graph.describe());
            }
        }
    }

    #[test]
    fn missing_scripts_never_start(graph in arb_graph()) {
        let Expectation::Exact(expected) = Expectation::for_graph(&graph) else {
            return Ok(());
        };
        for node in graph.nodes().filter(|n| n.is_not_found()) {
            prop_assert!(!expected.started[node.index().index()]);
        }
    }
}

// Worked examples.

fn check(graph: &str, events: &[&str]) -> Verdict {
    let mut run = TestRun::new(graph.parse().unwrap(), OracleConfig::default());
    run.feed(events.iter().copied()).unwrap().clone()
}

#[test]
fn static_chain_loads_leaf_first() {
    let graph = "3;1,1;m1,2;m0";
    assert!(check(graph, &["start 2", "finish 2", "start 1", "finish 1", "loaded"]).is_ok());
    assert!(!check(graph, &["start 1", "start 2", "finish 2", "finish 1", "loaded"]).is_ok());
}

#[test]
fn erroring_leaf_leaves_chain_unfinished() {
    let graph = "3;1,1;m1,2;me0";
    let verdict = check(
        graph,
        &["start 2", "error GeneratedError 2", "start 1", "loaded"],
    );
    assert!(verdict.is_ok());

    let verdict = check(
        graph,
        &["start 2", "error GeneratedError 2", "start 1", "finish 1", "loaded"],
    );
    assert!(!verdict.is_ok());
}

#[test]
fn missing_module_is_never_observed() {
    let graph = "2;1,1;mn0";
    assert!(check(graph, &["loaded"]).is_ok());
    assert!(!check(graph, &["start 1", "loaded"]).is_ok());
}

#[test]
fn back_edge_only_requires_completion() {
    let graph = "4;1,1;m1,2;m1,3;m1,1";
    let parsed: Graph = graph.parse().unwrap();
    assert!(parsed.has_cycle());

    let any_order = [
        "start 3", "start 1", "start 2", "finish 1", "finish 3", "finish 2", "loaded",
    ];
    assert!(check(graph, &any_order).is_ok());
    assert!(!check(graph, &["start 3", "finish 3", "loaded"]).is_ok());
}

#[test]
fn missing_sibling_does_not_excuse_an_idle_host() {
    let graph = "3;2,1,2;mt0;mn0";
    assert!(!check(graph, &["loaded"]).is_ok());
    assert!(check(graph, &["start 1", "finish 1", "loaded"]).is_ok());
}
