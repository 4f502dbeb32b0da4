//! Random graph generation.
//!
//! [`generate`] grows a graph one node at a time. Node `i` is created with
//! independently drawn flags and attached to nodes created before it, so
//! every forward import points to a higher index. The only imports that
//! point backwards are the explicit back-edges added with `cyclic`, which
//! makes `target <= source` an exact cycle test.
//!
//! # Livelock
//!
//! A cycle through a module that awaits at top level, or closed through a
//! dynamic import, can leave the host waiting on a dependency that only
//! settles after the waiter finishes. Two repairs keep every generated cycle
//! synchronous:
//!
//! 1. When a back-edge `node -> ancestor` is added, every node on the
//!    first-parent path from `node` up to `ancestor` loses top-level await
//!    and all of its dynamic imports.
//! 2. After construction, every node of a strongly connected component gets
//!    the same treatment. This covers cycles that extra parents close
//!    through a path other than the first-parent chain.
//!
//! Generation is reproducible: the same size, probabilities and RNG state
//! always build the same graph.

pub mod probability;

pub use probability::Probabilities;

use rand::Rng;
use tracing::debug;

use modfuzz_core::edge::EdgeFlags;
use modfuzz_core::error::CoreError;
use modfuzz_core::graph::{Graph, GraphFlags};
use modfuzz_core::id::NodeId;
use modfuzz_core::node::NodeFlags;

use crate::error::{ConfigError, GenerateError};

/// Smallest graph the generator builds: the root plus one script.
pub const MIN_SIZE: usize = 2;

fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    rng.gen::<f64>() < p
}

fn pick<R: Rng + ?Sized>(rng: &mut R, items: &[NodeId]) -> Option<NodeId> {
    if items.is_empty() {
        return None;
    }
    Some(items[rng.gen_range(0..items.len())])
}

/// Builds a random graph of `size` nodes.
pub fn generate<R: Rng + ?Sized>(
    size: usize,
    probabilities: &Probabilities,
    rng: &mut R,
) -> Result<Graph, GenerateError> {
    if size < MIN_SIZE {
        return Err(ConfigError::GraphTooSmall { size }.into());
    }
    probabilities.validate()?;

    let odds = probabilities.per_node(size);
    let mut graph_flags = GraphFlags::default();
    if chance(rng, probabilities.import_map) {
        if chance(rng, probabilities.static_import_map) {
            graph_flags.has_static_import_map = true;
        } else {
            graph_flags.has_dynamic_import_map = true;
        }
    }
    let mut graph = Graph::new(graph_flags)?;
    debug!(size, flags = %graph_flags, "generating graph");

    // Nodes allowed to import others, in creation order.
    let mut importers = vec![NodeId::ROOT];

    for _ in 1..size {
        let is_module = chance(rng, probabilities.module);
        let flags = NodeFlags {
            is_module,
            is_error: chance(rng, odds.error),
            is_not_found: chance(rng, odds.not_found),
            has_top_level_await: is_module && chance(rng, odds.top_level_await),
            has_preload: chance(rng, odds.preload),
            is_slow: chance(rng, odds.slow),
        };
        let node = graph.add_node(flags)?;

        if !is_module {
            graph.add_import(NodeId::ROOT, node, EdgeFlags::default())?;
            continue;
        }

        let mut parents = Vec::new();
        if let Some(first) = pick(rng, &importers) {
            attach(&mut graph, first, node, probabilities, rng)?;
            parents.push(first);
        }
        while parents.len() < importers.len() && chance(rng, odds.multi_parent) {
            if let Some(parent) = pick(rng, &importers) {
                if !parents.contains(&parent) {
                    attach(&mut graph, parent, node, probabilities, rng)?;
                    parents.push(parent);
                }
            }
        }

        if flags.is_not_found {
            continue;
        }
        importers.push(node);

        if chance(rng, odds.cyclic) {
            add_back_edge(&mut graph, node, probabilities, rng)?;
        }
    }

    seal_cycles(&mut graph)?;
    Ok(graph)
}

fn attach<R: Rng + ?Sized>(
    graph: &mut Graph,
    parent: NodeId,
    node: NodeId,
    probabilities: &Probabilities,
    rng: &mut R,
) -> Result<(), CoreError> {
    let flags = EdgeFlags {
        is_dynamic: chance(rng, probabilities.dynamic),
        is_bare: graph.has_import_map() && chance(rng, probabilities.bare),
    };
    graph.add_import(parent, node, flags)?;
    Ok(())
}

/// Imports a uniformly chosen first-parent ancestor of `node` (never the
/// root) and repairs the closed path.
fn add_back_edge<R: Rng + ?Sized>(
    graph: &mut Graph,
    node: NodeId,
    probabilities: &Probabilities,
    rng: &mut R,
) -> Result<(), CoreError> {
    let ancestors: Vec<NodeId> = graph
        .ancestors(node)
        .into_iter()
        .filter(|id| !id.is_root())
        .collect();
    let Some(ancestor) = pick(rng, &ancestors) else {
        return Ok(());
    };

    let flags = EdgeFlags {
        is_dynamic: false,
        is_bare: graph.has_import_map() && chance(rng, probabilities.bare),
    };
    graph.add_import(node, ancestor, flags)?;
    debug!(%node, %ancestor, "added back-edge");

    let Some(path) = graph.first_parent_path(node, ancestor) else {
        return Ok(());
    };
    let mut on_path = vec![node];
    on_path.extend(path.iter().map(|import| import.source));
    for id in on_path {
        make_synchronous(graph, id)?;
    }
    Ok(())
}

/// Clears top-level await and every dynamic import of `id`.
fn make_synchronous(graph: &mut Graph, id: NodeId) -> Result<(), CoreError> {
    for import in graph.out_edges(id) {
        if import.is_dynamic() {
            graph.set_import_dynamic(import.id, false)?;
            debug!(source = %id, target = %import.target, "cleared dynamic import on cycle");
        }
    }
    if graph.node(id).is_some_and(|node| node.has_top_level_await()) {
        graph.set_top_level_await(id, false)?;
        debug!(node = %id, "cleared top-level await on cycle");
    }
    Ok(())
}

fn seal_cycles(graph: &mut Graph) -> Result<(), CoreError> {
    for component in graph.cyclic_components() {
        for id in component {
            make_synchronous(graph, id)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generate_seeded(size: usize, probabilities: &Probabilities, seed: u64) -> Graph {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        generate(size, probabilities, &mut rng).unwrap()
    }

    #[test]
    fn rejects_undersized_graphs() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = generate(1, &Probabilities::default(), &mut rng);
        assert!(matches!(
            result,
            Err(GenerateError::Config(ConfigError::GraphTooSmall { size: 1 }))
        ));
    }

    #[test]
    fn rejects_invalid_probabilities() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let p = Probabilities {
            module: 2.0,
            ..Probabilities::default()
        };
        assert!(matches!(
            generate(4, &p, &mut rng),
            Err(GenerateError::Config(ConfigError::InvalidProbability { .. }))
        ));
    }

    #[test]
    fn all_zero_probabilities_give_classic_children_of_root() {
        let graph = generate_seeded(5, &Probabilities::none(), 7);
        assert_eq!(graph.size(), 5);
        assert_eq!(graph.out_edges(NodeId::ROOT).len(), 4);
        assert!(graph.nodes().skip(1).all(|node| node.flags() == NodeFlags::classic()));
        assert!(!graph.has_import_map());
    }

    #[test]
    fn all_modules_form_a_tree_without_extras() {
        let p = Probabilities {
            module: 1.0,
            ..Probabilities::none()
        };
        let graph = generate_seeded(8, &p, 3);
        for id in graph.node_ids().skip(1) {
            let parents = graph.in_edges(id);
            assert_eq!(parents.len(), 1);
            assert!(parents[0].source < id);
        }
        assert!(!graph.has_cycle());
    }

    #[test]
    fn same_seed_builds_same_graph() {
        let p = Probabilities::default();
        let a = generate_seeded(9, &p, 42);
        let b = generate_seeded(9, &p, 42);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn back_edges_are_synchronous() {
        let p = Probabilities {
            module: 1.0,
            cyclic: 1.0,
            top_level_await: 1.0,
            dynamic: 1.0,
            ..Probabilities::none()
        };
        for seed in 0..32 {
            let graph = generate_seeded(10, &p, seed);
            for component in graph.cyclic_components() {
                for id in component {
                    let node = graph.node(id).unwrap();
                    assert!(!node.has_top_level_await(), "{}", graph.describe());
                    assert!(graph.out_edges(id).iter().all(|i| !i.is_dynamic()));
                }
            }
            assert!(graph.validate().is_ok());
        }
    }

    #[test]
    fn back_edge_targets_a_first_parent_ancestor() {
        let p = Probabilities {
            module: 1.0,
            cyclic: 1.0,
            ..Probabilities::none()
        };
        let graph = generate_seeded(12, &p, 11);
        for import in graph.back_edges() {
            assert!(!import.target.is_root());
            assert!(graph.ancestors(import.source).contains(&import.target));
        }
    }

    #[test]
    fn classic_scripts_only_hang_off_the_root() {
        let p = Probabilities {
            module: 0.5,
            multi_parent: 1.0,
            import_map: 1.0,
            bare: 1.0,
            ..Probabilities::none()
        };
        for seed in 0..16 {
            let graph = generate_seeded(10, &p, seed);
            for node in graph.nodes().skip(1).filter(|node| !node.is_module()) {
                let parents = graph.in_edges(node.index());
                assert_eq!(parents.len(), 1);
                assert!(parents[0].source.is_root());
                assert!(!parents[0].is_bare());
            }
        }
    }
}
