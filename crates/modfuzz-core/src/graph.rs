//! Graph: the whole test case.
//!
//! [`Graph`] wraps a petgraph `DiGraph` whose node weights are [`Node`]s and
//! whose edge weights are [`EdgeFlags`]. Node indices are creation ordinals:
//! node 0 is the HTML document root and every other node is a script the
//! root loads directly or transitively.
//!
//! # Ordering
//!
//! petgraph hands out adjacent edges most-recent-first. The declared import
//! order matters to the host, so every adjacency query sorts by [`EdgeId`],
//! which grows in insertion order.
//!
//! # Freezing
//!
//! A graph is built once (by the generator or the serializer) and is then
//! read-only. Two caches enforce that: rendering a node caches its source and
//! freezes that node's imports, and serializing the graph caches the string
//! and freezes the whole graph. Mutators return
//! [`CoreError::SourceAlreadyGenerated`] or [`CoreError::GraphFrozen`]
//! afterwards.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use smallvec::SmallVec;

use crate::codec;
use crate::edge::{EdgeFlags, Import};
use crate::error::{CoreError, ParseError};
use crate::flags::{flag_set, FlagSet};
use crate::id::{EdgeId, NodeId};
use crate::node::{Node, NodeFlags};

flag_set! {
    /// Graph-level flags. The two import-map kinds are mutually exclusive.
    pub struct GraphFlags {
        /// The root declares an inline `<script type="importmap">`.
        has_static_import_map => "hasStaticImportMap",
        /// The root inserts its import map from a script at load time.
        has_dynamic_import_map => "hasDynamicImportMap",
    }
}

/// How the root document declares its import map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMapKind {
    Static,
    Dynamic,
}

/// Adjacency list of one node, in declared order.
pub type Imports = SmallVec<[Import; 4]>;

/// Post-order visitor for [`Graph::depth_first_search_with`].
pub trait Visitor {
    /// Decides whether the search descends along `import`. Called for every
    /// outgoing import of a node being expanded, including imports of
    /// already-visited targets.
    fn follow(&mut self, _import: &Import) -> bool {
        true
    }

    /// Called once per visited node, after all of its followed imports.
    fn finish(&mut self, node: NodeId);
}

struct FnVisitor<F, V> {
    filter: F,
    visit: V,
}

impl<F, V> Visitor for FnVisitor<F, V>
where
    F: FnMut(&Import) -> bool,
    V: FnMut(NodeId),
{
    fn follow(&mut self, import: &Import) -> bool {
        (self.filter)(import)
    }

    fn finish(&mut self, node: NodeId) {
        (self.visit)(node)
    }
}

struct Frame {
    node: NodeId,
    imports: Imports,
    next: usize,
}

/// A module-loading test case.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    flags: GraphFlags,
    imports: DiGraph<Node, EdgeFlags, u32>,
    #[serde(skip)]
    serialized: OnceLock<String>,
}

impl Graph {
    /// Creates a graph holding only the document root.
    pub fn new(flags: GraphFlags) -> Result<Self, CoreError> {
        if flags.has_static_import_map && flags.has_dynamic_import_map {
            return Err(CoreError::ConflictingImportMaps);
        }
        let mut imports = DiGraph::default();
        imports.add_node(Node::new(NodeId::ROOT, NodeFlags::default()));
        Ok(Graph {
            flags,
            imports,
            serialized: OnceLock::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn flags(&self) -> GraphFlags {
        self.flags
    }

    /// Number of nodes, root included.
    pub fn size(&self) -> usize {
        self.imports.node_count()
    }

    pub fn root(&self) -> &Node {
        &self.imports[NodeIndex::new(0)]
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.imports.node_weight(id.into())
    }

    fn node_or_err(&self, id: NodeId) -> Result<&Node, CoreError> {
        self.node(id).ok_or(CoreError::NodeNotFound { id })
    }

    /// All node IDs in index order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.size() as u32).map(NodeId)
    }

    /// All nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.imports
            .node_indices()
            .map(move |idx| &self.imports[idx])
    }

    pub fn import_map_kind(&self) -> Option<ImportMapKind> {
        if self.flags.has_static_import_map {
            Some(ImportMapKind::Static)
        } else if self.flags.has_dynamic_import_map {
            Some(ImportMapKind::Dynamic)
        } else {
            None
        }
    }

    pub fn has_import_map(&self) -> bool {
        self.import_map_kind().is_some()
    }

    /// Outgoing imports of `id` in declared order.
    pub fn out_edges(&self, id: NodeId) -> Imports {
        self.adjacent(id, Direction::Outgoing)
    }

    /// Incoming imports of `id` in insertion order.
    pub fn in_edges(&self, id: NodeId) -> Imports {
        self.adjacent(id, Direction::Incoming)
    }

    fn adjacent(&self, id: NodeId, direction: Direction) -> Imports {
        let idx: NodeIndex<u32> = id.into();
        if self.imports.node_weight(idx).is_none() {
            return Imports::new();
        }
        let mut edges: Imports = self
            .imports
            .edges_directed(idx, direction)
            .map(|edge| Import {
                id: edge.id().into(),
                source: edge.source().into(),
                target: edge.target().into(),
                flags: *edge.weight(),
            })
            .collect();
        edges.sort_by_key(|import| import.id);
        edges
    }

    /// Every import in the graph, in insertion order.
    pub fn imports(&self) -> impl Iterator<Item = Import> + '_ {
        self.imports.edge_references().map(|edge| Import {
            id: edge.id().into(),
            source: edge.source().into(),
            target: edge.target().into(),
            flags: *edge.weight(),
        })
    }

    pub fn import(&self, id: EdgeId) -> Option<Import> {
        let (source, target) = self.imports.edge_endpoints(id.into())?;
        let flags = *self.imports.edge_weight(id.into())?;
        Some(Import {
            id,
            source: source.into(),
            target: target.into(),
            flags,
        })
    }

    /// The import that first attached `id` to the graph.
    pub fn first_parent(&self, id: NodeId) -> Option<Import> {
        self.in_edges(id).first().copied()
    }

    /// Strict ancestors of `id` along the first-parent chain, nearest first,
    /// ending at the root. Stops early if the chain loops.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = id;
        while let Some(parent) = self.first_parent(current) {
            if !seen.insert(parent.source) {
                break;
            }
            chain.push(parent.source);
            current = parent.source;
        }
        chain
    }

    /// The first-parent imports leading from `ancestor` down to `node`, listed
    /// from `node` upwards. `None` if `ancestor` is not on the chain.
    pub fn first_parent_path(&self, node: NodeId, ancestor: NodeId) -> Option<Vec<Import>> {
        let mut path = Vec::new();
        let mut seen = HashSet::from([node]);
        let mut current = node;
        while current != ancestor {
            let parent = self.first_parent(current)?;
            if !seen.insert(parent.source) {
                return None;
            }
            path.push(parent);
            current = parent.source;
        }
        Some(path)
    }

    // -----------------------------------------------------------------------
    // Predicates
    // -----------------------------------------------------------------------

    /// Any top-level await or any dynamic import.
    pub fn has_async_evaluation(&self) -> bool {
        self.nodes().any(Node::has_top_level_await) || self.has_dynamic_import()
    }

    pub fn has_dynamic_import(&self) -> bool {
        self.imports().any(|import| import.is_dynamic())
    }

    pub fn has_error(&self) -> bool {
        self.nodes().any(Node::is_error)
    }

    pub fn has_not_found(&self) -> bool {
        self.nodes().any(Node::is_not_found)
    }

    /// Any import whose target index is not greater than its source index.
    pub fn has_cycle(&self) -> bool {
        self.imports().any(|import| import.is_back_edge())
    }

    pub fn back_edges(&self) -> impl Iterator<Item = Import> + '_ {
        self.imports().filter(Import::is_back_edge)
    }

    /// Strongly connected components that contain a cycle, each sorted by
    /// node index.
    pub fn cyclic_components(&self) -> Vec<Vec<NodeId>> {
        tarjan_scc(&self.imports)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&idx| self.imports.contains_edge(idx, idx))
            })
            .map(|component| {
                let mut ids: Vec<NodeId> = component.into_iter().map(NodeId::from).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Depth-first search from `start` in declared import order, calling the
    /// visitor's `finish` in post-order.
    ///
    /// `visited` is shared with the caller so several searches can split one
    /// visit budget; a node already in it is never entered again. That also
    /// keeps the search finite on cyclic graphs.
    pub fn depth_first_search_with<V: Visitor>(
        &self,
        start: NodeId,
        visited: &mut HashSet<NodeId>,
        visitor: &mut V,
    ) {
        if self.node(start).is_none() || !visited.insert(start) {
            return;
        }

        let mut stack = vec![Frame {
            node: start,
            imports: self.out_edges(start),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            match frame.imports.get(frame.next).copied() {
                Some(import) => {
                    frame.next += 1;
                    if visitor.follow(&import) && visited.insert(import.target) {
                        stack.push(Frame {
                            node: import.target,
                            imports: self.out_edges(import.target),
                            next: 0,
                        });
                    }
                }
                None => {
                    let node = frame.node;
                    stack.pop();
                    visitor.finish(node);
                }
            }
        }
    }

    /// Closure form of [`depth_first_search_with`](Self::depth_first_search_with).
    pub fn depth_first_search<F, V>(
        &self,
        start: NodeId,
        visited: &mut HashSet<NodeId>,
        filter: F,
        visit: V,
    ) where
        F: FnMut(&Import) -> bool,
        V: FnMut(NodeId),
    {
        let mut visitor = FnVisitor { filter, visit };
        self.depth_first_search_with(start, visited, &mut visitor);
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    fn ensure_unfrozen(&self) -> Result<(), CoreError> {
        if self.serialized.get().is_some() {
            return Err(CoreError::GraphFrozen);
        }
        Ok(())
    }

    /// Appends a node and returns its ID, the next ordinal.
    pub fn add_node(&mut self, flags: NodeFlags) -> Result<NodeId, CoreError> {
        self.ensure_unfrozen()?;
        let id = NodeId(self.size() as u32);
        check_node_flags(id, flags)?;
        self.imports.add_node(Node::new(id, flags));
        Ok(id)
    }

    /// Appends an import to `source`'s declared import list.
    ///
    /// A dynamic import forces top-level await on a non-root source, since the
    /// importer awaits the `import()` at top level.
    pub fn add_import(
        &mut self,
        source: NodeId,
        target: NodeId,
        flags: EdgeFlags,
    ) -> Result<EdgeId, CoreError> {
        self.ensure_unfrozen()?;
        let from = self.node_or_err(source)?;
        let to = self.node_or_err(target)?;
        from.ensure_mutable()?;
        self.check_import(from, to, flags)?;

        let idx = self
            .imports
            .add_edge(source.into(), target.into(), flags);
        if flags.is_dynamic && !source.is_root() {
            self.imports[NodeIndex::from(source)]
                .flags_mut()
                .has_top_level_await = true;
        }
        Ok(idx.into())
    }

    /// Sets or clears the dynamic flag of an existing import. Setting it also
    /// forces top-level await on the importer.
    pub fn set_import_dynamic(&mut self, id: EdgeId, dynamic: bool) -> Result<(), CoreError> {
        self.ensure_unfrozen()?;
        let import = self.import(id).ok_or(CoreError::EdgeNotFound { id })?;
        let from = self.node_or_err(import.source)?;
        from.ensure_mutable()?;
        let to = self.node_or_err(import.target)?;
        let flags = EdgeFlags {
            is_dynamic: dynamic,
            ..import.flags
        };
        self.check_import(from, to, flags)?;

        if let Some(weight) = self.imports.edge_weight_mut(id.into()) {
            *weight = flags;
        }
        if dynamic && !import.source.is_root() {
            self.imports[NodeIndex::from(import.source)]
                .flags_mut()
                .has_top_level_await = true;
        }
        Ok(())
    }

    /// Sets or clears top-level await on a node. Clearing fails while the
    /// node still has a dynamic import.
    pub fn set_top_level_await(&mut self, id: NodeId, value: bool) -> Result<(), CoreError> {
        self.ensure_unfrozen()?;
        let node = self.node_or_err(id)?;
        node.ensure_mutable()?;
        let flags = NodeFlags {
            has_top_level_await: value,
            ..node.flags()
        };
        check_node_flags(id, flags)?;
        if !value && self.out_edges(id).iter().any(Import::is_dynamic) {
            return Err(CoreError::InvalidNode {
                id,
                reason: "a node with a dynamic import awaits at top level".into(),
            });
        }
        *self.imports[NodeIndex::from(id)].flags_mut() = flags;
        Ok(())
    }

    fn check_import(&self, from: &Node, to: &Node, flags: EdgeFlags) -> Result<(), CoreError> {
        let invalid = |reason: &str| CoreError::InvalidEdge {
            from: from.index(),
            to: to.index(),
            reason: reason.to_string(),
        };

        if !from.is_importer() {
            return Err(invalid("only the root and existing modules can import"));
        }
        if to.is_root() {
            return Err(invalid("the root document cannot be imported"));
        }
        if !to.is_module() {
            if !from.is_root() {
                return Err(invalid("classic scripts can only be attached to the root"));
            }
            if flags.is_dynamic || flags.is_bare {
                return Err(invalid("classic scripts are attached with a plain script tag"));
            }
        }
        if flags.is_bare && !self.has_import_map() {
            return Err(invalid("bare specifier without an import map"));
        }
        Ok(())
    }

    /// Re-checks every structural rule over the whole graph.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.flags.has_static_import_map && self.flags.has_dynamic_import_map {
            return Err(CoreError::ConflictingImportMaps);
        }
        for node in self.nodes() {
            check_node_flags(node.index(), node.flags())?;
        }
        for import in self.imports() {
            let from = self.node_or_err(import.source)?;
            let to = self.node_or_err(import.target)?;
            self.check_import(from, to, import.flags)?;
            if import.is_dynamic() && !from.is_root() && !from.has_top_level_await() {
                return Err(CoreError::InvalidNode {
                    id: from.index(),
                    reason: "a node with a dynamic import awaits at top level".into(),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Text form
    // -----------------------------------------------------------------------

    /// The serialized graph string, computed once. Freezes the graph.
    pub fn serialized(&self) -> &str {
        self.serialized.get_or_init(|| codec::encode_graph(self))
    }

    /// Multi-line human-readable listing of the graph.
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!("Graph of {} nodes: {}", self.size(), self.serialized()),
            format!(
                "  Import map: {}",
                match self.import_map_kind() {
                    Some(ImportMapKind::Static) => "static",
                    Some(ImportMapKind::Dynamic) => "dynamic",
                    None => "none",
                }
            ),
        ];
        for node in self.nodes() {
            lines.push(format!("  Node {} {}", node.index(), node.describe()));
            for import in self.out_edges(node.index()) {
                let mut line = format!("   -> node {}", import.target);
                if import.is_dynamic() {
                    line.push_str(" dynamic");
                }
                if import.is_bare() {
                    line.push_str(" bare");
                }
                lines.push(line);
            }
        }
        lines.join("\n")
    }
}

fn check_node_flags(id: NodeId, flags: NodeFlags) -> Result<(), CoreError> {
    if id.is_root() && !flags.is_empty() {
        return Err(CoreError::InvalidNode {
            id,
            reason: "the root document carries no flags".into(),
        });
    }
    if !id.is_root() && !flags.is_module && flags.has_top_level_await {
        return Err(CoreError::InvalidNode {
            id,
            reason: "classic scripts cannot await at top level".into(),
        });
    }
    Ok(())
}

/// Structural equality: graph flags, node flags in order, and each node's
/// imports in declared order. Caches are ignored.
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        let same_imports = |a: Imports, b: Imports| {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| x.target == y.target && x.flags == y.flags)
        };
        self.flags == other.flags
            && self.size() == other.size()
            && self.nodes().zip(other.nodes()).all(|(a, b)| {
                a.flags() == b.flags()
                    && same_imports(self.out_edges(a.index()), other.out_edges(b.index()))
            })
    }
}

impl Eq for Graph {}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.serialized())
    }
}

impl FromStr for Graph {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        codec::decode_graph(s)
    }
}
