//! Text form of a graph.
//!
//! The serialized string is the test case's identity: it names the served
//! documents (`/graph/<string>/<file>`) and reproduces the case from a
//! permalink. The grammar is:
//!
//! ```text
//! graph  := header (";" node)*          -- exactly `count` node fields
//! header := graph-flags count
//! node   := node-flags count ("," import)*   -- exactly `count` imports
//! import := edge-flags index
//! ```
//!
//! Flags are letter tokens from [`crate::flags`], numbers are canonical
//! decimal (no sign, no leading zeros). Only letters, digits, `;` and `,`
//! appear, so the string is safe in a URL path or fragment.
//!
//! For example `s3;1,1;mt1,b2;m0` is a graph with a static import map whose
//! root imports module 1, which awaits at top level and imports module 2
//! through a bare specifier.

use crate::edge::{EdgeFlags, Import};
use crate::error::{CoreError, ParseError};
use crate::flags::{self, FlagSet};
use crate::graph::{Graph, GraphFlags};
use crate::id::NodeId;
use crate::node::{Node, NodeFlags};

pub const FIELD_SEPARATOR: char = ';';
pub const ITEM_SEPARATOR: char = ',';

/// A node field decoded on its own, before binding into a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub flags: NodeFlags,
    pub imports: Vec<(EdgeFlags, NodeId)>,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes a whole graph. Prefer [`Graph::serialized`], which caches.
pub fn encode_graph(graph: &Graph) -> String {
    let mut fields = Vec::with_capacity(graph.size() + 1);
    fields.push(format!("{}{}", graph.flags(), graph.size()));
    fields.extend(graph.node_ids().map(|id| encode_node(graph, id)));
    fields.join(&FIELD_SEPARATOR.to_string())
}

/// Encodes one node field: flags, import count, then each import.
pub fn encode_node(graph: &Graph, id: NodeId) -> String {
    let flags = graph.node(id).map(Node::flags).unwrap_or_default();
    let imports = graph.out_edges(id);
    let mut items = Vec::with_capacity(imports.len() + 1);
    items.push(format!("{}{}", flags, imports.len()));
    items.extend(imports.iter().map(Import::to_string));
    items.join(&ITEM_SEPARATOR.to_string())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes a graph string. Every field is parsed before any node is created,
/// and the finished graph is validated before it is returned.
pub fn decode_graph(input: &str) -> Result<Graph, ParseError> {
    if input.is_empty() {
        return Err(ParseError::Empty {
            context: "graph string",
        });
    }

    let mut fields = input.split(FIELD_SEPARATOR);
    let header = fields.next().unwrap_or_default();
    let (graph_flags, count) = decode_flags::<GraphFlags>(header, "graph header")?;
    let declared = parse_number(count, "graph header")?;

    let node_fields: Vec<&str> = fields.collect();
    if node_fields.len() != declared {
        return Err(ParseError::NodeCountMismatch {
            declared,
            actual: node_fields.len(),
        });
    }
    if declared == 0 {
        return Err(ParseError::Empty {
            context: "graph (no root node)",
        });
    }

    let records = node_fields
        .iter()
        .enumerate()
        .map(|(index, field)| decode_node(field, index, declared))
        .collect::<Result<Vec<_>, _>>()?;

    let mut graph = Graph::new(graph_flags)?;
    for (index, record) in records.iter().enumerate() {
        if index == 0 {
            if !record.flags.is_empty() {
                return Err(CoreError::InvalidNode {
                    id: NodeId::ROOT,
                    reason: "the root document carries no flags".into(),
                }
                .into());
            }
        } else {
            graph.add_node(record.flags)?;
        }
    }
    for (index, record) in records.iter().enumerate() {
        let source = NodeId(index as u32);
        for &(flags, target) in &record.imports {
            graph.add_import(source, target, flags)?;
        }
    }
    graph.validate()?;

    Ok(graph)
}

/// Decodes one node field of a graph with `size` nodes.
pub fn decode_node(field: &str, node: usize, size: usize) -> Result<NodeRecord, ParseError> {
    let context = format!("node {node}");
    let mut items = field.split(ITEM_SEPARATOR);
    let head = items.next().unwrap_or_default();
    let (flags, count) = decode_flags::<NodeFlags>(head, &context)?;
    let declared = parse_number(count, &context)?;

    let tokens: Vec<&str> = items.collect();
    if tokens.len() != declared {
        return Err(ParseError::ImportCountMismatch {
            node,
            declared,
            actual: tokens.len(),
        });
    }

    let imports = tokens
        .iter()
        .map(|token| decode_import(token, node, size))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NodeRecord { flags, imports })
}

/// Decodes one import token of node `node` in a graph with `size` nodes.
pub fn decode_import(
    token: &str,
    node: usize,
    size: usize,
) -> Result<(EdgeFlags, NodeId), ParseError> {
    let context = format!("import of node {node}");
    let (flags, index) = decode_flags::<EdgeFlags>(token, &context)?;
    let target = parse_number(index, &context)?;
    if target >= size {
        return Err(ParseError::IndexOutOfRange { node, target, size });
    }
    Ok((flags, NodeId(target as u32)))
}

fn decode_flags<'a, F: FlagSet>(token: &'a str, context: &str) -> Result<(F, &'a str), ParseError> {
    flags::decode(token).map_err(|source| ParseError::Flags {
        context: context.to_string(),
        source,
    })
}

fn parse_number(token: &str, context: &str) -> Result<usize, ParseError> {
    let bad = || ParseError::BadNumber {
        context: context.to_string(),
        token: token.to_string(),
    };
    let canonical = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !canonical {
        return Err(bad());
    }
    let value: usize = token.parse().map_err(|_| bad())?;
    if value > u32::MAX as usize {
        return Err(bad());
    }
    Ok(value)
}
