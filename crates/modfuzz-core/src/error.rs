//! Core error types for modfuzz-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! flag codec, graph construction, and the text serializer. Every malformed
//! input is reported before a [`Graph`](crate::graph::Graph) is handed out,
//! so callers never observe a partially built graph.

use thiserror::Error;

use crate::id::{EdgeId, NodeId};

/// Errors from deriving, encoding, or decoding flag letters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// A flag name lacks the `is`/`has` prefix or a letter after it.
    #[error("flag name '{name}' must be `is` or `has` followed by a letter")]
    MalformedName { name: String },

    /// Two flag names derive the same letter.
    #[error("flags '{first}' and '{second}' both encode as '{letter}'")]
    DuplicateFlag {
        letter: char,
        first: String,
        second: String,
    },

    /// A token contains a letter no flag maps to.
    #[error("unknown flag letter '{letter}'")]
    UnknownFlag { letter: char },

    /// A token names the same flag twice.
    #[error("flag letter '{letter}' appears more than once")]
    RepeatedFlag { letter: char },
}

/// Errors produced while building or mutating a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A node index was not found in the graph.
    #[error("node not found: NodeId({id})")]
    NodeNotFound { id: NodeId },

    /// An edge index was not found in the graph.
    #[error("edge not found: EdgeId({id})")]
    EdgeNotFound { id: EdgeId },

    /// The node's source text has been generated; its imports are fixed.
    #[error("node {id} source already generated, imports can no longer change")]
    SourceAlreadyGenerated { id: NodeId },

    /// The graph's serialized form has been cached; it can no longer change.
    #[error("graph already serialized, it can no longer change")]
    GraphFrozen,

    /// Both import-map kinds were requested.
    #[error("a graph cannot declare both a static and a dynamic import map")]
    ConflictingImportMaps,

    /// An import violates a structural rule.
    #[error("invalid import {from} -> {to}: {reason}")]
    InvalidEdge {
        from: NodeId,
        to: NodeId,
        reason: String,
    },

    /// A node's flags violate a structural rule.
    #[error("invalid node {id}: {reason}")]
    InvalidNode { id: NodeId, reason: String },

    /// An artifact body could not be produced.
    #[error("failed to render node {id}: {reason}")]
    Render { id: NodeId, reason: String },
}

/// Errors from decoding the serialized graph string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The string (or a required field) is empty.
    #[error("empty {context}")]
    Empty { context: &'static str },

    /// A count or index is not a canonical decimal number.
    #[error("bad number '{token}' in {context}")]
    BadNumber { context: String, token: String },

    /// The header's node count disagrees with the number of node fields.
    #[error("graph declares {declared} nodes but has {actual} node fields")]
    NodeCountMismatch { declared: usize, actual: usize },

    /// A node field's import count disagrees with its import tokens.
    #[error("node {node} declares {declared} imports but has {actual}")]
    ImportCountMismatch {
        node: usize,
        declared: usize,
        actual: usize,
    },

    /// An import names a node index past the end of the graph.
    #[error("node {node} imports index {target} but the graph has {size} nodes")]
    IndexOutOfRange {
        node: usize,
        target: usize,
        size: usize,
    },

    /// A flag token could not be decoded.
    #[error("bad flags in {context}: {source}")]
    Flags { context: String, source: FlagError },

    /// The decoded structure violates a graph invariant.
    #[error(transparent)]
    Invalid(#[from] CoreError),
}
