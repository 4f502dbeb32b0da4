//! Script nodes.
//!
//! A [`Node`] is one script in the test document: the HTML root, a module
//! script, or a classic script. Its flags decide how the script is served
//! and how it behaves when evaluated.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::flags::flag_set;
use crate::id::NodeId;

flag_set! {
    /// Flags carried by one node.
    pub struct NodeFlags {
        /// Module script rather than classic script.
        is_module => "isModule",
        /// Evaluation throws immediately after it starts.
        is_error => "isError",
        /// The resource does not exist; fetching it fails.
        is_not_found => "isNotFound",
        /// Evaluation suspends at top level before continuing. Forced on by
        /// any dynamic outgoing import.
        has_top_level_await => "hasTopLevelAwait",
        /// The root document emits a preload hint for this node.
        has_preload => "hasPreload",
        /// The server delays its response for this node.
        is_slow => "isSlow",
    }
}

impl NodeFlags {
    /// A plain module script.
    pub fn module() -> Self {
        NodeFlags {
            is_module: true,
            ..NodeFlags::default()
        }
    }

    /// A plain classic script.
    pub fn classic() -> Self {
        NodeFlags::default()
    }
}

/// How a node is loaded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// The HTML document hosting every other script.
    Document,
    Module,
    Classic,
}

impl ScriptKind {
    /// File extension of the served artifact.
    pub fn extension(self) -> &'static str {
        match self {
            ScriptKind::Document => "html",
            ScriptKind::Module => "mjs",
            ScriptKind::Classic => "js",
        }
    }

    /// `Content-Type` header of the served artifact.
    pub fn content_type(self) -> &'static str {
        match self {
            ScriptKind::Document => "text/html; charset=UTF-8",
            ScriptKind::Module | ScriptKind::Classic => "text/javascript",
        }
    }
}

/// One script in the graph.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    index: NodeId,
    flags: NodeFlags,
    /// Rendered source, cached on first render. Once set, the node's imports
    /// are frozen.
    #[serde(skip)]
    source: OnceLock<String>,
}

impl Node {
    pub(crate) fn new(index: NodeId, flags: NodeFlags) -> Self {
        Node {
            index,
            flags,
            source: OnceLock::new(),
        }
    }

    pub fn index(&self) -> NodeId {
        self.index
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut NodeFlags {
        &mut self.flags
    }

    pub fn is_root(&self) -> bool {
        self.index.is_root()
    }

    pub fn is_module(&self) -> bool {
        self.flags.is_module
    }

    pub fn is_error(&self) -> bool {
        self.flags.is_error
    }

    pub fn is_not_found(&self) -> bool {
        self.flags.is_not_found
    }

    pub fn has_top_level_await(&self) -> bool {
        self.flags.has_top_level_await
    }

    pub fn has_preload(&self) -> bool {
        self.flags.has_preload
    }

    pub fn is_slow(&self) -> bool {
        self.flags.is_slow
    }

    /// Whether the node may import other nodes: the root, or a module that
    /// exists.
    pub fn is_importer(&self) -> bool {
        self.is_root() || (self.is_module() && !self.is_not_found())
    }

    pub fn kind(&self) -> ScriptKind {
        if self.is_root() {
            ScriptKind::Document
        } else if self.is_module() {
            ScriptKind::Module
        } else {
            ScriptKind::Classic
        }
    }

    /// Returns the cached source if the node has been rendered.
    pub fn cached_source(&self) -> Option<&str> {
        self.source.get().map(String::as_str)
    }

    pub(crate) fn source_cell(&self) -> &OnceLock<String> {
        &self.source
    }

    pub(crate) fn ensure_mutable(&self) -> Result<(), CoreError> {
        if self.source.get().is_some() {
            return Err(CoreError::SourceAlreadyGenerated { id: self.index });
        }
        Ok(())
    }

    /// Short human-readable flag list, e.g. `module error`.
    pub fn describe(&self) -> String {
        let mut words = Vec::new();
        match self.kind() {
            ScriptKind::Document => words.push("root"),
            ScriptKind::Module => words.push("module"),
            ScriptKind::Classic => words.push("classic"),
        }
        if self.flags.is_error {
            words.push("error");
        }
        if self.flags.is_not_found {
            words.push("not-found");
        }
        if self.flags.has_top_level_await {
            words.push("async");
        }
        if self.flags.has_preload {
            words.push("preload");
        }
        if self.flags.is_slow {
            words.push("slow");
        }
        words.join(" ")
    }
}
