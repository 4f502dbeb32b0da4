//! Served artifacts: file names, URLs, import maps and script sources.
//!
//! Every node is served at `/graph/<serialized>/<index>.<ext>`, so a URL
//! alone is enough to rebuild the graph and find the node. Sources are
//! rendered once and cached on the node; after that the node's imports are
//! frozen.
//!
//! Scripts report progress to the harness with `postMessage`:
//! `start <i>` and `finish <i>` from every script, `error GeneratedError <i>`
//! or `error <message>` from the root's error listener, and `loaded` from
//! the root's last module script.

use indexmap::IndexMap;
use serde::Serialize;

use crate::edge::Import;
use crate::error::CoreError;
use crate::graph::{Graph, ImportMapKind};
use crate::id::NodeId;
use crate::node::{Node, ScriptKind};

/// Path prefix under which every graph is served.
pub const GRAPH_PREFIX: &str = "/graph";

/// Canonical file name: `<index>.<ext>`.
pub fn file_name(node: &Node) -> String {
    format!("{}.{}", node.index(), node.kind().extension())
}

pub fn node_url(graph: &Graph, node: &Node) -> String {
    format!("{GRAPH_PREFIX}/{}/{}", graph.serialized(), file_name(node))
}

pub fn root_url(graph: &Graph) -> String {
    node_url(graph, graph.root())
}

/// Bare specifier resolved through the import map: the decimal index.
pub fn bare_specifier(node: &Node) -> String {
    node.index().to_string()
}

/// The `{"imports": {...}}` document, one entry per module in index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportMap {
    pub imports: IndexMap<String, String>,
}

impl ImportMap {
    pub fn for_graph(graph: &Graph) -> Self {
        let imports = graph
            .nodes()
            .filter(|node| node.is_module())
            .map(|node| (bare_specifier(node), node_url(graph, node)))
            .collect();
        ImportMap { imports }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A rendered node as the server hands it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub node: NodeId,
    pub kind: ScriptKind,
    /// HTTP status: 404 for not-found nodes.
    pub status: u16,
    /// Delay the response.
    pub slow: bool,
    pub body: String,
}

impl Artifact {
    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }

    pub fn is_found(&self) -> bool {
        self.status == 200
    }
}

/// Renders node `id`, caching its source.
pub fn render(graph: &Graph, id: NodeId) -> Result<Artifact, CoreError> {
    let node = graph.node(id).ok_or(CoreError::NodeNotFound { id })?;
    let body = source(graph, node)?.to_string();
    Ok(Artifact {
        node: id,
        kind: node.kind(),
        status: if node.is_not_found() { 404 } else { 200 },
        slow: node.is_slow(),
        body,
    })
}

/// Renders every node in index order.
pub fn render_all(graph: &Graph) -> Result<Vec<Artifact>, CoreError> {
    graph.node_ids().map(|id| render(graph, id)).collect()
}

fn source<'g>(graph: &Graph, node: &'g Node) -> Result<&'g str, CoreError> {
    if let Some(cached) = node.cached_source() {
        return Ok(cached);
    }
    let built = if node.is_not_found() {
        String::new()
    } else {
        match node.kind() {
            ScriptKind::Document => document_source(graph)?,
            ScriptKind::Module => module_source(graph, node),
            ScriptKind::Classic => classic_source(node),
        }
    };
    Ok(node.source_cell().get_or_init(|| built))
}

fn specifier(graph: &Graph, import: &Import) -> String {
    match graph.node(import.target) {
        Some(target) if import.is_bare() => bare_specifier(target),
        Some(target) => node_url(graph, target),
        None => String::new(),
    }
}

const ERROR_LISTENER: &str = r#"<script>
  window.addEventListener("error", (event) => {
    const error = event.error;
    const message =
      error && error.name === "GeneratedError" ? `GeneratedError ${error.index}` : event.message;
    window.parent.postMessage(`error ${message}`, "*");
  });
</script>"#;

fn document_source(graph: &Graph) -> Result<String, CoreError> {
    let mut lines = vec![
        "<!DOCTYPE html>".to_string(),
        "<pre id=\"out\"></pre>".to_string(),
        ERROR_LISTENER.to_string(),
    ];

    if let Some(kind) = graph.import_map_kind() {
        let json = ImportMap::for_graph(graph)
            .to_json()
            .map_err(|err| CoreError::Render {
                id: NodeId::ROOT,
                reason: err.to_string(),
            })?;
        match kind {
            ImportMapKind::Static => {
                lines.push(format!("<script type=\"importmap\">{json}</script>"));
            }
            ImportMapKind::Dynamic => {
                lines.push("<script>".to_string());
                lines.push("  const map = document.createElement(\"script\");".to_string());
                lines.push("  map.type = \"importmap\";".to_string());
                lines.push(format!("  map.textContent = JSON.stringify({json});"));
                lines.push("  document.currentScript.after(map);".to_string());
                lines.push("</script>".to_string());
            }
        }
    }

    for node in graph.nodes().filter(|node| node.has_preload()) {
        let url = node_url(graph, node);
        if node.is_module() {
            lines.push(format!("<link rel=\"modulepreload\" href=\"{url}\">"));
        } else {
            lines.push(format!("<link rel=\"preload\" as=\"script\" href=\"{url}\">"));
        }
    }

    for import in graph.out_edges(NodeId::ROOT) {
        let Some(target) = graph.node(import.target) else {
            continue;
        };
        let spec = specifier(graph, &import);
        if !target.is_module() {
            lines.push(format!("<script src=\"{spec}\"></script>"));
        } else if import.is_dynamic() {
            lines.push(format!("<script type=\"module\">await import(\"{spec}\");</script>"));
        } else if import.is_bare() {
            lines.push(format!("<script type=\"module\">import \"{spec}\";</script>"));
        } else {
            lines.push(format!("<script type=\"module\" src=\"{spec}\"></script>"));
        }
    }

    // Waits for every root module, settled either way, before reporting.
    let pending: Vec<String> = graph
        .out_edges(NodeId::ROOT)
        .iter()
        .filter(|import| graph.node(import.target).is_some_and(|n| n.is_module()))
        .map(|import| format!("import(\"{}\")", specifier(graph, import)))
        .collect();
    lines.push("<script type=\"module\">".to_string());
    lines.push(format!("  await Promise.allSettled([{}]);", pending.join(", ")));
    lines.push("  window.parent.postMessage(\"loaded\", \"*\");".to_string());
    lines.push("</script>".to_string());
    Ok(lines.join("\n"))
}

fn post(event: &str, index: NodeId) -> String {
    format!("window.parent.postMessage(\"{event} {index}\", \"*\");")
}

fn throw_generated_error(index: NodeId) -> String {
    format!(
        "throw Object.assign(new Error(\"node {index}\"), {{ name: \"GeneratedError\", index: {index} }});"
    )
}

fn module_source(graph: &Graph, node: &Node) -> String {
    let index = node.index();
    let imports = graph.out_edges(index);
    let mut lines = vec![format!("// Module {index}")];

    // Declarations are hoisted by the host; list them first.
    for import in imports.iter().filter(|import| !import.is_dynamic()) {
        lines.push(format!("import \"{}\";", specifier(graph, import)));
    }
    lines.push(post("start", index));
    if node.is_error() {
        lines.push(throw_generated_error(index));
    }
    if node.has_top_level_await() {
        lines.push("await 0;".to_string());
    }
    for import in imports.iter().filter(|import| import.is_dynamic()) {
        lines.push(format!("await import(\"{}\");", specifier(graph, import)));
    }
    lines.push(post("finish", index));
    lines.join("\n")
}

fn classic_source(node: &Node) -> String {
    let index = node.index();
    let mut lines = vec![format!("// Script {index}"), post("start", index)];
    if node.is_error() {
        lines.push(throw_generated_error(index));
    }
    lines.push(post("finish", index));
    lines.join("\n")
}
