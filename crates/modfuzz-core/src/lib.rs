pub mod artifact;
pub mod codec;
pub mod edge;
pub mod error;
pub mod flags;
pub mod graph;
pub mod id;
pub mod node;

// Re-export commonly used types
pub use artifact::{Artifact, ImportMap};
pub use edge::{EdgeFlags, Import};
pub use error::{CoreError, FlagError, ParseError};
pub use flags::{FlagEntry, FlagSet, FlagTable};
pub use graph::{Graph, GraphFlags, ImportMapKind, Visitor};
pub use id::{EdgeId, NodeId};
pub use node::{Node, NodeFlags, ScriptKind};
