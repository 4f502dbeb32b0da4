//! Import edges.
//!
//! The graph stores [`EdgeFlags`] as the petgraph edge weight. Queries hand
//! out [`Import`], a copyable view that also carries the edge's ID and its
//! endpoints.

use std::fmt;

use serde::Serialize;

use crate::flags::flag_set;
use crate::id::{EdgeId, NodeId};

flag_set! {
    /// Flags carried by one import.
    pub struct EdgeFlags {
        /// `import()` expression instead of a static `import` declaration.
        is_dynamic => "isDynamic",
        /// The specifier is a bare name resolved through the import map.
        is_bare => "isBare",
    }
}

impl EdgeFlags {
    pub fn dynamic() -> Self {
        EdgeFlags {
            is_dynamic: true,
            is_bare: false,
        }
    }

    pub fn bare() -> Self {
        EdgeFlags {
            is_dynamic: false,
            is_bare: true,
        }
    }
}

/// A directed import from `source` to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Import {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub flags: EdgeFlags,
}

impl Import {
    pub fn is_dynamic(&self) -> bool {
        self.flags.is_dynamic
    }

    pub fn is_bare(&self) -> bool {
        self.flags.is_bare
    }

    /// An import whose target was created no later than its source. Node IDs
    /// follow generation order, so these are exactly the cycle-closing edges.
    pub fn is_back_edge(&self) -> bool {
        self.target <= self.source
    }
}

/// The single-edge text form: flag letters followed by the target index,
/// e.g. `d3` for a dynamic import of node 3.
impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.flags, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(source: u32, target: u32, flags: EdgeFlags) -> Import {
        Import {
            id: EdgeId(0),
            source: NodeId(source),
            target: NodeId(target),
            flags,
        }
    }

    #[test]
    fn back_edges_point_at_earlier_or_same_nodes() {
        assert!(!import(1, 2, EdgeFlags::default()).is_back_edge());
        assert!(import(3, 1, EdgeFlags::default()).is_back_edge());
        assert!(import(2, 2, EdgeFlags::default()).is_back_edge());
    }

    #[test]
    fn display_writes_flags_then_target() {
        let flags = EdgeFlags {
            is_dynamic: true,
            is_bare: true,
        };
        assert_eq!(import(0, 12, flags).to_string(), "db12");
        assert_eq!(import(0, 4, EdgeFlags::default()).to_string(), "4");
    }
}
