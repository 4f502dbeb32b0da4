//! Generator probability model.
//!
//! Per-graph parameters read as "expected occurrences per graph": the
//! generator divides them by the graph size before each per-node draw.
//! Per-edge and node-kind parameters are plain per-draw probabilities.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Every generator parameter. Loadable from JSON; missing fields take the
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Probabilities {
    /// Chance the graph declares an import map at all.
    pub import_map: f64,
    /// Chance a declared import map is static rather than inserted by script.
    pub static_import_map: f64,
    /// Chance a new node is a module rather than a classic script.
    pub module: f64,
    /// Per graph: extra parents, drawn repeatedly for each module.
    pub multi_parent: f64,
    /// Per graph: back-edges to an ancestor.
    pub cyclic: f64,
    /// Per graph: missing resources.
    pub not_found: f64,
    /// Per graph: scripts that throw.
    pub error: f64,
    /// Per graph: modules that await at top level.
    pub top_level_await: f64,
    /// Per graph: delayed responses.
    pub slow: f64,
    /// Per graph: preload hints.
    pub preload: f64,
    /// Per edge: `import()` instead of a static import.
    pub dynamic: f64,
    /// Per edge, when the graph has an import map: bare specifier.
    pub bare: f64,
}

impl Default for Probabilities {
    fn default() -> Self {
        Probabilities {
            import_map: 0.5,
            static_import_map: 0.5,
            module: 0.8,
            multi_parent: 1.0,
            cyclic: 0.5,
            not_found: 0.25,
            error: 0.5,
            top_level_await: 0.5,
            slow: 0.5,
            preload: 0.5,
            dynamic: 0.1,
            bare: 0.5,
        }
    }
}

impl Probabilities {
    /// All zeros: every node is a plain classic script attached to the root.
    pub fn none() -> Self {
        Probabilities {
            import_map: 0.0,
            static_import_map: 0.0,
            module: 0.0,
            multi_parent: 0.0,
            cyclic: 0.0,
            not_found: 0.0,
            error: 0.0,
            top_level_await: 0.0,
            slow: 0.0,
            preload: 0.0,
            dynamic: 0.0,
            bare: 0.0,
        }
    }

    fn fields(&self) -> [(&'static str, f64); 12] {
        [
            ("import_map", self.import_map),
            ("static_import_map", self.static_import_map),
            ("module", self.module),
            ("multi_parent", self.multi_parent),
            ("cyclic", self.cyclic),
            ("not_found", self.not_found),
            ("error", self.error),
            ("top_level_await", self.top_level_await),
            ("slow", self.slow),
            ("preload", self.preload),
            ("dynamic", self.dynamic),
            ("bare", self.bare),
        ]
    }

    /// Rejects any value outside `[0, 1]`, NaN included.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in self.fields() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str, origin: &Path) -> Result<Self, ConfigError> {
        let probabilities: Probabilities =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        probabilities.validate()?;
        Ok(probabilities)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json, path)
    }

    /// Per-node probabilities for a graph of `size` nodes.
    pub(crate) fn per_node(&self, size: usize) -> NodeOdds {
        let scale = 1.0 / size as f64;
        NodeOdds {
            multi_parent: self.multi_parent * scale,
            cyclic: self.cyclic * scale,
            not_found: self.not_found * scale,
            error: self.error * scale,
            top_level_await: self.top_level_await * scale,
            slow: self.slow * scale,
            preload: self.preload * scale,
        }
    }
}

/// Per-graph parameters scaled down to one node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeOdds {
    pub multi_parent: f64,
    pub cyclic: f64,
    pub not_found: f64,
    pub error: f64,
    pub top_level_await: f64,
    pub slow: f64,
    pub preload: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Probabilities::default().validate().is_ok());
        assert!(Probabilities::none().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        let p = Probabilities {
            error: 1.5,
            ..Probabilities::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigError::InvalidProbability { name: "error", .. })
        ));

        let p = Probabilities {
            bare: f64::NAN,
            ..Probabilities::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigError::InvalidProbability { name: "bare", .. })
        ));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let p = Probabilities::from_json_str(r#"{"cyclic": 1.0, "module": 1.0}"#, Path::new("inline"))
            .unwrap();
        assert_eq!(p.cyclic, 1.0);
        assert_eq!(p.module, 1.0);
        assert_eq!(p.error, Probabilities::default().error);
    }

    #[test]
    fn json_rejects_unknown_fields_and_bad_values() {
        assert!(matches!(
            Probabilities::from_json_str(r#"{"cyclik": 1.0}"#, Path::new("inline")),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Probabilities::from_json_str(r#"{"dynamic": -0.1}"#, Path::new("inline")),
            Err(ConfigError::InvalidProbability { .. })
        ));
    }

    #[test]
    fn per_node_scales_per_graph_parameters() {
        let odds = Probabilities::default().per_node(4);
        assert_eq!(odds.error, 0.125);
        assert_eq!(odds.multi_parent, 0.25);
    }
}
