//! Library configuration.
//!
//! [`CoreConfig`] can be built programmatically or loaded from JSON:
//!
//! ```json
//! {
//!   "neurarbor": {
//!     "list": { "use_threading": true, "n_cores": 4, "copy_on_subset": false },
//!     "graph": { "use_fast_graph": true },
//!     "soma": { "label": 1, "radius": 2.5 }
//!   }
//! }
//! ```
//!
//! Every section and field is optional.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Default worker count: all rayon threads minus two, at least one.
#[must_use]
pub fn default_n_cores() -> usize {
    rayon::current_num_threads().saturating_sub(2).max(1)
}

/// Parameters of the default soma finder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SomaConfig {
    /// Value of the `label` node column that marks soma nodes.
    pub label: i64,
    /// Minimum radius for a labelled node to count as soma.
    pub min_radius: Option<f64>,
}

impl Default for SomaConfig {
    fn default() -> Self {
        Self {
            label: 1,
            min_radius: None,
        }
    }
}

/// Defaults applied to newly created neurons and neuron lists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Convert list inputs on a worker pool.
    pub use_threading: bool,
    /// Worker count for list construction and dispatch.
    pub n_cores: usize,
    /// Subsetting a list deep-copies the selected neurons.
    pub copy_on_subset: bool,
    /// Cache a [`crate::graph::FastGraph`] for cable length and traversals.
    pub use_fast_graph: bool,
    pub soma: SomaConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            use_threading: true,
            n_cores: default_n_cores(),
            copy_on_subset: false,
            use_fast_graph: true,
            soma: SomaConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct JsonConfig {
    neurarbor: JsonRoot,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonRoot {
    list: JsonList,
    graph: JsonGraph,
    soma: JsonSoma,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonList {
    use_threading: bool,
    n_cores: Option<usize>,
    copy_on_subset: bool,
}

impl Default for JsonList {
    fn default() -> Self {
        Self {
            use_threading: true,
            n_cores: None,
            copy_on_subset: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonGraph {
    use_fast_graph: bool,
}

impl Default for JsonGraph {
    fn default() -> Self {
        Self {
            use_fast_graph: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonSoma {
    label: i64,
    radius: Option<f64>,
}

impl Default for JsonSoma {
    fn default() -> Self {
        Self {
            label: 1,
            radius: None,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Ok(Self::from_json_config(json_config))
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Ok(Self::from_json_config(json_config))
    }

    fn from_json_config(config: JsonConfig) -> Self {
        let root = config.neurarbor;
        Self {
            use_threading: root.list.use_threading,
            n_cores: root.list.n_cores.unwrap_or_else(default_n_cores).max(1),
            copy_on_subset: root.list.copy_on_subset,
            use_fast_graph: root.graph.use_fast_graph,
            soma: SomaConfig {
                label: root.soma.label,
                min_radius: root.soma.radius,
            },
        }
    }

    #[must_use]
    pub fn with_threading(mut self, use_threading: bool) -> Self {
        self.use_threading = use_threading;
        self
    }

    #[must_use]
    pub fn with_n_cores(mut self, n_cores: usize) -> Self {
        self.n_cores = n_cores.max(1);
        self
    }

    #[must_use]
    pub fn with_copy_on_subset(mut self, copy_on_subset: bool) -> Self {
        self.copy_on_subset = copy_on_subset;
        self
    }

    #[must_use]
    pub fn with_fast_graph(mut self, use_fast_graph: bool) -> Self {
        self.use_fast_graph = use_fast_graph;
        self
    }

    #[must_use]
    pub fn with_soma(mut self, soma: SomaConfig) -> Self {
        self.soma = soma;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_n_cores_at_least_one() {
        assert!(default_n_cores() >= 1);
        assert_eq!(CoreConfig::default().with_n_cores(0).n_cores, 1);
    }

    #[test]
    fn test_json_full_config() {
        let json = r#"{
            "neurarbor": {
                "list": { "use_threading": false, "n_cores": 3, "copy_on_subset": true },
                "graph": { "use_fast_graph": false },
                "soma": { "label": 4, "radius": 2.5 }
            }
        }"#;
        let config = CoreConfig::from_json(json).expect("Failed to parse JSON");
        assert!(!config.use_threading);
        assert_eq!(config.n_cores, 3);
        assert!(config.copy_on_subset);
        assert!(!config.use_fast_graph);
        assert_eq!(config.soma.label, 4);
        assert_eq!(config.soma.min_radius, Some(2.5));
    }

    #[test]
    fn test_json_partial_config() {
        let json = r#"{ "neurarbor": { "soma": { "radius": 1.0 } } }"#;
        let config = CoreConfig::from_json(json).expect("Should parse partial config");
        assert!(config.use_threading);
        assert!(config.use_fast_graph);
        assert_eq!(config.soma.label, 1);
        assert_eq!(config.soma.min_radius, Some(1.0));
    }

    #[test]
    fn test_json_invalid() {
        assert!(CoreConfig::from_json("{ \"other\": {} }").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "neurarbor": {{ "list": {{ "n_cores": 2 }} }} }}"#).unwrap();
        let config = CoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.n_cores, 2);
    }
}
