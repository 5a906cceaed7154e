//! Soma assignment for skeletons.

use super::tree::TreeNeuron;
use crate::config::SomaConfig;
use crate::nodes::NodeTable;
use std::fmt;
use std::sync::Arc;

/// Computes soma node ids from a neuron.
pub type SomaFinder = Arc<dyn Fn(&TreeNeuron) -> Vec<i64> + Send + Sync>;

/// How the soma of a [`TreeNeuron`] is determined.
#[derive(Clone)]
pub enum SomaSpec {
    None,
    /// A fixed node id.
    Node(i64),
    /// Several fixed node ids.
    Nodes(Vec<i64>),
    /// Evaluated on every read.
    Finder(SomaFinder),
}

impl SomaSpec {
    /// The default finder, driven by the neuron's [`SomaConfig`].
    #[must_use]
    pub fn default_finder() -> Self {
        Self::Finder(Arc::new(|n: &TreeNeuron| find_soma(n.nodes(), n.soma_config())))
    }

    /// Wraps a custom finder.
    pub fn finder<F>(f: F) -> Self
    where
        F: Fn(&TreeNeuron) -> Vec<i64> + Send + Sync + 'static,
    {
        Self::Finder(Arc::new(f))
    }

    /// Fixed node ids, if any.
    #[must_use]
    pub fn fixed(&self) -> Option<Vec<i64>> {
        match self {
            Self::Node(id) => Some(vec![*id]),
            Self::Nodes(ids) => Some(ids.clone()),
            Self::None | Self::Finder(_) => None,
        }
    }

    #[must_use]
    pub fn is_finder(&self) -> bool {
        matches!(self, Self::Finder(_))
    }
}

impl Default for SomaSpec {
    fn default() -> Self {
        Self::default_finder()
    }
}

impl fmt::Debug for SomaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Node(id) => f.debug_tuple("Node").field(id).finish(),
            Self::Nodes(ids) => f.debug_tuple("Nodes").field(ids).finish(),
            Self::Finder(_) => f.write_str("Finder(..)"),
        }
    }
}

impl From<i64> for SomaSpec {
    fn from(id: i64) -> Self {
        Self::Node(id)
    }
}

impl From<Vec<i64>> for SomaSpec {
    fn from(ids: Vec<i64>) -> Self {
        match ids.as_slice() {
            [] => Self::None,
            [id] => Self::Node(*id),
            _ => Self::Nodes(ids),
        }
    }
}

impl From<Option<i64>> for SomaSpec {
    fn from(id: Option<i64>) -> Self {
        id.map_or(Self::None, Self::Node)
    }
}

/// Nodes whose `label` column equals the soma label and whose radius is at
/// least the configured minimum.
#[must_use]
pub fn find_soma(nodes: &NodeTable, config: &SomaConfig) -> Vec<i64> {
    let Some(labels) = nodes.extra_column("label") else {
        return Vec::new();
    };
    labels
        .iter()
        .enumerate()
        .filter(|(_, label)| label.as_i64() == Some(config.label))
        .filter(|(i, _)| config.min_radius.map_or(true, |r| nodes.radius[*i] >= r))
        .map(|(i, _)| nodes.node_id[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeRow;
    use crate::table::Cell;

    #[test]
    fn test_find_soma_by_label_and_radius() {
        let mut nodes = NodeTable::from_rows([
            NodeRow::new(1, -1, 0.0, 0.0, 0.0).with_radius(5.0),
            NodeRow::new(2, 1, 1.0, 0.0, 0.0).with_radius(0.5),
            NodeRow::new(3, 2, 2.0, 0.0, 0.0),
        ])
        .unwrap();
        assert!(find_soma(&nodes, &SomaConfig::default()).is_empty());

        nodes
            .set_extra_column("label", vec![Cell::Int(1), Cell::Int(1), Cell::Int(0)])
            .unwrap();
        assert_eq!(find_soma(&nodes, &SomaConfig::default()), [1, 2]);

        let config = SomaConfig {
            label: 1,
            min_radius: Some(2.0),
        };
        assert_eq!(find_soma(&nodes, &config), [1]);
    }

    #[test]
    fn test_spec_from_ids() {
        assert!(matches!(SomaSpec::from(Vec::new()), SomaSpec::None));
        assert!(matches!(SomaSpec::from(vec![4]), SomaSpec::Node(4)));
        assert_eq!(SomaSpec::from(vec![4, 5]).fixed(), Some(vec![4, 5]));
        assert!(SomaSpec::default().is_finder());
    }
}
