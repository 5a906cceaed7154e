//! Skeleton neurons: a rooted forest of nodes with derived, cached views.

use super::base::{NeuronCore, NeuronId};
use super::soma::SomaSpec;
use crate::config::SomaConfig;
use crate::error::{Error, Result};
use crate::graph::{
    break_segments, build_fast_graph, classify_nodes, generate_segments, parent_dist, Dotprops,
    FastGraph, TreeGraph,
};
use crate::morpho::{self, Cut, StrahlerSelection, Volume, VolumeMode};
use crate::nodes::{ConnectorTable, NodeTable, NodeType};
use crate::table::Table;
use crate::units::Quantity;
use log::{debug, warn};
use std::f64::consts::PI;
use std::ops::{Div, Mul};
use std::sync::{Arc, OnceLock};

/// Node columns that only hold intermediate results.
const TEMP_NODE_COLUMNS: &[&str] = &["flow_centrality", "strahler_index"];

/// Derived representations, dropped together whenever nodes or connectors change.
#[derive(Debug, Clone, Default)]
struct TreeCache {
    graph: OnceLock<Arc<TreeGraph>>,
    fast_graph: OnceLock<Option<Arc<FastGraph>>>,
    segments: OnceLock<Arc<Vec<Vec<i64>>>>,
    small_segments: OnceLock<Arc<Vec<Vec<i64>>>>,
    simple: OnceLock<Arc<TreeNeuron>>,
    dps: OnceLock<Arc<Dotprops>>,
}

/// A neuron represented as a skeleton.
#[derive(Debug, Clone)]
pub struct TreeNeuron {
    pub(crate) core: NeuronCore,
    nodes: NodeTable,
    soma: SomaSpec,
    soma_config: SomaConfig,
    use_fast_graph: bool,
    cache: TreeCache,
    generation: u64,
}

impl TreeNeuron {
    /// Creates a neuron from a validated node table and classifies its nodes.
    #[must_use]
    pub fn new(mut nodes: NodeTable) -> Self {
        classify_nodes(&mut nodes);
        Self {
            core: NeuronCore::default(),
            nodes,
            soma: SomaSpec::default(),
            soma_config: SomaConfig::default(),
            use_fast_graph: true,
            cache: TreeCache::default(),
            generation: 0,
        }
    }

    /// Creates a neuron from a loosely typed node table.
    pub fn from_table(table: Table) -> Result<Self> {
        Ok(Self::new(NodeTable::from_table(table)?))
    }

    /// Sets units such as `"nm"` or `"8 nanometer"`.
    pub fn with_units(mut self, units: &str) -> Result<Self> {
        self.core.set_units(Some(units))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.core.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<NeuronId>) -> Self {
        self.core.id = id.into();
        self
    }

    #[must_use]
    pub fn with_connectors(mut self, connectors: ConnectorTable) -> Self {
        self.set_connectors(Some(connectors));
        self
    }

    /// Sets the soma; fixed ids must exist.
    pub fn with_soma(mut self, soma: impl Into<SomaSpec>) -> Result<Self> {
        self.set_soma(soma)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_soma_config(mut self, config: SomaConfig) -> Self {
        self.soma_config = config;
        self
    }

    /// Enables or disables the cached [`FastGraph`].
    #[must_use]
    pub fn with_fast_graph(mut self, use_fast_graph: bool) -> Self {
        self.use_fast_graph = use_fast_graph;
        self.cache.fast_graph = OnceLock::new();
        self
    }

    #[must_use]
    pub fn core(&self) -> &NeuronCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut NeuronCore {
        &mut self.core
    }

    #[must_use]
    pub fn id(&self) -> &NeuronId {
        &self.core.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.core.name()
    }

    #[must_use]
    pub fn units(&self) -> Quantity {
        self.core.units()
    }

    #[must_use]
    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Replaces the node table; nodes are reclassified and caches cleared.
    pub fn set_nodes(&mut self, nodes: NodeTable) {
        self.nodes = nodes;
        self.clear_temp_attr(true);
    }

    #[must_use]
    pub fn connectors(&self) -> Option<&ConnectorTable> {
        self.core.connectors()
    }

    pub fn set_connectors(&mut self, connectors: Option<ConnectorTable>) {
        self.core.set_connectors(connectors);
        self.clear_temp_attr(false);
    }

    #[must_use]
    pub fn soma_config(&self) -> &SomaConfig {
        &self.soma_config
    }

    /// How the soma is determined.
    #[must_use]
    pub fn soma_spec(&self) -> &SomaSpec {
        &self.soma
    }

    /// Soma node id(s), validated against the current node table.
    ///
    /// Unresolvable values are reported as a warning and read as `None`.
    #[must_use]
    pub fn soma(&self) -> Option<Vec<i64>> {
        let ids = match &self.soma {
            SomaSpec::None => return None,
            SomaSpec::Node(id) => vec![*id],
            SomaSpec::Nodes(ids) => ids.clone(),
            SomaSpec::Finder(find) => find(self),
        };
        if ids.is_empty() {
            return None;
        }
        if !ids.iter().any(|id| self.nodes.contains(*id)) {
            warn!("soma {ids:?} not found in node table of neuron {}", self.id());
            return None;
        }
        Some(ids)
    }

    /// Sets the soma to a finder, `None` or existing node id(s).
    pub fn set_soma(&mut self, soma: impl Into<SomaSpec>) -> Result<()> {
        let soma = soma.into();
        if let Some(ids) = soma.fixed() {
            if let Some(missing) = ids.iter().find(|id| !self.nodes.contains(**id)) {
                return Err(Error::Validation(format!(
                    "soma must be a finder, none or a valid node id; node {missing} not found"
                )));
            }
        }
        self.soma = soma;
        Ok(())
    }

    /// Counter incremented every time derived data is invalidated.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drops all cached representations and temporary node columns.
    ///
    /// A fixed soma that no longer exists is demoted. Nodes are reclassified
    /// unless `reclassify` is false.
    pub fn clear_temp_attr(&mut self, reclassify: bool) {
        self.cache = TreeCache::default();
        self.generation += 1;
        debug!("neuron {}: temporary attributes cleared", self.id());

        for col in TEMP_NODE_COLUMNS {
            self.nodes.drop_extra_column(col);
        }

        if let Some(ids) = self.soma.fixed() {
            let kept: Vec<i64> = ids
                .iter()
                .copied()
                .filter(|id| self.nodes.contains(*id))
                .collect();
            if kept.len() != ids.len() {
                if kept.is_empty() {
                    warn!("soma {ids:?} of neuron {} was removed", self.id());
                }
                self.soma = SomaSpec::from(kept);
            }
        }

        if reclassify {
            classify_nodes(&mut self.nodes);
        }
    }

    /// Directed child → parent graph, built on first access.
    #[must_use]
    pub fn graph(&self) -> Arc<TreeGraph> {
        Arc::clone(
            self.cache
                .graph
                .get_or_init(|| Arc::new(TreeGraph::from_nodes(&self.nodes))),
        )
    }

    /// Rebuilds and caches the graph.
    pub fn get_graph(&mut self) -> Arc<TreeGraph> {
        let graph = Arc::new(TreeGraph::from_nodes(&self.nodes));
        self.cache.graph = OnceLock::from(Arc::clone(&graph));
        graph
    }

    /// Flat graph index; `None` if disabled or unavailable.
    #[must_use]
    pub fn fast_graph(&self) -> Option<Arc<FastGraph>> {
        if !self.use_fast_graph {
            return None;
        }
        self.cache
            .fast_graph
            .get_or_init(|| build_fast_graph(&self.nodes).map(Arc::new))
            .clone()
    }

    /// Rebuilds and caches the flat graph index.
    pub fn get_fast_graph(&mut self) -> Option<Arc<FastGraph>> {
        if !self.use_fast_graph {
            return None;
        }
        let fast = build_fast_graph(&self.nodes).map(Arc::new);
        self.cache.fast_graph = OnceLock::from(fast.clone());
        fast
    }

    /// Longest-path decomposition, see [`generate_segments`].
    #[must_use]
    pub fn segments(&self) -> Arc<Vec<Vec<i64>>> {
        Arc::clone(
            self.cache
                .segments
                .get_or_init(|| Arc::new(generate_segments(&self.nodes))),
        )
    }

    /// Segments between branch points, see [`break_segments`].
    #[must_use]
    pub fn small_segments(&self) -> Arc<Vec<Vec<i64>>> {
        Arc::clone(
            self.cache
                .small_segments
                .get_or_init(|| Arc::new(break_segments(&self.nodes))),
        )
    }

    /// Reduced copy holding only root, branch and leaf nodes (plus soma and
    /// connector nodes).
    #[must_use]
    pub fn simple(&self) -> Arc<TreeNeuron> {
        Arc::clone(
            self.cache
                .simple
                .get_or_init(|| Arc::new(morpho::simplified(self))),
        )
    }

    /// Dotprops, built on first access.
    #[must_use]
    pub fn dps(&self) -> Arc<Dotprops> {
        Arc::clone(
            self.cache
                .dps
                .get_or_init(|| Arc::new(Dotprops::from_nodes(&self.nodes))),
        )
    }

    /// Recomputes and caches the dotprops.
    pub fn get_dps(&mut self) -> Arc<Dotprops> {
        let dps = Arc::new(Dotprops::from_nodes(&self.nodes));
        self.cache.dps = OnceLock::from(Arc::clone(&dps));
        dps
    }

    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn n_connectors(&self) -> usize {
        self.connectors().map_or(0, ConnectorTable::len)
    }

    /// Root node ids.
    #[must_use]
    pub fn root(&self) -> Vec<i64> {
        self.nodes.roots()
    }

    /// Reroots to the given node.
    pub fn set_root(&mut self, node_id: i64) -> Result<()> {
        self.reroot(node_id)
    }

    #[must_use]
    pub fn n_branches(&self) -> usize {
        self.nodes.ids_of_type(NodeType::Branch).len()
    }

    #[must_use]
    pub fn n_leafs(&self) -> usize {
        self.nodes.ids_of_type(NodeType::End).len()
    }

    /// Sum of all child → parent distances.
    #[must_use]
    pub fn cable_length(&self) -> f64 {
        self.fast_graph()
            .map_or_else(|| self.graph().total_weight(), |fg| fg.total_weight())
    }

    /// Radius-based volume: `π r² d` summed over child → parent segments.
    #[must_use]
    pub fn volume(&self) -> f64 {
        if self.nodes.radius.iter().any(|r| *r < 0.0) {
            warn!("neuron {} has negative radii - volume will not be correct", self.id());
        }
        if self.nodes.radius.iter().any(|r| r.is_nan()) {
            warn!("neuron {} has NaN radii - volume will not be correct", self.id());
        }
        parent_dist(&self.nodes, 0.0)
            .iter()
            .zip(&self.nodes.radius)
            .map(|(d, r)| r * r * d * PI)
            .filter(|v| !v.is_nan())
            .sum()
    }

    /// `[[xmin, xmax], [ymin, ymax], [zmin, zmax]]`.
    #[must_use]
    pub fn bbox(&self) -> Option<[[f64; 2]; 3]> {
        self.nodes.bbox()
    }

    /// Average cable length per node.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sampling_resolution(&self) -> f64 {
        self.cable_length() / self.n_nodes() as f64
    }

    /// Number of roots.
    #[must_use]
    pub fn n_skeletons(&self) -> usize {
        self.root().len()
    }

    /// Connected components as node ids.
    #[must_use]
    pub fn subtrees(&self) -> Vec<Vec<i64>> {
        self.graph().connected_components()
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.subtrees().len()
    }

    /// True for forests too.
    #[must_use]
    pub fn is_tree(&self) -> bool {
        self.graph().is_forest()
    }

    /// A cycle in the parent relation as `(child, parent)` edges, if any.
    #[must_use]
    pub fn cycles(&self) -> Option<Vec<(i64, i64)>> {
        self.graph().find_cycle()
    }

    /// Copy with independent tables. The cached graph is shared.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Copy that also duplicates the cached graph.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let mut copy = self.clone();
        if let Some(graph) = self.cache.graph.get() {
            copy.cache.graph = OnceLock::from(Arc::new(TreeGraph::clone(graph)));
        }
        copy
    }

    /// True if both neurons currently share one cached graph.
    #[must_use]
    pub fn shares_graph_with(&self, other: &Self) -> bool {
        match (self.cache.graph.get(), other.cache.graph.get()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn rescale(&mut self, factor: f64, units: Quantity) {
        self.nodes.scale(factor, true);
        if let Some(c) = self.core.connectors_mut() {
            c.scale(factor);
        }
        self.core.set_units_quantity(units.to_compact());
        self.clear_temp_attr(false);
    }

    /// Multiplies coordinates and radii in place; units are multiplied too.
    pub fn scale(&mut self, factor: f64) {
        let units = self.units() * factor;
        self.rescale(factor, units);
    }

    /// Divides coordinates and radii in place.
    pub fn divide(&mut self, divisor: f64) {
        let units = self.units() / divisor;
        self.rescale(1.0 / divisor, units);
    }

    /// Converts coordinates to another unit, e.g. `"um"`.
    ///
    /// Fails for dimensionless neurons.
    pub fn convert_units(&mut self, to: &str) -> Result<()> {
        let current = self.units();
        if current.is_dimensionless() {
            return Err(Error::Units(
                "unable to convert: neuron has no units set".to_string(),
            ));
        }
        let target = Quantity::new(1.0, Quantity::parse(to)?.unit);
        let factor = current.factor_to(&target)?;
        self.rescale(factor, target);
        Ok(())
    }

    /// Resamples to the given resolution.
    pub fn resample(&mut self, resample_to: f64) -> Result<()> {
        morpho::resample_neuron(self, resample_to)
    }

    /// Downsamples by the given factor; `f64::INFINITY` keeps only key nodes.
    pub fn downsample(&mut self, factor: f64) -> Result<()> {
        morpho::downsample_neuron(self, factor)
    }

    pub fn reroot(&mut self, new_root: i64) -> Result<()> {
        morpho::reroot_neuron(self, new_root)
    }

    /// Removes everything distal to each of the given nodes.
    pub fn prune_distal_to(&mut self, nodes: &[i64]) -> Result<()> {
        for node in nodes {
            morpho::cut_in_place(self, *node, Cut::KeepProximal)?;
        }
        Ok(())
    }

    /// Removes everything proximal to each of the given nodes.
    pub fn prune_proximal_to(&mut self, nodes: &[i64]) -> Result<()> {
        for node in nodes {
            morpho::cut_in_place(self, *node, Cut::KeepDistal)?;
        }
        Ok(())
    }

    pub fn prune_by_strahler(&mut self, to_prune: &StrahlerSelection) -> Result<()> {
        morpho::prune_by_strahler(self, to_prune, true)
    }

    /// Prunes terminal twigs shorter than `size`, for up to `rounds` rounds.
    pub fn prune_twigs(&mut self, size: f64, rounds: usize) -> Result<()> {
        morpho::prune_twigs(self, size, rounds)
    }

    pub fn prune_by_longest_neurite(&mut self, n: usize, reroot_to_soma: bool) -> Result<()> {
        morpho::longest_neurite(self, n, reroot_to_soma)
    }

    pub fn prune_by_volume(
        &mut self,
        volume: &dyn Volume,
        mode: VolumeMode,
        prevent_fragments: bool,
    ) -> Result<()> {
        morpho::in_volume(self, volume, mode, prevent_fragments)
    }

    /// Mutable node access for in-crate morphology operations; callers must
    /// invalidate afterwards.
    pub(crate) fn nodes_mut_unchecked(&mut self) -> &mut NodeTable {
        &mut self.nodes
    }

    /// Replaces nodes and soma for a derived copy without touching caches.
    pub(crate) fn derived(&self, nodes: NodeTable) -> Self {
        let mut nodes = nodes;
        classify_nodes(&mut nodes);
        let mut out = Self {
            core: self.core.clone(),
            nodes,
            soma: self.soma.clone(),
            soma_config: self.soma_config.clone(),
            use_fast_graph: self.use_fast_graph,
            cache: TreeCache::default(),
            generation: 0,
        };
        if let Some(ids) = out.soma.fixed() {
            let kept: Vec<i64> = ids.into_iter().filter(|id| out.nodes.contains(*id)).collect();
            out.soma = SomaSpec::from(kept);
        }
        out
    }
}

impl Mul<f64> for &TreeNeuron {
    type Output = TreeNeuron;

    fn mul(self, rhs: f64) -> TreeNeuron {
        let mut n = self.copy();
        n.scale(rhs);
        n
    }
}

impl Div<f64> for &TreeNeuron {
    type Output = TreeNeuron;

    fn div(self, rhs: f64) -> TreeNeuron {
        let mut n = self.copy();
        n.divide(rhs);
        n
    }
}

impl Mul<f64> for TreeNeuron {
    type Output = TreeNeuron;

    fn mul(mut self, rhs: f64) -> TreeNeuron {
        self.scale(rhs);
        self
    }
}

impl Div<f64> for TreeNeuron {
    type Output = TreeNeuron;

    fn div(mut self, rhs: f64) -> TreeNeuron {
        self.divide(rhs);
        self
    }
}
