//! Neuron entity model.
//!
//! [`Neuron`] is a sum type over the two representations:
//!
//! - [`TreeNeuron`]: skeleton with a node table and cached graph views
//! - [`MeshNeuron`]: surface with vertex and face arrays
//!
//! Shared state (id, name, units, connectors, registered attributes) lives in
//! [`NeuronCore`]. Attributes are resolved by name through [`Neuron::attr`].

mod attr;
mod base;
mod mesh;
mod soma;
mod tree;

pub use attr::{Attr, CallArgs, NeuronMethod};
pub use base::{NeuronCore, NeuronId};
pub use mesh::{MeshNeuron, TriMesh};
pub use soma::{find_soma, SomaFinder, SomaSpec};
pub use tree::TreeNeuron;

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::nodes::{ConnectorTable, NodeTable};
use crate::table::Table;
use crate::units::Quantity;
use crate::value::Value;
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Div, Mul};
use std::path::PathBuf;
use std::sync::Arc;

const TREE_SUMMARY_PROPS: &[&str] = &[
    "type",
    "name",
    "n_nodes",
    "n_connectors",
    "n_branches",
    "n_leafs",
    "cable_length",
    "soma",
    "units",
];
const MESH_SUMMARY_PROPS: &[&str] = &["type", "name", "units", "n_vertices", "n_faces"];

const TREE_EQ_ATTRIBUTES: &[&str] = &[
    "n_nodes",
    "n_connectors",
    "soma",
    "root",
    "n_branches",
    "n_leafs",
    "cable_length",
    "name",
];
const MESH_EQ_ATTRIBUTES: &[&str] = &["name", "n_vertices", "n_faces"];

/// Representation variant of a neuron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NeuronKind {
    Tree,
    Mesh,
}

impl NeuronKind {
    /// Type name as shown in summaries.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Tree => "TreeNeuron",
            Self::Mesh => "MeshNeuron",
        }
    }
}

impl fmt::Display for NeuronKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A neuron of any representation.
#[derive(Debug, Clone)]
pub enum Neuron {
    Tree(TreeNeuron),
    Mesh(MeshNeuron),
}

/// A file or an in-memory buffer holding a serialized neuron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeuronSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Reads neurons from a [`NeuronSource`].
pub trait NeuronLoader: Send + Sync + fmt::Debug {
    fn load(&self, source: &NeuronSource) -> Result<Neuron>;
}

/// Anything a neuron can be constructed from.
#[derive(Debug, Clone)]
pub enum NeuronInput {
    /// Copied.
    Neuron(Neuron),
    /// Loosely typed node table.
    Table(Table),
    Nodes(NodeTable),
    Mesh {
        vertices: ArrayD<f64>,
        faces: ArrayD<usize>,
    },
    /// Delegated to the configured [`NeuronLoader`].
    Source(NeuronSource),
    /// Unrecognized payload.
    Other(Value),
}

impl NeuronInput {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Neuron(_) => "neuron",
            Self::Table(_) => "table",
            Self::Nodes(_) => "node table",
            Self::Mesh { .. } => "mesh arrays",
            Self::Source(_) => "source",
            Self::Other(v) => v.kind_name(),
        }
    }
}

impl From<Value> for NeuronInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Neuron(n) => Self::Neuron(*n),
            Value::Table(t) => Self::Table(t),
            Value::Str(path) => Self::Source(NeuronSource::Path(path.into())),
            Value::List(items) => match <[Value; 2]>::try_from(items) {
                Ok([Value::Array(vertices), Value::IndexArray(faces)]) => Self::Mesh {
                    vertices: vertices.into_dyn(),
                    faces: faces.into_dyn(),
                },
                Ok(pair) => Self::Other(Value::List(pair.into())),
                Err(items) => Self::Other(Value::List(items)),
            },
            other => Self::Other(other),
        }
    }
}

impl From<Neuron> for NeuronInput {
    fn from(n: Neuron) -> Self {
        Self::Neuron(n)
    }
}

impl From<TreeNeuron> for NeuronInput {
    fn from(n: TreeNeuron) -> Self {
        Self::Neuron(Neuron::Tree(n))
    }
}

impl From<MeshNeuron> for NeuronInput {
    fn from(n: MeshNeuron) -> Self {
        Self::Neuron(Neuron::Mesh(n))
    }
}

impl From<Table> for NeuronInput {
    fn from(t: Table) -> Self {
        Self::Table(t)
    }
}

impl From<NodeTable> for NeuronInput {
    fn from(t: NodeTable) -> Self {
        Self::Nodes(t)
    }
}

impl From<NeuronSource> for NeuronInput {
    fn from(s: NeuronSource) -> Self {
        Self::Source(s)
    }
}

/// Overrides and collaborators used while constructing a neuron.
#[derive(Debug, Clone, Default)]
pub struct ConstructOptions {
    pub units: Option<String>,
    pub name: Option<String>,
    pub id: Option<NeuronId>,
    pub soma: Option<SomaSpec>,
    pub metadata: BTreeMap<String, Value>,
    pub loader: Option<Arc<dyn NeuronLoader>>,
    pub config: CoreConfig,
}

impl ConstructOptions {
    #[must_use]
    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<NeuronId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_soma(mut self, soma: impl Into<SomaSpec>) -> Self {
        self.soma = Some(soma.into());
        self
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn NeuronLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    fn apply_core(&self, core: &mut NeuronCore) -> Result<()> {
        if let Some(units) = &self.units {
            core.set_units(Some(units))?;
        }
        if let Some(name) = &self.name {
            core.set_name(Some(name.clone()));
        }
        if let Some(id) = &self.id {
            core.set_id(id.clone());
        }
        for (k, v) in &self.metadata {
            core.register_attr(k, v.clone());
        }
        Ok(())
    }

    /// Loads through the configured loader; skeletons pick up `self.config`.
    fn load(&self, source: &NeuronSource) -> Result<Neuron> {
        let loader = self.loader.as_ref().ok_or_else(|| {
            Error::Unsupported(format!("no loader configured to read {source:?}"))
        })?;
        Ok(match loader.load(source)? {
            Neuron::Tree(t) => Neuron::Tree(
                t.with_fast_graph(self.config.use_fast_graph)
                    .with_soma_config(self.config.soma.clone()),
            ),
            mesh @ Neuron::Mesh(_) => mesh,
        })
    }
}

impl TreeNeuron {
    /// Builds a skeleton from a copyable neuron, a node table or a source.
    ///
    /// Any other input fails with [`Error::Construction`].
    pub fn from_input(input: &NeuronInput, opts: &ConstructOptions) -> Result<Self> {
        let mut n = match input {
            NeuronInput::Neuron(Neuron::Tree(t)) => t.copy(),
            NeuronInput::Table(t) => Self::from_table(t.clone())?
                .with_fast_graph(opts.config.use_fast_graph)
                .with_soma_config(opts.config.soma.clone()),
            NeuronInput::Nodes(nodes) => Self::new(nodes.clone().validated()?)
                .with_fast_graph(opts.config.use_fast_graph)
                .with_soma_config(opts.config.soma.clone()),
            NeuronInput::Source(src) => match opts.load(src)? {
                Neuron::Tree(t) => t,
                Neuron::Mesh(_) => {
                    return Err(Error::Construction(
                        "source holds a MeshNeuron".to_string(),
                    ))
                }
            },
            other => {
                return Err(Error::Construction(format!(
                    "TreeNeuron cannot be built from {}",
                    other.kind_name()
                )))
            }
        };
        opts.apply_core(&mut n.core)?;
        if let Some(soma) = &opts.soma {
            n.set_soma(soma.clone())?;
        }
        Ok(n)
    }
}

impl MeshNeuron {
    /// Builds a mesh from a copyable neuron, vertex/face arrays or a source.
    ///
    /// Any other input fails with [`Error::Construction`].
    pub fn from_input(input: &NeuronInput, opts: &ConstructOptions) -> Result<Self> {
        let mut n = match input {
            NeuronInput::Neuron(Neuron::Mesh(m)) => m.copy(),
            NeuronInput::Mesh { vertices, faces } => {
                Self::from_arrays(vertices.clone(), faces.clone())?
            }
            NeuronInput::Source(src) => match opts.load(src)? {
                Neuron::Mesh(m) => m,
                Neuron::Tree(_) => {
                    return Err(Error::Construction(
                        "source holds a TreeNeuron".to_string(),
                    ))
                }
            },
            other => {
                return Err(Error::Construction(format!(
                    "MeshNeuron cannot be built from {}",
                    other.kind_name()
                )))
            }
        };
        opts.apply_core(&mut n.core)?;
        Ok(n)
    }
}

impl Neuron {
    /// Constructs a neuron of whichever variant accepts the input.
    ///
    /// Variants are tried in order (tree, then mesh); only
    /// [`Error::Construction`] falls through to the next one.
    pub fn new(input: impl Into<NeuronInput>, opts: &ConstructOptions) -> Result<Self> {
        let input = input.into();
        if let NeuronInput::Source(src) = &input {
            let mut n = opts.load(src)?;
            opts.apply_core(n.core_mut())?;
            if let (Self::Tree(t), Some(soma)) = (&mut n, &opts.soma) {
                t.set_soma(soma.clone())?;
            }
            return Ok(n);
        }
        match TreeNeuron::from_input(&input, opts) {
            Ok(t) => return Ok(Self::Tree(t)),
            Err(e) if !e.is_construction() => return Err(e),
            Err(_) => {}
        }
        match MeshNeuron::from_input(&input, opts) {
            Ok(m) => Ok(Self::Mesh(m)),
            Err(e) if e.is_construction() => Err(Error::Construction(format!(
                "unable to construct any neuron from {}",
                input.kind_name()
            ))),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn kind(&self) -> NeuronKind {
        match self {
            Self::Tree(_) => NeuronKind::Tree,
            Self::Mesh(_) => NeuronKind::Mesh,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    #[must_use]
    pub fn core(&self) -> &NeuronCore {
        match self {
            Self::Tree(t) => t.core(),
            Self::Mesh(m) => m.core(),
        }
    }

    pub fn core_mut(&mut self) -> &mut NeuronCore {
        match self {
            Self::Tree(t) => t.core_mut(),
            Self::Mesh(m) => m.core_mut(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &NeuronId {
        self.core().id()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.core().name()
    }

    #[must_use]
    pub fn units(&self) -> Quantity {
        self.core().units()
    }

    #[must_use]
    pub fn connectors(&self) -> Option<&ConnectorTable> {
        self.core().connectors()
    }

    #[must_use]
    pub fn as_tree(&self) -> Option<&TreeNeuron> {
        match self {
            Self::Tree(t) => Some(t),
            Self::Mesh(_) => None,
        }
    }

    pub fn as_tree_mut(&mut self) -> Option<&mut TreeNeuron> {
        match self {
            Self::Tree(t) => Some(t),
            Self::Mesh(_) => None,
        }
    }

    #[must_use]
    pub fn as_mesh(&self) -> Option<&MeshNeuron> {
        match self {
            Self::Mesh(m) => Some(m),
            Self::Tree(_) => None,
        }
    }

    #[must_use]
    pub fn bbox(&self) -> Option<[[f64; 2]; 3]> {
        match self {
            Self::Tree(t) => t.bbox(),
            Self::Mesh(m) => m.bbox(),
        }
    }

    /// Copy with independent tables.
    #[must_use]
    pub fn copy(&self) -> Self {
        match self {
            Self::Tree(t) => Self::Tree(t.copy()),
            Self::Mesh(m) => Self::Mesh(m.copy()),
        }
    }

    /// Copy that also duplicates cached graph data.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Tree(t) => Self::Tree(t.deep_copy()),
            Self::Mesh(m) => Self::Mesh(m.copy()),
        }
    }

    /// Scales coordinates (and connectors) in place.
    pub fn scale(&mut self, factor: f64) {
        match self {
            Self::Tree(t) => t.scale(factor),
            Self::Mesh(m) => m.scale(factor),
        }
    }

    pub fn divide(&mut self, divisor: f64) {
        match self {
            Self::Tree(t) => t.divide(divisor),
            Self::Mesh(m) => m.divide(divisor),
        }
    }

    pub fn convert_units(&mut self, to: &str) -> Result<()> {
        match self {
            Self::Tree(t) => t.convert_units(to),
            Self::Mesh(m) => m.convert_units(to),
        }
    }

    /// Calls a named method without mutable access.
    pub fn call_ref(&self, name: &str, args: &CallArgs) -> Result<Value> {
        match self.attr(name)? {
            Attr::Method(m) => m.invoke(self, args),
            Attr::Value(_) => Err(Error::Unsupported(format!("\"{name}\" is not callable"))),
        }
    }

    /// Attributes compared by domain equality.
    #[must_use]
    pub fn eq_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::Tree(_) => TREE_EQ_ATTRIBUTES,
            Self::Mesh(_) => MESH_EQ_ATTRIBUTES,
        }
    }

    /// Summary properties: the variant's fixed set plus registered attributes.
    #[must_use]
    pub fn summary_props(&self) -> Vec<String> {
        let fixed = match self {
            Self::Tree(_) => TREE_SUMMARY_PROPS,
            Self::Mesh(_) => MESH_SUMMARY_PROPS,
        };
        let mut props: Vec<String> = fixed.iter().map(ToString::to_string).collect();
        for extra in self.core().summary_extra() {
            if !props.contains(extra) {
                props.push(extra.clone());
            }
        }
        props
    }

    /// One summary row; `id` is placed third unless it was auto-generated.
    pub fn summary(&self, add_props: &[&str]) -> Result<Vec<(String, Value)>> {
        let mut props = self.summary_props();
        for p in add_props {
            if !props.iter().any(|q| q == p) {
                props.push((*p).to_string());
            }
        }
        let mut row = props
            .into_iter()
            .map(|p| {
                let v = self.get(&p)?;
                Ok((p, v))
            })
            .collect::<Result<Vec<_>>>()?;
        if !self.id().is_generated() {
            row.insert(row.len().min(2), ("id".to_string(), self.id().to_value()));
        }
        Ok(row)
    }

    /// Domain equality over [`Self::eq_attributes`]; `None` if the variants differ.
    #[must_use]
    pub fn domain_eq(&self, other: &Self) -> Option<bool> {
        if self.kind() != other.kind() {
            return None;
        }
        Some(self.eq_attributes().iter().all(|a| {
            matches!((self.get(a), other.get(a)), (Ok(x), Ok(y)) if x == y)
        }))
    }
}

impl PartialEq for Neuron {
    fn eq(&self, other: &Self) -> bool {
        self.domain_eq(other) == Some(true)
    }
}

impl From<TreeNeuron> for Neuron {
    fn from(t: TreeNeuron) -> Self {
        Self::Tree(t)
    }
}

impl From<MeshNeuron> for Neuron {
    fn from(m: MeshNeuron) -> Self {
        Self::Mesh(m)
    }
}

impl Mul<f64> for &Neuron {
    type Output = Neuron;

    fn mul(self, rhs: f64) -> Neuron {
        let mut n = self.copy();
        n.scale(rhs);
        n
    }
}

impl Div<f64> for &Neuron {
    type Output = Neuron;

    fn div(self, rhs: f64) -> Neuron {
        let mut n = self.copy();
        n.divide(rhs);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SomaConfig;
    use crate::nodes::NodeRow;
    use crate::table::Cell;
    use ndarray::{array, IxDyn};

    fn node_table() -> Table {
        Table::from_columns(vec![
            ("node_id", vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]),
            ("parent_id", vec![Cell::Int(-1), Cell::Int(1), Cell::Int(2)]),
            ("x", vec![Cell::Float(0.0), Cell::Float(1.0), Cell::Float(2.0)]),
            ("y", vec![Cell::Float(0.0); 3]),
            ("z", vec![Cell::Float(0.0); 3]),
        ])
        .unwrap()
    }

    #[test]
    fn test_construct_tree_from_table() {
        let opts = ConstructOptions::default()
            .with_units("8 nm")
            .with_name("DA1")
            .with_id(7i64);
        let n = Neuron::new(node_table(), &opts).unwrap();
        assert_eq!(n.kind(), NeuronKind::Tree);
        assert_eq!(n.name(), Some("DA1"));
        assert_eq!(n.id(), &NeuronId::Int(7));
        assert_eq!(n.units().to_string(), "8 nanometer");
    }

    #[test]
    fn test_construct_falls_through_to_mesh() {
        let vertices = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let faces = array![[0usize, 1, 2]];
        let input = Value::List(vec![Value::Array(vertices), Value::IndexArray(faces)]);
        let n = Neuron::new(input, &ConstructOptions::default()).unwrap();
        assert_eq!(n.kind(), NeuronKind::Mesh);
    }

    #[test]
    fn test_invalid_payload_is_construction_error() {
        let err = Neuron::new(Value::Float(1.5), &ConstructOptions::default()).unwrap_err();
        assert!(err.is_construction());

        let flat = NeuronInput::Mesh {
            vertices: ArrayD::zeros(IxDyn(&[3])),
            faces: ArrayD::zeros(IxDyn(&[0, 3])),
        };
        let err = Neuron::new(flat, &ConstructOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[derive(Debug)]
    struct FixedLoader;

    impl NeuronLoader for FixedLoader {
        fn load(&self, _: &NeuronSource) -> Result<Neuron> {
            let t = TreeNeuron::from_table(node_table())?;
            Ok(Neuron::Tree(t))
        }
    }

    #[test]
    fn test_loaded_source_uses_construct_config() {
        let soma = SomaConfig {
            label: 3,
            min_radius: Some(2.0),
        };
        let config = CoreConfig::default()
            .with_fast_graph(false)
            .with_soma(soma.clone());
        let opts = ConstructOptions::default()
            .with_loader(Arc::new(FixedLoader))
            .with_config(config);
        let src = NeuronSource::Bytes(Vec::new());

        for n in [
            Neuron::new(src.clone(), &opts).unwrap(),
            Neuron::Tree(TreeNeuron::from_input(&src.clone().into(), &opts).unwrap()),
        ] {
            let t = n.as_tree().unwrap();
            assert!(t.fast_graph().is_none());
            assert_eq!(t.soma_config(), &soma);
        }
    }

    #[test]
    fn test_source_without_loader() {
        let src = NeuronSource::Path("neuron.json".into());
        let err = Neuron::new(src, &ConstructOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_summary_and_equality() {
        let n = Neuron::new(node_table(), &ConstructOptions::default()).unwrap();
        let row = n.summary(&[]).unwrap();
        assert_eq!(row[0], ("type".to_string(), Value::from("TreeNeuron")));
        assert!(row.iter().all(|(k, _)| k != "id"));

        let named = Neuron::new(n.clone(), &ConstructOptions::default().with_id("abc")).unwrap();
        let row = named.summary(&["volume"]).unwrap();
        assert_eq!(row[2].0, "id");
        assert_eq!(row.last().unwrap().0, "volume");

        assert_eq!(n, n.copy());
        let mut pruned = n.copy();
        pruned.as_tree_mut().unwrap().prune_distal_to(&[2]).unwrap();
        assert_ne!(n, pruned);
    }

    #[test]
    fn test_domain_eq_across_variants() {
        let tree = Neuron::from(TreeNeuron::new(
            NodeTable::from_rows([NodeRow::new(1, -1, 0.0, 0.0, 0.0)]).unwrap(),
        ));
        let mesh = Neuron::from(
            MeshNeuron::new(array![[0.0, 0.0, 0.0]], ndarray::Array2::zeros((0, 3))).unwrap(),
        );
        assert_eq!(tree.domain_eq(&mesh), None);
        assert_ne!(tree, mesh);
    }

    #[test]
    fn test_scaling_operators() {
        let n = Neuron::new(node_table(), &ConstructOptions::default().with_units("nm")).unwrap();
        let scaled = &(&n * 1000.0) / 1000.0;
        assert_eq!(scaled.units(), n.units());
        approx::assert_relative_eq!(
            scaled.get("cable_length").unwrap().as_f64().unwrap(),
            n.get("cable_length").unwrap().as_f64().unwrap(),
            epsilon = 1e-9
        );
    }
}
