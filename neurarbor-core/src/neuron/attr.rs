//! Attribute resolution and named method dispatch for [`Neuron`].
//!
//! Names resolve through a fixed chain:
//!
//! 1. explicit properties (`nodes`, `cable_length`, `vertices`, ...)
//! 2. registered metadata
//! 3. named methods (`copy`, `resample`, `prune_twigs`, ...)
//! 4. `has_<X>`: `X` exists, is not `None` and is not an empty table
//! 5. `n_<X>`: length of `X`, `None` counting as 0
//! 6. derived representations (`graph`, `segments`, `dps`, ...)
//! 7. mesh geometry queries (`area`, `is_watertight`, ...)

use super::{Neuron, NeuronKind};
use crate::error::{Error, Result};
use crate::graph::TreeGraph;
use crate::morpho::{BoundingBox, StrahlerSelection, VolumeMode};
use crate::table::Table;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Positional and keyword arguments of a dispatched call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.to_string(), value.into());
        self
    }

    /// Keyword `name`, else positional `index`.
    #[must_use]
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.keyword
            .get(name)
            .or_else(|| self.positional.get(index))
    }

    /// Boolean keyword, false if absent.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.keyword
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn required(&self, index: usize, name: &str) -> Result<&Value> {
        self.get(index, name)
            .ok_or_else(|| Error::Validation(format!("missing argument \"{name}\"")))
    }

    fn invalid(name: &str, expected: &str, got: &Value) -> Error {
        Error::Validation(format!(
            "argument \"{name}\" must be {expected}, got {}",
            got.kind_name()
        ))
    }

    pub fn f64_arg(&self, index: usize, name: &str) -> Result<f64> {
        let v = self.required(index, name)?;
        v.as_f64().ok_or_else(|| Self::invalid(name, "a number", v))
    }

    pub fn i64_arg(&self, index: usize, name: &str) -> Result<i64> {
        let v = self.required(index, name)?;
        v.as_i64().ok_or_else(|| Self::invalid(name, "an integer", v))
    }

    pub fn str_arg(&self, index: usize, name: &str) -> Result<&str> {
        let v = self.required(index, name)?;
        v.as_str().ok_or_else(|| Self::invalid(name, "a string", v))
    }

    /// One node id or a list of node ids.
    pub fn ids_arg(&self, index: usize, name: &str) -> Result<Vec<i64>> {
        let v = self.required(index, name)?;
        v.as_ids().ok_or_else(|| Self::invalid(name, "node id(s)", v))
    }

    fn bool_or(&self, index: usize, name: &str, default: bool) -> bool {
        self.get(index, name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }
}

type ReadFn = Arc<dyn Fn(&Neuron, &CallArgs) -> Result<Value> + Send + Sync>;
type MutateFn = Arc<dyn Fn(&mut Neuron, &CallArgs) -> Result<()> + Send + Sync>;

/// A callable bound by name.
#[derive(Clone)]
pub enum NeuronMethod {
    /// Leaves the neuron untouched and returns a value.
    Read(ReadFn),
    /// Mutates the neuron; see [`NeuronMethod::invoke_mut`].
    Mutate(MutateFn),
}

impl NeuronMethod {
    pub fn read<F>(f: F) -> Self
    where
        F: Fn(&Neuron, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Read(Arc::new(f))
    }

    pub fn mutate<F>(f: F) -> Self
    where
        F: Fn(&mut Neuron, &CallArgs) -> Result<()> + Send + Sync + 'static,
    {
        Self::Mutate(Arc::new(f))
    }

    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Mutate(_))
    }

    /// Calls without mutable access; mutating methods run on a copy that is
    /// returned as [`Value::Neuron`].
    pub fn invoke(&self, n: &Neuron, args: &CallArgs) -> Result<Value> {
        match self {
            Self::Read(f) => f(n, args),
            Self::Mutate(f) => {
                if args.flag("inplace") {
                    return Err(Error::Unsupported(
                        "in-place call requires mutable access".to_string(),
                    ));
                }
                let mut copy = n.copy();
                f(&mut copy, args)?;
                Ok(Value::from(copy))
            }
        }
    }

    /// Calls with mutable access. With `inplace=true` a mutating method changes
    /// `n` and returns `None`; otherwise it behaves like [`Self::invoke`].
    pub fn invoke_mut(&self, n: &mut Neuron, args: &CallArgs) -> Result<Value> {
        match self {
            Self::Mutate(f) if args.flag("inplace") => {
                f(n, args)?;
                Ok(Value::None)
            }
            _ => self.invoke(n, args),
        }
    }
}

impl fmt::Debug for NeuronMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(_) => f.write_str("NeuronMethod::Read(..)"),
            Self::Mutate(_) => f.write_str("NeuronMethod::Mutate(..)"),
        }
    }
}

/// Result of resolving a name on a neuron.
#[derive(Debug, Clone)]
pub enum Attr {
    Value(Value),
    Method(NeuronMethod),
}

impl Attr {
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self, Self::Method(_))
    }
}

fn tree_mut<'a>(n: &'a mut Neuron, method: &str) -> Result<&'a mut super::TreeNeuron> {
    match n {
        Neuron::Tree(t) => Ok(t),
        Neuron::Mesh(_) => Err(Error::Unsupported(format!(
            "{method} is only defined for TreeNeuron"
        ))),
    }
}

fn strahler_arg(args: &CallArgs) -> Result<StrahlerSelection> {
    let v = args.required(0, "to_prune")?;
    match v {
        Value::List(items) => items
            .iter()
            .map(Value::as_i64)
            .collect::<Option<Vec<i64>>>()
            .map(StrahlerSelection::Orders)
            .ok_or_else(|| CallArgs::invalid("to_prune", "integer order(s)", v)),
        other => other
            .as_i64()
            .map(StrahlerSelection::Order)
            .ok_or_else(|| CallArgs::invalid("to_prune", "integer order(s)", v)),
    }
}

fn volume_arg(args: &CallArgs) -> Result<BoundingBox> {
    let v = args.required(0, "volume")?;
    match v {
        Value::Array(a) if a.dim() == (3, 2) => Ok(BoundingBox::new(
            [a[[0, 0]], a[[1, 0]], a[[2, 0]]],
            [a[[0, 1]], a[[1, 1]], a[[2, 1]]],
        )),
        other => Err(CallArgs::invalid("volume", "a 3x2 bounding box", other)),
    }
}

/// Named methods available on neurons of the given kind.
pub(crate) fn method(kind: NeuronKind, name: &str) -> Option<NeuronMethod> {
    let m = match name {
        "copy" => NeuronMethod::read(|n, args| {
            let copy = if args.flag("deep") { n.deep_copy() } else { n.copy() };
            Ok(Value::from(copy))
        }),
        "summary" => NeuronMethod::read(|n, _| {
            let row = n.summary(&[])?;
            let mut t = Table::new();
            t.push_row(row.into_iter().map(|(k, v)| (k, v.to_cell())).collect());
            Ok(Value::Table(t))
        }),
        "convert_units" => NeuronMethod::mutate(|n, args| n.convert_units(args.str_arg(0, "to")?)),
        _ if kind == NeuronKind::Mesh => return None,
        "get_graph" => NeuronMethod::read(|n, _| {
            let tree = n
                .as_tree()
                .ok_or_else(|| Error::Unsupported("get_graph".to_string()))?;
            Ok(Value::Graph(Arc::new(TreeGraph::from_nodes(tree.nodes()))))
        }),
        "get_dps" => NeuronMethod::read(|n, _| {
            let tree = n
                .as_tree()
                .ok_or_else(|| Error::Unsupported("get_dps".to_string()))?;
            Ok(Value::Table(
                crate::graph::Dotprops::from_nodes(tree.nodes()).to_table(),
            ))
        }),
        "resample" => NeuronMethod::mutate(|n, args| {
            tree_mut(n, "resample")?.resample(args.f64_arg(0, "resample_to")?)
        }),
        "downsample" => NeuronMethod::mutate(|n, args| {
            tree_mut(n, "downsample")?.downsample(args.f64_arg(0, "factor")?)
        }),
        "reroot" => NeuronMethod::mutate(|n, args| {
            tree_mut(n, "reroot")?.reroot(args.i64_arg(0, "new_root")?)
        }),
        "prune_distal_to" => NeuronMethod::mutate(|n, args| {
            let nodes = args.ids_arg(0, "nodes")?;
            tree_mut(n, "prune_distal_to")?.prune_distal_to(&nodes)
        }),
        "prune_proximal_to" => NeuronMethod::mutate(|n, args| {
            let nodes = args.ids_arg(0, "nodes")?;
            tree_mut(n, "prune_proximal_to")?.prune_proximal_to(&nodes)
        }),
        "prune_by_strahler" => NeuronMethod::mutate(|n, args| {
            let selection = strahler_arg(args)?;
            tree_mut(n, "prune_by_strahler")?.prune_by_strahler(&selection)
        }),
        "prune_twigs" => NeuronMethod::mutate(|n, args| {
            let size = args.f64_arg(0, "size")?;
            let rounds = match args.get(1, "recursive") {
                Some(Value::Bool(true)) => usize::MAX,
                Some(v) => v
                    .as_i64()
                    .map_or(1, |r| usize::try_from(r).unwrap_or(1)),
                None => 1,
            };
            tree_mut(n, "prune_twigs")?.prune_twigs(size, rounds)
        }),
        "prune_by_longest_neurite" => NeuronMethod::mutate(|n, args| {
            let count = args
                .get(0, "n")
                .and_then(Value::as_i64)
                .map_or(1, |v| usize::try_from(v).unwrap_or(0));
            let reroot = args.bool_or(1, "reroot_soma", false);
            tree_mut(n, "prune_by_longest_neurite")?.prune_by_longest_neurite(count, reroot)
        }),
        "prune_by_volume" => NeuronMethod::mutate(|n, args| {
            let volume = volume_arg(args)?;
            let mode = match args.get(1, "mode").and_then(Value::as_str) {
                Some("OUT" | "out") => VolumeMode::Outside,
                _ => VolumeMode::Inside,
            };
            let prevent = args.bool_or(2, "prevent_fragments", false);
            tree_mut(n, "prune_by_volume")?.prune_by_volume(&volume, mode, prevent)
        }),
        _ => return None,
    };
    Some(m)
}

fn soma_value(ids: Option<Vec<i64>>) -> Value {
    match ids {
        None => Value::None,
        Some(ids) if ids.len() == 1 => Value::Int(ids[0]),
        Some(ids) => Value::from(ids),
    }
}

impl Neuron {
    /// Explicitly defined properties.
    fn property(&self, name: &str) -> Result<Option<Value>> {
        let core = self.core();
        let common = match name {
            "id" => Some(core.id().to_value()),
            "name" => Some(Value::from(core.name().map(str::to_string))),
            "type" => Some(Value::from(self.type_name())),
            "units" => Some(Value::Quantity(core.units())),
            "connectors" => Some(Value::from(core.connectors().map(|c| c.to_table()))),
            "presynapses" => Some(Value::Table(core.presynapses()?.to_table())),
            "postsynapses" => Some(Value::Table(core.postsynapses()?.to_table())),
            "bbox" => Some(Value::from(self.bbox())),
            _ => None,
        };
        if common.is_some() {
            return Ok(common);
        }
        let value = match self {
            Self::Tree(t) => match name {
                "nodes" => Value::Table(t.nodes().to_table()),
                "soma" => soma_value(t.soma()),
                "root" => Value::from(t.root()),
                "n_nodes" => Value::from(t.n_nodes()),
                "n_connectors" => Value::from(t.n_connectors()),
                "n_branches" => Value::from(t.n_branches()),
                "n_leafs" => Value::from(t.n_leafs()),
                "cable_length" => Value::Float(t.cable_length()),
                "volume" => Value::Float(t.volume()),
                "sampling_resolution" => Value::Float(t.sampling_resolution()),
                "n_skeletons" => Value::from(t.n_skeletons()),
                "n_trees" => Value::from(t.n_trees()),
                "is_tree" => Value::Bool(t.is_tree()),
                "subtrees" => Value::from(t.subtrees()),
                "cycles" => Value::from(
                    t.cycles()
                        .map(|c| c.into_iter().map(|(a, b)| vec![a, b]).collect::<Vec<_>>()),
                ),
                _ => return Ok(None),
            },
            Self::Mesh(m) => match name {
                "vertices" => Value::Array(m.vertices().clone()),
                "faces" => Value::IndexArray(m.faces().clone()),
                "n_vertices" => Value::from(m.n_vertices()),
                "n_faces" => Value::from(m.n_faces()),
                _ => return Ok(None),
            },
        };
        Ok(Some(value))
    }

    /// Cached representations computed on demand.
    fn derived(&self, name: &str) -> Option<Value> {
        let Self::Tree(t) = self else {
            return None;
        };
        let value = match name {
            "graph" => Value::Graph(t.graph()),
            "segments" => Value::from(t.segments().as_ref().clone()),
            "small_segments" => Value::from(t.small_segments().as_ref().clone()),
            "dps" => Value::Table(t.dps().to_table()),
            "simple" => Value::from(Neuron::Tree(t.simple().as_ref().clone())),
            _ => return None,
        };
        Some(value)
    }

    /// Resolves a name to a value or a callable method.
    pub fn attr(&self, name: &str) -> Result<Attr> {
        if let Some(v) = self.property(name)? {
            return Ok(Attr::Value(v));
        }
        if let Some(v) = self.core().metadata().get(name) {
            return Ok(Attr::Value(v.clone()));
        }
        if let Some(m) = method(self.kind(), name) {
            return Ok(Attr::Method(m));
        }
        if let Some(inner) = name.strip_prefix("has_") {
            let present = match self.attr(inner) {
                Ok(Attr::Method(_)) => true,
                Ok(Attr::Value(v)) => match v {
                    Value::None => false,
                    Value::Table(t) => !t.is_empty(),
                    _ => true,
                },
                Err(Error::AttributeNotFound(_)) => false,
                Err(e) => return Err(e),
            };
            return Ok(Attr::Value(Value::Bool(present)));
        }
        if let Some(inner) = name.strip_prefix("n_") {
            if let Ok(Attr::Value(v)) = self.attr(inner) {
                if let Ok(len) = v.len() {
                    return Ok(Attr::Value(Value::from(len)));
                }
            }
        }
        if let Some(v) = self.derived(name) {
            return Ok(Attr::Value(v));
        }
        if let Self::Mesh(m) = self {
            if let Some(v) = m.trimesh().attr(name) {
                return Ok(Attr::Value(v));
            }
        }
        Err(Error::AttributeNotFound(name.to_string()))
    }

    /// Resolves a name to a value; methods are rejected.
    pub fn get(&self, name: &str) -> Result<Value> {
        match self.attr(name)? {
            Attr::Value(v) => Ok(v),
            Attr::Method(_) => Err(Error::Unsupported(format!(
                "\"{name}\" is a method, not a value"
            ))),
        }
    }

    /// Calls a named method, honouring the `inplace` keyword.
    pub fn call(&mut self, name: &str, args: &CallArgs) -> Result<Value> {
        match self.attr(name)? {
            Attr::Method(m) => m.invoke_mut(self, args),
            Attr::Value(_) => Err(Error::Unsupported(format!("\"{name}\" is not callable"))),
        }
    }

    /// Names of table-valued attributes that currently hold data.
    #[must_use]
    pub fn datatables(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if matches!(self, Self::Tree(_)) {
            out.push("nodes");
        }
        if self.core().connectors().is_some() {
            out.push("connectors");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{NodeRow, NodeTable};
    use crate::neuron::TreeNeuron;

    fn tree() -> Neuron {
        let nodes = NodeTable::from_rows([
            NodeRow::new(1, -1, 0.0, 0.0, 0.0),
            NodeRow::new(2, 1, 1.0, 0.0, 0.0),
            NodeRow::new(3, 2, 2.0, 0.0, 0.0),
            NodeRow::new(4, 2, 1.0, 1.0, 0.0),
        ])
        .unwrap();
        Neuron::Tree(TreeNeuron::new(nodes).with_units("nm").unwrap())
    }

    #[test]
    fn test_explicit_and_fallback_attributes() {
        let n = tree();
        assert_eq!(n.get("n_nodes").unwrap(), Value::Int(4));
        assert_eq!(n.get("has_nodes").unwrap(), Value::Bool(true));
        assert_eq!(n.get("has_connectors").unwrap(), Value::Bool(false));
        assert_eq!(n.get("n_connectors").unwrap(), Value::Int(0));
        assert_eq!(n.get("n_segments").unwrap(), Value::Int(2));
        assert_eq!(n.get("has_bogus").unwrap(), Value::Bool(false));
        assert!(matches!(n.get("graph").unwrap(), Value::Graph(_)));
        assert!(matches!(
            n.get("bogus"),
            Err(Error::AttributeNotFound(name)) if name == "bogus"
        ));
    }

    #[test]
    fn test_metadata_resolves() {
        let mut n = tree();
        n.core_mut().register_attr("confidence", Value::Float(0.5));
        assert_eq!(n.get("confidence").unwrap(), Value::Float(0.5));
        assert_eq!(n.get("has_confidence").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_count_of_unsized_attribute_is_not_found() {
        let mut n = tree();
        n.core_mut().register_attr("confidence", Value::Float(0.5));
        assert!(matches!(
            n.get("n_confidence"),
            Err(Error::AttributeNotFound(name)) if name == "n_confidence"
        ));
        n.core_mut().register_attr("tags", Value::from(vec![1i64, 2]));
        assert_eq!(n.get("n_tags").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_methods_respect_inplace() {
        let mut n = tree();
        assert!(n.attr("prune_twigs").unwrap().is_method());
        assert!(n.get("copy").is_err());

        let copy = n.call("reroot", &CallArgs::new().arg(3i64)).unwrap();
        assert_eq!(copy.as_neuron().unwrap().get("root").unwrap(), Value::from(vec![3i64]));
        assert_eq!(n.get("root").unwrap(), Value::from(vec![1i64]));

        let ret = n
            .call("reroot", &CallArgs::new().arg(3i64).kwarg("inplace", true))
            .unwrap();
        assert!(ret.is_none());
        assert_eq!(n.get("root").unwrap(), Value::from(vec![3i64]));
    }

    #[test]
    fn test_get_dps_returns_table() {
        let n = tree();
        let t = n.call_ref("get_dps", &CallArgs::new()).unwrap();
        assert_eq!(t.as_table().unwrap().n_rows(), 3);
    }

    #[test]
    fn test_missing_argument() {
        let mut n = tree();
        assert!(matches!(
            n.call("resample", &CallArgs::new()),
            Err(Error::Validation(_))
        ));
    }
}
