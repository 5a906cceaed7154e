//! Ordered collections of neurons with vectorized attribute access.
//!
//! A [`NeuronList`] holds shared handles ([`NeuronRef`]) to neurons of any
//! variant. The same neuron may appear several times and may be shared with
//! other lists; subsetting copies neurons only if `copy_on_subset` is set.
//!
//! Attribute lookups by name are forwarded to every neuron and aggregated:
//!
//! - tables are concatenated with a `neuron` column holding the list index
//! - unit-bearing values are converted to the unit of the first neuron
//! - methods come back as a [`NeuronProcessor`] bound to every neuron
//! - anything else is returned as one value per neuron

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::neuron::{
    Attr, CallArgs, ConstructOptions, MeshNeuron, Neuron, NeuronId, NeuronInput, NeuronKind,
    NeuronSource, TreeNeuron,
};
use crate::nodes::NodeTable;
use crate::processor::{Dispatched, NeuronProcessor};
use crate::progress::Progress;
use crate::table::{Cell, Table};
use crate::units::{Quantity, QuantityArray};
use crate::value::Value;
use log::{debug, warn};
use parking_lot::RwLock;
use rand::Rng;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::{Add, BitAnd, Div, Mul, Range, RangeFrom, RangeFull, RangeTo, Sub};
use std::sync::Arc;

/// Shared, lockable handle to a neuron held by one or more lists.
pub type NeuronRef = Arc<RwLock<Neuron>>;

/// Wraps a neuron into a fresh handle.
#[must_use]
pub fn neuron_ref(neuron: Neuron) -> NeuronRef {
    Arc::new(RwLock::new(neuron))
}

fn same(a: &NeuronRef, b: &NeuronRef) -> bool {
    Arc::ptr_eq(a, b) || *a.read() == *b.read()
}

/// Settings of a [`NeuronList`].
#[derive(Debug, Clone)]
pub struct ListConfig {
    /// Convert raw inputs and dispatch methods on a worker pool.
    pub use_threading: bool,
    pub n_cores: usize,
    /// Subsets hold copies instead of shared handles.
    pub copy_on_subset: bool,
    pub progress: Progress,
    /// Used to build neurons from raw inputs.
    pub construct: ConstructOptions,
}

impl ListConfig {
    #[must_use]
    pub fn from_core(core: &CoreConfig) -> Self {
        Self {
            use_threading: core.use_threading,
            n_cores: core.n_cores.max(1),
            copy_on_subset: core.copy_on_subset,
            progress: Progress::none(),
            construct: ConstructOptions::default().with_config(core.clone()),
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
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_construct(mut self, construct: ConstructOptions) -> Self {
        self.construct = construct;
        self
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        Self::from_core(&CoreConfig::default())
    }
}

/// One element handed to [`NeuronList::from_items`].
#[derive(Debug, Clone)]
pub enum ListItem {
    Neuron(Neuron),
    /// Kept as is, without copying.
    Ref(NeuronRef),
    /// Flattened into the new list.
    List(NeuronList),
    /// Converted with [`Neuron::new`].
    Input(NeuronInput),
}

impl From<Neuron> for ListItem {
    fn from(n: Neuron) -> Self {
        Self::Neuron(n)
    }
}

impl From<TreeNeuron> for ListItem {
    fn from(n: TreeNeuron) -> Self {
        Self::Neuron(Neuron::Tree(n))
    }
}

impl From<MeshNeuron> for ListItem {
    fn from(n: MeshNeuron) -> Self {
        Self::Neuron(Neuron::Mesh(n))
    }
}

impl From<NeuronRef> for ListItem {
    fn from(r: NeuronRef) -> Self {
        Self::Ref(r)
    }
}

impl From<NeuronList> for ListItem {
    fn from(nl: NeuronList) -> Self {
        Self::List(nl)
    }
}

impl From<&NeuronList> for ListItem {
    fn from(nl: &NeuronList) -> Self {
        Self::List(nl.clone())
    }
}

impl From<NeuronInput> for ListItem {
    fn from(input: NeuronInput) -> Self {
        match input {
            NeuronInput::Neuron(n) => Self::Neuron(n),
            other => Self::Input(other),
        }
    }
}

impl From<Table> for ListItem {
    fn from(t: Table) -> Self {
        Self::Input(NeuronInput::Table(t))
    }
}

impl From<NodeTable> for ListItem {
    fn from(t: NodeTable) -> Self {
        Self::Input(NeuronInput::Nodes(t))
    }
}

impl From<NeuronSource> for ListItem {
    fn from(s: NeuronSource) -> Self {
        Self::Input(NeuronInput::Source(s))
    }
}

impl From<Value> for ListItem {
    fn from(v: Value) -> Self {
        match v {
            Value::Neuron(n) => Self::Neuron(*n),
            other => Self::from(NeuronInput::from(other)),
        }
    }
}

/// Positional or name-based selection, see [`NeuronList::select`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Negative values count from the end.
    Index(isize),
    /// Half-open; negative bounds count from the end, others are clamped.
    Slice {
        start: Option<isize>,
        end: Option<isize>,
    },
    /// Must have one entry per neuron.
    Mask(Vec<bool>),
    /// Regular expression that must match the whole name.
    Name(String),
    /// Union of several selections, in order.
    Many(Vec<Selector>),
}

fn to_isize<T: TryInto<isize>>(v: T) -> isize {
    v.try_into().unwrap_or(isize::MAX)
}

impl From<isize> for Selector {
    fn from(i: isize) -> Self {
        Self::Index(i)
    }
}

impl From<i32> for Selector {
    fn from(i: i32) -> Self {
        Self::Index(to_isize(i))
    }
}

impl From<i64> for Selector {
    fn from(i: i64) -> Self {
        Self::Index(to_isize(i))
    }
}

impl From<usize> for Selector {
    fn from(i: usize) -> Self {
        Self::Index(to_isize(i))
    }
}

impl From<Range<usize>> for Selector {
    fn from(r: Range<usize>) -> Self {
        Self::Slice {
            start: Some(to_isize(r.start)),
            end: Some(to_isize(r.end)),
        }
    }
}

impl From<RangeFrom<usize>> for Selector {
    fn from(r: RangeFrom<usize>) -> Self {
        Self::Slice {
            start: Some(to_isize(r.start)),
            end: None,
        }
    }
}

impl From<RangeTo<usize>> for Selector {
    fn from(r: RangeTo<usize>) -> Self {
        Self::Slice {
            start: None,
            end: Some(to_isize(r.end)),
        }
    }
}

impl From<RangeFull> for Selector {
    fn from(_: RangeFull) -> Self {
        Self::Slice {
            start: None,
            end: None,
        }
    }
}

impl From<Vec<bool>> for Selector {
    fn from(mask: Vec<bool>) -> Self {
        Self::Mask(mask)
    }
}

impl From<&[bool]> for Selector {
    fn from(mask: &[bool]) -> Self {
        Self::Mask(mask.to_vec())
    }
}

impl From<&str> for Selector {
    fn from(pattern: &str) -> Self {
        Self::Name(pattern.to_string())
    }
}

impl From<String> for Selector {
    fn from(pattern: String) -> Self {
        Self::Name(pattern)
    }
}

impl From<Vec<usize>> for Selector {
    fn from(indices: Vec<usize>) -> Self {
        Self::Many(indices.into_iter().map(Self::from).collect())
    }
}

impl From<Vec<Selector>> for Selector {
    fn from(items: Vec<Selector>) -> Self {
        Self::Many(items)
    }
}

fn resolve_index(index: isize, len: usize) -> Option<usize> {
    let pos = if index < 0 {
        len.checked_sub(index.unsigned_abs())?
    } else {
        index.unsigned_abs()
    };
    (pos < len).then_some(pos)
}

fn slice_bounds(start: Option<isize>, end: Option<isize>, len: usize) -> (usize, usize) {
    let clamp = |i: isize| {
        if i < 0 {
            len.saturating_sub(i.unsigned_abs())
        } else {
            i.unsigned_abs().min(len)
        }
    };
    let a = start.map_or(0, clamp);
    let b = end.map_or(len, clamp);
    (a, b.max(a))
}

/// Result of an id lookup.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Exactly one neuron matched.
    Single(NeuronRef),
    Many(NeuronList),
}

impl Selection {
    #[must_use]
    pub fn single(self) -> Option<NeuronRef> {
        match self {
            Self::Single(n) => Some(n),
            Self::Many(_) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(nl) => nl.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregated attribute of a [`NeuronList`].
#[derive(Debug, Clone)]
pub enum ListAttr {
    Values(Vec<Value>),
    /// Concatenated tables with a `neuron` source column.
    Table(Table),
    /// Compatible quantities converted to the first neuron's unit.
    Quantities(QuantityArray),
    Method(NeuronProcessor),
}

impl ListAttr {
    /// One value per neuron; quantities become plain magnitudes.
    #[must_use]
    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Self::Values(v) => Some(v),
            Self::Quantities(q) => Some(q.magnitudes.into_iter().map(Value::Float).collect()),
            Self::Table(_) | Self::Method(_) => None,
        }
    }

    #[must_use]
    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_processor(self) -> Option<NeuronProcessor> {
        match self {
            Self::Method(p) => Some(p),
            _ => None,
        }
    }
}

fn aggregate_values(name: &str, values: Vec<Value>) -> ListAttr {
    let has_table = values.iter().any(|v| matches!(v, Value::Table(_)));
    if has_table
        && values
            .iter()
            .all(|v| matches!(v, Value::Table(_) | Value::None))
    {
        let tables: Vec<Table> = values
            .into_iter()
            .map(|v| match v {
                Value::Table(t) => t,
                _ => Table::new(),
            })
            .collect();
        return ListAttr::Table(Table::concat(&tables, Some("neuron")));
    }

    let quantities: Vec<Quantity> = values
        .iter()
        .filter_map(|v| match v {
            Value::Quantity(q) => Some(*q),
            _ => None,
        })
        .collect();
    if quantities.is_empty() {
        return ListAttr::Values(values);
    }
    if quantities.len() == values.len() {
        if let Some(array) = QuantityArray::from_compatible(&quantities) {
            return ListAttr::Quantities(array);
        }
        warn!("\"{name}\" contains incompatible units. Returning unitless values.");
    } else {
        warn!("\"{name}\" contains data with and without units. Removing units.");
    }
    ListAttr::Values(
        values
            .into_iter()
            .map(|v| match v {
                Value::Quantity(q) => Value::Float(q.magnitude),
                other => other,
            })
            .collect(),
    )
}

/// Ordered collection of neurons.
///
/// Cloning a list shares its neurons; use [`NeuronList::copy`] for
/// independent neurons.
#[derive(Clone)]
pub struct NeuronList {
    neurons: Vec<NeuronRef>,
    config: ListConfig,
}

impl NeuronList {
    /// Empty list with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::from_refs(Vec::new(), ListConfig::default())
    }

    #[must_use]
    pub fn from_refs(neurons: Vec<NeuronRef>, config: ListConfig) -> Self {
        Self { neurons, config }
    }

    #[must_use]
    pub fn from_neurons(neurons: impl IntoIterator<Item = Neuron>) -> Self {
        Self::from_refs(
            neurons.into_iter().map(neuron_ref).collect(),
            ListConfig::default(),
        )
    }

    /// Builds a list from neurons, handles, nested lists and raw inputs.
    ///
    /// Nested lists are flattened in place. Raw inputs are converted with
    /// [`Neuron::new`], on a pool of `config.n_cores` workers if threading
    /// is enabled; positions are preserved either way.
    ///
    /// # Errors
    ///
    /// Returns the first conversion error, e.g. [`Error::Construction`] for
    /// an input no variant accepts.
    pub fn from_items<I>(items: I, config: ListConfig) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<ListItem>,
    {
        let mut slots: Vec<Option<NeuronRef>> = Vec::new();
        let mut pending: Vec<(usize, NeuronInput)> = Vec::new();
        for item in items {
            match item.into() {
                ListItem::Neuron(n) => slots.push(Some(neuron_ref(n))),
                ListItem::Ref(r) => slots.push(Some(r)),
                ListItem::List(nl) => slots.extend(nl.neurons.into_iter().map(Some)),
                ListItem::Input(input) => {
                    pending.push((slots.len(), input));
                    slots.push(None);
                }
            }
        }
        for (i, n) in convert_inputs(pending, &config)? {
            slots[i] = Some(neuron_ref(n));
        }
        Ok(Self::from_refs(slots.into_iter().flatten().collect(), config))
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_config(mut self, config: ListConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    #[must_use]
    pub fn shape(&self) -> (usize,) {
        (self.neurons.len(),)
    }

    #[must_use]
    pub fn neurons(&self) -> &[NeuronRef] {
        &self.neurons
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NeuronRef> {
        self.neurons.iter()
    }

    /// Neuron at `index`; negative values count from the end.
    #[must_use]
    pub fn get(&self, index: isize) -> Option<NeuronRef> {
        resolve_index(index, self.len()).map(|i| Arc::clone(&self.neurons[i]))
    }

    pub fn push(&mut self, neuron: impl Into<Neuron>) {
        self.neurons.push(neuron_ref(neuron.into()));
    }

    #[must_use]
    pub fn ids(&self) -> Vec<NeuronId> {
        self.neurons.iter().map(|n| n.read().id().clone()).collect()
    }

    /// Distinct variants in order of first appearance.
    #[must_use]
    pub fn types(&self) -> Vec<NeuronKind> {
        let mut kinds = Vec::new();
        for n in &self.neurons {
            let kind = n.read().kind();
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// True if the list holds more than one variant.
    #[must_use]
    pub fn is_mixed(&self) -> bool {
        self.types().len() > 1
    }

    /// True if some ids occur more than once.
    #[must_use]
    pub fn is_degenerated(&self) -> bool {
        let unique: HashSet<NeuronId> = self.ids().into_iter().collect();
        unique.len() < self.len()
    }

    /// Bounding box over all neurons as `[[min, max]; 3]`.
    #[must_use]
    pub fn bbox(&self) -> Option<[[f64; 2]; 3]> {
        self.neurons
            .iter()
            .filter_map(|n| n.read().bbox())
            .reduce(|mut acc, b| {
                for (a, b) in acc.iter_mut().zip(b) {
                    a[0] = a[0].min(b[0]);
                    a[1] = a[1].max(b[1]);
                }
                acc
            })
    }

    /// True if any neuron is domain-equal to `neuron`.
    #[must_use]
    pub fn contains(&self, neuron: &Neuron) -> bool {
        self.neurons.iter().any(|n| *n.read() == *neuron)
    }

    fn contains_ref(&self, neuron: &NeuronRef) -> bool {
        self.neurons.iter().any(|n| same(n, neuron))
    }

    /// Copies every neuron into a new list with the same settings.
    #[must_use]
    pub fn copy(&self, deep: bool) -> Self {
        let neurons = self
            .neurons
            .iter()
            .map(|n| {
                let n = n.read();
                neuron_ref(if deep { n.deep_copy() } else { n.copy() })
            })
            .collect();
        Self::from_refs(neurons, self.config.clone())
    }

    /// New list over `refs`, copied if `copy_on_subset` is set.
    fn derived(&self, refs: Vec<NeuronRef>) -> Self {
        let neurons = if self.config.copy_on_subset {
            refs.iter().map(|n| neuron_ref(n.read().copy())).collect()
        } else {
            refs
        };
        Self::from_refs(neurons, self.config.clone())
    }

    fn filtered(&self, keep: impl Fn(&NeuronRef) -> bool) -> Self {
        self.derived(self.neurons.iter().filter(|n| keep(n)).cloned().collect())
    }

    /// Selects neurons by position, slice, mask, name pattern or a
    /// combination thereof.
    ///
    /// Each neuron appears at most once in the result, at its first
    /// selected position.
    ///
    /// # Errors
    ///
    /// [`Error::NoMatch`] if nothing was selected,
    /// [`Error::IndexOutOfRange`] for a bad index, [`Error::Validation`] for a
    /// mask of the wrong length and [`Error::Regex`] for an invalid pattern.
    pub fn select(&self, selector: impl Into<Selector>) -> Result<Self> {
        let mut picked = Vec::new();
        self.collect_selected(&selector.into(), &mut picked)?;
        if picked.is_empty() {
            return Err(Error::NoMatch);
        }
        let mut seen = HashSet::new();
        picked.retain(|n| seen.insert(Arc::as_ptr(n)));
        Ok(self.derived(picked))
    }

    fn collect_selected(&self, selector: &Selector, out: &mut Vec<NeuronRef>) -> Result<()> {
        let len = self.len();
        match selector {
            Selector::Index(index) => {
                let i = resolve_index(*index, len).ok_or(Error::IndexOutOfRange {
                    index: *index,
                    len,
                })?;
                out.push(Arc::clone(&self.neurons[i]));
            }
            Selector::Slice { start, end } => {
                let (a, b) = slice_bounds(*start, *end, len);
                out.extend(self.neurons[a..b].iter().cloned());
            }
            Selector::Mask(mask) => {
                if mask.len() != len {
                    return Err(Error::Validation(format!(
                        "mask of length {} for list of length {len}",
                        mask.len()
                    )));
                }
                out.extend(
                    self.neurons
                        .iter()
                        .zip(mask)
                        .filter(|(_, keep)| **keep)
                        .map(|(n, _)| Arc::clone(n)),
                );
            }
            Selector::Name(pattern) => {
                let re = Regex::new(&format!("^(?:{pattern})$"))?;
                out.extend(
                    self.neurons
                        .iter()
                        .filter(|n| re.is_match(n.read().name().unwrap_or_default()))
                        .cloned(),
                );
            }
            Selector::Many(items) => {
                for item in items {
                    self.collect_selected(item, out)?;
                }
            }
        }
        Ok(())
    }

    fn build_id_index(&self) -> HashMap<String, Vec<usize>> {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, n) in self.neurons.iter().enumerate() {
            index.entry(n.read().id().to_string()).or_default().push(i);
        }
        index
    }

    /// Looks up neurons by id, compared as strings.
    ///
    /// Matches are returned in the requested order. A single match is
    /// returned bare. Ids are read at call time, so in-place id changes
    /// are always seen.
    ///
    /// # Errors
    ///
    /// [`Error::IdNotFound`] naming every id without a match.
    pub fn idx<I, S>(&self, ids: I) -> Result<Selection>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let index = self.build_id_index();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            let id = id.to_string();
            match index.get(&id) {
                Some(hits) => found.extend(hits.iter().map(|&i| Arc::clone(&self.neurons[i]))),
                None => missing.push(id),
            }
        }
        if !missing.is_empty() {
            return Err(Error::IdNotFound(missing));
        }
        if found.len() == 1 {
            if let Some(n) = found.pop() {
                return Ok(Selection::Single(n));
            }
        }
        Ok(Selection::Many(Self::from_refs(found, self.config.clone())))
    }

    /// Resolves `name` on every neuron and aggregates the results.
    ///
    /// # Errors
    ///
    /// - [`Error::AttributeNotFound`] if no neuron has it (or the list is empty)
    /// - [`Error::AttributeMissing`] if only some neurons have it
    /// - [`Error::TypeMismatch`] if it is a method on some neurons only
    pub fn attr(&self, name: &str) -> Result<ListAttr> {
        if self.is_empty() {
            return Err(Error::AttributeNotFound(name.to_string()));
        }
        let mut resolved = Vec::with_capacity(self.len());
        for n in &self.neurons {
            let attr = n.read().attr(name);
            match attr {
                Ok(a) => resolved.push(a),
                Err(Error::AttributeNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if resolved.is_empty() {
            return Err(Error::AttributeNotFound(name.to_string()));
        }
        if resolved.len() < self.len() {
            return Err(Error::AttributeMissing(name.to_string()));
        }

        let n_methods = resolved.iter().filter(|a| a.is_method()).count();
        if n_methods == resolved.len() {
            let methods = resolved
                .into_iter()
                .filter_map(|a| match a {
                    Attr::Method(m) => Some(m),
                    Attr::Value(_) => None,
                })
                .collect();
            return Ok(ListAttr::Method(NeuronProcessor::from_methods(
                self, name, methods,
            )));
        }
        if n_methods > 0 {
            return Err(Error::TypeMismatch(name.to_string()));
        }
        let values = resolved
            .into_iter()
            .filter_map(|a| match a {
                Attr::Value(v) => Some(v),
                Attr::Method(_) => None,
            })
            .collect();
        Ok(aggregate_values(name, values))
    }

    /// One value per neuron for a non-method attribute.
    pub fn values(&self, name: &str) -> Result<Vec<Value>> {
        match self.attr(name)? {
            ListAttr::Table(_) => Err(Error::Unsupported(format!(
                "\"{name}\" aggregates into a table"
            ))),
            ListAttr::Method(_) => Err(Error::Unsupported(format!(
                "\"{name}\" is a method, not a value"
            ))),
            other => Ok(other.into_values().unwrap_or_default()),
        }
    }

    /// Calls the named method on every neuron.
    pub fn call(&self, name: &str, args: &CallArgs) -> Result<Dispatched> {
        match self.attr(name)? {
            ListAttr::Method(p) => p.call(args),
            _ => Err(Error::Unsupported(format!("\"{name}\" is not callable"))),
        }
    }

    /// Binds `func` to every neuron, see [`NeuronProcessor`].
    pub fn processor<F>(&self, func: F) -> NeuronProcessor
    where
        F: Fn(&mut Neuron, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        NeuronProcessor::new(self, func)
    }

    /// Runs `func` on every neuron, sequentially, and aggregates the results.
    pub fn apply<F>(&self, func: F, args: &CallArgs) -> Result<Dispatched>
    where
        F: Fn(&Neuron, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        self.processor(move |n, a| func(n, a))
            .with_parallel(false)
            .call(args)
    }

    /// Runs `func` on every neuron, mutating it in place.
    pub fn apply_mut<F>(&self, func: F) -> Result<()>
    where
        F: Fn(&mut Neuron) -> Result<()> + Send + Sync + 'static,
    {
        self.processor(move |n, _| {
            func(n)?;
            Ok(Value::None)
        })
        .with_inplace(true)
        .call(&CallArgs::new())
        .map(|_| ())
    }

    fn summary_columns(&self) -> Vec<String> {
        let mut props: Vec<String> = Vec::new();
        for n in &self.neurons {
            for p in n.read().summary_props() {
                if !props.contains(&p) {
                    props.push(p);
                }
            }
        }
        if self.neurons.iter().any(|n| !n.read().id().is_generated()) {
            props.insert(props.len().min(2), "id".to_string());
        }
        props
    }

    fn summary_of(&self, rows: &[NeuronRef], add_props: &[&str]) -> Result<Table> {
        let mut props = self.summary_columns();
        for p in add_props {
            if !props.iter().any(|q| q == p) {
                props.push((*p).to_string());
            }
        }
        let mut columns: Vec<(String, Vec<Cell>)> = props
            .into_iter()
            .map(|p| (p, Vec::with_capacity(rows.len())))
            .collect();
        for n in rows {
            let n = n.read();
            for (prop, cells) in &mut columns {
                let cell = match n.get(prop) {
                    Ok(v) => v.to_cell(),
                    Err(Error::AttributeNotFound(_)) => Cell::Null,
                    Err(e) => return Err(e),
                };
                cells.push(cell);
            }
        }
        Table::from_columns(columns)
    }

    /// One row per neuron over the union of all summary properties.
    ///
    /// `id` is the third column unless every id was auto-generated;
    /// properties a neuron lacks are null.
    pub fn summary(&self, add_props: &[&str]) -> Result<Table> {
        self.summary_of(&self.neurons, add_props)
    }

    /// Summary of the first `n` neurons.
    pub fn head(&self, n: usize) -> Result<Table> {
        self.summary_of(&self.neurons[..n.min(self.len())], &[])
    }

    /// Summary of the last `n` neurons.
    pub fn tail(&self, n: usize) -> Result<Table> {
        self.summary_of(&self.neurons[self.len().saturating_sub(n)..], &[])
    }

    fn numeric_columns(&self) -> Result<Vec<(String, Vec<f64>)>> {
        let table = self.summary(&[])?;
        let mut out = Vec::new();
        for name in table.columns() {
            let Some(cells) = table.column(name) else {
                continue;
            };
            let numeric = cells
                .iter()
                .all(|c| c.is_null() || matches!(c, Cell::Int(_) | Cell::Float(_) | Cell::Bool(_)));
            let values: Vec<f64> = cells
                .iter()
                .filter(|c| !c.is_null())
                .filter_map(Cell::as_f64)
                .collect();
            if numeric && !values.is_empty() {
                out.push((name.clone(), values));
            }
        }
        Ok(out)
    }

    /// Column sums over numeric and boolean summary columns.
    pub fn sum(&self) -> Result<Vec<(String, f64)>> {
        Ok(self
            .numeric_columns()?
            .into_iter()
            .map(|(name, v)| (name, v.iter().sum()))
            .collect())
    }

    /// Column means over numeric and boolean summary columns.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Result<Vec<(String, f64)>> {
        Ok(self
            .numeric_columns()?
            .into_iter()
            .map(|(name, v)| {
                let mean = v.iter().sum::<f64>() / v.len() as f64;
                (name, mean)
            })
            .collect())
    }

    /// Drops neurons whose `keys` attributes all equal those of an earlier
    /// neuron.
    pub fn remove_duplicates(&self, keys: &[&str]) -> Result<Self> {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        let mut keep = Vec::with_capacity(self.len());
        for n in &self.neurons {
            let key = {
                let n = n.read();
                keys.iter().map(|k| n.get(k)).collect::<Result<Vec<Value>>>()?
            };
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            keep.push(Arc::clone(n));
        }
        Ok(self.derived(keep))
    }

    /// Reorders the list by the value of `key`.
    pub fn sort_values(&mut self, key: &str, ascending: bool) -> Result<()> {
        let keys = self
            .neurons
            .iter()
            .map(|n| n.read().get(key))
            .collect::<Result<Vec<Value>>>()?;
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            let o = keys[a].compare(&keys[b]);
            if ascending {
                o
            } else {
                o.reverse()
            }
        });
        self.neurons = order.iter().map(|&i| Arc::clone(&self.neurons[i])).collect();
        Ok(())
    }

    /// Splits into one list per variant.
    #[must_use]
    pub fn unmix(&self) -> BTreeMap<NeuronKind, Self> {
        let mut groups: BTreeMap<NeuronKind, Vec<NeuronRef>> = BTreeMap::new();
        for n in &self.neurons {
            let kind = n.read().kind();
            groups.entry(kind).or_default().push(Arc::clone(n));
        }
        groups
            .into_iter()
            .map(|(k, refs)| (k, Self::from_refs(refs, self.config.clone())))
            .collect()
    }

    /// `n` neurons drawn without replacement, in list order.
    #[must_use]
    pub fn sample(&self, n: usize) -> Self {
        self.sample_with_rng(n, &mut rand::thread_rng())
    }

    #[must_use]
    pub fn sample_with_rng<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Self {
        let mut picked = rand::seq::index::sample(rng, self.len(), n.min(self.len())).into_vec();
        picked.sort_unstable();
        self.derived(
            picked
                .into_iter()
                .map(|i| Arc::clone(&self.neurons[i]))
                .collect(),
        )
    }

    /// Appends converted `items` to a copy of this list.
    pub fn union<I>(&self, items: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<ListItem>,
    {
        let other = Self::from_items(items, self.config.clone())?;
        Ok(self + &other)
    }

    fn joined(&self, extra: impl IntoIterator<Item = NeuronRef>) -> Self {
        self.derived(self.neurons.iter().cloned().chain(extra).collect())
    }

    fn mapped(&self, f: impl Fn(&Neuron) -> Neuron) -> Self {
        let neurons = self.neurons.iter().map(|n| neuron_ref(f(&*n.read()))).collect();
        Self::from_refs(neurons, self.config.clone())
    }
}

fn convert_inputs(
    pending: Vec<(usize, NeuronInput)>,
    config: &ListConfig,
) -> Result<Vec<(usize, Neuron)>> {
    if pending.is_empty() {
        return Ok(Vec::new());
    }
    let counter = config.progress.counter(pending.len(), "Make nrn");
    let opts = &config.construct;
    let make = |(i, input): (usize, NeuronInput)| -> Result<(usize, Neuron)> {
        let n = Neuron::new(input, opts)?;
        counter.tick();
        Ok((i, n))
    };
    if config.use_threading && pending.len() > 1 {
        debug!(
            "converting {} inputs on {} workers",
            pending.len(),
            config.n_cores
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_cores)
            .build()?;
        pool.install(|| pending.into_par_iter().map(make).collect())
    } else {
        pending.into_iter().map(make).collect()
    }
}

impl Default for NeuronList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NeuronList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuronList")
            .field("len", &self.neurons.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for NeuronList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NeuronList of {} neurons", self.len())?;
        match self.summary(&[]) {
            Ok(table) => write!(f, "{table}"),
            Err(_) => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a NeuronList {
    type Item = &'a NeuronRef;
    type IntoIter = std::slice::Iter<'a, NeuronRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.neurons.iter()
    }
}

impl PartialEq for NeuronList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .neurons
                .iter()
                .zip(&other.neurons)
                .all(|(a, b)| same(a, b))
    }
}

impl Add<&NeuronList> for &NeuronList {
    type Output = NeuronList;

    fn add(self, rhs: &NeuronList) -> NeuronList {
        self.joined(rhs.neurons.iter().cloned())
    }
}

impl Add<Neuron> for &NeuronList {
    type Output = NeuronList;

    fn add(self, rhs: Neuron) -> NeuronList {
        self.joined([neuron_ref(rhs)])
    }
}

impl Add<&NeuronRef> for &NeuronList {
    type Output = NeuronList;

    fn add(self, rhs: &NeuronRef) -> NeuronList {
        self.joined([Arc::clone(rhs)])
    }
}

impl Sub<&Neuron> for &NeuronList {
    type Output = NeuronList;

    fn sub(self, rhs: &Neuron) -> NeuronList {
        self.filtered(|n| *n.read() != *rhs)
    }
}

impl Sub<&NeuronRef> for &NeuronList {
    type Output = NeuronList;

    fn sub(self, rhs: &NeuronRef) -> NeuronList {
        self.filtered(|n| !same(n, rhs))
    }
}

impl Sub<&NeuronList> for &NeuronList {
    type Output = NeuronList;

    fn sub(self, rhs: &NeuronList) -> NeuronList {
        self.filtered(|n| !rhs.contains_ref(n))
    }
}

impl BitAnd<&Neuron> for &NeuronList {
    type Output = NeuronList;

    fn bitand(self, rhs: &Neuron) -> NeuronList {
        self.filtered(|n| *n.read() == *rhs)
    }
}

impl BitAnd<&NeuronRef> for &NeuronList {
    type Output = NeuronList;

    fn bitand(self, rhs: &NeuronRef) -> NeuronList {
        self.filtered(|n| same(n, rhs))
    }
}

impl BitAnd<&NeuronList> for &NeuronList {
    type Output = NeuronList;

    fn bitand(self, rhs: &NeuronList) -> NeuronList {
        self.filtered(|n| rhs.contains_ref(n))
    }
}

impl Mul<f64> for &NeuronList {
    type Output = NeuronList;

    fn mul(self, rhs: f64) -> NeuronList {
        self.mapped(|n| n * rhs)
    }
}

impl Div<f64> for &NeuronList {
    type Output = NeuronList;

    fn div(self, rhs: f64) -> NeuronList {
        self.mapped(|n| n / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeRow;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tree(id: i64, name: &str, length: f64) -> Neuron {
        let nodes = NodeTable::from_rows([
            NodeRow::new(1, -1, 0.0, 0.0, 0.0),
            NodeRow::new(2, 1, length, 0.0, 0.0),
            NodeRow::new(3, 2, length, length, 0.0),
        ])
        .unwrap();
        Neuron::Tree(
            TreeNeuron::new(nodes)
                .with_id(id)
                .with_name(name)
                .with_units("1 um")
                .unwrap(),
        )
    }

    fn mesh() -> Neuron {
        Neuron::Mesh(
            MeshNeuron::new(
                array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                array![[0, 1, 2]],
            )
            .unwrap()
            .with_name("surface"),
        )
    }

    fn three() -> NeuronList {
        NeuronList::from_neurons([tree(1, "PN_a", 1.0), tree(2, "PN_b", 2.0), tree(3, "KC", 3.0)])
    }

    fn names(nl: &NeuronList) -> Vec<String> {
        nl.iter()
            .map(|n| n.read().name().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_from_items_flattens_and_converts_in_order() {
        let table = tree(9, "raw", 1.0).as_tree().unwrap().nodes().to_table();
        let config = ListConfig::default().with_threading(true).with_n_cores(2);
        let items: Vec<ListItem> = vec![
            tree(1, "first", 1.0).into(),
            table.clone().into(),
            three().into(),
            table.into(),
        ];
        let nl = NeuronList::from_items(items, config).unwrap();
        assert_eq!(nl.len(), 6);
        assert_eq!(names(&nl)[0], "first");
        assert_eq!(names(&nl)[2..5], ["PN_a", "PN_b", "KC"]);
        assert!(nl.get(1).unwrap().read().name().is_none());
        assert!(nl.get(-1).unwrap().read().as_tree().is_some());
    }

    #[test]
    fn test_invalid_item_is_construction_error() {
        let items = vec![
            Value::from(tree(1, "a", 1.0)),
            Value::from(tree(2, "b", 1.0)),
            Value::Int(42),
        ];
        let err = NeuronList::from_items(items, ListConfig::default()).unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn test_select_by_mask_and_slice() {
        let nl = three();
        let mask = vec![true, false, true];
        let picked = nl.select(mask.clone()).unwrap();
        assert_eq!(picked.len(), mask.iter().filter(|m| **m).count());
        assert_eq!(nl.select(1..).unwrap().len(), 2);
        assert_eq!(names(&nl.select(-1).unwrap()), ["KC"]);
        assert!(matches!(
            nl.select(vec![true]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            nl.select(5),
            Err(Error::IndexOutOfRange { index: 5, len: 3 })
        ));
    }

    #[test]
    fn test_select_by_name_is_full_match() {
        let nl = three();
        assert_eq!(names(&nl.select("PN_.*").unwrap()), ["PN_a", "PN_b"]);
        assert!(matches!(nl.select("PN"), Err(Error::NoMatch)));
    }

    #[test]
    fn test_select_dedupes_by_identity() {
        let nl = three();
        let picked = nl
            .select(vec![Selector::Index(2), Selector::Index(0), Selector::Index(2)])
            .unwrap();
        assert_eq!(names(&picked), ["KC", "PN_a"]);
        assert!(Arc::ptr_eq(&picked.neurons()[0], &nl.neurons()[2]));
    }

    #[test]
    fn test_copy_on_subset() {
        let nl = three().with_config(ListConfig::default().with_copy_on_subset(true));
        let picked = nl.select(0).unwrap();
        assert!(!Arc::ptr_eq(&picked.neurons()[0], &nl.neurons()[0]));
        assert!(*picked.neurons()[0].read() == *nl.neurons()[0].read());
    }

    #[test]
    fn test_idx_in_requested_order() {
        let nl = three();
        let Selection::Many(sel) = nl.idx([3, 1]).unwrap() else {
            panic!("expected several neurons");
        };
        assert_eq!(names(&sel), ["KC", "PN_a"]);

        let single = nl.idx(["2"]).unwrap().single().unwrap();
        assert_eq!(single.read().name(), Some("PN_b"));

        match nl.idx([1, 7, 8]) {
            Err(Error::IdNotFound(missing)) => assert_eq!(missing, ["7", "8"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_idx_sees_changed_ids() {
        let nl = three();
        assert!(nl.idx([1]).is_ok());
        nl.neurons()[0].write().core_mut().set_id(11i64);
        assert!(nl.idx([1]).is_err());
        assert_eq!(nl.idx([11]).unwrap().len(), 1);
    }

    #[test]
    fn test_idx_sees_id_moved_onto_existing_id() {
        let nl = three();
        assert_eq!(nl.idx([2]).unwrap().len(), 1);
        nl.neurons()[0].write().core_mut().set_id(2i64);
        let Selection::Many(both) = nl.idx([2]).unwrap() else {
            panic!("expected both neurons with id 2");
        };
        assert_eq!(names(&both), ["PN_a", "PN_b"]);
    }

    #[test]
    fn test_attr_values_and_sum() {
        let nl = three();
        let lengths: Vec<f64> = nl
            .values("cable_length")
            .unwrap()
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        let individual: f64 = nl
            .iter()
            .map(|n| n.read().as_tree().unwrap().cable_length())
            .sum();
        assert_relative_eq!(lengths.iter().sum::<f64>(), individual, epsilon = 1e-9);
        assert_relative_eq!(lengths.iter().sum::<f64>(), 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_attr_quantities_share_first_unit() {
        let mut nl = three();
        nl.neurons[1].write().convert_units("nm").unwrap();
        match nl.attr("units").unwrap() {
            ListAttr::Quantities(q) => {
                assert_eq!(q.unit, crate::units::Unit::Length(-6));
                assert_relative_eq!(q.magnitudes[1], 0.001, epsilon = 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
        nl.push(mesh());
        assert!(matches!(nl.attr("units").unwrap(), ListAttr::Values(_)));
    }

    #[test]
    fn test_attr_tables_concatenated() {
        let nl = three();
        let table = nl.attr("nodes").unwrap().into_table().unwrap();
        assert_eq!(table.n_rows(), 9);
        let sources: HashSet<i64> = table
            .column("neuron")
            .unwrap()
            .iter()
            .filter_map(Cell::as_i64)
            .collect();
        assert_eq!(sources.len(), 3);
    }

    #[test]
    fn test_attr_failures() {
        let nl = three();
        assert!(matches!(nl.attr("nope"), Err(Error::AttributeNotFound(_))));

        let mixed = &nl + mesh();
        assert!(matches!(
            mixed.attr("cable_length"),
            Err(Error::AttributeMissing(_))
        ));

        nl.neurons()[0]
            .write()
            .core_mut()
            .register_attr("reroot", Value::Int(1));
        assert!(matches!(nl.attr("reroot"), Err(Error::TypeMismatch(_))));
        assert!(NeuronList::new().attr("name").is_err());
    }

    #[test]
    fn test_method_forwarding() {
        let nl = three();
        let rerooted = nl
            .call("reroot", &CallArgs::new().arg(3i64))
            .unwrap()
            .into_list()
            .unwrap();
        assert_eq!(rerooted.len(), 3);
        assert_eq!(rerooted.values("root").unwrap()[0], Value::from(vec![3i64]));
        assert_eq!(nl.values("root").unwrap()[0], Value::from(vec![1i64]));

        let dps = nl
            .call("get_dps", &CallArgs::new())
            .unwrap()
            .into_table()
            .unwrap();
        let sources: HashSet<i64> = dps
            .column("neuron")
            .unwrap()
            .iter()
            .filter_map(Cell::as_i64)
            .collect();
        assert_eq!(sources, HashSet::from([0, 1, 2]));

        let done = nl
            .call("reroot", &CallArgs::new().arg(3i64).kwarg("inplace", true))
            .unwrap();
        assert!(matches!(done, Dispatched::InPlace));
        assert_eq!(nl.values("root").unwrap()[2], Value::from(vec![3i64]));
    }

    #[test]
    fn test_set_operators() {
        let nl = three();
        let first = nl.get(0).unwrap();
        let rest = &nl - &first;
        assert_eq!(rest.len(), 2);
        assert!(!rest.contains(&first.read()));

        let both = &nl & &nl.select(1..).unwrap();
        assert_eq!(names(&both), ["PN_b", "KC"]);

        let grown = &nl + &rest;
        assert_eq!(grown.len(), 5);
        assert!(grown.is_degenerated());
        assert!(!nl.is_degenerated());

        let other = tree(1, "PN_a", 1.0);
        assert_eq!((&nl - &other).len(), 2);
        assert_eq!((&nl & &other).len(), 1);
    }

    #[test]
    fn test_scaling_operators() {
        let nl = three();
        let back = &(&nl * 4.0) / 4.0;
        assert!(back == nl);
        let scaled = &nl * 2.0;
        let x = scaled.get(1).unwrap().read().as_tree().unwrap().nodes().x[1];
        assert_relative_eq!(x, 4.0);
        assert_relative_eq!(nl.get(1).unwrap().read().as_tree().unwrap().nodes().x[1], 2.0);
    }

    #[test]
    fn test_summary_columns() {
        let nl = three();
        let summary = nl.summary(&["volume"]).unwrap();
        assert_eq!(summary.n_rows(), 3);
        assert_eq!(&summary.columns()[..3], ["type", "name", "id"]);
        assert_eq!(summary.columns().last().map(String::as_str), Some("volume"));

        let anonymous = NeuronList::from_neurons([mesh()]);
        assert!(!anonymous.summary(&[]).unwrap().has_column("id"));

        let mixed = &nl + mesh();
        let summary = mixed.summary(&[]).unwrap();
        assert!(summary.has_column("n_faces"));
        assert!(summary.column("n_faces").unwrap()[0].is_null());
        assert_eq!(mixed.head(2).unwrap().n_rows(), 2);
        assert_eq!(mixed.tail(10).unwrap().n_rows(), 4);
    }

    #[test]
    fn test_sum_and_mean() {
        let nl = three();
        let sums: HashMap<String, f64> = nl.sum().unwrap().into_iter().collect();
        assert_relative_eq!(sums["cable_length"], 12.0, epsilon = 1e-9);
        assert_relative_eq!(sums["n_nodes"], 9.0);
        let means: HashMap<String, f64> = nl.mean().unwrap().into_iter().collect();
        assert_relative_eq!(means["cable_length"], 4.0, epsilon = 1e-9);
        assert!(!sums.contains_key("name"));
    }

    #[test]
    fn test_sort_and_duplicates() {
        let mut nl = three();
        nl.sort_values("cable_length", true).unwrap();
        assert_eq!(names(&nl), ["PN_a", "PN_b", "KC"]);
        nl.sort_values("cable_length", false).unwrap();
        assert_eq!(names(&nl), ["KC", "PN_b", "PN_a"]);
        assert_eq!(nl.idx([1]).unwrap().single().unwrap().read().name(), Some("PN_a"));

        let doubled = &nl + &nl;
        assert_eq!(doubled.remove_duplicates(&["name"]).unwrap().len(), 3);
        assert_eq!(doubled.remove_duplicates(&["n_nodes"]).unwrap().len(), 1);
    }

    #[test]
    fn test_unmix_and_types() {
        let nl = &three() + mesh();
        assert!(nl.is_mixed());
        assert_eq!(nl.types(), [NeuronKind::Tree, NeuronKind::Mesh]);
        let parts = nl.unmix();
        assert_eq!(parts[&NeuronKind::Tree].len(), 3);
        assert_eq!(parts[&NeuronKind::Mesh].len(), 1);
        let bbox = nl.bbox().unwrap();
        assert_relative_eq!(bbox[0][1], 3.0);
    }

    #[test]
    fn test_sample_is_deterministic_with_seed() {
        let nl = three();
        let a = nl.sample_with_rng(2, &mut StdRng::seed_from_u64(7));
        let b = nl.sample_with_rng(2, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.len(), 2);
        assert_eq!(names(&a), names(&b));
        assert_eq!(nl.sample(10).len(), 3);
    }

    #[test]
    fn test_copy_is_independent() {
        let nl = three();
        let copy = nl.copy(false);
        assert!(copy == nl);
        copy.apply_mut(|n| {
            n.scale(3.0);
            Ok(())
        })
        .unwrap();
        assert!(copy != nl);
        assert_relative_eq!(nl.get(0).unwrap().read().as_tree().unwrap().nodes().x[1], 1.0);

        let shared = nl.clone();
        shared.apply_mut(|n| {
            n.scale(2.0);
            Ok(())
        })
        .unwrap();
        assert_relative_eq!(nl.get(0).unwrap().read().as_tree().unwrap().nodes().x[1], 2.0);
    }

    #[test]
    fn test_apply_collects_values() {
        let nl = three();
        let out = nl
            .apply(
                |n, args| {
                    let factor = args.f64_arg(0, "factor")?;
                    Ok(Value::Float(n.as_tree().map_or(0.0, TreeNeuron::cable_length) * factor))
                },
                &CallArgs::new().arg(2.0),
            )
            .unwrap()
            .into_values()
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[2].as_f64().unwrap(), 12.0, epsilon = 1e-9);
    }
}
