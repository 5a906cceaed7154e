//! Parallel dispatch of per-neuron functions.
//!
//! A [`NeuronProcessor`] binds one function per list item and invokes them
//! sequentially or on a rayon pool. Arguments are broadcast: a
//! [`Value::List`] whose length equals the number of items is split one
//! element per item, anything else is passed unchanged to every call.

use crate::error::{Error, Result};
use crate::list::{ListConfig, NeuronList, NeuronRef};
use crate::logging::LogLevelGuard;
use crate::neuron::{CallArgs, Neuron, NeuronMethod};
use crate::progress::Progress;
use crate::table::Table;
use crate::value::Value;
use log::debug;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Minimum number of items handed to a worker at once.
const CHUNK_SIZE: usize = 10;

/// Function applied to a single neuron.
pub type ItemFn = Arc<dyn Fn(&mut Neuron, &CallArgs) -> Result<Value> + Send + Sync>;

/// Aggregated outcome of a dispatch.
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// Every call mutated its own neuron; nothing was collected.
    InPlace,
    /// Every call returned a neuron.
    List(NeuronList),
    /// Every call returned a table (or nothing); rows carry a `neuron` index.
    Table(Table),
    Values(Vec<Value>),
}

impl Dispatched {
    fn aggregate(results: Vec<Value>, config: &ListConfig) -> Self {
        if !results.is_empty() && results.iter().all(|v| matches!(v, Value::Neuron(_))) {
            let neurons = results.into_iter().filter_map(|v| match v {
                Value::Neuron(n) => Some(*n),
                _ => None,
            });
            return Self::List(NeuronList::from_neurons(neurons).with_config(config.clone()));
        }
        let has_table = results.iter().any(|v| matches!(v, Value::Table(_)));
        if has_table
            && results
                .iter()
                .all(|v| matches!(v, Value::Table(_) | Value::None))
        {
            let tables: Vec<Table> = results
                .into_iter()
                .map(|v| match v {
                    Value::Table(t) => t,
                    _ => Table::new(),
                })
                .collect();
            return Self::Table(Table::concat(&tables, Some("neuron")));
        }
        Self::Values(results)
    }

    #[must_use]
    pub fn into_list(self) -> Option<NeuronList> {
        match self {
            Self::List(nl) => Some(nl),
            _ => None,
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
    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Self::Values(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-item arguments for item `i` of `n`.
fn broadcast(args: &CallArgs, i: usize, n: usize) -> CallArgs {
    let pick = |v: &Value| match v {
        Value::List(items) if items.len() == n => items[i].clone(),
        other => other.clone(),
    };
    CallArgs {
        positional: args.positional.iter().map(pick).collect(),
        keyword: args
            .keyword
            .iter()
            .map(|(k, v)| (k.clone(), pick(v)))
            .collect(),
    }
}

/// Runs one function per neuron of a list.
#[derive(Clone)]
pub struct NeuronProcessor {
    neurons: Vec<NeuronRef>,
    funcs: Vec<ItemFn>,
    parallel: bool,
    n_cores: usize,
    inplace: bool,
    desc: String,
    progress: Progress,
    config: ListConfig,
}

impl NeuronProcessor {
    /// Binds `func` to every neuron of `nl`.
    ///
    /// Parallelism and worker count default to the list's configuration.
    pub fn new<F>(nl: &NeuronList, func: F) -> Self
    where
        F: Fn(&mut Neuron, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        let func: ItemFn = Arc::new(func);
        Self::from_parts(nl, vec![func; nl.len()])
    }

    /// Binds one function per neuron.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the number of functions differs from
    /// the number of neurons.
    pub fn with_funcs(nl: &NeuronList, funcs: Vec<ItemFn>) -> Result<Self> {
        if funcs.len() != nl.len() {
            return Err(Error::Validation(format!(
                "got {} functions for {} neurons",
                funcs.len(),
                nl.len()
            )));
        }
        Ok(Self::from_parts(nl, funcs))
    }

    /// Binds the named method resolved on each neuron.
    pub(crate) fn from_methods(nl: &NeuronList, name: &str, methods: Vec<NeuronMethod>) -> Self {
        let funcs = methods
            .into_iter()
            .map(|m| -> ItemFn {
                Arc::new(move |n: &mut Neuron, args: &CallArgs| m.invoke_mut(n, args))
            })
            .collect();
        Self::from_parts(nl, funcs).with_desc(name)
    }

    fn from_parts(nl: &NeuronList, funcs: Vec<ItemFn>) -> Self {
        let config = nl.config().clone();
        Self {
            neurons: nl.neurons().to_vec(),
            funcs,
            parallel: config.use_threading,
            n_cores: config.n_cores,
            inplace: false,
            desc: "Processing".to_string(),
            progress: config.progress.clone(),
            config,
        }
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_n_cores(mut self, n_cores: usize) -> Self {
        self.n_cores = n_cores.max(1);
        self
    }

    /// Treat every call as in-place regardless of the `inplace` keyword.
    #[must_use]
    pub fn with_inplace(mut self, inplace: bool) -> Self {
        self.inplace = inplace;
        self
    }

    #[must_use]
    pub fn with_desc(mut self, desc: &str) -> Self {
        self.desc = desc.to_string();
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    #[must_use]
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Invokes every bound function and aggregates the results.
    ///
    /// Log records below `error` are suppressed while the calls run. The
    /// first failing call aborts the batch and its error is returned.
    ///
    /// # Errors
    ///
    /// Propagates the first per-item error, or [`Error::ThreadPool`] if the
    /// worker pool cannot be built.
    pub fn call(&self, args: &CallArgs) -> Result<Dispatched> {
        let n = self.funcs.len();
        let inplace = self.inplace || args.flag("inplace");
        let per_item: Vec<CallArgs> = (0..n).map(|i| broadcast(args, i, n)).collect();
        debug!(
            "{}: dispatching over {n} neurons ({})",
            self.desc,
            if self.parallel { "parallel" } else { "sequential" }
        );

        let counter = self.progress.counter(n, &self.desc);
        let run = |i: usize| -> Result<Value> {
            let mut neuron = self.neurons[i].write();
            let out = (self.funcs[i])(&mut *neuron, &per_item[i]);
            counter.tick();
            out
        };

        let results = {
            let _quiet = LogLevelGuard::errors_only();
            if self.parallel && n > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.n_cores)
                    .build()?;
                pool.install(|| {
                    (0..n)
                        .into_par_iter()
                        .with_min_len(CHUNK_SIZE)
                        .map(run)
                        .collect::<Result<Vec<Value>>>()
                })?
            } else {
                (0..n).map(run).collect::<Result<Vec<Value>>>()?
            }
        };

        if inplace {
            return Ok(Dispatched::InPlace);
        }
        Ok(Dispatched::aggregate(results, &self.config))
    }
}

impl fmt::Debug for NeuronProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuronProcessor")
            .field("desc", &self.desc)
            .field("n_items", &self.funcs.len())
            .field("parallel", &self.parallel)
            .field("n_cores", &self.n_cores)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{NodeRow, NodeTable};
    use crate::neuron::TreeNeuron;
    use std::sync::Mutex;

    fn list(n: usize) -> NeuronList {
        NeuronList::from_neurons((0..n).map(|i| {
            let nodes = NodeTable::from_rows([
                NodeRow::new(1, -1, 0.0, 0.0, 0.0),
                NodeRow::new(2, 1, 1.0, 0.0, 0.0),
            ])
            .unwrap();
            Neuron::Tree(TreeNeuron::new(nodes).with_name(format!("n{i}")))
        }))
    }

    #[test]
    fn test_broadcast_splits_matching_lists() {
        let args = CallArgs::new()
            .arg(Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
            .kwarg("scale", 2.0)
            .kwarg("pair", Value::List(vec![Value::Int(1), Value::Int(2)]));
        let second = broadcast(&args, 1, 3);
        assert_eq!(second.positional[0], Value::Int(2));
        assert_eq!(second.keyword["scale"], Value::Float(2.0));
        assert_eq!(second.keyword["pair"].len().unwrap(), 2);
    }

    #[test]
    fn test_each_item_receives_its_element() {
        let nl = list(3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let proc = NeuronProcessor::new(&nl, move |n, args| {
            sink.lock()
                .unwrap()
                .push((n.name().unwrap_or_default().to_string(), args.get(0, "k").cloned()));
            Ok(Value::None)
        })
        .with_parallel(false);

        let per_item = Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        proc.call(&CallArgs::new().kwarg("k", per_item)).unwrap();
        let got = seen.lock().unwrap().clone();
        assert_eq!(got[0], ("n0".to_string(), Some(Value::Int(10))));
        assert_eq!(got[2], ("n2".to_string(), Some(Value::Int(30))));

        seen.lock().unwrap().clear();
        proc.call(&CallArgs::new().kwarg("k", Value::Int(5))).unwrap();
        let got = seen.lock().unwrap().clone();
        assert!(got.iter().all(|(_, v)| *v == Some(Value::Int(5))));
    }

    #[test]
    fn test_parallel_preserves_order() {
        let nl = list(25);
        let proc = NeuronProcessor::new(&nl, |n, _| Ok(Value::from(n.name().map(str::to_string))))
            .with_parallel(true)
            .with_n_cores(4);
        let values = proc.call(&CallArgs::new()).unwrap().into_values().unwrap();
        let expected: Vec<Value> = (0..25).map(|i| Value::from(format!("n{i}"))).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_error_aborts_batch() {
        let nl = list(3);
        let proc = NeuronProcessor::new(&nl, |n, _| {
            if n.name() == Some("n1") {
                Err(Error::Validation("bad neuron".to_string()))
            } else {
                Ok(Value::None)
            }
        });
        assert!(matches!(
            proc.call(&CallArgs::new()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_inplace_mutates_items() {
        let nl = list(2);
        let proc = NeuronProcessor::new(&nl, |n, _| {
            n.scale(2.0);
            Ok(Value::None)
        })
        .with_inplace(true);
        assert!(matches!(proc.call(&CallArgs::new()).unwrap(), Dispatched::InPlace));
        let first = nl.get(0).unwrap();
        let x = first.read().as_tree().unwrap().nodes().x[1];
        approx::assert_relative_eq!(x, 2.0);
    }

    #[test]
    fn test_function_count_checked() {
        let nl = list(2);
        let f: ItemFn = Arc::new(|_, _| Ok(Value::None));
        assert!(NeuronProcessor::with_funcs(&nl, vec![f]).is_err());
    }
}
