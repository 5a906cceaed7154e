//! neurarbor-core: neuron entity model, neuron collections and parallel dispatch.
//!
//! Neurons are either skeletons ([`TreeNeuron`]) backed by a [`NodeTable`] or
//! surfaces ([`MeshNeuron`]) backed by vertex and face arrays. Derived views
//! such as graphs and segment decompositions are cached and invalidated when
//! the primary data changes.
//!
//! A [`NeuronList`] forwards attribute access and method calls to every
//! neuron it holds; calls are executed by a [`NeuronProcessor`].

pub mod config;
pub mod error;
pub mod graph;
pub mod list;
pub mod logging;
pub mod morpho;
pub mod neuron;
pub mod nodes;
pub mod processor;
pub mod progress;
pub mod record;
pub mod table;
pub mod units;
pub mod value;

pub use config::{default_n_cores, CoreConfig, SomaConfig};
pub use error::{Error, ErrorKind, Result};
pub use graph::{Dotprops, FastGraph, TreeGraph};
pub use list::{neuron_ref, ListAttr, ListConfig, ListItem, NeuronList, NeuronRef, Selection, Selector};
pub use logging::LogLevelGuard;
pub use morpho::{BoundingBox, Cut, StrahlerSelection, Volume, VolumeMode};
pub use neuron::{
    Attr, CallArgs, ConstructOptions, MeshNeuron, Neuron, NeuronCore, NeuronId, NeuronInput,
    NeuronKind, NeuronLoader, NeuronMethod, NeuronSource, SomaFinder, SomaSpec, TreeNeuron, TriMesh,
};
pub use nodes::{ConnectorRow, ConnectorTable, NodeRow, NodeTable, NodeType};
pub use processor::{Dispatched, ItemFn, NeuronProcessor};
pub use progress::{Progress, ProgressCounter};
pub use record::{NeuronRecord, RecordData};
pub use table::{validate_table, Cell, Table, TableSchema};
pub use units::{Quantity, QuantityArray, Unit};
pub use value::Value;
