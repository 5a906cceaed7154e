//! neurarbor-io: Loading and saving neurarbor neurons.
//!
//! Neurons are stored one per file as JSON [`neurarbor_core::NeuronRecord`]s.
//! [`JsonLoader`] plugs into [`neurarbor_core::ConstructOptions`] so paths and
//! byte buffers can be handed directly to [`neurarbor_core::NeuronList`].

mod error;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use reader::{load_dir, load_files, load_neuron, JsonLoader, RECORD_EXTENSION};
pub use writer::{save_list, save_neuron};
