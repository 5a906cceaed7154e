//! Writers for neuron records.

use crate::reader::RECORD_EXTENSION;
use crate::{Error, Result};
use log::debug;
use neurarbor_core::{Neuron, NeuronList, NeuronRecord};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes `neuron` as a pretty-printed JSON record.
pub fn save_neuron<P: AsRef<Path>>(neuron: &Neuron, path: P) -> Result<()> {
    let path = path.as_ref();
    debug!("writing {}", path.display());
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &NeuronRecord::from_neuron(neuron))?;
    writer.flush()?;
    Ok(())
}

/// Writes every neuron of `list` to `dir` as `<id>.json`.
///
/// The directory is created if needed. Nothing is written if two neurons
/// share an id. Returns the written paths in list order.
pub fn save_list<P: AsRef<Path>>(list: &NeuronList, dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut paths = Vec::with_capacity(list.len());
    let mut seen = HashSet::with_capacity(list.len());
    for id in list.ids() {
        let path = dir.join(format!("{id}.{RECORD_EXTENSION}"));
        if !seen.insert(path.clone()) {
            return Err(Error::InvalidPath(format!(
                "duplicate id {id} would overwrite {}",
                path.display()
            )));
        }
        paths.push(path);
    }
    fs::create_dir_all(dir)?;
    for (n, path) in list.iter().zip(&paths) {
        save_neuron(&n.read(), path)?;
    }
    Ok(paths)
}
