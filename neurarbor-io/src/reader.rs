//! Readers for neuron records.

use crate::{Error, Result};
use log::{debug, info};
use neurarbor_core::{
    ListConfig, Neuron, NeuronList, NeuronLoader, NeuronRecord, NeuronSource,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extension of neuron records.
pub const RECORD_EXTENSION: &str = "json";

/// Loads neurons stored as JSON [`NeuronRecord`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLoader;

impl JsonLoader {
    /// Shared handle for [`neurarbor_core::ConstructOptions::with_loader`].
    #[must_use]
    pub fn shared() -> Arc<dyn NeuronLoader> {
        Arc::new(Self)
    }
}

impl NeuronLoader for JsonLoader {
    fn load(&self, source: &NeuronSource) -> neurarbor_core::Result<Neuron> {
        let record = match source {
            NeuronSource::Path(path) => {
                debug!("reading {}", path.display());
                NeuronRecord::from_slice(&fs::read(path)?)?
            }
            NeuronSource::Bytes(bytes) => NeuronRecord::from_slice(bytes)?,
        };
        record.into_neuron()
    }
}

/// Reads a single neuron.
pub fn load_neuron<P: AsRef<Path>>(path: P) -> Result<Neuron> {
    let source = NeuronSource::Path(path.as_ref().to_path_buf());
    Ok(JsonLoader.load(&source)?)
}

/// Reads the given files into one list, in order.
///
/// Files are decoded on the list's worker pool when threading is enabled.
pub fn load_files<I, P>(paths: I, config: ListConfig) -> Result<NeuronList>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let construct = config.construct.clone().with_loader(JsonLoader::shared());
    let config = config.with_construct(construct);
    let sources: Vec<NeuronSource> = paths
        .into_iter()
        .map(|p| NeuronSource::Path(p.as_ref().to_path_buf()))
        .collect();
    Ok(NeuronList::from_items(sources, config)?)
}

/// Reads every `*.json` record in `dir`, sorted by file name.
pub fn load_dir<P: AsRef<Path>>(dir: P, config: ListConfig) -> Result<NeuronList> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::InvalidPath(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == RECORD_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    info!("loading {} neurons from {}", paths.len(), dir.display());
    load_files(paths, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurarbor_core::{NodeRow, NodeTable, TreeNeuron};

    fn record_bytes() -> Vec<u8> {
        let nodes = NodeTable::from_rows([
            NodeRow::new(1, -1, 0.0, 0.0, 0.0),
            NodeRow::new(2, 1, 0.0, 3.0, 4.0),
        ])
        .unwrap();
        let n = Neuron::Tree(TreeNeuron::new(nodes).with_id(5i64));
        NeuronRecord::from_neuron(&n).to_json().unwrap().into_bytes()
    }

    #[test]
    fn test_loader_reads_bytes() {
        let n = JsonLoader.load(&NeuronSource::Bytes(record_bytes())).unwrap();
        assert_eq!(n.as_tree().unwrap().n_nodes(), 2);
    }

    #[test]
    fn test_loader_rejects_garbage() {
        let err = JsonLoader
            .load(&NeuronSource::Bytes(b"{not json".to_vec()))
            .unwrap_err();
        assert!(matches!(err, neurarbor_core::Error::Json(_)));
    }

    #[test]
    fn test_load_dir_requires_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_dir(file.path(), ListConfig::default()),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_neuron(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::CoreError(neurarbor_core::Error::Io(_))));
    }
}
