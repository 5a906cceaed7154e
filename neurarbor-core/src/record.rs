//! Serializable neuron records.
//!
//! A [`NeuronRecord`] is the wire format of a neuron: units travel as their
//! canonical string, somas only if they are fixed node ids. Callable somas are
//! replaced by the default finder when a record is turned back into a neuron.

use crate::error::{Error, Result};
use crate::neuron::{MeshNeuron, Neuron, NeuronId, SomaSpec, TreeNeuron};
use crate::nodes::{ConnectorTable, NodeTable};
use crate::table::Cell;
use crate::value::Value;
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variant specific payload of a [`NeuronRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordData {
    Tree {
        nodes: NodeTable,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        soma: Option<Vec<i64>>,
    },
    Mesh {
        vertices: Vec<[f64; 3]>,
        faces: Vec<Vec<usize>>,
    },
}

/// Serde mirror of a [`Neuron`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronRecord {
    pub id: NeuronId,
    #[serde(default)]
    pub name: Option<String>,
    /// Canonical unit string, absent when dimensionless.
    #[serde(default)]
    pub units: Option<String>,
    #[serde(flatten)]
    pub data: RecordData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectors: Option<ConnectorTable>,
    /// Registered scalar and string attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Cell>,
}

impl NeuronRecord {
    /// Captures a neuron. Non-scalar metadata is skipped.
    #[must_use]
    pub fn from_neuron(n: &Neuron) -> Self {
        let core = n.core();
        let data = match n {
            Neuron::Tree(t) => RecordData::Tree {
                nodes: t.nodes().clone(),
                soma: t.soma_spec().fixed(),
            },
            Neuron::Mesh(m) => RecordData::Mesh {
                vertices: m
                    .vertices()
                    .rows()
                    .into_iter()
                    .map(|r| [r[0], r[1], r[2]])
                    .collect(),
                faces: m.faces().rows().into_iter().map(|r| r.to_vec()).collect(),
            },
        };
        let mut metadata = BTreeMap::new();
        for (k, v) in core.metadata() {
            match v {
                Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
                    metadata.insert(k.clone(), v.to_cell());
                }
                other => debug!("attribute \"{k}\" of kind {} not serialized", other.kind_name()),
            }
        }
        Self {
            id: core.id().clone(),
            name: core.name().map(str::to_string),
            units: core.unit_str().map(str::to_string),
            data,
            connectors: core.connectors().cloned(),
            metadata,
        }
    }

    /// Rebuilds the neuron.
    pub fn into_neuron(self) -> Result<Neuron> {
        let mut n = match self.data {
            RecordData::Tree { nodes, soma } => {
                let mut t = TreeNeuron::new(nodes.validated()?);
                if let Some(ids) = soma {
                    t.set_soma(SomaSpec::from(ids))?;
                }
                Neuron::Tree(t)
            }
            RecordData::Mesh { vertices, faces } => {
                let n_corners = faces.first().map_or(3, Vec::len);
                if faces.iter().any(|f| f.len() != n_corners) {
                    return Err(Error::Validation(
                        "all faces must have the same number of corners".to_string(),
                    ));
                }
                let v = Array2::from_shape_fn((vertices.len(), 3), |(i, j)| vertices[i][j]);
                let f = Array2::from_shape_fn((faces.len(), n_corners), |(i, j)| faces[i][j]);
                Neuron::Mesh(MeshNeuron::new(v, f)?)
            }
        };
        let core = n.core_mut();
        core.set_id(self.id);
        core.set_name(self.name);
        core.set_units(self.units.as_deref())?;
        core.set_connectors(self.connectors);
        for (k, cell) in self.metadata {
            let value = match cell {
                Cell::Null => Value::None,
                Cell::Bool(b) => Value::Bool(b),
                Cell::Int(i) => Value::Int(i),
                Cell::Float(f) => Value::Float(f),
                Cell::Str(s) => Value::Str(s),
            };
            core.register_attr(&k, value);
        }
        Ok(n)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeRow;
    use ndarray::array;

    #[test]
    fn test_tree_record_restores_state() {
        let nodes = NodeTable::from_rows([
            NodeRow::new(1, -1, 0.0, 0.0, 0.0).with_radius(2.0),
            NodeRow::new(2, 1, 1.0, 0.0, 0.0),
        ])
        .unwrap();
        let mut t = TreeNeuron::new(nodes)
            .with_units("8 nm")
            .unwrap()
            .with_name("PN")
            .with_soma(1i64)
            .unwrap();
        t.core_mut().register_attr("confidence", Value::Float(0.75));
        let n = Neuron::Tree(t);

        let json = NeuronRecord::from_neuron(&n).to_json().unwrap();
        assert!(json.contains("\"kind\":\"tree\""));
        assert!(json.contains("\"units\":\"8 nanometer\""));

        let back = NeuronRecord::from_json(&json).unwrap().into_neuron().unwrap();
        assert_eq!(back, n);
        assert_eq!(back.id(), n.id());
        assert_eq!(back.get("soma").unwrap(), Value::Int(1));
        assert_eq!(back.get("confidence").unwrap(), Value::Float(0.75));
        assert_eq!(back.core().summary_extra(), ["confidence"]);
    }

    #[test]
    fn test_finder_soma_not_serialized() {
        let nodes = NodeTable::from_rows([NodeRow::new(1, -1, 0.0, 0.0, 0.0)]).unwrap();
        let t = TreeNeuron::new(nodes).with_soma(SomaSpec::finder(|_| vec![1])).unwrap();
        let record = NeuronRecord::from_neuron(&Neuron::Tree(t));
        assert!(matches!(record.data, RecordData::Tree { soma: None, .. }));
        let back = record.into_neuron().unwrap();
        assert!(back.as_tree().unwrap().soma_spec().is_finder());
    }

    #[test]
    fn test_mesh_record() {
        let m = MeshNeuron::new(
            array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            array![[0, 1, 2]],
        )
        .unwrap()
        .with_id(3i64);
        let record = NeuronRecord::from_neuron(&Neuron::Mesh(m));
        let json = record.to_json().unwrap();
        let back = NeuronRecord::from_slice(json.as_bytes())
            .unwrap()
            .into_neuron()
            .unwrap();
        assert_eq!(back.as_mesh().unwrap().n_faces(), 1);
        assert_eq!(back.id(), &NeuronId::Int(3));
    }

    #[test]
    fn test_ragged_faces_rejected() {
        let record = NeuronRecord {
            id: NeuronId::Int(1),
            name: None,
            units: None,
            data: RecordData::Mesh {
                vertices: vec![[0.0; 3]; 4],
                faces: vec![vec![0, 1, 2], vec![0, 1, 2, 3]],
            },
            connectors: None,
            metadata: BTreeMap::new(),
        };
        assert!(matches!(record.into_neuron(), Err(Error::Validation(_))));
    }
}
