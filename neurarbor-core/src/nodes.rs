//! Typed node and connector tables.
//!
//! Both are stored as Structure of Arrays so coordinate columns can be scaled
//! or sliced without touching the free-form `extra` columns.

use crate::error::{Error, Result};
use crate::table::{validate_table, Cell, Table, TableSchema};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Structural class of a skeleton node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Root,
    End,
    #[default]
    Slab,
    Branch,
}

impl NodeType {
    /// Returns the lowercase label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::End => "end",
            Self::Slab => "slab",
            Self::Branch => "branch",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single skeleton node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRow {
    pub node_id: i64,
    /// Negative for roots.
    pub parent_id: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
}

impl NodeRow {
    #[must_use]
    pub fn new(node_id: i64, parent_id: i64, x: f64, y: f64, z: f64) -> Self {
        Self {
            node_id,
            parent_id,
            x,
            y,
            z,
            radius: 0.0,
        }
    }

    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }
}

const NODE_SCHEMA: TableSchema<'static> = TableSchema {
    required: &[
        &["node_id", "rowId", "node", "treenode_id"],
        &["parent_id", "link", "parent"],
        &["x"],
        &["y"],
        &["z"],
    ],
    optional: &[(&["radius"], Cell::Float(0.0))],
};

/// Columns owned by [`NodeTable`] rather than its `extra` table.
const NODE_COLUMNS: &[&str] = &["node_id", "parent_id", "x", "y", "z", "radius", "type"];

/// Skeleton node table in `SoA` layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTable {
    pub node_id: Vec<i64>,
    pub parent_id: Vec<i64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub radius: Vec<f64>,
    /// Refreshed by [`crate::graph::classify_nodes`].
    pub node_type: Vec<NodeType>,
    /// Additional per-node columns (labels, strahler index, ...).
    #[serde(default)]
    pub extra: Table,
}

impl NodeTable {
    /// Builds a table from rows and validates it.
    pub fn from_rows(rows: impl IntoIterator<Item = NodeRow>) -> Result<Self> {
        let mut table = Self::default();
        for row in rows {
            table.push_unchecked(row);
        }
        table.validated()
    }

    /// Builds a table from a loosely typed [`Table`].
    ///
    /// Accepts the aliases `rowId`/`node`/`treenode_id` for `node_id` and
    /// `link`/`parent` for `parent_id`. A missing `radius` column defaults to 0.
    pub fn from_table(table: Table) -> Result<Self> {
        let mut table = validate_table(table, &NODE_SCHEMA, false)?;
        let ids = int_column(&table, "node_id", None)?;
        let parents = int_column(&table, "parent_id", Some(-1))?;
        let x = float_column(&table, "x")?;
        let y = float_column(&table, "y")?;
        let z = float_column(&table, "z")?;
        let radius = float_column(&table, "radius")?;
        for name in NODE_COLUMNS {
            table.drop_column(name);
        }
        let n = ids.len();
        let extra = if table.n_cols() == 0 { Table::new() } else { table };
        Self {
            node_id: ids,
            parent_id: parents,
            x,
            y,
            z,
            radius,
            node_type: vec![NodeType::default(); n],
            extra,
        }
        .validated()
    }

    /// Rejects duplicate ids and demotes parents that point nowhere to roots.
    pub fn validated(mut self) -> Result<Self> {
        let mut seen = HashSet::with_capacity(self.len());
        for id in &self.node_id {
            if !seen.insert(*id) {
                return Err(Error::Validation(format!("duplicate node id {id}")));
            }
        }
        let mut orphans = 0usize;
        for parent in &mut self.parent_id {
            if *parent >= 0 && !seen.contains(parent) {
                *parent = -1;
                orphans += 1;
            }
        }
        if orphans > 0 {
            warn!("{orphans} node(s) referenced missing parents and were turned into roots");
        }
        self.node_type.resize(self.len(), NodeType::default());
        Ok(self)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.node_id.len()
    }

    /// Returns true if there are no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_id.is_empty()
    }

    /// Map from node id to row index.
    #[must_use]
    pub fn id_index(&self) -> HashMap<i64, usize> {
        self.node_id.iter().enumerate().map(|(i, id)| (*id, i)).collect()
    }

    /// Row index of a node id.
    #[must_use]
    pub fn index_of(&self, node_id: i64) -> Option<usize> {
        self.node_id.iter().position(|id| *id == node_id)
    }

    /// Returns true if the node id exists.
    #[must_use]
    pub fn contains(&self, node_id: i64) -> bool {
        self.node_id.contains(&node_id)
    }

    /// Position of row `i`.
    #[must_use]
    pub fn position(&self, i: usize) -> [f64; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Row `i` as a [`NodeRow`].
    #[must_use]
    pub fn row(&self, i: usize) -> NodeRow {
        NodeRow {
            node_id: self.node_id[i],
            parent_id: self.parent_id[i],
            x: self.x[i],
            y: self.y[i],
            z: self.z[i],
            radius: self.radius[i],
        }
    }

    /// Ids of all nodes without a parent.
    #[must_use]
    pub fn roots(&self) -> Vec<i64> {
        self.node_id
            .iter()
            .zip(&self.parent_id)
            .filter(|(_, p)| **p < 0)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Ids of all nodes of the given type.
    #[must_use]
    pub fn ids_of_type(&self, kind: NodeType) -> Vec<i64> {
        self.node_id
            .iter()
            .zip(&self.node_type)
            .filter(|(_, t)| **t == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Appends a node without validation; extra columns receive nulls.
    pub fn push_unchecked(&mut self, row: NodeRow) {
        self.node_id.push(row.node_id);
        self.parent_id.push(row.parent_id);
        self.x.push(row.x);
        self.y.push(row.y);
        self.z.push(row.z);
        self.radius.push(row.radius);
        self.node_type.push(NodeType::default());
        if self.extra.n_cols() > 0 {
            let cols: Vec<String> = self.extra.columns().to_vec();
            self.extra
                .push_row(cols.into_iter().map(|c| (c, Cell::Null)).collect());
        }
    }

    /// Returns the given rows in the given order.
    #[must_use]
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            node_id: rows.iter().map(|&r| self.node_id[r]).collect(),
            parent_id: rows.iter().map(|&r| self.parent_id[r]).collect(),
            x: rows.iter().map(|&r| self.x[r]).collect(),
            y: rows.iter().map(|&r| self.y[r]).collect(),
            z: rows.iter().map(|&r| self.z[r]).collect(),
            radius: rows.iter().map(|&r| self.radius[r]).collect(),
            node_type: rows.iter().map(|&r| self.node_type[r]).collect(),
            extra: if self.extra.n_cols() > 0 {
                self.extra.take_rows(rows)
            } else {
                Table::new()
            },
        }
    }

    /// Keeps only the given node ids; parents outside the subset become roots.
    #[must_use]
    pub fn subset(&self, keep: &HashSet<i64>) -> Self {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| keep.contains(&self.node_id[i]))
            .collect();
        let mut out = self.take(&rows);
        for parent in &mut out.parent_id {
            if !keep.contains(parent) {
                *parent = -1;
            }
        }
        out
    }

    /// Multiplies coordinates and radii by a factor.
    pub fn scale(&mut self, factor: f64, radius: bool) {
        for v in self.x.iter_mut().chain(&mut self.y).chain(&mut self.z) {
            *v *= factor;
        }
        if radius {
            for r in &mut self.radius {
                *r *= factor;
            }
        }
    }

    /// Extra column values.
    #[must_use]
    pub fn extra_column(&self, name: &str) -> Option<&[Cell]> {
        self.extra.column(name)
    }

    /// Sets an extra column, replacing any existing column of the same name.
    pub fn set_extra_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.len() {
            return Err(Error::Validation(format!(
                "column \"{name}\" has {} values, node table has {} rows",
                values.len(),
                self.len()
            )));
        }
        if self.extra.n_cols() == 0 {
            self.extra = Table::new();
        }
        self.extra.add_column(name, values)
    }

    /// Removes an extra column if present.
    pub fn drop_extra_column(&mut self, name: &str) -> bool {
        self.extra.drop_column(name).is_some()
    }

    /// `[[xmin, xmax], [ymin, ymax], [zmin, zmax]]`, or `None` if empty.
    #[must_use]
    pub fn bbox(&self) -> Option<[[f64; 2]; 3]> {
        if self.is_empty() {
            return None;
        }
        Some([min_max(&self.x), min_max(&self.y), min_max(&self.z)])
    }

    /// Converts back into a loosely typed [`Table`].
    #[must_use]
    pub fn to_table(&self) -> Table {
        let mut t = Table::new();
        let cols: Vec<(&str, Vec<Cell>)> = vec![
            ("node_id", self.node_id.iter().map(|v| Cell::Int(*v)).collect()),
            ("parent_id", self.parent_id.iter().map(|v| Cell::Int(*v)).collect()),
            ("x", self.x.iter().map(|v| Cell::Float(*v)).collect()),
            ("y", self.y.iter().map(|v| Cell::Float(*v)).collect()),
            ("z", self.z.iter().map(|v| Cell::Float(*v)).collect()),
            ("radius", self.radius.iter().map(|v| Cell::Float(*v)).collect()),
            (
                "type",
                self.node_type.iter().map(|v| Cell::from(v.as_str())).collect(),
            ),
        ];
        for (name, values) in cols {
            // Lengths are consistent by construction.
            let _ = t.add_column(name, values);
        }
        for name in self.extra.columns() {
            if let Some(values) = self.extra.column(name) {
                let _ = t.add_column(name.clone(), values.to_vec());
            }
        }
        t
    }
}

pub(crate) fn min_max(values: &[f64]) -> [f64; 2] {
    values.iter().fold([f64::INFINITY, f64::NEG_INFINITY], |[lo, hi], v| {
        [lo.min(*v), hi.max(*v)]
    })
}

fn int_column(table: &Table, name: &str, null_as: Option<i64>) -> Result<Vec<i64>> {
    let values = table.column(name).unwrap_or_default();
    values
        .iter()
        .map(|c| match (c.as_i64(), null_as) {
            (Some(v), _) => Ok(v),
            (None, Some(default)) if c.is_null() => Ok(default),
            _ => Err(Error::Validation(format!(
                "column \"{name}\" must hold integers, found \"{c}\""
            ))),
        })
        .collect()
}

fn float_column(table: &Table, name: &str) -> Result<Vec<f64>> {
    let values = table.column(name).unwrap_or_default();
    values
        .iter()
        .map(|c| {
            if c.is_null() {
                Ok(f64::NAN)
            } else {
                c.as_f64().ok_or_else(|| {
                    Error::Validation(format!("column \"{name}\" must be numeric, found \"{c}\""))
                })
            }
        })
        .collect()
}

const CONNECTOR_SCHEMA: TableSchema<'static> = TableSchema {
    required: &[&["x"], &["y"], &["z"], &["type", "relation", "label"]],
    optional: &[
        (&["connector_id", "id"], Cell::Null),
        (&["node_id", "rowId", "node", "treenode_id"], Cell::Null),
    ],
};

const CONNECTOR_COLUMNS: &[&str] = &["connector_id", "node_id", "x", "y", "z", "type"];

/// A single connector (synapse marker).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorRow {
    pub connector_id: Option<i64>,
    pub node_id: Option<i64>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub kind: String,
}

/// Connector table in `SoA` layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorTable {
    pub connector_id: Vec<Option<i64>>,
    /// Node the connector is attached to, if any.
    pub node_id: Vec<Option<i64>>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    /// Type label; integer codes are kept as their string form.
    pub kind: Vec<String>,
    #[serde(default)]
    pub extra: Table,
}

impl ConnectorTable {
    /// Builds a table from rows.
    pub fn from_rows(rows: impl IntoIterator<Item = ConnectorRow>) -> Self {
        let mut t = Self::default();
        for row in rows {
            t.connector_id.push(row.connector_id);
            t.node_id.push(row.node_id);
            t.x.push(row.x);
            t.y.push(row.y);
            t.z.push(row.z);
            t.kind.push(row.kind);
        }
        t
    }

    /// Builds a table from a loosely typed [`Table`].
    ///
    /// The type column may be named `type`, `relation` or `label`.
    pub fn from_table(table: Table) -> Result<Self> {
        let mut table = validate_table(table, &CONNECTOR_SCHEMA, false)?;
        let opt_ints = |name: &str| -> Vec<Option<i64>> {
            table
                .column(name)
                .unwrap_or_default()
                .iter()
                .map(Cell::as_i64)
                .collect()
        };
        let connector_id = opt_ints("connector_id");
        let node_id = opt_ints("node_id");
        let x = float_column(&table, "x")?;
        let y = float_column(&table, "y")?;
        let z = float_column(&table, "z")?;
        let kind = table
            .column("type")
            .unwrap_or_default()
            .iter()
            .map(ToString::to_string)
            .collect();
        for name in CONNECTOR_COLUMNS {
            table.drop_column(name);
        }
        let extra = if table.n_cols() == 0 { Table::new() } else { table };
        Ok(Self {
            connector_id,
            node_id,
            x,
            y,
            z,
            kind,
            extra,
        })
    }

    /// Number of connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if there are no connectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Returns the given rows in the given order.
    #[must_use]
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            connector_id: rows.iter().map(|&r| self.connector_id[r]).collect(),
            node_id: rows.iter().map(|&r| self.node_id[r]).collect(),
            x: rows.iter().map(|&r| self.x[r]).collect(),
            y: rows.iter().map(|&r| self.y[r]).collect(),
            z: rows.iter().map(|&r| self.z[r]).collect(),
            kind: rows.iter().map(|&r| self.kind[r].clone()).collect(),
            extra: if self.extra.n_cols() > 0 {
                self.extra.take_rows(rows)
            } else {
                Table::new()
            },
        }
    }

    /// Keeps connectors that are unattached or attached to a kept node.
    #[must_use]
    pub fn retain_nodes(&self, keep: &HashSet<i64>) -> Self {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| self.node_id[i].map_or(true, |n| keep.contains(&n)))
            .collect();
        self.take(&rows)
    }

    /// Multiplies coordinates by a factor.
    pub fn scale(&mut self, factor: f64) {
        for v in self.x.iter_mut().chain(&mut self.y).chain(&mut self.z) {
            *v *= factor;
        }
    }

    /// Distinct type labels in first-appearance order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for k in &self.kind {
            if !out.contains(&k.as_str()) {
                out.push(k);
            }
        }
        out
    }

    /// Connectors whose label contains `"pre"` or equals `"0"`.
    ///
    /// Fails if more than one distinct label matches.
    pub fn presynapses(&self) -> Result<Self> {
        self.select_kind("pre", "0", "presynapse")
    }

    /// Connectors whose label contains `"post"` or equals `"1"`.
    ///
    /// Fails if more than one distinct label matches.
    pub fn postsynapses(&self) -> Result<Self> {
        self.select_kind("post", "1", "postsynapse")
    }

    fn select_kind(&self, needle: &str, code: &str, what: &str) -> Result<Self> {
        let matches: Vec<&str> = self
            .kinds()
            .into_iter()
            .filter(|k| k.contains(needle) || *k == code)
            .collect();
        match matches.as_slice() {
            [] => {
                log::debug!("unable to find {what}s in types {:?}", self.kinds());
                Ok(self.take(&[]))
            }
            [label] => {
                let rows: Vec<usize> = (0..self.len()).filter(|&i| self.kind[i] == *label).collect();
                Ok(self.take(&rows))
            }
            many => Err(Error::Validation(format!(
                "found ambiguous {what} labels: {many:?}"
            ))),
        }
    }

    /// Converts back into a loosely typed [`Table`].
    #[must_use]
    pub fn to_table(&self) -> Table {
        let mut t = Table::new();
        let cols: Vec<(&str, Vec<Cell>)> = vec![
            ("connector_id", self.connector_id.iter().map(|v| Cell::from(*v)).collect()),
            ("node_id", self.node_id.iter().map(|v| Cell::from(*v)).collect()),
            ("x", self.x.iter().map(|v| Cell::Float(*v)).collect()),
            ("y", self.y.iter().map(|v| Cell::Float(*v)).collect()),
            ("z", self.z.iter().map(|v| Cell::Float(*v)).collect()),
            ("type", self.kind.iter().map(|v| Cell::from(v.as_str())).collect()),
        ];
        for (name, values) in cols {
            let _ = t.add_column(name, values);
        }
        for name in self.extra.columns() {
            if let Some(values) = self.extra.column(name) {
                let _ = t.add_column(name.clone(), values.to_vec());
            }
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connectors(kinds: &[&str]) -> ConnectorTable {
        ConnectorTable::from_rows(kinds.iter().enumerate().map(|(i, k)| ConnectorRow {
            connector_id: Some(i as i64),
            node_id: None,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            kind: (*k).to_string(),
        }))
    }

    #[test]
    fn test_node_table_aliases_and_defaults() {
        let t = Table::from_columns(vec![
            ("rowId", vec![Cell::Int(1), Cell::Int(2)]),
            ("link", vec![Cell::Int(-1), Cell::Int(1)]),
            ("x", vec![Cell::Float(0.0), Cell::Float(1.0)]),
            ("y", vec![Cell::Float(0.0), Cell::Float(0.0)]),
            ("z", vec![Cell::Float(0.0), Cell::Float(0.0)]),
            ("label", vec![Cell::Int(1), Cell::Int(0)]),
        ])
        .unwrap();
        let nodes = NodeTable::from_table(t).unwrap();
        assert_eq!(nodes.node_id, [1, 2]);
        assert_eq!(nodes.parent_id, [-1, 1]);
        assert_eq!(nodes.radius, [0.0, 0.0]);
        assert_eq!(nodes.extra_column("label").unwrap()[0], Cell::Int(1));
    }

    #[test]
    fn test_node_table_missing_column() {
        let t = Table::from_columns(vec![("node_id", vec![Cell::Int(1)])]).unwrap();
        assert!(matches!(NodeTable::from_table(t), Err(Error::Validation(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let rows = [NodeRow::new(1, -1, 0.0, 0.0, 0.0), NodeRow::new(1, -1, 1.0, 0.0, 0.0)];
        assert!(NodeTable::from_rows(rows).is_err());
    }

    #[test]
    fn test_orphan_parent_becomes_root() {
        let rows = [NodeRow::new(1, -1, 0.0, 0.0, 0.0), NodeRow::new(2, 99, 1.0, 0.0, 0.0)];
        let nodes = NodeTable::from_rows(rows).unwrap();
        assert_eq!(nodes.roots(), [1, 2]);
    }

    #[test]
    fn test_subset_cuts_parents() {
        let rows = [
            NodeRow::new(1, -1, 0.0, 0.0, 0.0),
            NodeRow::new(2, 1, 1.0, 0.0, 0.0),
            NodeRow::new(3, 2, 2.0, 0.0, 0.0),
        ];
        let nodes = NodeTable::from_rows(rows).unwrap();
        let sub = nodes.subset(&[2, 3].into_iter().collect());
        assert_eq!(sub.node_id, [2, 3]);
        assert_eq!(sub.parent_id, [-1, 2]);
    }

    #[test]
    fn test_pre_post_selection() {
        let c = connectors(&["presynapse", "postsynapse", "presynapse"]);
        assert_eq!(c.presynapses().unwrap().len(), 2);
        assert_eq!(c.postsynapses().unwrap().len(), 1);

        let c = connectors(&["0", "1", "1"]);
        assert_eq!(c.presynapses().unwrap().len(), 1);
        assert_eq!(c.postsynapses().unwrap().len(), 2);
    }

    #[test]
    fn test_no_match_is_empty() {
        let c = connectors(&["gap_junction"]);
        assert!(c.presynapses().unwrap().is_empty());
        assert!(ConnectorTable::default().postsynapses().unwrap().is_empty());
    }

    #[test]
    fn test_ambiguous_labels_fail() {
        let c = connectors(&["pre", "presynapse"]);
        assert!(matches!(c.presynapses(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_connector_aliases() {
        let t = Table::from_columns(vec![
            ("id", vec![Cell::Int(5)]),
            ("treenode_id", vec![Cell::Int(1)]),
            ("x", vec![Cell::Float(1.0)]),
            ("y", vec![Cell::Float(2.0)]),
            ("z", vec![Cell::Float(3.0)]),
            ("relation", vec![Cell::Int(0)]),
        ])
        .unwrap();
        let c = ConnectorTable::from_table(t).unwrap();
        assert_eq!(c.connector_id, [Some(5)]);
        assert_eq!(c.node_id, [Some(1)]);
        assert_eq!(c.kind, ["0"]);
    }
}
