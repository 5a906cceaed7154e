//! Column-major attribute tables and schema validation.
//!
//! [`Table`] is the loosely typed table used for summaries, concatenated
//! dispatch results and the free-form columns attached to node and connector
//! tables. Typed tables ([`crate::NodeTable`], [`crate::ConnectorTable`]) are
//! built from a [`Table`] through [`validate_table`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single table value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Cell {
    /// Returns true for [`Cell::Null`] and NaN floats.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// Integer view of the cell; floats must be integral.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String view of the cell.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Orders numbers numerically, strings lexically and nulls last.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A column-major table with named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    data: Vec<Vec<Cell>>,
}

impl Table {
    /// Creates an empty table without columns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(name, values)` pairs.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<Cell>)>) -> Result<Self> {
        let mut table = Self::new();
        for (name, values) in columns {
            table.add_column(name, values)?;
        }
        Ok(table)
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Returns true if a column with this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.position(name).map(|i| self.data[i].as_slice())
    }

    /// Mutable values of a column.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<Cell>> {
        self.position(name).map(|i| &mut self.data[i])
    }

    /// Adds a column, replacing any existing column of the same name.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Cell>) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            return Err(Error::Validation(format!(
                "column \"{name}\" has {} values, table has {} rows",
                values.len(),
                self.n_rows()
            )));
        }
        match self.position(&name) {
            Some(i) => self.data[i] = values,
            None => {
                self.columns.push(name);
                self.data.push(values);
            }
        }
        Ok(())
    }

    /// Inserts a column at a position, replacing any existing column of that name.
    pub fn insert_column(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: Vec<Cell>,
    ) -> Result<()> {
        let name = name.into();
        self.drop_column(&name);
        self.add_column(name.clone(), values)?;
        let last = self.columns.len() - 1;
        let index = index.min(last);
        let col = self.columns.remove(last);
        let vals = self.data.remove(last);
        self.columns.insert(index, col);
        self.data.insert(index, vals);
        Ok(())
    }

    /// Removes a column and returns its values.
    pub fn drop_column(&mut self, name: &str) -> Option<Vec<Cell>> {
        let i = self.position(name)?;
        self.columns.remove(i);
        Some(self.data.remove(i))
    }

    /// Renames a column. Returns false if it does not exist.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.position(from) {
            Some(i) => {
                self.columns[i] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Appends a row given as `(column, value)` pairs; absent columns get nulls
    /// and unknown columns are created.
    pub fn push_row<S: AsRef<str>>(&mut self, row: Vec<(S, Cell)>) {
        let n = self.n_rows();
        for (name, _) in &row {
            if !self.has_column(name.as_ref()) {
                self.columns.push(name.as_ref().to_string());
                self.data.push(vec![Cell::Null; n]);
            }
        }
        for values in &mut self.data {
            values.push(Cell::Null);
        }
        for (name, value) in row {
            if let Some(i) = self.position(name.as_ref()) {
                self.data[i][n] = value;
            }
        }
    }

    /// Returns row `i` as cells in column order.
    #[must_use]
    pub fn row(&self, i: usize) -> Option<Vec<Cell>> {
        if i >= self.n_rows() {
            return None;
        }
        Some(self.data.iter().map(|c| c[i].clone()).collect())
    }

    /// Returns a table with only the given rows, in the given order.
    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            data: self
                .data
                .iter()
                .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
                .collect(),
        }
    }

    /// Returns the first `n` rows.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let rows: Vec<usize> = (0..n.min(self.n_rows())).collect();
        self.take_rows(&rows)
    }

    /// Returns the last `n` rows.
    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let total = self.n_rows();
        let rows: Vec<usize> = (total.saturating_sub(n)..total).collect();
        self.take_rows(&rows)
    }

    /// Concatenates tables row-wise as an outer join on column names.
    ///
    /// Columns appear in first-appearance order. If `source` is given, a column
    /// of that name records the index of the table each row came from.
    #[must_use]
    pub fn concat(tables: &[Table], source: Option<&str>) -> Self {
        let mut out = Self::new();
        for table in tables {
            for name in &table.columns {
                if !out.has_column(name) {
                    out.columns.push(name.clone());
                    out.data.push(Vec::new());
                }
            }
        }
        let mut origin = Vec::new();
        for (ti, table) in tables.iter().enumerate() {
            let n = table.n_rows();
            for (ci, name) in out.columns.iter().enumerate() {
                match table.column(name) {
                    Some(values) => out.data[ci].extend_from_slice(values),
                    None => out.data[ci].extend(std::iter::repeat(Cell::Null).take(n)),
                }
            }
            origin.extend(std::iter::repeat(Cell::from(ti)).take(n));
        }
        if let Some(name) = source {
            out.drop_column(name);
            out.columns.push(name.to_string());
            out.data.push(origin);
        }
        out
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<Vec<String>> = self
            .data
            .iter()
            .map(|col| col.iter().map(ToString::to_string).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&rendered)
            .map(|(name, col)| col.iter().map(String::len).chain([name.len()]).max().unwrap_or(0))
            .collect();
        let index_width = self.n_rows().saturating_sub(1).to_string().len();
        write!(f, "{:index_width$}", "")?;
        for (name, w) in self.columns.iter().zip(&widths) {
            write!(f, "  {name:>w$}")?;
        }
        for row in 0..self.n_rows() {
            write!(f, "\n{row:<index_width$}")?;
            for (col, w) in rendered.iter().zip(&widths) {
                write!(f, "  {:>w$}", col[row])?;
            }
        }
        Ok(())
    }
}

/// Required and optional columns for [`validate_table`].
///
/// Each entry lists accepted aliases; the first alias is the canonical name.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema<'a> {
    pub required: &'a [&'a [&'a str]],
    pub optional: &'a [(&'a [&'a str], Cell)],
}

/// Normalizes a table against a schema.
///
/// Aliased columns are renamed to their canonical name, missing optional columns
/// are filled with their default and, if `restrict` is set, unknown columns are
/// dropped. Fails if a required column is absent under all of its aliases.
pub fn validate_table(mut table: Table, schema: &TableSchema<'_>, restrict: bool) -> Result<Table> {
    let n = table.n_rows();
    let mut known: Vec<&str> = Vec::new();
    for aliases in schema.required {
        let canonical = aliases[0];
        match aliases.iter().find(|a| table.has_column(a)) {
            Some(found) => {
                table.rename_column(found, canonical);
            }
            None => {
                return Err(Error::Validation(format!(
                    "table missing required column \"{canonical}\" (accepted: {})",
                    aliases.join(", ")
                )))
            }
        }
        known.push(canonical);
    }
    for (aliases, default) in schema.optional {
        let canonical = aliases[0];
        match aliases.iter().find(|a| table.has_column(a)) {
            Some(found) => {
                table.rename_column(found, canonical);
            }
            None => table.add_column(canonical, vec![default.clone(); n])?,
        }
        known.push(canonical);
    }
    if restrict {
        let extra: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !known.contains(&c.as_str()))
            .cloned()
            .collect();
        for name in extra {
            table.drop_column(&name);
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            ("rowId", vec![Cell::Int(1), Cell::Int(2)]),
            ("x", vec![Cell::Float(0.0), Cell::Float(1.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_lengths_must_match() {
        let mut t = sample();
        assert!(t.add_column("y", vec![Cell::Null]).is_err());
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.n_cols(), 2);
    }

    #[test]
    fn test_validate_renames_aliases() {
        let schema = TableSchema {
            required: &[&["node_id", "rowId"], &["x"]],
            optional: &[(&["radius"], Cell::Float(0.0))],
        };
        let t = validate_table(sample(), &schema, false).unwrap();
        assert_eq!(t.columns(), ["node_id", "x", "radius"]);
        assert_eq!(t.column("radius").unwrap()[1], Cell::Float(0.0));

        let schema = TableSchema {
            required: &[&["z"]],
            optional: &[],
        };
        let err = validate_table(sample(), &schema, false).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_restrict_drops_unknown() {
        let schema = TableSchema {
            required: &[&["x"]],
            optional: &[],
        };
        let t = validate_table(sample(), &schema, true).unwrap();
        assert_eq!(t.columns(), ["x"]);
    }

    #[test]
    fn test_concat_outer_join() {
        let a = sample();
        let b = Table::from_columns(vec![("x", vec![Cell::Float(5.0)]), ("y", vec![Cell::Int(3)])])
            .unwrap();
        let c = Table::concat(&[a, b], Some("neuron"));
        assert_eq!(c.columns(), ["rowId", "x", "y", "neuron"]);
        assert_eq!(c.n_rows(), 3);
        assert_eq!(c.column("rowId").unwrap()[2], Cell::Null);
        assert_eq!(
            c.column("neuron").unwrap(),
            [Cell::Int(0), Cell::Int(0), Cell::Int(1)]
        );
    }

    #[test]
    fn test_push_row_and_insert() {
        let mut t = Table::new();
        t.push_row(vec![("name", Cell::from("a")), ("n", Cell::Int(1))]);
        t.push_row(vec![("n", Cell::Int(2)), ("extra", Cell::Bool(true))]);
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.column("extra").unwrap()[0], Cell::Null);
        t.insert_column(0, "id", vec![Cell::Int(7), Cell::Int(8)]).unwrap();
        assert_eq!(t.columns()[0], "id");
        assert_eq!(t.tail(1).row(0).unwrap()[0], Cell::Int(8));
    }

    #[test]
    fn test_cell_ordering() {
        assert_eq!(Cell::Int(2).compare(&Cell::Float(1.5)), Ordering::Greater);
        assert_eq!(Cell::Null.compare(&Cell::Int(0)), Ordering::Greater);
        assert_eq!(Cell::from("a").compare(&Cell::from("b")), Ordering::Less);
    }
}
