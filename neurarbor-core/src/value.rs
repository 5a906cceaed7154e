//! Dynamically typed attribute values.
//!
//! Attribute lookups by name (on a neuron or across a list) and dispatched
//! method calls exchange [`Value`]s.

use crate::error::{Error, Result};
use crate::graph::TreeGraph;
use crate::neuron::Neuron;
use crate::table::{Cell, Table};
use crate::units::Quantity;
use ndarray::Array2;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A value returned by attribute access or passed as a call argument.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Quantity(Quantity),
    List(Vec<Value>),
    Table(Table),
    Array(Array2<f64>),
    IndexArray(Array2<usize>),
    Graph(Arc<TreeGraph>),
    Neuron(Box<Neuron>),
}

impl Value {
    /// Short name of the value kind, used in messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Quantity(_) => "quantity",
            Self::List(_) => "list",
            Self::Table(_) => "table",
            Self::Array(_) | Self::IndexArray(_) => "array",
            Self::Graph(_) => "graph",
            Self::Neuron(_) => "neuron",
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Length of a sized value; `None` counts as empty.
    pub fn len(&self) -> Result<usize> {
        match self {
            Self::None => Ok(0),
            Self::Str(s) => Ok(s.chars().count()),
            Self::List(v) => Ok(v.len()),
            Self::Table(t) => Ok(t.n_rows()),
            Self::Array(a) => Ok(a.nrows()),
            Self::IndexArray(a) => Ok(a.nrows()),
            Self::Graph(g) => Ok(g.node_count()),
            other => Err(Error::Unsupported(format!(
                "value of kind {} has no length",
                other.kind_name()
            ))),
        }
    }

    /// Returns true if the value is sized and empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len().is_ok_and(|n| n == 0)
    }

    /// Numeric view; quantities yield their magnitude.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Quantity(q) => Some(q.magnitude),
            _ => None,
        }
    }

    /// Integer view; floats must be integral.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_neuron(&self) -> Option<&Neuron> {
        match self {
            Self::Neuron(n) => Some(n),
            _ => None,
        }
    }

    /// Node ids from an int or a list of ints.
    #[must_use]
    pub fn as_ids(&self) -> Option<Vec<i64>> {
        match self {
            Self::List(v) => v.iter().map(Value::as_i64).collect(),
            other => other.as_i64().map(|id| vec![id]),
        }
    }

    /// Converts into a table cell for summaries; composite values are rendered.
    #[must_use]
    pub fn to_cell(&self) -> Cell {
        match self {
            Self::None => Cell::Null,
            Self::Bool(b) => Cell::Bool(*b),
            Self::Int(v) => Cell::Int(*v),
            Self::Float(v) => Cell::Float(*v),
            Self::Str(s) => Cell::Str(s.clone()),
            other => Cell::Str(other.to_string()),
        }
    }

    /// Orders numbers numerically and strings lexically; `None` sorts last.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::None, Self::None) => Ordering::Equal,
            (Self::None, _) => Ordering::Greater,
            (_, Self::None) => Ordering::Less,
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Quantity(a), Self::Quantity(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::IndexArray(a), Self::IndexArray(b)) => a == b,
            (Self::Graph(a), Self::Graph(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.node_count() == b.node_count()
                        && a.edge_count() == b.edge_count()
                        && a.total_weight() == b.total_weight())
            }
            (Self::Neuron(a), Self::Neuron(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b))
                    if !matches!(self, Self::Quantity(_) | Self::Bool(_))
                        && !matches!(other, Self::Quantity(_) | Self::Bool(_)) =>
                {
                    a == b
                }
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Quantity(q) => write!(f, "{q}"),
            Self::List(v) => {
                f.write_str("[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Table(t) => write!(f, "<table {}x{}>", t.n_rows(), t.n_cols()),
            Self::Array(a) => write!(f, "<array {}x{}>", a.nrows(), a.ncols()),
            Self::IndexArray(a) => write!(f, "<array {}x{}>", a.nrows(), a.ncols()),
            Self::Graph(g) => write!(f, "<graph {} nodes, {} edges>", g.node_count(), g.edge_count()),
            Self::Neuron(n) => write!(f, "<{} {}>", n.type_name(), n.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Quantity> for Value {
    fn from(v: Quantity) -> Self {
        Self::Quantity(v)
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Self::Table(v)
    }
}

impl From<Array2<f64>> for Value {
    fn from(v: Array2<f64>) -> Self {
        Self::Array(v)
    }
}

impl From<Neuron> for Value {
    fn from(v: Neuron) -> Self {
        Self::Neuron(Box::new(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::List(v.into_iter().map(Value::Int).collect())
    }
}

impl From<Vec<Vec<i64>>> for Value {
    fn from(v: Vec<Vec<i64>>) -> Self {
        Self::List(v.into_iter().map(Value::from).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

impl From<[[f64; 2]; 3]> for Value {
    fn from(b: [[f64; 2]; 3]) -> Self {
        Self::Array(Array2::from_shape_fn((3, 2), |(i, j)| b[i][j]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_of_none_is_zero() {
        assert_eq!(Value::None.len().unwrap(), 0);
        assert_eq!(Value::from(vec![1i64, 2, 3]).len().unwrap(), 3);
        assert!(Value::Float(1.0).len().is_err());
    }

    #[test]
    fn test_numeric_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(1), Value::Bool(true));
        assert_ne!(Value::from("a"), Value::Int(1));
    }

    #[test]
    fn test_compare_and_cells() {
        assert_eq!(Value::Float(1.0).compare(&Value::Int(2)), Ordering::Less);
        assert_eq!(Value::None.compare(&Value::Int(2)), Ordering::Greater);
        assert_eq!(Value::from(vec![1i64, 2]).to_cell(), Cell::from("[1, 2]"));
        assert_eq!(Value::from(vec![3i64]).as_ids().unwrap(), [3]);
    }
}
