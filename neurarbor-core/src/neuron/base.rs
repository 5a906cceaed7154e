//! State shared by every neuron variant.

use crate::error::{Error, Result};
use crate::nodes::ConnectorTable;
use crate::units::{canonical_unit_string, Quantity};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Hashable neuron identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NeuronId {
    Int(i64),
    Uuid(Uuid),
    Str(String),
}

impl NeuronId {
    /// A fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self::Uuid(Uuid::new_v4())
    }

    /// Only random UUIDs count as generated.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Uuid(_))
    }

    /// Converts into a summary value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(v) => Value::Int(*v),
            other => Value::Str(other.to_string()),
        }
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for NeuronId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for NeuronId {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for NeuronId {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Uuid> for NeuronId {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl TryFrom<&Value> for NeuronId {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(Self::Int(*v)),
            Value::Str(s) => Ok(Uuid::parse_str(s).map_or_else(|_| Self::Str(s.clone()), Self::Uuid)),
            other => Err(Error::Validation(format!(
                "id must be an int or a string, got {}",
                other.kind_name()
            ))),
        }
    }
}

/// Identity, units, connectors and registered attributes of a neuron.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronCore {
    pub(crate) id: NeuronId,
    pub(crate) name: Option<String>,
    /// Canonical unit string, `None` when dimensionless.
    pub(crate) unit_str: Option<String>,
    pub(crate) connectors: Option<ConnectorTable>,
    pub(crate) metadata: BTreeMap<String, Value>,
    /// Registered attributes that appear in summaries.
    pub(crate) summary_extra: Vec<String>,
}

impl Default for NeuronCore {
    fn default() -> Self {
        Self {
            id: NeuronId::generate(),
            name: None,
            unit_str: None,
            connectors: None,
            metadata: BTreeMap::new(),
            summary_extra: Vec::new(),
        }
    }
}

impl NeuronCore {
    #[must_use]
    pub fn id(&self) -> &NeuronId {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<NeuronId>) {
        self.id = id.into();
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    /// Units of the coordinate space, rebuilt from the stored string.
    #[must_use]
    pub fn units(&self) -> Quantity {
        self.unit_str
            .as_deref()
            .and_then(|s| Quantity::parse(s).ok())
            .unwrap_or_else(Quantity::dimensionless)
    }

    /// The stored canonical unit string.
    #[must_use]
    pub fn unit_str(&self) -> Option<&str> {
        self.unit_str.as_deref()
    }

    /// Parses and stores units such as `"nm"` or `"8 nanometer"`.
    pub fn set_units(&mut self, units: Option<&str>) -> Result<()> {
        self.unit_str = canonical_unit_string(units)?;
        Ok(())
    }

    pub fn set_units_quantity(&mut self, units: Quantity) {
        self.unit_str = if units.is_dimensionless() {
            None
        } else {
            Some(units.to_string())
        };
    }

    #[must_use]
    pub fn connectors(&self) -> Option<&ConnectorTable> {
        self.connectors.as_ref()
    }

    pub fn connectors_mut(&mut self) -> Option<&mut ConnectorTable> {
        self.connectors.as_mut()
    }

    pub fn set_connectors(&mut self, connectors: Option<ConnectorTable>) {
        self.connectors = connectors;
    }

    /// True if a non-empty connector table is attached.
    #[must_use]
    pub fn has_connectors(&self) -> bool {
        self.connectors.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Presynaptic connectors; empty without connectors.
    pub fn presynapses(&self) -> Result<ConnectorTable> {
        self.connectors
            .as_ref()
            .map_or_else(|| Ok(ConnectorTable::default()), ConnectorTable::presynapses)
    }

    /// Postsynaptic connectors; empty without connectors.
    pub fn postsynapses(&self) -> Result<ConnectorTable> {
        self.connectors
            .as_ref()
            .map_or_else(|| Ok(ConnectorTable::default()), ConnectorTable::postsynapses)
    }

    /// Registered attribute values.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Sets an attribute; scalars and strings also join the summary.
    pub fn register_attr(&mut self, name: &str, value: Value) {
        let summarize = matches!(
            value,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        );
        self.metadata.insert(name.to_string(), value);
        if summarize && !self.summary_extra.iter().any(|n| n == name) {
            self.summary_extra.push(name.to_string());
        }
    }

    /// Removes an attribute and its summary entry.
    pub fn unregister_attr(&mut self, name: &str) -> Result<Value> {
        self.summary_extra.retain(|n| n != name);
        self.metadata
            .remove(name)
            .ok_or_else(|| Error::AttributeNotFound(name.to_string()))
    }

    /// Registered attribute names that appear in summaries.
    #[must_use]
    pub fn summary_extra(&self) -> &[String] {
        &self.summary_extra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids() {
        let a = NeuronCore::default();
        let b = NeuronCore::default();
        assert!(a.id().is_generated());
        assert_ne!(a.id(), b.id());
        assert!(!NeuronId::from(12).is_generated());
    }

    #[test]
    fn test_units_stored_as_string() {
        let mut core = NeuronCore::default();
        assert!(core.units().is_dimensionless());
        core.set_units(Some("8nm")).unwrap();
        assert_eq!(core.unit_str(), Some("8 nanometer"));
        assert_eq!(core.units().to_string(), "8 nanometer");
        assert!(core.set_units(Some("furlong")).is_err());
        core.set_units(None).unwrap();
        assert!(core.units().is_dimensionless());
    }

    #[test]
    fn test_register_attr() {
        let mut core = NeuronCore::default();
        core.register_attr("confidence", Value::Float(0.9));
        core.register_attr("tags", Value::List(vec![]));
        assert_eq!(core.summary_extra(), ["confidence"]);
        assert_eq!(core.unregister_attr("confidence").unwrap(), Value::Float(0.9));
        assert!(core.summary_extra().is_empty());
        assert!(core.unregister_attr("confidence").is_err());
    }

    #[test]
    fn test_id_from_value() {
        let id = NeuronId::try_from(&Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")).unwrap();
        assert!(id.is_generated());
        assert_eq!(NeuronId::try_from(&Value::Int(3)).unwrap(), NeuronId::Int(3));
        assert!(NeuronId::try_from(&Value::Float(1.5)).is_err());
    }
}
