//! Physical units for neuron coordinate spaces.
//!
//! Neurons store their units as a canonical string (e.g. `"8 nanometer"`) and
//! re-materialize a [`Quantity`] on read. The string is what crosses thread,
//! process and file boundaries.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// Known length units as powers of ten of a meter.
const LENGTH_UNITS: &[(i32, &str, &[&str])] = &[
    (-12, "picometer", &["pm", "picometer", "picometers", "picometre"]),
    (-10, "angstrom", &["a", "\u{e5}", "angstrom", "angstroms"]),
    (-9, "nanometer", &["nm", "nanometer", "nanometers", "nanometre"]),
    (
        -6,
        "micrometer",
        &[
            "um",
            "\u{b5}m",
            "\u{3bc}m",
            "micron",
            "microns",
            "micrometer",
            "micrometers",
            "micrometre",
        ],
    ),
    (-3, "millimeter", &["mm", "millimeter", "millimeters", "millimetre"]),
    (-2, "centimeter", &["cm", "centimeter", "centimeters", "centimetre"]),
    (0, "meter", &["m", "meter", "meters", "metre"]),
    (3, "kilometer", &["km", "kilometer", "kilometers", "kilometre"]),
];

/// Smallest and largest exponents reachable by [`Quantity::to_compact`].
const COMPACT_RANGE: (i32, i32) = (-12, 3);

/// A unit: either dimensionless or a power-of-ten multiple of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Dimensionless,
    /// Length unit of `10^exp` meters.
    Length(i32),
}

impl Unit {
    /// Parses a bare unit name such as `"nm"` or `"micrometer"`.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim().to_lowercase();
        if name.is_empty() || name == "dimensionless" {
            return Ok(Self::Dimensionless);
        }
        LENGTH_UNITS
            .iter()
            .find(|(_, _, aliases)| aliases.contains(&name.as_str()))
            .map(|(exp, _, _)| Self::Length(*exp))
            .ok_or_else(|| Error::Units(format!("unknown unit \"{name}\"")))
    }

    /// Returns the canonical long name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Dimensionless => "dimensionless".to_string(),
            Self::Length(exp) => LENGTH_UNITS
                .iter()
                .find(|(e, _, _)| e == exp)
                .map_or_else(|| format!("1e{exp} meter"), |(_, n, _)| (*n).to_string()),
        }
    }

    /// Returns true if quantities in both units can be converted into each other.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Dimensionless, Self::Dimensionless) | (Self::Length(_), Self::Length(_))
        )
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A magnitude paired with a unit, e.g. `8 nanometer`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: Unit,
}

impl Quantity {
    /// Creates a new quantity.
    #[must_use]
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit }
    }

    /// The dimensionless quantity `1`.
    #[must_use]
    pub fn dimensionless() -> Self {
        Self::new(1.0, Unit::Dimensionless)
    }

    /// Parses strings like `"nm"`, `"8 nm"`, `"8nm"` or `"0.5 micrometer"`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::dimensionless());
        }
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let magnitude = if number.is_empty() {
            1.0
        } else {
            number
                .parse::<f64>()
                .map_err(|_| Error::Units(format!("invalid magnitude in \"{s}\"")))?
        };
        Ok(Self::new(magnitude, Unit::parse(unit)?))
    }

    /// Returns true if this quantity carries no physical dimension.
    #[must_use]
    pub fn is_dimensionless(&self) -> bool {
        self.unit == Unit::Dimensionless
    }

    /// Returns true if both quantities share a dimension.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.unit.is_compatible_with(&other.unit)
    }

    /// Converts this quantity into the given unit.
    pub fn to(&self, unit: Unit) -> Result<Self> {
        match (self.unit, unit) {
            (Unit::Dimensionless, Unit::Dimensionless) => Ok(*self),
            (Unit::Length(from), Unit::Length(to)) => {
                Ok(Self::new(scale_pow10(self.magnitude, from - to), unit))
            }
            _ => Err(Error::Units(format!(
                "cannot convert from {} to {}",
                self.unit, unit
            ))),
        }
    }

    /// Factor by which a coordinate expressed in `self` must be multiplied
    /// to be expressed in `target`.
    pub fn factor_to(&self, target: &Self) -> Result<f64> {
        let converted = self.to(target.unit)?;
        Ok(converted.magnitude / target.magnitude)
    }

    /// Rescales to the SI prefix that keeps the magnitude within `[1, 1000)`.
    #[must_use]
    pub fn to_compact(&self) -> Self {
        let Unit::Length(mut exp) = self.unit else {
            return *self;
        };
        let mut magnitude = self.magnitude;
        if magnitude == 0.0 || !magnitude.is_finite() {
            return *self;
        }
        let aligned = exp.div_euclid(3) * 3;
        magnitude = scale_pow10(magnitude, exp - aligned);
        exp = aligned;
        while magnitude.abs() >= 1000.0 && exp < COMPACT_RANGE.1 {
            magnitude /= 1000.0;
            exp += 3;
        }
        while magnitude.abs() < 1.0 && exp > COMPACT_RANGE.0 {
            magnitude *= 1000.0;
            exp -= 3;
        }
        Self::new(magnitude, Unit::Length(exp))
    }
}

/// Multiplies by `10^exp` using exact integer powers.
fn scale_pow10(value: f64, exp: i32) -> f64 {
    let factor = 10f64.powi(exp.abs());
    if exp >= 0 {
        value * factor
    } else {
        value / factor
    }
}

fn format_magnitude(m: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    if m.fract() == 0.0 && m.abs() < 1e15 {
        format!("{}", m as i64)
    } else {
        format!("{m}")
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_magnitude(self.magnitude), self.unit)
    }
}

impl Mul<f64> for Quantity {
    type Output = Quantity;

    fn mul(self, rhs: f64) -> Quantity {
        Quantity::new(self.magnitude * rhs, self.unit)
    }
}

impl Div<f64> for Quantity {
    type Output = Quantity;

    fn div(self, rhs: f64) -> Quantity {
        Quantity::new(self.magnitude / rhs, self.unit)
    }
}

/// Canonicalizes a user supplied unit string, `None` meaning dimensionless.
pub fn canonical_unit_string(units: Option<&str>) -> Result<Option<String>> {
    match units {
        None => Ok(None),
        Some(s) => {
            let q = Quantity::parse(s)?;
            if q.is_dimensionless() {
                Ok(None)
            } else {
                Ok(Some(q.to_string()))
            }
        }
    }
}

/// Several magnitudes sharing one unit, e.g. aggregated over a neuron list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityArray {
    pub magnitudes: Vec<f64>,
    pub unit: Unit,
}

impl QuantityArray {
    /// Converts all quantities into the unit of the first one.
    ///
    /// Returns `None` if any of them is incompatible with the first.
    #[must_use]
    pub fn from_compatible(values: &[Quantity]) -> Option<Self> {
        let first = values.first()?;
        let magnitudes = values
            .iter()
            .map(|q| q.to(first.unit).ok().map(|c| c.magnitude))
            .collect::<Option<Vec<f64>>>()?;
        Some(Self {
            magnitudes,
            unit: first.unit,
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }
}
