// src/core/value.rs

//! The process-data value model: canonical data types, tagged values and
//! quality words exchanged with the data source.

use crate::core::GatewayError;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};

/// The canonical data type of a point, mirroring the variant tags a
/// process-data server reports on registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DataType {
    /// No declared type. The data source picks the canonical one.
    Empty,
    Bool,
    I1,
    I2,
    I4,
    I8,
    UI1,
    UI2,
    UI4,
    UI8,
    R4,
    R8,
    String,
}

/// A tagged process value.
///
/// Ordering is total and type-aware: values of the same type compare by
/// their payload, values of different types never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Empty,
    Bool(bool),
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    UI1(u8),
    UI2(u16),
    UI4(u32),
    UI8(u64),
    R4(OrderedFloat<f32>),
    R8(OrderedFloat<f64>),
    String(String),
}

impl Value {
    /// Returns the data type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Empty => DataType::Empty,
            Value::Bool(_) => DataType::Bool,
            Value::I1(_) => DataType::I1,
            Value::I2(_) => DataType::I2,
            Value::I4(_) => DataType::I4,
            Value::I8(_) => DataType::I8,
            Value::UI1(_) => DataType::UI1,
            Value::UI2(_) => DataType::UI2,
            Value::UI4(_) => DataType::UI4,
            Value::UI8(_) => DataType::UI8,
            Value::R4(_) => DataType::R4,
            Value::R8(_) => DataType::R8,
            Value::String(_) => DataType::String,
        }
    }

    /// The zero value of a data type, used by data sources for freshly
    /// registered points.
    pub fn default_for(data_type: DataType) -> Self {
        match data_type {
            DataType::Empty => Value::Empty,
            DataType::Bool => Value::Bool(false),
            DataType::I1 => Value::I1(0),
            DataType::I2 => Value::I2(0),
            DataType::I4 => Value::I4(0),
            DataType::I8 => Value::I8(0),
            DataType::UI1 => Value::UI1(0),
            DataType::UI2 => Value::UI2(0),
            DataType::UI4 => Value::UI4(0),
            DataType::UI8 => Value::UI8(0),
            DataType::R4 => Value::R4(OrderedFloat(0.0)),
            DataType::R8 => Value::R8(OrderedFloat(0.0)),
            DataType::String => Value::String(String::new()),
        }
    }

    /// Decodes a textual wire literal into the representation of `data_type`.
    ///
    /// Booleans accept `true`/`false`/`1`/`0` in any case. `Empty` only accepts
    /// an empty literal.
    pub fn decode(literal: &str, data_type: DataType) -> Result<Self, GatewayError> {
        let literal = literal.trim();
        let fail = || GatewayError::Decode {
            literal: literal.to_string(),
            data_type,
        };
        let value = match data_type {
            DataType::Empty if literal.is_empty() => Value::Empty,
            DataType::Empty => return Err(fail()),
            DataType::Bool => match literal.to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(fail()),
            },
            DataType::I1 => Value::I1(literal.parse().map_err(|_| fail())?),
            DataType::I2 => Value::I2(literal.parse().map_err(|_| fail())?),
            DataType::I4 => Value::I4(literal.parse().map_err(|_| fail())?),
            DataType::I8 => Value::I8(literal.parse().map_err(|_| fail())?),
            DataType::UI1 => Value::UI1(literal.parse().map_err(|_| fail())?),
            DataType::UI2 => Value::UI2(literal.parse().map_err(|_| fail())?),
            DataType::UI4 => Value::UI4(literal.parse().map_err(|_| fail())?),
            DataType::UI8 => Value::UI8(literal.parse().map_err(|_| fail())?),
            DataType::R4 => Value::R4(OrderedFloat(literal.parse().map_err(|_| fail())?)),
            DataType::R8 => Value::R8(OrderedFloat(literal.parse().map_err(|_| fail())?)),
            DataType::String => Value::String(literal.to_string()),
        };
        Ok(value)
    }

    /// Converts this value into `target`, going through its textual form.
    /// Used by data sources to coerce written values to a point's canonical type.
    pub fn coerce(&self, target: DataType) -> Result<Self, GatewayError> {
        if self.data_type() == target || target == DataType::Empty {
            return Ok(self.clone());
        }
        Value::decode(&self.to_string(), target)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I1(v) => write!(f, "{v}"),
            Value::I2(v) => write!(f, "{v}"),
            Value::I4(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::UI1(v) => write!(f, "{v}"),
            Value::UI2(v) => write!(f, "{v}"),
            Value::UI4(v) => write!(f, "{v}"),
            Value::UI8(v) => write!(f, "{v}"),
            Value::R4(v) => write!(f, "{}", v.0),
            Value::R8(v) => write!(f, "{}", v.0),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// Mask selecting the major quality bits of a raw quality word.
pub const QUALITY_MASK: u16 = 0xC0;

/// The quality flag accompanying a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quality(u16);

impl Quality {
    pub const BAD: Quality = Quality(0x00);
    pub const UNCERTAIN: Quality = Quality(0x40);
    pub const GOOD: Quality = Quality(0xC0);

    /// Wraps a raw quality word as reported by the data source.
    pub fn from_raw(raw: u16) -> Self {
        Quality(raw)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    /// Keeps only the major quality bits, discarding substatus and limit bits.
    pub fn masked(self) -> Self {
        Quality(self.0 & QUALITY_MASK)
    }

    pub fn is_good(self) -> bool {
        self.masked() == Quality::GOOD
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.masked() {
            Quality::GOOD => f.write_str("GOOD"),
            Quality::UNCERTAIN => f.write_str("UNCERTAIN"),
            Quality::BAD => f.write_str("BAD"),
            _ => write!(f, "0x{:04X}", self.0),
        }
    }
}
