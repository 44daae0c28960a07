//! Typed configuration values
//!
//! [`ConfigurationValues`] always holds exactly one value per schema field,
//! stored by [`FieldId`] position, so lookups can never miss.

use std::fmt;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::{Map, Value};

use super::schema::{self, FieldId, FieldKind};
use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Str(_) => FieldKind::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            // `{:?}` keeps the decimal point on whole floats (1.0, not 1)
            FieldValue::Float(x) => write!(f, "{x:?}"),
            FieldValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// One validated value per schema field
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationValues {
    values: Vec<FieldValue>,
}

impl ConfigurationValues {
    pub(crate) fn from_fn(f: impl FnMut(FieldId) -> FieldValue) -> Self {
        Self {
            values: FieldId::ALL.into_iter().map(f).collect(),
        }
    }

    pub fn get(&self, id: FieldId) -> &FieldValue {
        &self.values[id.index()]
    }

    /// Replace one value after checking it against the schema
    pub fn set(&mut self, id: FieldId, value: FieldValue) -> Result<(), SchemaError> {
        schema::check(id.field(), &value)?;
        self.values[id.index()] = value;
        Ok(())
    }

    /// Coerce a raw value by field name and store it
    pub fn set_raw(&mut self, name: &str, raw: &Value) -> Result<FieldId, SchemaError> {
        let id = name.parse::<FieldId>()?;
        let value = schema::coerce_field(id.field(), raw)?;
        self.values[id.index()] = value;
        Ok(id)
    }

    /// Apply a partial raw update; nothing changes unless every entry is valid
    pub fn merge_raw(&self, raw: &Map<String, Value>) -> Result<Self, SchemaError> {
        let mut merged = self.clone();
        for (name, value) in raw {
            merged.set_raw(name, value)?;
        }
        Ok(merged)
    }

    /// Entries in schema order
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &FieldValue)> {
        FieldId::ALL.into_iter().zip(self.values.iter())
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(id, value)| (id.name().to_string(), value.to_json()))
                .collect(),
        )
    }
}

impl Default for ConfigurationValues {
    fn default() -> Self {
        schema::defaults()
    }
}

impl Serialize for ConfigurationValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (id, value) in self.iter() {
            map.serialize_entry(id.name(), value)?;
        }
        map.end()
    }
}
