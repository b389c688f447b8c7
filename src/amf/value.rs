//! AMF value types
//!
//! The decoded form of command arguments, replies and status objects.

use std::collections::HashMap;

/// AMF0 value representation
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// Null value (0x05)
    Null,

    /// Undefined value (0x06, also produced for 0x0D Unsupported)
    Undefined,

    /// Boolean value (0x01)
    Boolean(bool),

    /// IEEE 754 double-precision floating point (0x00)
    Number(f64),

    /// UTF-8 string (0x02 or 0x0C)
    String(String),

    /// Strict (dense) array (0x0A)
    Array(Vec<AmfValue>),

    /// Anonymous key-value object (0x03)
    Object(HashMap<String, AmfValue>),

    /// Typed object with class name (0x10) that no external handler claimed
    TypedObject {
        class_name: String,
        properties: HashMap<String, AmfValue>,
    },

    /// Date value as milliseconds since Unix epoch (0x0B)
    Date(f64),

    /// XML document (0x0F)
    Xml(String),

    /// ECMA (associative) array (0x08)
    EcmaArray(HashMap<String, AmfValue>),
}

impl AmfValue {
    /// Build an anonymous object from key/value pairs
    pub fn object<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<AmfValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        AmfValue::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Properties of any map-shaped value (object, ECMA array, typed object)
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Some(m),
            AmfValue::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Get a property from a map-shaped value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}
