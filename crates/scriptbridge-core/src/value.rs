//! Guest values and their JSON wire form.

use serde_json::{Map, Number, Value};

use crate::error::BridgeError;

/// A structured value handed over by guest code.
///
/// Mirrors the value shapes a dynamic guest language can produce. Only the
/// JSON-shaped subset has a wire form; `Opaque` stands for anything else
/// (functions, sets, handles) and is kept so the failure can be reported at
/// serialization time instead of at send time.
#[derive(Debug, Clone, PartialEq)]
pub enum GuestValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<GuestValue>),
    /// Keyed mapping in insertion order. Keys are not deduplicated here.
    Map(Vec<(String, GuestValue)>),
    /// A value with no wire form, carrying its guest type name.
    Opaque(String),
}

impl GuestValue {
    /// Guest-facing type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Opaque(name) => name,
        }
    }

    /// Convert into the wire form.
    ///
    /// # Errors
    /// Returns [`BridgeError::SerializationFailure`] for opaque values,
    /// non-finite floats and mappings with duplicate keys.
    pub fn to_wire(&self) -> Result<Value, BridgeError> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::Bool(b) => Ok(Value::Bool(*b)),
            Self::Int(i) => Ok(Value::Number((*i).into())),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
                BridgeError::SerializationFailure(format!(
                    "float value {f} has no JSON representation"
                ))
            }),
            Self::Str(s) => Ok(Value::String(s.clone())),
            Self::List(items) => items
                .iter()
                .map(Self::to_wire)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    if map.insert(key.clone(), value.to_wire()?).is_some() {
                        return Err(BridgeError::SerializationFailure(format!(
                            "duplicate key {key:?} in mapping"
                        )));
                    }
                }
                Ok(Value::Object(map))
            }
            Self::Opaque(name) => Err(BridgeError::SerializationFailure(format!(
                "object of type '{name}' is not JSON serializable"
            ))),
        }
    }

    /// Serialize into compact wire text.
    ///
    /// # Errors
    /// Same as [`GuestValue::to_wire`].
    pub fn to_wire_text(&self) -> Result<String, BridgeError> {
        let wire = self.to_wire()?;
        serde_json::to_string(&wire).map_err(|e| BridgeError::SerializationFailure(e.to_string()))
    }

    /// Build a guest value from its wire form.
    #[must_use]
    pub fn from_wire(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_wire).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_wire(v)))
                    .collect(),
            ),
        }
    }

    /// Truthiness in the usual dynamic-language sense.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
            Self::Opaque(_) => true,
        }
    }
}

impl From<&str> for GuestValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for GuestValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for GuestValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for GuestValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for GuestValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
