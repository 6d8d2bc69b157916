//! The value model shared by every container.
//!
//! A [`Synchronizable`] is what can live in a synchronized structure: plain
//! JSON or another observable container. Domain types reach the backend
//! only through [`Element`] (their own mapping) or a per-key
//! [`crate::converter::Converter`].

use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::{MapHandleRef, TextHandleRef, VectorHandleRef};
use crate::error::{Result, SyncError};
use crate::observable::{ObservableMap, ObservableString, ObservableVector};

pub type MapObject = Rc<dyn ObservableMap<Synchronizable>>;
pub type VectorObject = Rc<dyn ObservableVector<Synchronizable>>;
pub type StringObject = Rc<dyn ObservableString>;

/// A value that can be stored in a synchronized container.
#[derive(Clone)]
pub enum Synchronizable {
    Json(Value),
    Map(MapObject),
    Vector(VectorObject),
    Text(StringObject),
}

impl Synchronizable {
    pub fn type_name(&self) -> &'static str {
        match self {
            Synchronizable::Json(_) => "json",
            Synchronizable::Map(_) => "map",
            Synchronizable::Vector(_) => "vector",
            Synchronizable::Text(_) => "text",
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Synchronizable::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapObject> {
        match self {
            Synchronizable::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&VectorObject> {
        match self {
            Synchronizable::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&StringObject> {
        match self {
            Synchronizable::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, Synchronizable::Json(_))
    }

    /// Deep JSON snapshot. Maps become objects, vectors arrays, strings
    /// strings.
    pub fn to_json(&self) -> Value {
        match self {
            Synchronizable::Json(v) => v.clone(),
            Synchronizable::Map(m) => {
                let mut object = serde_json::Map::new();
                for key in m.keys() {
                    if let Some(value) = m.get(&key) {
                        object.insert(key, value.to_json());
                    }
                }
                Value::Object(object)
            }
            Synchronizable::Vector(v) => {
                Value::Array(v.values().iter().map(Synchronizable::to_json).collect())
            }
            Synchronizable::Text(s) => Value::String(s.text()),
        }
    }

    /// Backend handle of a synchronized map, if this is one.
    pub fn map_backend(&self) -> Option<MapHandleRef> {
        self.as_map().and_then(|m| m.backend())
    }

    pub fn vector_backend(&self) -> Option<VectorHandleRef> {
        self.as_vector().and_then(|v| v.backend())
    }

    pub fn text_backend(&self) -> Option<TextHandleRef> {
        self.as_text().and_then(|s| s.backend())
    }

    /// A container already bound to a backend object.
    pub fn is_synchronized(&self) -> bool {
        match self {
            Synchronizable::Json(_) => false,
            Synchronizable::Map(m) => m.backend().is_some(),
            Synchronizable::Vector(v) => v.backend().is_some(),
            Synchronizable::Text(s) => s.backend().is_some(),
        }
    }
}

impl fmt::Debug for Synchronizable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Synchronizable::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Synchronizable::Map(m) => write!(f, "Map(len={})", m.len()),
            Synchronizable::Vector(v) => write!(f, "Vector(len={})", v.len()),
            Synchronizable::Text(s) => write!(f, "Text({:?})", s.text()),
        }
    }
}

impl From<Value> for Synchronizable {
    fn from(v: Value) -> Self {
        Synchronizable::Json(v)
    }
}

impl From<MapObject> for Synchronizable {
    fn from(m: MapObject) -> Self {
        Synchronizable::Map(m)
    }
}

impl From<VectorObject> for Synchronizable {
    fn from(v: VectorObject) -> Self {
        Synchronizable::Vector(v)
    }
}

impl From<StringObject> for Synchronizable {
    fn from(s: StringObject) -> Self {
        Synchronizable::Text(s)
    }
}

// ───────────────────────────────────────────────────────────────────
// Element
// ───────────────────────────────────────────────────────────────────

/// How a mirror value type maps onto [`Synchronizable`].
///
/// Used for every key without a registered converter.
pub trait Element: Clone + 'static {
    fn to_entry(&self) -> Result<Synchronizable>;

    fn from_entry(entry: Synchronizable) -> Result<Self>;
}

impl Element for Synchronizable {
    fn to_entry(&self) -> Result<Synchronizable> {
        Ok(self.clone())
    }

    fn from_entry(entry: Synchronizable) -> Result<Self> {
        Ok(entry)
    }
}

/// Plain JSON only; nested containers are rejected.
impl Element for Value {
    fn to_entry(&self) -> Result<Synchronizable> {
        Ok(Synchronizable::Json(self.clone()))
    }

    fn from_entry(entry: Synchronizable) -> Result<Self> {
        match entry {
            Synchronizable::Json(v) => Ok(v),
            other => Err(SyncError::TypeMismatch {
                expected: "json",
                found: other.type_name(),
            }),
        }
    }
}

/// `Element::to_entry` for serde types stored as JSON.
pub fn to_json_entry<T: Serialize>(value: &T) -> Result<Synchronizable> {
    Ok(Synchronizable::Json(serde_json::to_value(value)?))
}

/// `Element::from_entry` for serde types stored as JSON.
pub fn from_json_entry<T: DeserializeOwned>(entry: Synchronizable) -> Result<T> {
    match entry {
        Synchronizable::Json(v) => Ok(serde_json::from_value(v)?),
        other => Err(SyncError::TypeMismatch {
            expected: "json",
            found: other.type_name(),
        }),
    }
}
