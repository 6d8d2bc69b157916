//! Contracts for the collaborative backend this crate adapts to.
//!
//! The backend owns merge semantics. This crate only sees three kinds of
//! shared object (keyed map, ordered vector, text buffer) through the
//! handle traits below, plus a document-level view of the live
//! collaborators.
//!
//! ```text
//!            ┌──────────────── DocumentHandle ────────────────┐
//!            │ root(): MapHandle      collaborators()          │
//!            │                        joined / left events     │
//!            └──────┬─────────────────────────────────────────┘
//!                   │ BackendValue (kind fixed by the binding)
//!        ┌──────────┼──────────────┬────────────────┐
//!        ▼          ▼              ▼                ▼
//!      Json    MapHandle      VectorHandle      TextHandle
//! ```
//!
//! Writes take a [`Prelim`] (a description of the value to store) and hand
//! back the stored [`BackendValue`], so a binding that can only create
//! nested objects in place (e.g. Yjs) fits the same contract as one that
//! creates them detached.
//!
//! Every handle delivers change events to its listeners, tagged with
//! `is_local` when the change was made through this replica.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ───────────────────────────────────────────────────────────────────
// Values
// ───────────────────────────────────────────────────────────────────

/// Discriminator for nested shared objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Map,
    Vector,
    Text,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Map => write!(f, "map"),
            HandleKind::Vector => write!(f, "vector"),
            HandleKind::Text => write!(f, "text"),
        }
    }
}

pub type MapHandleRef = Rc<dyn MapHandle>;
pub type VectorHandleRef = Rc<dyn VectorHandle>;
pub type TextHandleRef = Rc<dyn TextHandle>;

/// A raw value as read from a backend handle.
#[derive(Clone)]
pub enum BackendValue {
    Json(Value),
    Map(MapHandleRef),
    Vector(VectorHandleRef),
    Text(TextHandleRef),
}

impl BackendValue {
    /// `None` for plain JSON.
    pub fn handle_kind(&self) -> Option<HandleKind> {
        match self {
            BackendValue::Json(_) => None,
            BackendValue::Map(_) => Some(HandleKind::Map),
            BackendValue::Vector(_) => Some(HandleKind::Vector),
            BackendValue::Text(_) => Some(HandleKind::Text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            BackendValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BackendValue::Json(_) => "json",
            BackendValue::Map(_) => "map",
            BackendValue::Vector(_) => "vector",
            BackendValue::Text(_) => "text",
        }
    }
}

impl fmt::Debug for BackendValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            BackendValue::Map(h) => write!(f, "Map(size={})", h.size()),
            BackendValue::Vector(h) => write!(f, "Vector(len={})", h.len()),
            BackendValue::Text(h) => write!(f, "Text({:?})", h.text()),
        }
    }
}

impl From<Value> for BackendValue {
    fn from(v: Value) -> Self {
        BackendValue::Json(v)
    }
}

/// Description of a value to be written into a backend handle.
///
/// Nested variants create fresh shared objects seeded with the given
/// contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Prelim {
    Json(Value),
    Map(Vec<(String, Prelim)>),
    Vector(Vec<Prelim>),
    Text(String),
}

impl Prelim {
    pub fn empty_map() -> Self {
        Prelim::Map(Vec::new())
    }

    pub fn empty_vector() -> Self {
        Prelim::Vector(Vec::new())
    }

    pub fn kind(&self) -> Option<HandleKind> {
        match self {
            Prelim::Json(_) => None,
            Prelim::Map(_) => Some(HandleKind::Map),
            Prelim::Vector(_) => Some(HandleKind::Vector),
            Prelim::Text(_) => Some(HandleKind::Text),
        }
    }
}

impl From<Value> for Prelim {
    fn from(v: Value) -> Self {
        Prelim::Json(v)
    }
}

// ───────────────────────────────────────────────────────────────────
// Events
// ───────────────────────────────────────────────────────────────────

/// A key of a backend map changed.
#[derive(Debug, Clone)]
pub struct MapEvent {
    pub property: String,
    pub old_value: Option<BackendValue>,
    pub new_value: Option<BackendValue>,
    /// The change was made through this replica.
    pub is_local: bool,
}

/// A backend vector changed.
#[derive(Debug, Clone)]
pub enum VectorEvent {
    Inserted {
        index: usize,
        values: Vec<BackendValue>,
        is_local: bool,
    },
    Removed {
        index: usize,
        values: Vec<BackendValue>,
        is_local: bool,
    },
    Set {
        index: usize,
        old_value: BackendValue,
        new_value: BackendValue,
        is_local: bool,
    },
}

impl VectorEvent {
    pub fn is_local(&self) -> bool {
        match self {
            VectorEvent::Inserted { is_local, .. }
            | VectorEvent::Removed { is_local, .. }
            | VectorEvent::Set { is_local, .. } => *is_local,
        }
    }
}

/// A backend text buffer changed. Indices are in characters.
#[derive(Debug, Clone, PartialEq)]
pub enum TextEvent {
    Inserted {
        index: usize,
        text: String,
        is_local: bool,
    },
    Deleted {
        index: usize,
        text: String,
        is_local: bool,
    },
}

impl TextEvent {
    pub fn is_local(&self) -> bool {
        match self {
            TextEvent::Inserted { is_local, .. } | TextEvent::Deleted { is_local, .. } => *is_local,
        }
    }
}

pub type MapListener = Rc<dyn Fn(&MapEvent)>;
pub type VectorListener = Rc<dyn Fn(&VectorEvent)>;
pub type TextListener = Rc<dyn Fn(&TextEvent)>;

// ───────────────────────────────────────────────────────────────────
// Handles
// ───────────────────────────────────────────────────────────────────

/// A keyed shared object.
///
/// Listener registration is per handle value: `remove_all_listeners`
/// detaches only what was added through this handle, even when several
/// handles point at the same shared object.
pub trait MapHandle {
    fn get(&self, key: &str) -> Result<Option<BackendValue>>;

    /// Store `value` under `key` and return what was stored.
    fn set(&self, key: &str, value: Prelim) -> Result<BackendValue>;

    /// Remove `key`, returning the removed value.
    fn delete(&self, key: &str) -> Result<Option<BackendValue>>;

    fn has(&self, key: &str) -> bool;

    fn keys(&self) -> Vec<String>;

    fn values(&self) -> Result<Vec<BackendValue>> {
        let mut values = Vec::new();
        for key in self.keys() {
            if let Some(value) = self.get(&key)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn size(&self) -> usize;

    fn add_listener(&self, listener: MapListener);

    fn remove_all_listeners(&self);

    /// Whether both handles address the same shared object.
    fn same_handle(&self, other: &dyn MapHandle) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// An ordered shared sequence.
pub trait VectorHandle {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<Option<BackendValue>>;

    fn values(&self) -> Result<Vec<BackendValue>>;

    /// Insert `values` starting at `index`; returns the stored values.
    fn insert(&self, index: usize, values: Vec<Prelim>) -> Result<Vec<BackendValue>>;

    /// Remove `count` values starting at `index`; returns them.
    fn remove(&self, index: usize, count: usize) -> Result<Vec<BackendValue>>;

    /// Replace the value at `index`; returns the stored value.
    fn set(&self, index: usize, value: Prelim) -> Result<BackendValue>;

    fn add_listener(&self, listener: VectorListener);

    fn remove_all_listeners(&self);

    fn same_handle(&self, other: &dyn VectorHandle) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// A shared character buffer. All indices count characters.
pub trait TextHandle {
    fn text(&self) -> String;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, index: usize, text: &str) -> Result<()>;

    /// Delete `count` characters from `index`; returns the removed text.
    fn delete(&self, index: usize, count: usize) -> Result<String>;

    fn add_listener(&self, listener: TextListener);

    fn remove_all_listeners(&self);

    fn same_handle(&self, other: &dyn TextHandle) -> bool;

    fn as_any(&self) -> &dyn Any;
}

// ───────────────────────────────────────────────────────────────────
// Document & collaborators
// ───────────────────────────────────────────────────────────────────

/// A live participant as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorInfo {
    pub user_id: String,
    pub session_id: String,
    pub display_name: String,
    /// May be empty when the backend does not assign colors.
    pub color: String,
}

impl CollaboratorInfo {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        display_name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            display_name: display_name.into(),
            color: color.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorEvent {
    Joined(CollaboratorInfo),
    Left(CollaboratorInfo),
}

pub type CollaboratorListener = Rc<dyn Fn(&CollaboratorEvent)>;

/// Document-level view: the root map and the live session list.
pub trait DocumentHandle {
    fn root(&self) -> MapHandleRef;

    fn collaborators(&self) -> Vec<CollaboratorInfo>;

    fn add_collaborator_listener(&self, listener: CollaboratorListener);

    fn remove_collaborator_listeners(&self);
}

// ───────────────────────────────────────────────────────────────────
// Helpers for bindings
// ───────────────────────────────────────────────────────────────────

/// Byte offset of the `index`-th character, or `None` past the end.
pub fn char_to_byte(text: &str, index: usize) -> Option<usize> {
    if index == 0 {
        return Some(0);
    }
    match text.char_indices().nth(index) {
        Some((offset, _)) => Some(offset),
        None if text.chars().count() == index => Some(text.len()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handle_kind_display() {
        assert_eq!(HandleKind::Map.to_string(), "map");
        assert_eq!(HandleKind::Vector.to_string(), "vector");
        assert_eq!(HandleKind::Text.to_string(), "text");
    }

    #[test]
    fn test_prelim_kind() {
        assert_eq!(Prelim::Json(json!(1)).kind(), None);
        assert_eq!(Prelim::empty_map().kind(), Some(HandleKind::Map));
        assert_eq!(Prelim::empty_vector().kind(), Some(HandleKind::Vector));
        assert_eq!(Prelim::Text("x".into()).kind(), Some(HandleKind::Text));
    }

    #[test]
    fn test_backend_value_json() {
        let v = BackendValue::from(json!("hello"));
        assert_eq!(v.handle_kind(), None);
        assert_eq!(v.as_json(), Some(&json!("hello")));
        assert_eq!(v.type_name(), "json");
    }

    #[test]
    fn test_char_to_byte() {
        let s = "aé😀b";
        assert_eq!(char_to_byte(s, 0), Some(0));
        assert_eq!(char_to_byte(s, 1), Some(1));
        assert_eq!(char_to_byte(s, 2), Some(3));
        assert_eq!(char_to_byte(s, 3), Some(7));
        assert_eq!(char_to_byte(s, 4), Some(8));
        assert_eq!(char_to_byte(s, 5), None);
        assert_eq!(char_to_byte("", 0), Some(0));
    }
}
