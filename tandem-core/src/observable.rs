//! Shared container capabilities.
//!
//! Two families implement these traits:
//!
//! - plain in-memory containers ([`crate::local`]) which can additionally be
//!   [`Linkable`] to a parent container, and
//! - backend-synchronized containers ([`crate::sync`]) which are link
//!   targets only and expose their backend handle.
//!
//! Everything here is single-threaded (`Rc`, not `Arc`): containers and
//! backend callbacks run on one logical thread.

use std::rc::Rc;

use crate::backend::{MapHandleRef, TextHandleRef, VectorHandleRef};
use crate::error::Result;
use crate::signal::Signal;

// ───────────────────────────────────────────────────────────────────
// Change payloads
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapChangeKind {
    Add,
    Change,
    Remove,
}

/// Payload of a map's change signal.
#[derive(Debug, Clone)]
pub struct MapChange<T> {
    pub kind: MapChangeKind,
    pub key: String,
    pub old_value: Option<T>,
    pub new_value: Option<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorChangeKind {
    Add,
    Remove,
    Set,
    Move,
}

/// Payload of a vector's change signal.
///
/// `old_index` is where `old_values` used to start, `new_index` is where
/// `new_values` start now. For `Add` only the new side is meaningful, for
/// `Remove` only the old side.
#[derive(Debug, Clone)]
pub struct VectorChange<T> {
    pub kind: VectorChangeKind,
    pub old_index: usize,
    pub new_index: usize,
    pub old_values: Vec<T>,
    pub new_values: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringChangeKind {
    Insert,
    Remove,
    Set,
}

/// Payload of a string's change signal. `start..end` in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringChange {
    pub kind: StringChangeKind,
    pub start: usize,
    pub end: usize,
    pub value: String,
}

// ───────────────────────────────────────────────────────────────────
// Capabilities
// ───────────────────────────────────────────────────────────────────

/// Observable keyed container.
///
/// Every operation on a disposed container panics.
pub trait ObservableMap<T: 'static> {
    fn changed(&self) -> &Signal<MapChange<T>>;

    /// Store `value`, returning the previous value.
    fn set(&self, key: &str, value: T) -> Result<Option<T>>;

    fn get(&self, key: &str) -> Option<T>;

    fn has(&self, key: &str) -> bool;

    fn keys(&self) -> Vec<String>;

    fn values(&self) -> Vec<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `key`, returning the removed value.
    fn delete(&self, key: &str) -> Result<Option<T>>;

    /// Remove every key one at a time, one signal per key.
    fn clear(&self) -> Result<()>;

    /// Idempotent.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    /// The backend handle for synchronized containers.
    fn backend(&self) -> Option<MapHandleRef> {
        None
    }

    fn as_linkable(&self) -> Option<&dyn Linkable<dyn ObservableMap<T>>> {
        None
    }

    fn is_linkable(&self) -> bool {
        self.as_linkable().is_some()
    }
}

/// Observable ordered container.
pub trait ObservableVector<T: 'static> {
    fn changed(&self) -> &Signal<VectorChange<T>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<T>;

    fn values(&self) -> Vec<T>;

    /// Replace the value at `index`, returning the old one.
    fn set(&self, index: usize, value: T) -> Result<T>;

    /// Append `value`; returns the new length.
    fn push(&self, value: T) -> Result<usize>;

    fn insert(&self, index: usize, value: T) -> Result<()>;

    fn remove(&self, index: usize) -> Result<T>;

    /// Remove `start..end`.
    fn remove_range(&self, start: usize, end: usize) -> Result<Vec<T>>;

    fn move_item(&self, from: usize, to: usize) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    fn backend(&self) -> Option<VectorHandleRef> {
        None
    }

    fn as_linkable(&self) -> Option<&dyn Linkable<dyn ObservableVector<T>>> {
        None
    }

    fn is_linkable(&self) -> bool {
        self.as_linkable().is_some()
    }
}

/// Observable character buffer. Indices are characters, not bytes.
pub trait ObservableString {
    fn changed(&self) -> &Signal<StringChange>;

    fn text(&self) -> String;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_text(&self, text: &str) -> Result<()>;

    fn insert(&self, index: usize, text: &str) -> Result<()>;

    /// Remove `start..end`, returning the removed text.
    fn remove(&self, start: usize, end: usize) -> Result<String>;

    fn clear(&self) -> Result<()>;

    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    fn backend(&self) -> Option<TextHandleRef> {
        None
    }

    fn as_linkable(&self) -> Option<&dyn Linkable<dyn ObservableString>> {
        None
    }

    fn is_linkable(&self) -> bool {
        self.as_linkable().is_some()
    }
}

/// Mirroring capability of plain containers.
///
/// A linked container becomes a proxy for its parent: reads and writes go
/// to the parent and the parent's signals are re-emitted. Unlinking leaves
/// a detached copy of the parent's contents behind.
pub trait Linkable<P: ?Sized> {
    fn link(&self, parent: Rc<P>);

    fn unlink(&self);

    fn is_linked(&self) -> bool;
}
