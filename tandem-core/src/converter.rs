//! Per-key type converters.
//!
//! A converter lets a map store a domain object as something the backend
//! understands and rebuild it on read:
//!
//! ```text
//! set(key, domain) ── to ──► Synchronizable ──► backend
//! backend ──► Synchronizable ── from ──► domain ──► mirror
//! ```
//!
//! Converters apply to top-level keys of the map they are registered on.
//! Nested maps never inherit them.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::value::Synchronizable;

pub trait Converter<T> {
    fn to(&self, value: &T) -> Result<Synchronizable>;

    fn from(&self, entry: Synchronizable) -> Result<T>;
}

/// A converter built from two closures.
pub struct FnConverter<T> {
    to: Box<dyn Fn(&T) -> Result<Synchronizable>>,
    from: Box<dyn Fn(Synchronizable) -> Result<T>>,
}

impl<T> FnConverter<T> {
    pub fn new(
        to: impl Fn(&T) -> Result<Synchronizable> + 'static,
        from: impl Fn(Synchronizable) -> Result<T> + 'static,
    ) -> Self {
        Self {
            to: Box::new(to),
            from: Box::new(from),
        }
    }
}

impl<T> Converter<T> for FnConverter<T> {
    fn to(&self, value: &T) -> Result<Synchronizable> {
        (self.to)(value)
    }

    fn from(&self, entry: Synchronizable) -> Result<T> {
        (self.from)(entry)
    }
}

/// Converter table keyed by map key.
pub struct Converters<T> {
    by_key: HashMap<String, Rc<dyn Converter<T>>>,
}

impl<T> Converters<T> {
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
        }
    }

    /// Builder form of [`Converters::insert`].
    pub fn with(mut self, key: impl Into<String>, converter: impl Converter<T> + 'static) -> Self {
        self.insert(key, converter);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, converter: impl Converter<T> + 'static) {
        self.by_key.insert(key.into(), Rc::new(converter));
    }

    pub fn get(&self, key: &str) -> Option<&Rc<dyn Converter<T>>> {
        self.by_key.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }
}

impl<T> Default for Converters<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Converters<T> {
    fn clone(&self) -> Self {
        Self {
            by_key: self.by_key.clone(),
        }
    }
}

impl<T> fmt::Debug for Converters<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Converters").field("keys", &keys).finish()
    }
}
