use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::backend::MapHandleRef;
use crate::error::Result;
use crate::observable::{Linkable, MapChange, MapChangeKind, ObservableMap};
use crate::signal::{Signal, SlotId};

use super::DISPOSED;

type Parent<T> = Rc<dyn ObservableMap<T>>;

/// Plain observable map.
pub struct LocalMap<T: Clone + 'static> {
    this: Weak<Self>,
    entries: RefCell<HashMap<String, T>>,
    parent: RefCell<Option<(Parent<T>, SlotId)>>,
    changed: Signal<MapChange<T>>,
    disposed: Cell<bool>,
}

impl<T: Clone + 'static> LocalMap<T> {
    pub fn new() -> Rc<Self> {
        Self::from_entries(std::iter::empty())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, T)>) -> Rc<Self> {
        let entries = entries.into_iter().collect();
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            entries: RefCell::new(entries),
            parent: RefCell::new(None),
            changed: Signal::new(),
            disposed: Cell::new(false),
        })
    }

    fn assert_live(&self) {
        assert!(!self.disposed.get(), "{}", DISPOSED);
    }

    fn parent(&self) -> Option<Parent<T>> {
        self.assert_live();
        self.parent.borrow().as_ref().map(|(p, _)| p.clone())
    }

    fn emit(&self, kind: MapChangeKind, key: &str, old_value: Option<T>, new_value: Option<T>) {
        self.changed.emit(&MapChange {
            kind,
            key: key.to_string(),
            old_value,
            new_value,
        });
    }

    /// Disconnect from the parent; returns it.
    fn detach(&self) -> Option<Parent<T>> {
        let (parent, slot) = self.parent.borrow_mut().take()?;
        if !parent.is_disposed() {
            parent.changed().disconnect(slot);
        }
        Some(parent)
    }
}

impl<T: Clone + 'static> ObservableMap<T> for LocalMap<T> {
    fn changed(&self) -> &Signal<MapChange<T>> {
        self.assert_live();
        &self.changed
    }

    fn set(&self, key: &str, value: T) -> Result<Option<T>> {
        if let Some(parent) = self.parent() {
            return parent.set(key, value);
        }
        let previous = self
            .entries
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        let kind = if previous.is_some() {
            MapChangeKind::Change
        } else {
            MapChangeKind::Add
        };
        self.emit(kind, key, previous.clone(), Some(value));
        Ok(previous)
    }

    fn get(&self, key: &str) -> Option<T> {
        match self.parent() {
            Some(parent) => parent.get(key),
            None => self.entries.borrow().get(key).cloned(),
        }
    }

    fn has(&self, key: &str) -> bool {
        match self.parent() {
            Some(parent) => parent.has(key),
            None => self.entries.borrow().contains_key(key),
        }
    }

    fn keys(&self) -> Vec<String> {
        if let Some(parent) = self.parent() {
            return parent.keys();
        }
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn values(&self) -> Vec<T> {
        if let Some(parent) = self.parent() {
            return parent.values();
        }
        let entries = self.entries.borrow();
        self.keys()
            .iter()
            .filter_map(|k| entries.get(k).cloned())
            .collect()
    }

    fn len(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.len(),
            None => self.entries.borrow().len(),
        }
    }

    fn delete(&self, key: &str) -> Result<Option<T>> {
        if let Some(parent) = self.parent() {
            return parent.delete(key);
        }
        let removed = self.entries.borrow_mut().remove(key);
        if let Some(old) = &removed {
            self.emit(MapChangeKind::Remove, key, Some(old.clone()), None);
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        for key in self.keys() {
            self.delete(&key)?;
        }
        Ok(())
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.detach();
        self.changed.clear();
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        drop(entries);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// The parent's handle while linked to a synchronized map.
    fn backend(&self) -> Option<MapHandleRef> {
        if self.disposed.get() {
            return None;
        }
        self.parent
            .borrow()
            .as_ref()
            .and_then(|(parent, _)| parent.backend())
    }

    fn as_linkable(&self) -> Option<&dyn Linkable<dyn ObservableMap<T>>> {
        Some(self)
    }
}

impl<T: Clone + 'static> Linkable<dyn ObservableMap<T>> for LocalMap<T> {
    fn link(&self, parent: Rc<dyn ObservableMap<T>>) {
        self.assert_live();
        self.detach();
        let weak = self.this.clone();
        let slot = parent.changed().connect(move |change: &MapChange<T>| {
            if let Some(me) = weak.upgrade() {
                me.changed.emit(change);
            }
        });
        self.entries.borrow_mut().clear();
        *self.parent.borrow_mut() = Some((parent, slot));
    }

    fn unlink(&self) {
        self.assert_live();
        let Some(parent) = self.detach() else {
            return;
        };
        if parent.is_disposed() {
            return;
        }
        let snapshot: HashMap<String, T> = parent
            .keys()
            .into_iter()
            .filter_map(|k| parent.get(&k).map(|v| (k, v)))
            .collect();
        *self.entries.borrow_mut() = snapshot;
    }

    fn is_linked(&self) -> bool {
        self.parent.borrow().is_some()
    }
}

impl<T: Clone + 'static> Drop for LocalMap<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Clone + 'static> fmt::Debug for LocalMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMap")
            .field("entries", &self.entries.borrow().len())
            .field("linked", &self.parent.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_standalone_operations() {
        let map = LocalMap::<Value>::new();
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let k = kinds.clone();
        map.changed()
            .connect(move |c: &MapChange<Value>| k.borrow_mut().push(c.kind));

        map.set("a", json!(1)).unwrap();
        map.set("a", json!(2)).unwrap();
        map.set("b", json!(3)).unwrap();
        assert_eq!(map.keys(), vec!["a", "b"]);
        assert_eq!(map.values(), vec![json!(2), json!(3)]);
        map.clear().unwrap();
        assert!(map.is_empty());
        assert_eq!(
            *kinds.borrow(),
            vec![
                MapChangeKind::Add,
                MapChangeKind::Change,
                MapChangeKind::Add,
                MapChangeKind::Remove,
                MapChangeKind::Remove
            ]
        );
    }

    #[test]
    fn test_link_proxies_and_reemits() {
        let parent = LocalMap::<Value>::new();
        parent.set("p", json!(true)).unwrap();
        let child = LocalMap::<Value>::from_entries([("c".to_string(), json!(0))]);

        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        child.changed().connect(move |_| h.set(h.get() + 1));

        child.link(parent.clone());
        assert!(child.is_linked());
        assert_eq!(child.keys(), vec!["p"]);

        child.set("x", json!(1)).unwrap();
        assert_eq!(parent.get("x"), Some(json!(1)));
        parent.set("y", json!(2)).unwrap();
        assert_eq!(child.get("y"), Some(json!(2)));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_unlink_keeps_a_copy() {
        let parent = LocalMap::<Value>::new();
        let child = LocalMap::<Value>::new();
        child.link(parent.clone());
        child.set("k", json!("v")).unwrap();

        child.unlink();
        assert!(!child.is_linked());
        parent.set("k", json!("changed")).unwrap();
        assert_eq!(child.get("k"), Some(json!("v")));
    }

    #[test]
    fn test_plain_map_has_no_backend() {
        let map = LocalMap::<Value>::new();
        assert!(map.is_linkable());
        assert!(map.backend().is_none());
    }

    #[test]
    #[should_panic(expected = "used after dispose")]
    fn test_use_after_dispose_panics() {
        let map = LocalMap::<Value>::new();
        map.dispose();
        map.dispose();
        let _ = map.len();
    }
}
