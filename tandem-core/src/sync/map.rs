use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::backend::{BackendValue, MapEvent, MapHandleRef};
use crate::converter::{Converter, Converters};
use crate::error::Result;
use crate::factory;
use crate::observable::{MapChange, MapChangeKind, ObservableMap};
use crate::signal::Signal;
use crate::value::Element;

use super::DISPOSED;

/// A remote map event, classified once.
enum RemoteChange<'a> {
    Add {
        key: &'a str,
        value: &'a BackendValue,
    },
    Change {
        key: &'a str,
        old: &'a BackendValue,
        new: &'a BackendValue,
    },
    Remove {
        key: &'a str,
        old: &'a BackendValue,
    },
}

impl<'a> RemoteChange<'a> {
    fn classify(event: &'a MapEvent) -> Option<Self> {
        let key = event.property.as_str();
        match (&event.old_value, &event.new_value) {
            (None, Some(value)) => Some(RemoteChange::Add { key, value }),
            (Some(old), Some(new)) => Some(RemoteChange::Change { key, old, new }),
            (Some(old), None) => Some(RemoteChange::Remove { key, old }),
            (None, None) => None,
        }
    }
}

/// Local mirror of a backend map.
///
/// Keys without a converter go through `T`'s [`Element`] mapping.
///
/// # Panics
///
/// Every operation except `dispose`/`is_disposed` panics once the map has
/// been disposed.
pub struct SyncMap<T: Element> {
    handle: RefCell<Option<MapHandleRef>>,
    mirror: RefCell<HashMap<String, T>>,
    converters: Converters<T>,
    changed: Signal<MapChange<T>>,
    disposed: Cell<bool>,
}

impl<T: Element> SyncMap<T> {
    pub fn new(handle: MapHandleRef) -> Result<Rc<Self>> {
        Self::with_converters(handle, Converters::new())
    }

    /// Populate the mirror from `handle`, then start listening to it.
    ///
    /// Entries that cannot be represented as `T` are left out of the mirror
    /// (and logged), exactly as a remote event carrying them would be.
    pub fn with_converters(handle: MapHandleRef, converters: Converters<T>) -> Result<Rc<Self>> {
        let mut mirror = HashMap::new();
        for key in handle.keys() {
            let raw = handle.get(&key)?;
            match factory::wrap_entry(&key, raw, converters.get(&key)) {
                Ok(Some(value)) => {
                    mirror.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => log::warn!("skipping '{}' while populating: {}", key, e),
            }
        }
        log::debug!("SyncMap populated with {} keys", mirror.len());

        let map = Rc::new(Self {
            handle: RefCell::new(Some(handle.clone())),
            mirror: RefCell::new(mirror),
            converters,
            changed: Signal::new(),
            disposed: Cell::new(false),
        });

        let weak = Rc::downgrade(&map);
        handle.add_listener(Rc::new(move |event: &MapEvent| {
            if let Some(map) = weak.upgrade() {
                map.on_backend_change(event);
            }
        }));
        Ok(map)
    }

    pub fn converters(&self) -> &Converters<T> {
        &self.converters
    }

    fn live_handle(&self) -> MapHandleRef {
        match self.handle.borrow().as_ref() {
            Some(handle) if !self.disposed.get() => handle.clone(),
            _ => panic!("{}", DISPOSED),
        }
    }

    fn assert_live(&self) {
        assert!(!self.disposed.get(), "{}", DISPOSED);
    }

    fn converter(&self, key: &str) -> Option<&Rc<dyn Converter<T>>> {
        self.converters.get(key)
    }

    // ── Remote path ────────────────────────────────────────────────

    fn on_backend_change(&self, event: &MapEvent) {
        if self.disposed.get() {
            return;
        }
        if event.is_local {
            log::trace!("echo of local write to '{}' ignored", event.property);
            return;
        }
        let Some(change) = RemoteChange::classify(event) else {
            return;
        };
        match self.apply_remote(change) {
            Ok(signal) => self.changed.emit(&signal),
            Err(e) => log::error!("dropping remote change to '{}': {}", event.property, e),
        }
    }

    fn wrap(&self, key: &str, raw: &BackendValue) -> Result<Option<T>> {
        factory::wrap_entry(key, Some(raw.clone()), self.converter(key))
    }

    fn apply_remote(&self, change: RemoteChange<'_>) -> Result<MapChange<T>> {
        match change {
            RemoteChange::Add { key, value } => {
                let new_value = self.wrap(key, value)?;
                if let Some(v) = &new_value {
                    self.mirror.borrow_mut().insert(key.to_string(), v.clone());
                }
                log::debug!("remote add '{}'", key);
                Ok(MapChange {
                    kind: MapChangeKind::Add,
                    key: key.to_string(),
                    old_value: None,
                    new_value,
                })
            }
            RemoteChange::Change { key, old, new } => {
                let new_value = self.wrap(key, new)?;
                let previous = match &new_value {
                    Some(v) => self.mirror.borrow_mut().insert(key.to_string(), v.clone()),
                    None => None,
                };
                log::debug!("remote change '{}'", key);
                Ok(MapChange {
                    kind: MapChangeKind::Change,
                    key: key.to_string(),
                    old_value: self.old_value(key, old, previous),
                    new_value,
                })
            }
            RemoteChange::Remove { key, old } => {
                let previous = self.mirror.borrow_mut().remove(key);
                log::debug!("remote remove '{}'", key);
                Ok(MapChange {
                    kind: MapChangeKind::Remove,
                    key: key.to_string(),
                    old_value: self.old_value(key, old, previous),
                    new_value: None,
                })
            }
        }
    }

    /// Old value as carried by the event, or the mirror's if the payload
    /// cannot be wrapped any more.
    fn old_value(&self, key: &str, raw: &BackendValue, previous: Option<T>) -> Option<T> {
        match self.wrap(key, raw) {
            Ok(Some(v)) => Some(v),
            Ok(None) => previous,
            Err(e) => {
                log::debug!("old value of '{}' taken from mirror: {}", key, e);
                previous
            }
        }
    }
}

impl<T: Element> ObservableMap<T> for SyncMap<T> {
    fn changed(&self) -> &Signal<MapChange<T>> {
        self.assert_live();
        &self.changed
    }

    fn set(&self, key: &str, value: T) -> Result<Option<T>> {
        let handle = self.live_handle();
        let entry = match self.converter(key) {
            Some(converter) => converter.to(&value)?,
            None => value.to_entry()?,
        };
        let kept = match factory::store_in_map(handle.as_ref(), key, &entry)? {
            Some(stored) => factory::adopt_stored(value, &entry, stored, |synced| {
                match self.converter(key) {
                    Some(converter) => converter.from(synced),
                    None => T::from_entry(synced),
                }
            })?,
            None => value,
        };
        let previous = self
            .mirror
            .borrow_mut()
            .insert(key.to_string(), kept.clone());
        log::debug!("set '{}' ({})", key, entry.type_name());

        let kind = if previous.is_some() {
            MapChangeKind::Change
        } else {
            MapChangeKind::Add
        };
        self.changed.emit(&MapChange {
            kind,
            key: key.to_string(),
            old_value: previous.clone(),
            new_value: Some(kept),
        });
        Ok(previous)
    }

    fn get(&self, key: &str) -> Option<T> {
        self.assert_live();
        self.mirror.borrow().get(key).cloned()
    }

    fn has(&self, key: &str) -> bool {
        self.assert_live();
        self.mirror.borrow().contains_key(key)
    }

    /// Sorted.
    fn keys(&self) -> Vec<String> {
        self.assert_live();
        let mut keys: Vec<String> = self.mirror.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// In [`ObservableMap::keys`] order.
    fn values(&self) -> Vec<T> {
        let keys = self.keys();
        let mirror = self.mirror.borrow();
        keys.iter().filter_map(|k| mirror.get(k).cloned()).collect()
    }

    fn len(&self) -> usize {
        self.assert_live();
        self.mirror.borrow().len()
    }

    fn delete(&self, key: &str) -> Result<Option<T>> {
        let handle = self.live_handle();
        let removed = self.mirror.borrow_mut().remove(key);
        if handle.has(key) {
            if let Err(e) = handle.delete(key) {
                if let Some(v) = removed {
                    self.mirror.borrow_mut().insert(key.to_string(), v);
                }
                return Err(e);
            }
        }
        let Some(old) = removed else {
            return Ok(None);
        };
        log::debug!("delete '{}'", key);
        self.changed.emit(&MapChange {
            kind: MapChangeKind::Remove,
            key: key.to_string(),
            old_value: Some(old.clone()),
            new_value: None,
        });
        Ok(Some(old))
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
        let handle = self.handle.borrow_mut().take();
        if let Some(handle) = handle {
            handle.remove_all_listeners();
        }
        self.changed.clear();
        let mirror = std::mem::take(&mut *self.mirror.borrow_mut());
        log::debug!("SyncMap disposed ({} keys released)", mirror.len());
        drop(mirror);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn backend(&self) -> Option<MapHandleRef> {
        self.handle.borrow().clone()
    }
}

impl<T: Element> Drop for SyncMap<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Element> fmt::Debug for SyncMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncMap")
            .field("len", &self.mirror.borrow().len())
            .field("converters", &self.converters)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DocumentHandle, MapHandle, Prelim};
    use crate::converter::FnConverter;
    use crate::error::SyncError;
    use crate::local::LocalMap;
    use crate::memory::MemoryDocument;
    use crate::value::Synchronizable;
    use serde_json::{json, Value};

    fn record(map: &SyncMap<Value>) -> Rc<RefCell<Vec<(MapChangeKind, String)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        map.changed()
            .connect(move |c: &MapChange<Value>| l.borrow_mut().push((c.kind, c.key.clone())));
        log
    }

    fn backend_json(handle: &MapHandleRef, key: &str) -> Option<Value> {
        handle
            .get(key)
            .unwrap()
            .and_then(|v| v.as_json().cloned())
    }

    // ── Local writes ───────────────────────────────────────────────

    #[test]
    fn test_set_get_delete_signals() {
        let doc = MemoryDocument::new();
        let map = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let log = record(&map);

        assert_eq!(map.set("x", json!("hello")).unwrap(), None);
        assert_eq!(map.delete("x").unwrap(), Some(json!("hello")));
        assert_eq!(map.get("x"), None);
        assert_eq!(
            *log.borrow(),
            vec![
                (MapChangeKind::Add, "x".to_string()),
                (MapChangeKind::Remove, "x".to_string())
            ]
        );
    }

    #[test]
    fn test_local_set_emits_once() {
        let doc = MemoryDocument::new();
        let map = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let log = record(&map);

        map.set("a", json!(1)).unwrap();
        map.set("a", json!(2)).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                (MapChangeKind::Add, "a".to_string()),
                (MapChangeKind::Change, "a".to_string())
            ]
        );
    }

    #[test]
    fn test_mirror_matches_backend() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        let map = SyncMap::<Value>::new(root.clone()).unwrap();

        map.set("a", json!(1)).unwrap();
        map.set("b", json!({"n": [1, 2]})).unwrap();
        map.set("c", json!(null)).unwrap();
        map.delete("a").unwrap();

        let mut backend_keys = root.keys();
        backend_keys.sort();
        assert_eq!(map.keys(), backend_keys);
        for key in map.keys() {
            assert_eq!(map.get(&key), backend_json(&root, &key));
        }
    }

    #[test]
    fn test_delete_absent_key_is_silent() {
        let doc = MemoryDocument::new();
        let map = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let log = record(&map);

        assert_eq!(map.delete("missing").unwrap(), None);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_clear_emits_per_key() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        let map = SyncMap::<Value>::new(root.clone()).unwrap();
        map.set("a", json!(1)).unwrap();
        map.set("b", json!(2)).unwrap();
        let log = record(&map);

        map.clear().unwrap();
        assert_eq!(log.borrow().len(), 2);
        assert!(log.borrow().iter().all(|(k, _)| *k == MapChangeKind::Remove));
        assert_eq!(root.size(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_populates_from_existing_backend() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        root.set("a", Prelim::Json(json!(1))).unwrap();
        root.set("b", Prelim::Json(json!("two"))).unwrap();

        let map = SyncMap::<Value>::new(root).unwrap();
        assert_eq!(map.keys(), vec!["a", "b"]);
        assert_eq!(map.values(), vec![json!(1), json!("two")]);
    }

    #[test]
    fn test_populate_skips_unrepresentable_entries() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        root.set("plain", Prelim::Json(json!(1))).unwrap();
        root.set("nested", Prelim::empty_map()).unwrap();

        // Value has no nested containers; same outcome as the remote path.
        let map = SyncMap::<Value>::new(root.clone()).unwrap();
        assert_eq!(map.keys(), vec!["plain"]);
        assert!(root.has("nested"));

        // The skipped key is still writable.
        map.set("nested", json!("flat")).unwrap();
        assert_eq!(backend_json(&root, "nested"), Some(json!("flat")));
    }

    // ── Remote events ──────────────────────────────────────────────

    #[test]
    fn test_remote_events_in_order() {
        let doc = MemoryDocument::new();
        let local = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let remote = doc.open_session().root();
        let log = record(&local);

        remote.set("k1", Prelim::Json(json!(1))).unwrap();
        remote.set("k1", Prelim::Json(json!(2))).unwrap();
        remote.delete("k1").unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (MapChangeKind::Add, "k1".to_string()),
                (MapChangeKind::Change, "k1".to_string()),
                (MapChangeKind::Remove, "k1".to_string())
            ]
        );
        assert!(!local.has("k1"));
    }

    #[test]
    fn test_remote_change_carries_payload_values() {
        let doc = MemoryDocument::new();
        let local = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let remote = doc.open_session().root();
        local.set("k", json!("old")).unwrap();

        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        local.changed().connect(move |c: &MapChange<Value>| {
            *s.borrow_mut() = Some((c.old_value.clone(), c.new_value.clone()));
        });

        remote.set("k", Prelim::Json(json!("new"))).unwrap();
        assert_eq!(
            *seen.borrow(),
            Some((Some(json!("old")), Some(json!("new"))))
        );
        assert_eq!(local.get("k"), Some(json!("new")));
    }

    #[test]
    fn test_remote_nested_map_is_wrapped() {
        let doc = MemoryDocument::new();
        let local = SyncMap::<Synchronizable>::new(doc.open_session().root()).unwrap();
        let remote = doc.open_session().root();

        let BackendValue::Map(nested) = remote.set("child", Prelim::empty_map()).unwrap() else {
            panic!("expected map");
        };
        let child = local.get("child").unwrap();
        let child = child.as_map().unwrap();
        assert!(child.backend().is_some());

        nested.set("leaf", Prelim::Json(json!(true))).unwrap();
        assert_eq!(child.get("leaf").unwrap().as_json(), Some(&json!(true)));
    }

    #[test]
    fn test_remote_failure_leaves_mirror_untouched() {
        let doc = MemoryDocument::new();
        // Value rejects nested containers.
        let local = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let remote = doc.open_session().root();
        let log = record(&local);

        remote.set("nested", Prelim::empty_map()).unwrap();
        assert!(!local.has("nested"));
        assert!(log.borrow().is_empty());
    }

    // ── Converters ─────────────────────────────────────────────────

    fn object_to_number() -> FnConverter<Value> {
        FnConverter::new(
            |v: &Value| {
                v.get("a")
                    .cloned()
                    .map(Synchronizable::Json)
                    .ok_or_else(|| SyncError::converter("k", "missing field a"))
            },
            |entry| match entry {
                Synchronizable::Json(n) => Ok(json!({ "a": n })),
                other => Err(SyncError::converter("k", other.type_name())),
            },
        )
    }

    #[test]
    fn test_converter_round_trip() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        let map = SyncMap::with_converters(
            root.clone(),
            Converters::new().with("k", object_to_number()),
        )
        .unwrap();

        map.set("k", json!({"a": 1})).unwrap();
        assert_eq!(map.get("k"), Some(json!({"a": 1})));
        assert_eq!(backend_json(&root, "k"), Some(json!(1)));

        // Other keys are untouched by the converter.
        map.set("other", json!({"a": 1})).unwrap();
        assert_eq!(backend_json(&root, "other"), Some(json!({"a": 1})));
    }

    #[test]
    fn test_converter_failure_propagates() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        let map = SyncMap::with_converters(
            root.clone(),
            Converters::new().with("k", object_to_number()),
        )
        .unwrap();
        let log = record(&map);

        let err = map.set("k", json!({"b": 1})).unwrap_err();
        assert!(matches!(err, SyncError::Converter { .. }));
        assert!(!map.has("k"));
        assert!(!root.has("k"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_converter_applies_to_remote_values() {
        let doc = MemoryDocument::new();
        let map = SyncMap::with_converters(
            doc.open_session().root(),
            Converters::new().with("k", object_to_number()),
        )
        .unwrap();
        doc.open_session()
            .root()
            .set("k", Prelim::Json(json!(5)))
            .unwrap();
        assert_eq!(map.get("k"), Some(json!({"a": 5})));
    }

    #[test]
    fn test_remote_json_only_needs_converter_from() {
        // `to` refuses what `from` builds; plain values must still arrive.
        let one_way = FnConverter::new(
            |_: &Value| Err(SyncError::converter("k", "write-only")),
            |entry| match entry {
                Synchronizable::Json(n) => Ok(json!({ "wrapped": n })),
                other => Err(SyncError::converter("k", other.type_name())),
            },
        );
        let doc = MemoryDocument::new();
        let remote = doc.open_session().root();
        remote.set("k", Prelim::Json(json!(1))).unwrap();

        let map = SyncMap::with_converters(
            doc.open_session().root(),
            Converters::new().with("k", one_way),
        )
        .unwrap();
        assert_eq!(map.get("k"), Some(json!({"wrapped": 1})));

        let log = record(&map);
        remote.set("k", Prelim::Json(json!(2))).unwrap();
        remote.delete("k").unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                (MapChangeKind::Change, "k".to_string()),
                (MapChangeKind::Remove, "k".to_string())
            ]
        );
        assert!(!map.has("k"));
    }

    // ── Nested containers ──────────────────────────────────────────

    #[test]
    fn test_set_plain_map_links_it() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        let map = SyncMap::<Synchronizable>::new(root.clone()).unwrap();

        let plain = LocalMap::<Synchronizable>::new();
        plain.set("x", json!(1).into()).unwrap();
        map.set("child", Synchronizable::Map(plain.clone())).unwrap();

        plain.set("y", json!(2).into()).unwrap();
        let BackendValue::Map(nested) = root.get("child").unwrap().unwrap() else {
            panic!("expected map");
        };
        let mut keys = nested.keys();
        keys.sort();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[test]
    fn test_set_own_nested_value_skips_write() {
        let doc = MemoryDocument::new();
        let root = doc.open_session().root();
        root.set("child", Prelim::empty_map()).unwrap();
        let map = SyncMap::<Synchronizable>::new(root.clone()).unwrap();

        let child = map.get("child").unwrap();
        let before = root.get("child").unwrap().unwrap();
        map.set("child", child).unwrap();
        let BackendValue::Map(after) = root.get("child").unwrap().unwrap() else {
            panic!("expected map");
        };
        let BackendValue::Map(before) = before else {
            panic!("expected map");
        };
        assert!(after.same_handle(before.as_ref()));
    }

    // ── Disposal ───────────────────────────────────────────────────

    #[test]
    fn test_dispose_twice() {
        let doc = MemoryDocument::new();
        let map = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        let remote = doc.open_session().root();
        map.set("a", json!(1)).unwrap();

        map.dispose();
        map.dispose();
        assert!(map.is_disposed());
        assert!(map.backend().is_none());
        // Remote traffic after disposal reaches nobody.
        remote.set("b", Prelim::Json(json!(2))).unwrap();
    }

    #[test]
    #[should_panic(expected = "used after dispose")]
    fn test_use_after_dispose_panics() {
        let doc = MemoryDocument::new();
        let map = SyncMap::<Value>::new(doc.open_session().root()).unwrap();
        map.dispose();
        let _ = map.get("a");
    }
}
