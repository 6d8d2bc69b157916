//! Entry wrapper factory.
//!
//! Turns raw backend values into local values and local values into
//! backend writes.
//!
//! ```text
//!  read path                               write path
//!  ─────────                               ──────────
//!  BackendValue                            Synchronizable
//!    Json   ──► Json                         Json      ──► Prelim::Json
//!    Map    ──► SyncMap    ─┐                container ──► Prelim snapshot
//!    Vector ──► SyncVector  ├─ converter       │           (recursive)
//!    Text   ──► SyncString ─┘  `from`, then    ▼
//!                              link `to`'s   stored handle ──► plain
//!                              container     containers link to it
//! ```
//!
//! Nested wrappers are built without converters: a converter table only
//! covers the top-level keys of the map it was registered on.

use std::rc::Rc;

use crate::backend::{BackendValue, MapHandle, Prelim, VectorHandle};
use crate::converter::Converter;
use crate::error::Result;
use crate::sync::{SyncMap, SyncString, SyncVector};
use crate::value::{Element, Synchronizable};

// ───────────────────────────────────────────────────────────────────
// Read path
// ───────────────────────────────────────────────────────────────────

/// Wrap a raw backend value. Nested handles become synchronized
/// containers over that handle.
pub fn wrap_value(raw: BackendValue) -> Result<Synchronizable> {
    Ok(match raw {
        BackendValue::Json(v) => Synchronizable::Json(v),
        BackendValue::Map(handle) => Synchronizable::Map(SyncMap::<Synchronizable>::new(handle)?),
        BackendValue::Vector(handle) => {
            Synchronizable::Vector(SyncVector::<Synchronizable>::new(handle)?)
        }
        BackendValue::Text(handle) => Synchronizable::Text(SyncString::new(handle)?),
    })
}

/// Build the local value for `key` from its raw backend value.
///
/// With a converter, `from` produces the domain value. For container
/// entries the container returned by the converter's `to` is then linked to
/// the synchronized one, so edits made through the domain object reach the
/// backend. JSON entries never go through `to` on this path.
pub fn wrap_entry<T: Element>(
    key: &str,
    raw: Option<BackendValue>,
    converter: Option<&Rc<dyn Converter<T>>>,
) -> Result<Option<T>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let entry = wrap_value(raw)?;
    let value = match converter {
        Some(converter) => {
            let domain = converter.from(entry.clone())?;
            if entry.is_container() {
                let own = converter.to(&domain)?;
                link_container(&own, &entry);
            }
            log::debug!("wrapped '{}' through its converter ({})", key, entry.type_name());
            domain
        }
        None => T::from_entry(entry)?,
    };
    Ok(Some(value))
}

/// Link a plain container to the synchronized container of the same kind,
/// nested plain containers first. Anything else is left alone.
pub fn link_container(local: &Synchronizable, synced: &Synchronizable) {
    match (local, synced) {
        (Synchronizable::Map(local), Synchronizable::Map(synced)) => {
            if let Some(linkable) = local.as_linkable() {
                for key in local.keys() {
                    if let (Some(l), Some(s)) = (local.get(&key), synced.get(&key)) {
                        link_container(&l, &s);
                    }
                }
                linkable.link(synced.clone());
            }
        }
        (Synchronizable::Vector(local), Synchronizable::Vector(synced)) => {
            if let Some(linkable) = local.as_linkable() {
                for (l, s) in local.values().iter().zip(synced.values().iter()) {
                    link_container(l, s);
                }
                linkable.link(synced.clone());
            }
        }
        (Synchronizable::Text(local), Synchronizable::Text(synced)) => {
            if let Some(linkable) = local.as_linkable() {
                linkable.link(synced.clone());
            }
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────────
// Write path
// ───────────────────────────────────────────────────────────────────

/// Snapshot an entry as a backend write description.
pub fn to_prelim(entry: &Synchronizable) -> Prelim {
    match entry {
        Synchronizable::Json(v) => Prelim::Json(v.clone()),
        Synchronizable::Map(map) => Prelim::Map(
            map.keys()
                .into_iter()
                .filter_map(|key| map.get(&key).map(|value| (key, to_prelim(&value))))
                .collect(),
        ),
        Synchronizable::Vector(vector) => {
            Prelim::Vector(vector.values().iter().map(to_prelim).collect())
        }
        Synchronizable::Text(text) => Prelim::Text(text.text()),
    }
}

/// Whether `entry` is a synchronized container over exactly `stored`.
pub fn is_bound_to(entry: &Synchronizable, stored: &BackendValue) -> bool {
    match (entry, stored) {
        (Synchronizable::Map(m), BackendValue::Map(h)) => {
            m.backend().is_some_and(|own| own.same_handle(h.as_ref()))
        }
        (Synchronizable::Vector(v), BackendValue::Vector(h)) => {
            v.backend().is_some_and(|own| own.same_handle(h.as_ref()))
        }
        (Synchronizable::Text(s), BackendValue::Text(h)) => {
            s.backend().is_some_and(|own| own.same_handle(h.as_ref()))
        }
        _ => false,
    }
}

/// Write `entry` under `key`.
///
/// Returns `None` when the key already holds the very object `entry` is
/// bound to; nothing is written then. Otherwise the stored value is
/// returned for [`adopt_stored`].
pub fn store_in_map(
    handle: &dyn MapHandle,
    key: &str,
    entry: &Synchronizable,
) -> Result<Option<BackendValue>> {
    if entry.is_synchronized() {
        if let Some(current) = handle.get(key)? {
            if is_bound_to(entry, &current) {
                log::trace!("'{}' already holds this {}; skipping write", key, entry.type_name());
                return Ok(None);
            }
        }
    }
    Ok(Some(handle.set(key, to_prelim(entry))?))
}

/// Replace the value at `index`. Same contract as [`store_in_map`].
pub fn store_in_vector(
    handle: &dyn VectorHandle,
    index: usize,
    entry: &Synchronizable,
) -> Result<Option<BackendValue>> {
    if entry.is_synchronized() {
        if let Some(current) = handle.get(index)? {
            if is_bound_to(entry, &current) {
                return Ok(None);
            }
        }
    }
    Ok(Some(handle.set(index, to_prelim(entry))?))
}

/// Decide what the mirror keeps after `entry` (built from `value`) was
/// written as `stored`.
///
/// - JSON: `value` itself.
/// - plain container: `value`, now linked to a synchronized container
///   over the stored object.
/// - container bound to some other backend object: its contents were
///   copied, so the mirror gets `rebuild` applied to a fresh wrapper over
///   the copy.
pub fn adopt_stored<T>(
    value: T,
    entry: &Synchronizable,
    stored: BackendValue,
    rebuild: impl FnOnce(Synchronizable) -> Result<T>,
) -> Result<T> {
    if !entry.is_container() || stored.handle_kind().is_none() {
        return Ok(value);
    }
    let synced = wrap_value(stored)?;
    if entry.is_synchronized() {
        return rebuild(synced);
    }
    link_container(entry, &synced);
    Ok(value)
}
