//! yrs backend binding.
//!
//! Exposes a yrs [`Doc`] through the `tandem_core` backend contracts so the
//! synchronized containers run unchanged on top of a real CRDT.
//!
//! ```text
//!   SyncMap / SyncVector / SyncString
//!        │ write            ▲ events (is_local)
//!        ▼                  │
//!   YrsMap / YrsArray / YrsText ──► pending v1 updates ──► drain_local_updates()
//!        │                  ▲
//!        ▼                  │ before/after diff of observed objects
//!      yrs::Doc ◄──────── apply_remote_update(bytes)
//! ```
//!
//! ## Value mapping
//!
//! | tandem          | yrs                                   |
//! |-----------------|---------------------------------------|
//! | JSON value      | native `Any` (integers as doubles)    |
//! | map handle      | `MapRef` (nested `MapPrelim`)         |
//! | vector handle   | `ArrayRef` (nested `ArrayPrelim`)     |
//! | text handle     | `TextRef` (nested `TextPrelim`)       |
//!
//! ## Events
//!
//! Local writes are reported synchronously with `is_local = true`. A remote
//! update is applied in one transaction; every shared object that has a
//! listener is read before and after, and the difference is delivered with
//! `is_local = false`. Concurrent edits that yrs merged into one position
//! therefore surface as a single splice per object.
//!
//! Integral floats such as `1.0` are read back as integers, as JS clients
//! would see them.

mod convert;
mod diff;
mod handles;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tandem_core::backend::{
    BackendValue, CollaboratorEvent, CollaboratorInfo, CollaboratorListener, DocumentHandle,
    MapEvent, MapHandleRef, MapListener, TextEvent, TextListener, VectorEvent, VectorListener,
};
use tandem_core::SyncError;
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Array, ArrayRef, Doc, GetString, Map, MapRef, OffsetKind, Options, ReadTxn, StateVector,
    TextRef, Transact, Update,
};

use crate::config::YrsConfig;
use crate::error::{CollabError, Result};
use crate::protocol::SyncMessage;

use convert::Slot;
use diff::{map_changes, splice};

pub use handles::{YrsArray, YrsMap, YrsText};

// ───────────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct Registered<R, F> {
    owner: u64,
    target: R,
    callback: F,
}

pub(crate) struct Shared {
    doc: Doc,
    root: MapRef,
    next_id: Cell<u64>,
    maps: RefCell<Vec<Registered<MapRef, MapListener>>>,
    vectors: RefCell<Vec<Registered<ArrayRef, VectorListener>>>,
    texts: RefCell<Vec<Registered<TextRef, TextListener>>>,
    pending: RefCell<Vec<Vec<u8>>>,
    collaborators: RefCell<Vec<CollaboratorInfo>>,
    collaborator_listeners: RefCell<Vec<(u64, CollaboratorListener)>>,
}

impl Shared {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Expose a slot as a backend value. Every nested handle gets its own
    /// listener owner id.
    pub(crate) fn value(self: &Rc<Self>, slot: &Slot) -> tandem_core::Result<BackendValue> {
        Ok(match slot {
            Slot::Json(v) => BackendValue::Json(v.clone()),
            Slot::Map(map) => BackendValue::Map(Rc::new(YrsMap {
                shared: self.clone(),
                map: map.clone(),
                owner: self.next_id(),
            })),
            Slot::Vector(array) => BackendValue::Vector(Rc::new(YrsArray {
                shared: self.clone(),
                array: array.clone(),
                owner: self.next_id(),
            })),
            Slot::Text(text) => BackendValue::Text(Rc::new(YrsText {
                shared: self.clone(),
                text: text.clone(),
                owner: self.next_id(),
            })),
            Slot::Unsupported => {
                return Err(SyncError::Backend(
                    "unsupported yrs shared type".to_string(),
                ))
            }
        })
    }

    /// Like [`Shared::value`] but for event payloads, where there is no
    /// caller to fail: unsupported content is reported as `null`.
    pub(crate) fn lossy_value(self: &Rc<Self>, slot: &Slot) -> BackendValue {
        self.value(slot).unwrap_or_else(|e| {
            log::warn!("{}; reporting null", e);
            BackendValue::Json(Value::Null)
        })
    }

    pub(crate) fn record_update(&self, update: Vec<u8>) {
        log::trace!("local update of {} bytes queued", update.len());
        self.pending.borrow_mut().push(update);
    }

    pub(crate) fn notify_map(&self, target: &MapRef, event: &MapEvent) {
        let listeners: Vec<MapListener> = self
            .maps
            .borrow()
            .iter()
            .filter(|l| &l.target == target)
            .map(|l| l.callback.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub(crate) fn notify_vector(&self, target: &ArrayRef, event: &VectorEvent) {
        let listeners: Vec<VectorListener> = self
            .vectors
            .borrow()
            .iter()
            .filter(|l| &l.target == target)
            .map(|l| l.callback.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub(crate) fn notify_text(&self, target: &TextRef, event: &TextEvent) {
        let listeners: Vec<TextListener> = self
            .texts
            .borrow()
            .iter()
            .filter(|l| &l.target == target)
            .map(|l| l.callback.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn notify_collaborators(&self, event: CollaboratorEvent) {
        let listeners: Vec<CollaboratorListener> = self
            .collaborator_listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    // ── Remote diffing ─────────────────────────────────────────────

    fn observed(&self) -> Observed {
        fn distinct<R: Clone + PartialEq, F>(listeners: &[Registered<R, F>]) -> Vec<R> {
            let mut targets: Vec<R> = Vec::new();
            for l in listeners {
                if !targets.contains(&l.target) {
                    targets.push(l.target.clone());
                }
            }
            targets
        }
        Observed {
            maps: distinct(&self.maps.borrow()),
            vectors: distinct(&self.vectors.borrow()),
            texts: distinct(&self.texts.borrow()),
        }
    }

    fn snapshot(&self, observed: &Observed) -> Snapshot {
        let txn = self.doc.transact();
        Snapshot {
            maps: observed
                .maps
                .iter()
                .map(|m| {
                    m.iter(&txn)
                        .map(|(k, v)| (k.to_string(), Slot::from(v)))
                        .collect()
                })
                .collect(),
            vectors: observed
                .vectors
                .iter()
                .map(|a| a.iter(&txn).map(Slot::from).collect())
                .collect(),
            texts: observed
                .texts
                .iter()
                .map(|t| t.get_string(&txn).chars().collect())
                .collect(),
        }
    }

    fn dispatch_remote(self: &Rc<Self>, observed: &Observed, before: Snapshot, after: Snapshot) {
        for (i, map) in observed.maps.iter().enumerate() {
            for (key, old, new) in map_changes(&before.maps[i], &after.maps[i]) {
                let event = MapEvent {
                    property: key,
                    old_value: old.map(|s| self.lossy_value(&s)),
                    new_value: new.map(|s| self.lossy_value(&s)),
                    is_local: false,
                };
                self.notify_map(map, &event);
            }
        }

        for (i, array) in observed.vectors.iter().enumerate() {
            let Some(edit) = splice(&before.vectors[i], &after.vectors[i]) else {
                continue;
            };
            let index = edit.index;
            let values = |slots: &[Slot]| -> Vec<BackendValue> {
                slots.iter().map(|s| self.lossy_value(s)).collect()
            };
            if let ([old], [new]) = (edit.removed.as_slice(), edit.inserted.as_slice()) {
                self.notify_vector(
                    array,
                    &VectorEvent::Set {
                        index,
                        old_value: self.lossy_value(old),
                        new_value: self.lossy_value(new),
                        is_local: false,
                    },
                );
                continue;
            }
            if !edit.removed.is_empty() {
                self.notify_vector(
                    array,
                    &VectorEvent::Removed {
                        index,
                        values: values(&edit.removed),
                        is_local: false,
                    },
                );
            }
            if !edit.inserted.is_empty() {
                self.notify_vector(
                    array,
                    &VectorEvent::Inserted {
                        index,
                        values: values(&edit.inserted),
                        is_local: false,
                    },
                );
            }
        }

        for (i, text) in observed.texts.iter().enumerate() {
            let Some(edit) = splice(&before.texts[i], &after.texts[i]) else {
                continue;
            };
            if !edit.removed.is_empty() {
                self.notify_text(
                    text,
                    &TextEvent::Deleted {
                        index: edit.index,
                        text: edit.removed.iter().collect(),
                        is_local: false,
                    },
                );
            }
            if !edit.inserted.is_empty() {
                self.notify_text(
                    text,
                    &TextEvent::Inserted {
                        index: edit.index,
                        text: edit.inserted.iter().collect(),
                        is_local: false,
                    },
                );
            }
        }
    }
}

/// Shared objects with at least one listener, deduplicated.
struct Observed {
    maps: Vec<MapRef>,
    vectors: Vec<ArrayRef>,
    texts: Vec<TextRef>,
}

/// Contents of every observed object, index-aligned with [`Observed`].
struct Snapshot {
    maps: Vec<BTreeMap<String, Slot>>,
    vectors: Vec<Vec<Slot>>,
    texts: Vec<Vec<char>>,
}

// ───────────────────────────────────────────────────────────────────
// Document
// ───────────────────────────────────────────────────────────────────

/// One replica of a yrs-backed document.
///
/// Local edits accumulate as v1 updates until the transport drains them;
/// remote bytes go through [`YrsDocument::apply_remote_update`] or
/// [`YrsDocument::receive`]. Collaborator presence is fed in by the
/// transport as well.
pub struct YrsDocument {
    shared: Rc<Shared>,
    owner: u64,
    session_id: String,
}

impl YrsDocument {
    pub fn new() -> Self {
        Self::with_config(&YrsConfig::default())
    }

    pub fn with_config(config: &YrsConfig) -> Self {
        let mut options = Options::default();
        options.offset_kind = OffsetKind::Bytes;
        if let Some(id) = config.client_id {
            options.client_id = id.into();
        }
        let doc = Doc::with_options(options);
        let root = doc.get_or_insert_map(config.root_name.as_str());

        let shared = Rc::new(Shared {
            doc,
            root,
            next_id: Cell::new(1),
            maps: RefCell::new(Vec::new()),
            vectors: RefCell::new(Vec::new()),
            texts: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            collaborators: RefCell::new(Vec::new()),
            collaborator_listeners: RefCell::new(Vec::new()),
        });
        let owner = shared.next_id();
        Self {
            shared,
            owner,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Collaborator record announcing this replica. The color is left for
    /// the registry to derive.
    pub fn info(&self, user_id: &str, display_name: &str) -> CollaboratorInfo {
        CollaboratorInfo::new(user_id, self.session_id.as_str(), display_name, "")
    }

    // ── Update exchange ────────────────────────────────────────────

    /// Apply update bytes produced by another replica and deliver the
    /// resulting changes to listeners as remote events.
    pub fn apply_remote_update(&self, update: &[u8]) -> Result<()> {
        let update = Update::decode_v1(update)?;
        let observed = self.shared.observed();
        let before = self.shared.snapshot(&observed);
        {
            let mut txn = self.shared.doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| CollabError::Apply(e.to_string()))?;
        }
        let after = self.shared.snapshot(&observed);
        self.shared.dispatch_remote(&observed, before, after);
        Ok(())
    }

    /// Take the updates produced by local edits since the last call.
    pub fn drain_local_updates(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.shared.pending.borrow_mut())
    }

    pub fn has_local_updates(&self) -> bool {
        !self.shared.pending.borrow().is_empty()
    }

    /// v1-encoded state vector, step one of a handshake.
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.shared.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Everything the holder of `remote_state_vector` is missing.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let remote = StateVector::decode_v1(remote_state_vector)?;
        let txn = self.shared.doc.transact();
        Ok(txn.encode_diff_v1(&remote))
    }

    /// Full document state as a single update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        let txn = self.shared.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Handle one inbound message; returns the reply, if any.
    pub fn receive(&self, message: SyncMessage) -> Result<Option<SyncMessage>> {
        log::debug!("{} received {}", self.session_id, message.kind());
        match message {
            SyncMessage::StateVector(sv) => Ok(Some(SyncMessage::Update(self.encode_diff(&sv)?))),
            SyncMessage::Update(update) => {
                self.apply_remote_update(&update)?;
                Ok(None)
            }
            SyncMessage::Joined(info) => {
                self.peer_joined(info);
                Ok(None)
            }
            SyncMessage::Left { session_id } => {
                self.peer_left(&session_id);
                Ok(None)
            }
        }
    }

    /// Pending local updates wrapped for the wire.
    pub fn outgoing(&self) -> Vec<SyncMessage> {
        self.drain_local_updates()
            .into_iter()
            .map(SyncMessage::Update)
            .collect()
    }

    // ── Presence ───────────────────────────────────────────────────

    /// A session became live. Re-joining replaces the entry.
    pub fn peer_joined(&self, info: CollaboratorInfo) {
        {
            let mut live = self.shared.collaborators.borrow_mut();
            live.retain(|c| c.session_id != info.session_id);
            live.push(info.clone());
        }
        self.shared
            .notify_collaborators(CollaboratorEvent::Joined(info));
    }

    /// A session went away. Unknown ids are ignored.
    pub fn peer_left(&self, session_id: &str) -> Option<CollaboratorInfo> {
        let info = {
            let mut live = self.shared.collaborators.borrow_mut();
            let position = live.iter().position(|c| c.session_id == session_id)?;
            live.remove(position)
        };
        self.shared
            .notify_collaborators(CollaboratorEvent::Left(info.clone()));
        Some(info)
    }

    /// Listeners attached to shared objects of this replica.
    pub fn listener_count(&self) -> usize {
        self.shared.maps.borrow().len()
            + self.shared.vectors.borrow().len()
            + self.shared.texts.borrow().len()
    }

    /// Number of top-level entries in the root map.
    pub fn root_len(&self) -> usize {
        let txn = self.shared.doc.transact();
        self.shared.root.len(&txn) as usize
    }
}

impl Default for YrsDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentHandle for YrsDocument {
    fn root(&self) -> MapHandleRef {
        Rc::new(YrsMap {
            shared: self.shared.clone(),
            map: self.shared.root.clone(),
            owner: self.shared.next_id(),
        })
    }

    fn collaborators(&self) -> Vec<CollaboratorInfo> {
        self.shared.collaborators.borrow().clone()
    }

    fn add_collaborator_listener(&self, listener: CollaboratorListener) {
        self.shared
            .collaborator_listeners
            .borrow_mut()
            .push((self.owner, listener));
    }

    fn remove_collaborator_listeners(&self) {
        self.shared
            .collaborator_listeners
            .borrow_mut()
            .retain(|(owner, _)| *owner != self.owner);
    }
}

impl fmt::Debug for YrsDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YrsDocument")
            .field("session_id", &self.session_id)
            .field("root_len", &self.root_len())
            .field("pending_updates", &self.shared.pending.borrow().len())
            .finish()
    }
}
