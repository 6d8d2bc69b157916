//! In-memory reference backend.
//!
//! One [`MemoryDocument`] holds the shared state. Every
//! [`MemoryDocument::open_session`] call returns a replica view whose writes
//! are delivered to its own listeners with `is_local = true` and to every
//! other session's listeners with `is_local = false`, synchronously.
//!
//! ```text
//!                 MemoryDocument (shared nodes)
//!                 ┌───────────────────────────┐
//!   session A ───►│ root map ─► nested nodes  │◄─── session B
//!   (is_local)    │ collaborators             │     (remote)
//!                 └───────────────────────────┘
//! ```
//!
//! There is no merging: edits apply in call order. That is all the
//! synchronization layer needs from a test double.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use uuid::Uuid;

use crate::backend::{
    char_to_byte, BackendValue, CollaboratorEvent, CollaboratorInfo, CollaboratorListener,
    DocumentHandle, MapEvent, MapHandle, MapHandleRef, MapListener, Prelim, TextEvent, TextHandle,
    TextListener, VectorEvent, VectorHandle, VectorListener,
};
use crate::error::{Result, SyncError};

// ───────────────────────────────────────────────────────────────────
// Shared nodes
// ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Registered<F> {
    session: u64,
    owner: u64,
    callback: F,
}

#[derive(Clone)]
enum Stored {
    Json(Value),
    Map(Rc<MapNode>),
    Vector(Rc<VectorNode>),
    Text(Rc<TextNode>),
}

#[derive(Default)]
struct MapNode {
    entries: RefCell<BTreeMap<String, Stored>>,
    listeners: RefCell<Vec<Registered<MapListener>>>,
}

#[derive(Default)]
struct VectorNode {
    items: RefCell<Vec<Stored>>,
    listeners: RefCell<Vec<Registered<VectorListener>>>,
}

#[derive(Default)]
struct TextNode {
    text: RefCell<String>,
    listeners: RefCell<Vec<Registered<TextListener>>>,
}

struct Shared {
    root: Rc<MapNode>,
    collaborators: RefCell<Vec<CollaboratorInfo>>,
    collaborator_listeners: RefCell<Vec<Registered<CollaboratorListener>>>,
    next_id: Cell<u64>,
}

impl Shared {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn notify_collaborators(&self, event: CollaboratorEvent) {
        let listeners = self.collaborator_listeners.borrow().clone();
        for listener in listeners {
            (listener.callback)(&event);
        }
    }
}

/// A session's view of the shared state.
#[derive(Clone)]
struct Ctx {
    shared: Rc<Shared>,
    session: u64,
}

impl Ctx {
    fn for_session(&self, session: u64) -> Ctx {
        Ctx {
            shared: self.shared.clone(),
            session,
        }
    }

    /// Expose a stored value as seen by this session. Every nested handle
    /// gets its own listener owner id.
    fn value(&self, stored: &Stored) -> BackendValue {
        match stored {
            Stored::Json(v) => BackendValue::Json(v.clone()),
            Stored::Map(node) => BackendValue::Map(Rc::new(MemoryMap {
                node: node.clone(),
                ctx: self.clone(),
                owner: self.shared.next_id(),
            })),
            Stored::Vector(node) => BackendValue::Vector(Rc::new(MemoryVector {
                node: node.clone(),
                ctx: self.clone(),
                owner: self.shared.next_id(),
            })),
            Stored::Text(node) => BackendValue::Text(Rc::new(MemoryText {
                node: node.clone(),
                ctx: self.clone(),
                owner: self.shared.next_id(),
            })),
        }
    }

    fn build(prelim: Prelim) -> Stored {
        match prelim {
            Prelim::Json(v) => Stored::Json(v),
            Prelim::Map(entries) => {
                let node = MapNode::default();
                node.entries.borrow_mut().extend(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key, Ctx::build(value))),
                );
                Stored::Map(Rc::new(node))
            }
            Prelim::Vector(items) => {
                let node = VectorNode::default();
                *node.items.borrow_mut() = items.into_iter().map(Ctx::build).collect();
                Stored::Vector(Rc::new(node))
            }
            Prelim::Text(text) => {
                let node = TextNode::default();
                *node.text.borrow_mut() = text;
                Stored::Text(Rc::new(node))
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Handles
// ───────────────────────────────────────────────────────────────────

pub struct MemoryMap {
    node: Rc<MapNode>,
    ctx: Ctx,
    owner: u64,
}

impl MemoryMap {
    fn notify(&self, key: &str, old: Option<&Stored>, new: Option<&Stored>) {
        let listeners = self.node.listeners.borrow().clone();
        for listener in listeners {
            let view = self.ctx.for_session(listener.session);
            let event = MapEvent {
                property: key.to_string(),
                old_value: old.map(|s| view.value(s)),
                new_value: new.map(|s| view.value(s)),
                is_local: listener.session == self.ctx.session,
            };
            (listener.callback)(&event);
        }
    }
}

impl MapHandle for MemoryMap {
    fn get(&self, key: &str) -> Result<Option<BackendValue>> {
        Ok(self
            .node
            .entries
            .borrow()
            .get(key)
            .map(|s| self.ctx.value(s)))
    }

    fn set(&self, key: &str, value: Prelim) -> Result<BackendValue> {
        let stored = Ctx::build(value);
        let old = self
            .node
            .entries
            .borrow_mut()
            .insert(key.to_string(), stored.clone());
        self.notify(key, old.as_ref(), Some(&stored));
        Ok(self.ctx.value(&stored))
    }

    fn delete(&self, key: &str) -> Result<Option<BackendValue>> {
        let old = self.node.entries.borrow_mut().remove(key);
        let Some(old) = old else {
            return Ok(None);
        };
        self.notify(key, Some(&old), None);
        Ok(Some(self.ctx.value(&old)))
    }

    fn has(&self, key: &str) -> bool {
        self.node.entries.borrow().contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.node.entries.borrow().keys().cloned().collect()
    }

    fn size(&self) -> usize {
        self.node.entries.borrow().len()
    }

    fn add_listener(&self, listener: MapListener) {
        self.node.listeners.borrow_mut().push(Registered {
            session: self.ctx.session,
            owner: self.owner,
            callback: listener,
        });
    }

    fn remove_all_listeners(&self) {
        self.node
            .listeners
            .borrow_mut()
            .retain(|l| l.owner != self.owner);
    }

    fn same_handle(&self, other: &dyn MapHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryMap>()
            .is_some_and(|o| Rc::ptr_eq(&self.node, &o.node))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MemoryVector {
    node: Rc<VectorNode>,
    ctx: Ctx,
    owner: u64,
}

impl MemoryVector {
    fn notify(&self, make: impl Fn(&Ctx, bool) -> VectorEvent) {
        let listeners = self.node.listeners.borrow().clone();
        for listener in listeners {
            let view = self.ctx.for_session(listener.session);
            let event = make(&view, listener.session == self.ctx.session);
            (listener.callback)(&event);
        }
    }
}

impl VectorHandle for MemoryVector {
    fn len(&self) -> usize {
        self.node.items.borrow().len()
    }

    fn get(&self, index: usize) -> Result<Option<BackendValue>> {
        Ok(self
            .node
            .items
            .borrow()
            .get(index)
            .map(|s| self.ctx.value(s)))
    }

    fn values(&self) -> Result<Vec<BackendValue>> {
        Ok(self
            .node
            .items
            .borrow()
            .iter()
            .map(|s| self.ctx.value(s))
            .collect())
    }

    fn insert(&self, index: usize, values: Vec<Prelim>) -> Result<Vec<BackendValue>> {
        let len = self.len();
        if index > len {
            return Err(SyncError::IndexOutOfBounds { index, len });
        }
        let stored: Vec<Stored> = values.into_iter().map(Ctx::build).collect();
        {
            let mut items = self.node.items.borrow_mut();
            let tail = items.split_off(index);
            items.extend(stored.iter().cloned());
            items.extend(tail);
        }
        self.notify(|view, is_local| VectorEvent::Inserted {
            index,
            values: stored.iter().map(|s| view.value(s)).collect(),
            is_local,
        });
        Ok(stored.iter().map(|s| self.ctx.value(s)).collect())
    }

    fn remove(&self, index: usize, count: usize) -> Result<Vec<BackendValue>> {
        let len = self.len();
        if index + count > len {
            return Err(SyncError::IndexOutOfBounds {
                index: index + count,
                len,
            });
        }
        let removed: Vec<Stored> = self
            .node
            .items
            .borrow_mut()
            .drain(index..index + count)
            .collect();
        if !removed.is_empty() {
            self.notify(|view, is_local| VectorEvent::Removed {
                index,
                values: removed.iter().map(|s| view.value(s)).collect(),
                is_local,
            });
        }
        Ok(removed.iter().map(|s| self.ctx.value(s)).collect())
    }

    fn set(&self, index: usize, value: Prelim) -> Result<BackendValue> {
        let len = self.len();
        if index >= len {
            return Err(SyncError::IndexOutOfBounds { index, len });
        }
        let stored = Ctx::build(value);
        let old = std::mem::replace(&mut self.node.items.borrow_mut()[index], stored.clone());
        self.notify(|view, is_local| VectorEvent::Set {
            index,
            old_value: view.value(&old),
            new_value: view.value(&stored),
            is_local,
        });
        Ok(self.ctx.value(&stored))
    }

    fn add_listener(&self, listener: VectorListener) {
        self.node.listeners.borrow_mut().push(Registered {
            session: self.ctx.session,
            owner: self.owner,
            callback: listener,
        });
    }

    fn remove_all_listeners(&self) {
        self.node
            .listeners
            .borrow_mut()
            .retain(|l| l.owner != self.owner);
    }

    fn same_handle(&self, other: &dyn VectorHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryVector>()
            .is_some_and(|o| Rc::ptr_eq(&self.node, &o.node))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MemoryText {
    node: Rc<TextNode>,
    ctx: Ctx,
    owner: u64,
}

impl MemoryText {
    fn notify(&self, make: impl Fn(bool) -> TextEvent) {
        let listeners = self.node.listeners.borrow().clone();
        for listener in listeners {
            let event = make(listener.session == self.ctx.session);
            (listener.callback)(&event);
        }
    }
}

impl TextHandle for MemoryText {
    fn text(&self) -> String {
        self.node.text.borrow().clone()
    }

    fn len(&self) -> usize {
        self.node.text.borrow().chars().count()
    }

    fn insert(&self, index: usize, text: &str) -> Result<()> {
        let offset = char_to_byte(&self.node.text.borrow(), index);
        let Some(offset) = offset else {
            return Err(SyncError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        };
        self.node.text.borrow_mut().insert_str(offset, text);
        self.notify(|is_local| TextEvent::Inserted {
            index,
            text: text.to_string(),
            is_local,
        });
        Ok(())
    }

    fn delete(&self, index: usize, count: usize) -> Result<String> {
        let range = {
            let current = self.node.text.borrow();
            char_to_byte(&current, index).zip(char_to_byte(&current, index + count))
        };
        let Some((from, to)) = range else {
            return Err(SyncError::IndexOutOfBounds {
                index: index + count,
                len: self.len(),
            });
        };
        let removed: String = self.node.text.borrow_mut().drain(from..to).collect();
        if !removed.is_empty() {
            self.notify(|is_local| TextEvent::Deleted {
                index,
                text: removed.clone(),
                is_local,
            });
        }
        Ok(removed)
    }

    fn add_listener(&self, listener: TextListener) {
        self.node.listeners.borrow_mut().push(Registered {
            session: self.ctx.session,
            owner: self.owner,
            callback: listener,
        });
    }

    fn remove_all_listeners(&self) {
        self.node
            .listeners
            .borrow_mut()
            .retain(|l| l.owner != self.owner);
    }

    fn same_handle(&self, other: &dyn TextHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryText>()
            .is_some_and(|o| Rc::ptr_eq(&self.node, &o.node))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ───────────────────────────────────────────────────────────────────
// Document & sessions
// ───────────────────────────────────────────────────────────────────

/// Shared in-memory document.
pub struct MemoryDocument {
    shared: Rc<Shared>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                root: Rc::new(MapNode::default()),
                collaborators: RefCell::new(Vec::new()),
                collaborator_listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Open a new replica view with a fresh session id.
    pub fn open_session(&self) -> MemorySession {
        MemorySession {
            ctx: Ctx {
                shared: self.shared.clone(),
                session: self.shared.next_id(),
            },
            owner: self.shared.next_id(),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// A collaborator joined. Re-joining with a known session id replaces
    /// the entry.
    pub fn join(&self, info: CollaboratorInfo) {
        {
            let mut live = self.shared.collaborators.borrow_mut();
            live.retain(|c| c.session_id != info.session_id);
            live.push(info.clone());
        }
        log::debug!("session {} joined", info.session_id);
        self.shared
            .notify_collaborators(CollaboratorEvent::Joined(info));
    }

    /// A collaborator left. Unknown session ids are ignored.
    pub fn leave(&self, session_id: &str) -> Option<CollaboratorInfo> {
        let info = {
            let mut live = self.shared.collaborators.borrow_mut();
            let position = live.iter().position(|c| c.session_id == session_id)?;
            live.remove(position)
        };
        log::debug!("session {} left", session_id);
        self.shared
            .notify_collaborators(CollaboratorEvent::Left(info.clone()));
        Some(info)
    }

    pub fn collaborators(&self) -> Vec<CollaboratorInfo> {
        self.shared.collaborators.borrow().clone()
    }

    /// Listeners currently attached to the root map, across sessions.
    pub fn root_listener_count(&self) -> usize {
        self.shared.root.listeners.borrow().len()
    }

    pub fn collaborator_listener_count(&self) -> usize {
        self.shared.collaborator_listeners.borrow().len()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("root_keys", &self.shared.root.entries.borrow().len())
            .field("collaborators", &self.shared.collaborators.borrow().len())
            .finish()
    }
}

/// One replica of a [`MemoryDocument`].
pub struct MemorySession {
    ctx: Ctx,
    owner: u64,
    session_id: String,
}

impl MemorySession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Collaborator record for this session. The color is left for the
    /// consumer to derive.
    pub fn info(&self, user_id: &str, display_name: &str) -> CollaboratorInfo {
        CollaboratorInfo::new(user_id, self.session_id.as_str(), display_name, "")
    }
}

impl DocumentHandle for MemorySession {
    fn root(&self) -> MapHandleRef {
        Rc::new(MemoryMap {
            node: self.ctx.shared.root.clone(),
            ctx: self.ctx.clone(),
            owner: self.ctx.shared.next_id(),
        })
    }

    fn collaborators(&self) -> Vec<CollaboratorInfo> {
        self.ctx.shared.collaborators.borrow().clone()
    }

    fn add_collaborator_listener(&self, listener: CollaboratorListener) {
        self.ctx
            .shared
            .collaborator_listeners
            .borrow_mut()
            .push(Registered {
                session: self.ctx.session,
                owner: self.owner,
                callback: listener,
            });
    }

    fn remove_collaborator_listeners(&self) {
        self.ctx
            .shared
            .collaborator_listeners
            .borrow_mut()
            .retain(|l| l.owner != self.owner);
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("session_id", &self.session_id)
            .finish()
    }
}
