//! Collaborator presence registry.
//!
//! ```text
//!  DocumentHandle ──joined──► set(session, fresh record)
//!        │        ──left────► delete(session)
//!        │
//!        └─ root["collaborators:map"] ◄──► SyncMap<Collaborator>
//! ```
//!
//! On construction the shared map is reconciled against the backend's live
//! session list: stale sessions are purged and live sessions without a
//! record get one. After that the registry is event driven.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tandem_core::backend::{
    BackendValue, CollaboratorEvent, DocumentHandle, HandleKind, MapHandleRef, Prelim,
};
use tandem_core::observable::{MapChange, ObservableMap};
use tandem_core::signal::Signal;
use tandem_core::sync::SyncMap;
use tandem_core::{Result, SyncError};

use crate::collaborator::Collaborator;
use crate::config::RegistryConfig;

/// Live mirror of sessionId → [`Collaborator`].
///
/// Reads and writes follow the [`SyncMap`] contract. The registry is never
/// linkable.
///
/// # Panics
///
/// Like [`SyncMap`], every operation except `dispose`/`is_disposed` panics
/// after `dispose()`.
pub struct CollaboratorRegistry {
    map: Rc<SyncMap<Collaborator>>,
    document: Rc<dyn DocumentHandle>,
    config: RegistryConfig,
    disposed: Cell<bool>,
}

impl CollaboratorRegistry {
    pub fn new(document: Rc<dyn DocumentHandle>) -> Result<Rc<Self>> {
        Self::with_config(document, RegistryConfig::default())
    }

    pub fn with_config(document: Rc<dyn DocumentHandle>, config: RegistryConfig) -> Result<Rc<Self>> {
        let handle = collaborator_map(document.as_ref(), &config.map_name)?;
        let live = document.collaborators();

        for key in handle.keys() {
            if !live.iter().any(|c| c.session_id == key) {
                log::warn!("purging stale collaborator session {}", key);
                handle.delete(&key)?;
            }
        }

        let map = SyncMap::new(handle)?;
        for info in &live {
            if !map.has(&info.session_id) {
                let record = Collaborator::joined(info, config.default_position.clone());
                map.set(&info.session_id, record)?;
            }
        }
        log::debug!("collaborator registry ready with {} sessions", map.len());

        let registry = Rc::new(Self {
            map,
            document: document.clone(),
            config,
            disposed: Cell::new(false),
        });

        let weak: Weak<Self> = Rc::downgrade(&registry);
        document.add_collaborator_listener(Rc::new(move |event: &CollaboratorEvent| {
            if let Some(registry) = weak.upgrade() {
                registry.on_collaborator_event(event);
            }
        }));
        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn on_collaborator_event(&self, event: &CollaboratorEvent) {
        if self.disposed.get() {
            return;
        }
        let outcome = match event {
            CollaboratorEvent::Joined(info) => {
                log::debug!("collaborator {} joined", info.session_id);
                let record = Collaborator::joined(info, self.config.default_position.clone());
                self.map.set(&info.session_id, record).map(|_| ())
            }
            CollaboratorEvent::Left(info) => {
                log::debug!("collaborator {} left", info.session_id);
                self.map.delete(&info.session_id).map(|_| ())
            }
        };
        if let Err(e) = outcome {
            log::error!("collaborator event not applied: {}", e);
        }
    }

    /// Replace the position blob of a session. Returns `false` when the
    /// session is unknown.
    pub fn set_position(&self, session_id: &str, position: Value) -> Result<bool> {
        let Some(record) = self.map.get(session_id) else {
            return Ok(false);
        };
        self.map.set(session_id, record.with_position(position))?;
        Ok(true)
    }

    /// Every session of one user, ordered by session id.
    pub fn collaborators_for_user(&self, user_id: &str) -> Vec<Collaborator> {
        self.map
            .values()
            .into_iter()
            .filter(|c| c.user_id == user_id)
            .collect()
    }
}

/// Find the collaborator map under `name`, creating it when missing.
fn collaborator_map(document: &dyn DocumentHandle, name: &str) -> Result<MapHandleRef> {
    let root = document.root();
    let value = match root.get(name)? {
        Some(value) => value,
        None => root.set(name, Prelim::empty_map())?,
    };
    match value {
        BackendValue::Map(handle) => Ok(handle),
        other => match other.handle_kind() {
            Some(found) => Err(SyncError::HandleKind {
                expected: HandleKind::Map,
                found,
            }),
            None => Err(SyncError::TypeMismatch {
                expected: "map",
                found: other.type_name(),
            }),
        },
    }
}

impl ObservableMap<Collaborator> for CollaboratorRegistry {
    fn changed(&self) -> &Signal<MapChange<Collaborator>> {
        self.map.changed()
    }

    fn set(&self, key: &str, value: Collaborator) -> Result<Option<Collaborator>> {
        self.map.set(key, value)
    }

    fn get(&self, key: &str) -> Option<Collaborator> {
        self.map.get(key)
    }

    fn has(&self, key: &str) -> bool {
        self.map.has(key)
    }

    fn keys(&self) -> Vec<String> {
        self.map.keys()
    }

    fn values(&self) -> Vec<Collaborator> {
        self.map.values()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn delete(&self, key: &str) -> Result<Option<Collaborator>> {
        self.map.delete(key)
    }

    fn clear(&self) -> Result<()> {
        self.map.clear()
    }

    /// Stops following join/leave events and disposes the mirror. The
    /// shared map keeps its records.
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.document.remove_collaborator_listeners();
        self.map.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn backend(&self) -> Option<MapHandleRef> {
        self.map.backend()
    }
}

impl Drop for CollaboratorRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for CollaboratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sessions = if self.disposed.get() {
            Vec::new()
        } else {
            self.map.keys()
        };
        f.debug_struct("CollaboratorRegistry")
            .field("map_name", &self.config.map_name)
            .field("sessions", &sessions)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use serde_json::json;
    use tandem_core::backend::CollaboratorInfo;
    use tandem_core::memory::{MemoryDocument, MemorySession};
    use tandem_core::observable::MapChangeKind;

    fn session(doc: &MemoryDocument) -> Rc<MemorySession> {
        Rc::new(doc.open_session())
    }

    fn info(session: &str) -> CollaboratorInfo {
        CollaboratorInfo::new(format!("user-{session}"), session, session.to_uppercase(), "")
    }

    #[test]
    fn test_creates_map_when_missing() {
        let doc = MemoryDocument::new();
        let s = session(&doc);
        let registry = CollaboratorRegistry::new(s.clone()).unwrap();
        assert!(registry.is_empty());
        assert!(s.root().has("collaborators:map"));
    }

    #[test]
    fn test_stale_sessions_are_purged() {
        let doc = MemoryDocument::new();
        let s = session(&doc);
        let stale = Collaborator::joined(&info("s1"), json!({}));
        s.root()
            .set(
                "collaborators:map",
                Prelim::Map(vec![("s1".into(), Prelim::Json(json!(stale)))]),
            )
            .unwrap();

        let registry = CollaboratorRegistry::new(s).unwrap();
        assert!(!registry.has("s1"));
        assert!(registry.backend().unwrap().keys().is_empty());
    }

    #[test]
    fn test_live_sessions_are_added() {
        let doc = MemoryDocument::new();
        doc.join(info("s1"));
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        assert_eq!(registry.keys(), vec!["s1"]);
        let record = registry.get("s1").unwrap();
        assert_eq!(record.display_name, "S1");
        assert_eq!(record.position, json!({}));
        assert!(record.color.starts_with('#'));
    }

    #[test]
    fn test_unreadable_live_record_is_replaced() {
        let doc = MemoryDocument::new();
        doc.join(info("s1"));
        let s = session(&doc);
        s.root()
            .set(
                "collaborators:map",
                Prelim::Map(vec![("s1".into(), Prelim::Json(json!("garbage")))]),
            )
            .unwrap();

        let registry = CollaboratorRegistry::new(s).unwrap();
        assert_eq!(registry.get("s1").unwrap().display_name, "S1");
        let stored = registry.backend().unwrap().get("s1").unwrap().unwrap();
        assert_eq!(stored.as_json().unwrap()["sessionId"], json!("s1"));
    }

    #[test]
    fn test_join_and_leave() {
        let doc = MemoryDocument::new();
        doc.join(info("s1"));
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        registry
            .changed()
            .connect(move |c: &MapChange<Collaborator>| s.borrow_mut().push((c.kind, c.key.clone())));

        doc.join(info("s2"));
        assert_eq!(registry.keys(), vec!["s1", "s2"]);
        assert_eq!(registry.len(), 2);

        doc.leave("s1");
        assert_eq!(registry.len(), 1);
        assert!(!registry.has("s1"));
        assert_eq!(
            *seen.borrow(),
            vec![
                (MapChangeKind::Add, "s2".to_string()),
                (MapChangeKind::Remove, "s1".to_string()),
            ]
        );
    }

    #[test]
    fn test_rejoin_resets_position() {
        let doc = MemoryDocument::new();
        doc.join(info("s1"));
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        assert!(registry.set_position("s1", json!({"line": 9})).unwrap());
        assert_eq!(registry.get("s1").unwrap().position, json!({"line": 9}));

        doc.join(info("s1"));
        assert_eq!(registry.get("s1").unwrap().position, json!({}));
    }

    #[test]
    fn test_set_position_unknown_session() {
        let doc = MemoryDocument::new();
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        assert!(!registry.set_position("ghost", json!({})).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_collaborators_for_user() {
        let doc = MemoryDocument::new();
        doc.join(CollaboratorInfo::new("ada", "s1", "Ada", ""));
        doc.join(CollaboratorInfo::new("ada", "s2", "Ada", ""));
        doc.join(CollaboratorInfo::new("bob", "s3", "Bob", ""));
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();

        let sessions: Vec<String> = registry
            .collaborators_for_user("ada")
            .into_iter()
            .map(|c| c.session_id)
            .collect();
        assert_eq!(sessions, vec!["s1", "s2"]);
    }

    #[test]
    fn test_custom_map_name_and_position() {
        let doc = MemoryDocument::new();
        doc.join(info("s1"));
        let config = RegistryConfig {
            map_name: "presence".into(),
            default_position: json!({"line": 0}),
        };
        let s = session(&doc);
        let registry = CollaboratorRegistry::with_config(s.clone(), config).unwrap();
        assert!(s.root().has("presence"));
        assert_eq!(registry.get("s1").unwrap().position, json!({"line": 0}));
    }

    #[test]
    fn test_wrong_kind_under_map_name() {
        let doc = MemoryDocument::new();
        let s = session(&doc);
        s.root()
            .set("collaborators:map", Prelim::Json(json!(1)))
            .unwrap();
        let err = CollaboratorRegistry::new(s).unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));
    }

    #[test]
    fn test_not_linkable() {
        let doc = MemoryDocument::new();
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        assert!(!registry.is_linkable());
    }

    #[test]
    fn test_dispose_stops_following_events() {
        let doc = MemoryDocument::new();
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        assert_eq!(doc.collaborator_listener_count(), 1);

        registry.dispose();
        registry.dispose();
        assert!(registry.is_disposed());
        assert_eq!(doc.collaborator_listener_count(), 0);

        // Nothing observes the join any more.
        doc.join(info("s9"));
    }

    #[test]
    fn test_drop_detaches() {
        let doc = MemoryDocument::new();
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        drop(registry);
        assert_eq!(doc.collaborator_listener_count(), 0);
    }

    #[test]
    #[should_panic(expected = "used after dispose()")]
    fn test_use_after_dispose_panics() {
        let doc = MemoryDocument::new();
        let registry = CollaboratorRegistry::new(session(&doc)).unwrap();
        registry.dispose();
        let _ = registry.keys();
    }
}
