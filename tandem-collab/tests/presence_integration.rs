//! Integration tests for the collaborator presence registry: the in-memory
//! backend for deterministic join/leave ordering, and two yrs replicas for
//! presence that travels through update bytes.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tandem_collab::{
    Collaborator, CollaboratorRegistry, RegistryConfig, SyncMessage, YrsConfig, YrsDocument,
};
use tandem_core::memory::MemoryDocument;
use tandem_core::prelude::*;

fn info(session: &str) -> CollaboratorInfo {
    CollaboratorInfo::new(format!("user-{session}"), session, session, "")
}

// ─── In-memory backend ───────────────────────────────────────────

#[test]
fn test_stale_session_purged_on_startup() {
    let doc = MemoryDocument::new();
    let writer = doc.open_session();
    // A previous run left "s1" behind; only "s2" is live now.
    let leftover = Collaborator::joined(&info("s1"), json!({}));
    writer
        .root()
        .set(
            "collaborators:map",
            Prelim::Map(vec![("s1".into(), Prelim::Json(json!(leftover)))]),
        )
        .unwrap();
    doc.join(info("s2"));

    let registry = CollaboratorRegistry::new(Rc::new(doc.open_session())).unwrap();
    assert!(!registry.has("s1"));
    assert_eq!(registry.keys(), vec!["s2"]);
}

#[test]
fn test_join_leave_sequence() {
    let doc = MemoryDocument::new();
    doc.join(info("s1"));
    let registry = CollaboratorRegistry::new(Rc::new(doc.open_session())).unwrap();
    assert_eq!(registry.keys(), vec!["s1"]);

    doc.join(info("s2"));
    assert_eq!(registry.keys(), vec!["s1", "s2"]);
    assert_eq!(registry.len(), 2);

    doc.leave("s1");
    assert_eq!(registry.len(), 1);
    assert!(!registry.has("s1"));
}

#[test]
fn test_two_registries_share_records() {
    let doc = MemoryDocument::new();
    let a = CollaboratorRegistry::new(Rc::new(doc.open_session())).unwrap();
    let b = CollaboratorRegistry::new(Rc::new(doc.open_session())).unwrap();

    doc.join(info("s1"));
    assert!(a.set_position("s1", json!({"x": 4})).unwrap());
    assert_eq!(b.get("s1").unwrap().position, json!({"x": 4}));

    doc.leave("s1");
    assert!(a.is_empty());
    assert!(b.is_empty());
}

#[test]
fn test_signal_history_for_set_then_delete() {
    let doc = MemoryDocument::new();
    let registry = CollaboratorRegistry::new(Rc::new(doc.open_session())).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    registry
        .changed()
        .connect(move |c: &MapChange<Collaborator>| s.borrow_mut().push(c.kind));

    let record = Collaborator::joined(&info("x"), json!({}));
    registry.set("x", record).unwrap();
    registry.delete("x").unwrap();
    assert!(registry.get("x").is_none());
    assert_eq!(
        *seen.borrow(),
        vec![MapChangeKind::Add, MapChangeKind::Remove]
    );
}

#[test]
fn test_configured_registry() {
    let doc = MemoryDocument::new();
    doc.join(info("s1"));
    let config = RegistryConfig::from_json(
        r#"{"map_name": "presence", "default_position": {"cursor": null}}"#,
    )
    .unwrap();
    let registry =
        CollaboratorRegistry::with_config(Rc::new(doc.open_session()), config).unwrap();
    assert_eq!(registry.get("s1").unwrap().position, json!({"cursor": null}));
}

// ─── yrs replicas ────────────────────────────────────────────────

fn exchange(from: &YrsDocument, to: &YrsDocument) {
    for message in from.outgoing() {
        let bytes = message.encode().unwrap();
        to.receive(SyncMessage::decode(&bytes).unwrap()).unwrap();
    }
}

#[test]
fn test_presence_over_yrs() {
    let a = Rc::new(YrsDocument::with_config(&YrsConfig::for_testing(1)));
    let b = Rc::new(YrsDocument::with_config(&YrsConfig::for_testing(2)));
    let ada = a.info("ada", "Ada");

    // Only replica A hosts a registry; B observes the shared map directly.
    let registry = CollaboratorRegistry::new(a.clone()).unwrap();
    a.peer_joined(ada.clone());
    assert!(registry.has(ada.session_id.as_str()));
    exchange(&a, &b);

    let presence = SyncMap::<Collaborator>::new(
        match b.root().get("collaborators:map").unwrap() {
            Some(BackendValue::Map(handle)) => handle,
            other => panic!("expected collaborator map, got {other:?}"),
        },
    )
    .unwrap();
    let record = presence.get(&ada.session_id).unwrap();
    assert_eq!(record.display_name, "Ada");
    assert_eq!(record.color, tandem_collab::session_color(&ada.session_id));

    registry
        .set_position(&ada.session_id, json!({"line": 12}))
        .unwrap();
    exchange(&a, &b);
    assert_eq!(
        presence.get(&ada.session_id).unwrap().position,
        json!({"line": 12})
    );

    a.peer_left(&ada.session_id);
    exchange(&a, &b);
    assert!(presence.is_empty());
}
