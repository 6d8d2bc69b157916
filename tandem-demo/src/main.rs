//! tandem demo — two yrs replicas kept in step through an in-process
//! "transport" that just moves bincode frames between them.
//!
//! Run with `RUST_LOG=info` (or `debug` for the synchronization traffic).

use std::rc::Rc;

use log::info;
use serde_json::{json, Value};
use tandem_collab::{
    Collaborator, CollaboratorRegistry, Result, SyncMessage, YrsConfig, YrsDocument,
};
use tandem_core::prelude::*;

const BOARD: &str = "board";

/// Replica plus the containers the demo watches on it.
struct Replica {
    name: &'static str,
    doc: Rc<YrsDocument>,
    board: Rc<SyncMap<Value>>,
    presence: Rc<CollaboratorRegistry>,
}

impl Replica {
    /// Open a replica. When `peer` is given the new document first catches
    /// up with it, so both sides share the same collaborator map.
    fn open(name: &'static str, client_id: u64, peer: Option<&Replica>) -> Result<Self> {
        let doc = Rc::new(YrsDocument::with_config(&YrsConfig::for_testing(client_id)));
        if let Some(peer) = peer {
            let reply = peer
                .doc
                .receive(SyncMessage::StateVector(doc.state_vector()))?;
            if let Some(reply) = reply {
                doc.receive(reply)?;
            }
            info!("{name} caught up with {}", peer.name);
        }
        let board = SyncMap::new(board_map(&doc)?)?;
        let presence = CollaboratorRegistry::new(doc.clone())?;

        board.changed().connect(move |c: &MapChange<Value>| {
            info!(
                "[{name}] board {:?} '{}': {:?} -> {:?}",
                c.kind, c.key, c.old_value, c.new_value
            );
        });
        presence
            .changed()
            .connect(move |c: &MapChange<Collaborator>| {
                let who = c
                    .new_value
                    .as_ref()
                    .or(c.old_value.as_ref())
                    .map_or("?", |r| r.display_name.as_str());
                info!("[{name}] presence {:?} {} ({})", c.kind, c.key, who);
            });

        Ok(Self {
            name,
            doc,
            board,
            presence,
        })
    }

    /// Move every pending frame to `other`, answering handshakes.
    fn send_to(&self, other: &Replica) {
        for message in self.doc.outgoing() {
            deliver(self, other, message);
        }
    }
}

/// The shared `board` map, created by the first replica to open.
fn board_map(doc: &YrsDocument) -> Result<MapHandleRef> {
    let root = doc.root();
    let value = match root.get(BOARD)? {
        Some(value) => value,
        None => root.set(BOARD, Prelim::empty_map())?,
    };
    match value {
        BackendValue::Map(handle) => Ok(handle),
        other => Err(SyncError::TypeMismatch {
            expected: "map",
            found: other.type_name(),
        }
        .into()),
    }
}

fn deliver(from: &Replica, to: &Replica, message: SyncMessage) {
    let frame = match message.encode() {
        Ok(frame) => frame,
        Err(e) => {
            log::error!("{} could not encode {}: {}", from.name, message.kind(), e);
            return;
        }
    };
    log::debug!("{} -> {}: {} bytes", from.name, to.name, frame.len());
    let reply = SyncMessage::decode(&frame).and_then(|m| to.doc.receive(m));
    match reply {
        Ok(Some(reply)) => deliver(to, from, reply),
        Ok(None) => {}
        Err(e) => log::error!("{} rejected frame from {}: {}", to.name, from.name, e),
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("demo failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    info!("Starting tandem demo...");
    let alice = Replica::open("alice", 1, None)?;
    let bob = Replica::open("bob", 2, Some(&alice))?;
    alice.send_to(&bob);

    // Presence: each side announces itself to both replicas.
    for replica in [&alice, &bob] {
        let me = replica.doc.info(replica.name, &replica.name.to_uppercase());
        replica.doc.peer_joined(me.clone());
        let other = if replica.name == "alice" { &bob } else { &alice };
        deliver(replica, other, SyncMessage::Joined(me));
    }
    alice.send_to(&bob);
    bob.send_to(&alice);

    alice.board.set("title", json!("Sprint plan"))?;
    alice.send_to(&bob);
    bob.board.set("title", json!("Sprint plan v2"))?;
    bob.board.set("owner", json!("bob"))?;
    bob.send_to(&alice);

    alice
        .presence
        .set_position(alice.doc.session_id(), json!({"line": 3, "column": 14}))?;
    alice.send_to(&bob);

    info!("alice board: {:?}", alice.board.values());
    info!("bob board:   {:?}", bob.board.values());
    info!(
        "sessions seen by bob: {:?}",
        bob.presence
            .values()
            .iter()
            .map(|c| format!("{} {}", c.display_name, c.color))
            .collect::<Vec<_>>()
    );

    // Bob leaves.
    let leaving = SyncMessage::Left {
        session_id: bob.doc.session_id().to_string(),
    };
    bob.doc.peer_left(bob.doc.session_id());
    deliver(&bob, &alice, leaving);
    alice.send_to(&bob);
    bob.send_to(&alice);
    info!("alice now sees {} session(s)", alice.presence.len());

    Ok(())
}
