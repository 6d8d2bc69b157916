//! Binary envelope for shipping yrs traffic between replicas.
//!
//! The transport itself is the host's business; this module only fixes the
//! message set and its bincode encoding.
//!
//! ```text
//! Replica A                         Replica B
//!    │── StateVector(sv_A) ───────────►│
//!    │◄────────── Update(diff for A) ──│   handshake
//!    │── Update(drain_local_updates) ─►│   steady state
//!    │── Joined(info) / Left{..} ─────►│   presence
//! ```

use serde::{Deserialize, Serialize};
use tandem_core::backend::CollaboratorInfo;

use crate::error::Result;

/// Message exchanged between two replicas of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// "This is what I have": v1-encoded state vector.
    StateVector(Vec<u8>),
    /// v1-encoded yrs update, either a handshake diff or local edits.
    Update(Vec<u8>),
    /// A session became live.
    Joined(CollaboratorInfo),
    /// A session went away.
    Left { session_id: String },
}

impl SyncMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (message, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(message)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::StateVector(_) => "state-vector",
            SyncMessage::Update(_) => "update",
            SyncMessage::Joined(_) => "joined",
            SyncMessage::Left { .. } => "left",
        }
    }
}
