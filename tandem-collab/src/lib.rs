//! # tandem-collab — Presence and a yrs binding for tandem
//!
//! Builds on `tandem-core`: a collaborator presence registry kept in the
//! shared document, and a backend binding that runs the synchronized
//! containers on a yrs (Yjs) document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │ CollaboratorRegistry │        │ SyncMap / SyncVector │
//! │ (SyncMap<Collaborator>)       │ SyncString           │
//! └──────────┬───────────┘        └──────────┬───────────┘
//!            │      DocumentHandle / MapHandle ...       │
//!            ▼                                           ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ YrsDocument (yrs::Doc)        or any other binding      │
//! └──────────┬──────────────────────────────────────────────┘
//!            │ SyncMessage (bincode)
//!            ▼
//!        transport (host)
//! ```
//!
//! ## Modules
//!
//! - [`collaborator`] — collaborator records and stable colors
//! - [`registry`] — the presence registry
//! - [`config`] — registry and document configuration
//! - [`ybackend`] — yrs-backed document and handles
//! - [`protocol`] — binary envelope for update and presence traffic

pub mod collaborator;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod ybackend;

pub use collaborator::{session_color, Collaborator};
pub use config::{RegistryConfig, YrsConfig};
pub use error::{CollabError, Result};
pub use protocol::SyncMessage;
pub use registry::CollaboratorRegistry;
pub use ybackend::{YrsArray, YrsDocument, YrsMap, YrsText};
