//! # tandem-core — Observable collections kept in step with a collaborative backend
//!
//! Local maps, vectors and strings that mirror shared objects of a
//! collaborative (CRDT/OT) backend. The backend does the merging; this crate
//! translates local calls into backend writes, normalizes remote events into
//! typed change signals, and keeps the two from echoing into each other.
//!
//! ## Architecture
//!
//! ```text
//!  application
//!      │ set / delete / insert ...            ▲ changed() signals
//!      ▼                                      │
//! ┌──────────────────────────────────────────────────────┐
//! │ SyncMap / SyncVector / SyncString  (mirror + Signal) │
//! │        │ Converters (per key)     ▲                  │
//! │        ▼                          │ factory          │
//! │   backend write          remote event (is_local=0)   │
//! └────────┬──────────────────────────┴──────────────────┘
//!          ▼
//!   MapHandle / VectorHandle / TextHandle   (backend binding)
//! ```
//!
//! ## Modules
//!
//! - [`backend`] — handle traits a backend binding implements
//! - [`signal`] — per-instance typed observer lists
//! - [`observable`] — container capability traits and change payloads
//! - [`value`] — [`Synchronizable`] values and the [`Element`] mapping
//! - [`converter`] — per-key domain converters
//! - [`factory`] — raw backend value ↔ local value
//! - [`local`] — plain containers that can link to a parent
//! - [`sync`] — backend-synchronized containers
//! - [`memory`] — in-memory multi-session backend

pub mod backend;
pub mod converter;
pub mod error;
pub mod factory;
pub mod local;
pub mod memory;
pub mod observable;
pub mod signal;
pub mod sync;
pub mod value;

pub use error::{Result, SyncError};
pub use value::{Element, Synchronizable};

/// Everything needed to work with containers.
pub mod prelude {
    pub use crate::backend::{
        BackendValue, CollaboratorEvent, CollaboratorInfo, DocumentHandle, HandleKind, MapHandle,
        MapHandleRef, Prelim, TextHandle, VectorHandle,
    };
    pub use crate::converter::{Converter, Converters, FnConverter};
    pub use crate::error::{Result, SyncError};
    pub use crate::local::{LocalMap, LocalString, LocalVector};
    pub use crate::observable::{
        Linkable, MapChange, MapChangeKind, ObservableMap, ObservableString, ObservableVector,
        StringChange, StringChangeKind, VectorChange, VectorChangeKind,
    };
    pub use crate::signal::{Signal, SlotId};
    pub use crate::sync::{SyncMap, SyncString, SyncVector};
    pub use crate::value::{Element, Synchronizable};
}
