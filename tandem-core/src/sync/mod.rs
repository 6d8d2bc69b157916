//! Backend-synchronized containers.
//!
//! Each container owns a local mirror and holds one backend handle:
//!
//! ```text
//!   local call ──► backend write ──► mirror ──► changed.emit()
//!                       │
//!                       └─► echo (is_local) ──► ignored
//!
//!   remote event ──► classify ──► factory ──► mirror ──► changed.emit()
//! ```
//!
//! Reads never touch the backend. The only echo-suppression device is the
//! `is_local` flag carried by backend events.

mod map;
mod string;
mod vector;

pub use map::SyncMap;
pub use string::SyncString;
pub use vector::SyncVector;

const DISPOSED: &str = "synchronized container used after dispose()";
