//! Plain in-memory observable containers.
//!
//! These hold their own data until they are [`Linkable::link`]ed to a
//! parent container, at which point they become a proxy for it:
//!
//! ```text
//!   LocalMap ──link──► parent (e.g. SyncMap)
//!      │  reads/writes ─────► parent
//!      ◄── re-emit ────────── parent.changed
//! ```
//!
//! Storing a plain container in a synchronized one copies its contents to
//! the backend and links it to the resulting synchronized container, so the
//! caller's object keeps working against shared state.
//!
//! [`Linkable::link`]: crate::observable::Linkable::link

mod map;
mod string;
mod vector;

pub use map::LocalMap;
pub use string::LocalString;
pub use vector::LocalVector;

const DISPOSED: &str = "plain container used after dispose()";
