//! Session registry
//!
//! Tracks named sessions, the active one, and the close handshake.

mod manager;
mod state;

pub use manager::{ConnectionManager, DEFAULT_SESSION, NO_AUTH_USER};
pub use state::{CloseHandshake, ClosePhase};
