//! xsession - X Protocol session manager
//!
//! Named sessions against a MySQL X Protocol server for a scripted test
//! driver: a default session, switching between sessions, and a strict
//! close handshake.

pub mod config;
pub mod connection;
pub mod console;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod util;
pub mod variables;

pub use config::{Config, ConnectionOptions, IpMode, SslOptions};
pub use connection::{ConnectionManager, DEFAULT_SESSION};
pub use console::Console;
pub use error::{Error, Result, UsageError, XError};
pub use protocol::{XSession, XSessionFactory};
pub use variables::{VariableStore, Variables};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
