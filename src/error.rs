//! Error taxonomy
//!
//! Two domains surface from the session layer: usage errors raised by the
//! manager itself, and protocol/transport errors raised by (or detected
//! against) a session collaborator.

use std::fmt;
use thiserror::Error;

/// Client error codes reported by the wire layer
pub mod code {
    pub const CR_CONNECTION_ERROR: u32 = 2002;
    pub const CR_CONN_HOST_ERROR: u32 = 2003;
    pub const CR_UNKNOWN_HOST: u32 = 2005;
    pub const CR_SERVER_GONE_ERROR: u32 = 2006;
    pub const CR_COMMANDS_OUT_OF_SYNC: u32 = 2014;
    pub const CR_SSL_CONNECTION_ERROR: u32 = 2026;
    pub const CR_MALFORMED_PACKET: u32 = 2027;
    pub const CR_X_READ_TIMEOUT: u32 = 2500;
    pub const CR_X_TLS_WRONG_CONFIGURATION: u32 = 2503;
    pub const CR_X_INVALID_AUTH_METHOD: u32 = 2504;
}

/// Caller misuse of the connection manager. Never involves the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("a session named {0} already exists")]
    SessionExists(String),

    #[error("no session named '{name}': {known}")]
    NoSuchSession { name: String, known: String },

    #[error("no active session")]
    NoActiveSession,

    #[error("cannot close default session")]
    CloseDefault,
}

/// Error reported by a session collaborator: a client error code from
/// [`code`] or an error code sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XError {
    code: u32,
    message: String,
}

impl XError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Map an I/O failure on an established transport
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Self::new(code::CR_X_READ_TIMEOUT, "Read operation failed because of a timeout")
            }
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => {
                Self::new(code::CR_SERVER_GONE_ERROR, "MySQL server has gone away")
            }
            _ => Self::new(code::CR_SERVER_GONE_ERROR, err.to_string()),
        }
    }
}

impl fmt::Display for XError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for XError {}

/// Error returned by every fallible [`ConnectionManager`](crate::ConnectionManager) operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The close handshake received something other than `Ok("bye!")`
    #[error(
        "Disconnect was expecting Mysqlx.Ok(bye!), but got {received} \
         (one or more calls to -->recv are probably missing)"
    )]
    ProtocolViolation { received: String },

    #[error(transparent)]
    Transport(#[from] XError),
}

impl Error {
    /// Client error code, if this error carries one
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::Usage(_) => None,
            Error::ProtocolViolation { .. } => Some(code::CR_COMMANDS_OUT_OF_SYNC),
            Error::Transport(e) => Some(e.code()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
