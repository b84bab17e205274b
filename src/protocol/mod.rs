//! X Protocol session layer
//!
//! The connection manager drives sessions only through the traits below.
//! [`XSession`] is the network implementation; tests substitute scripted ones.

pub mod codec;
mod message;
pub mod mysqlx;
mod session;
mod tls;
mod transport;

pub use message::{
    client_id, server_id, server_message_name, ClientMessage, Scalar, ServerMessage, Severity,
    BYE_TEXTS,
};
pub use session::{XProtocol, XSession, XSessionFactory};
pub use transport::XConnection;

use crate::config::{ConnectionOptions, IpMode};
use crate::error::XError;

/// Byte transport underneath a protocol
pub trait Connection {
    fn is_connected(&self) -> bool;

    /// Close the transport without any protocol exchange
    fn close(&mut self);
}

/// Message-level access to a session
pub trait Protocol {
    fn send(&mut self, message: &ClientMessage) -> Result<(), XError>;

    /// Block until exactly one message arrives
    fn recv_single_message(&mut self) -> Result<ServerMessage, XError>;

    fn connection(&self) -> &dyn Connection;

    fn connection_mut(&mut self) -> &mut dyn Connection;
}

/// Capabilities a client may request before authenticating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CanHandleExpiredPassword,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::CanHandleExpiredPassword => "client.pwd_expire_ok",
        }
    }
}

/// Authentication mechanism
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMethod {
    Plain,
    #[default]
    Mysql41,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Plain => "PLAIN",
            AuthMethod::Mysql41 => "MYSQL41",
        }
    }
}

/// One protocol session, configured and then connected by the manager
pub trait Session {
    /// Capture TLS material. Configuration problems surface from the next connect.
    fn setup_ssl(&mut self, options: &ConnectionOptions);

    /// Start tracing messages and counting received ones by name
    fn setup_msg_callbacks(&mut self);

    fn set_capability(&mut self, capability: Capability, value: bool);

    fn set_auth_method(&mut self, method: AuthMethod);

    fn set_ip_mode(&mut self, mode: IpMode);

    /// Connect and negotiate capabilities without authenticating
    fn setup_connection(&mut self, options: &ConnectionOptions) -> Result<(), XError>;

    /// Connect, negotiate capabilities and authenticate
    fn setup_session(&mut self, options: &ConnectionOptions) -> Result<(), XError>;

    /// Server-assigned connection id (0 until known)
    fn client_id(&self) -> u64;

    fn protocol(&self) -> &dyn Protocol;

    fn protocol_mut(&mut self) -> &mut dyn Protocol;

    /// Number of messages received with the given name, if counted
    fn try_get_received_count(&self, message_name: &str) -> Option<u64>;

    fn is_connected(&self) -> bool {
        self.protocol().connection().is_connected()
    }

    fn close(&mut self) {
        self.protocol_mut().connection_mut().close();
    }
}

/// Produces fresh, unconnected sessions
pub trait SessionFactory {
    type Session: Session;

    fn create(&mut self) -> Self::Session;
}
