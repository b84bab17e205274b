//! Network session
//!
//! [`XSession`] opens the transport, negotiates TLS and capabilities, and
//! authenticates. [`XProtocol`] moves whole messages over an [`XConnection`].

use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tracing::{debug, info, trace};

use super::message::{ClientMessage, Scalar, ServerMessage};
use super::tls::{self, TlsPolicy};
use super::transport::XConnection;
use super::{AuthMethod, Capability, Connection, Protocol, Session, SessionFactory};
use crate::config::{ConnectionOptions, IpMode};
use crate::error::{code, XError};
use crate::metrics::METRICS;

/// Message exchange over one connection
#[derive(Default)]
pub struct XProtocol {
    connection: XConnection,
    /// Present once message callbacks are installed
    received: Option<HashMap<&'static str, u64>>,
}

impl XProtocol {
    fn install_callbacks(&mut self) {
        self.received.get_or_insert_with(HashMap::new);
    }

    fn received_count(&self, name: &str) -> Option<u64> {
        self.received
            .as_ref()
            .map(|counts| counts.get(name).copied().unwrap_or(0))
    }
}

impl Protocol for XProtocol {
    fn send(&mut self, message: &ClientMessage) -> Result<(), XError> {
        let frame = message.to_frame();
        if self.received.is_some() {
            trace!(message = message.name(), bytes = frame.len(), ">>>> SEND");
        }
        self.connection.write_frame(&frame)?;
        METRICS.message_tx(frame.len());
        Ok(())
    }

    fn recv_single_message(&mut self) -> Result<ServerMessage, XError> {
        let (id, payload, bytes) = self.connection.read_frame()?;
        METRICS.message_rx(bytes);

        let message = ServerMessage::decode(id, payload)?;
        if let Some(counts) = self.received.as_mut() {
            trace!(message = message.name(), bytes, "<<<< RECEIVE");
            *counts.entry(message.name()).or_insert(0) += 1;
        }
        Ok(message)
    }

    fn connection(&self) -> &dyn Connection {
        &self.connection
    }

    fn connection_mut(&mut self) -> &mut dyn Connection {
        &mut self.connection
    }
}

/// Session over the network
pub struct XSession {
    protocol: XProtocol,
    tls: Result<TlsPolicy, XError>,
    capabilities: Vec<(Capability, bool)>,
    auth_method: AuthMethod,
    ip_mode: IpMode,
    client_id: u64,
}

impl Default for XSession {
    fn default() -> Self {
        Self {
            protocol: XProtocol::default(),
            tls: Ok(TlsPolicy::Disabled),
            capabilities: Vec::new(),
            auth_method: AuthMethod::default(),
            ip_mode: IpMode::default(),
            client_id: 0,
        }
    }
}

impl XSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tls(&self) -> bool {
        self.protocol.connection.is_tls()
    }

    fn connect(&mut self, options: &ConnectionOptions, authenticate: bool) -> Result<(), XError> {
        self.client_id = 0;
        self.protocol
            .connection
            .connect(options, self.ip_mode)?;

        // Transport stays open on configuration errors; the caller decides when to close it
        let policy = self.tls.clone()?;
        self.negotiate_tls(policy, &options.host)?;

        for (capability, value) in self.capabilities.clone() {
            self.set_remote_capability(capability.name(), Scalar::Bool(value))?;
        }

        if authenticate {
            self.authenticate(options)?;
        }

        info!(
            host = %options.host,
            port = options.port,
            tls = self.is_tls(),
            client_id = self.client_id,
            authenticated = authenticate,
            "Session established"
        );
        Ok(())
    }

    fn negotiate_tls(&mut self, policy: TlsPolicy, host: &str) -> Result<(), XError> {
        let (config, required) = match policy {
            TlsPolicy::Disabled => return Ok(()),
            TlsPolicy::Preferred(config) => (config, false),
            TlsPolicy::Required(config) => (config, true),
        };

        match self.set_remote_capability("tls", Scalar::Bool(true)) {
            Ok(()) => self.protocol.connection.upgrade_tls(config, host),
            Err(e) if !required && e.code() != code::CR_SERVER_GONE_ERROR => {
                debug!(error = %e, "Server refused TLS, continuing unencrypted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn set_remote_capability(&mut self, name: &str, value: Scalar) -> Result<(), XError> {
        debug!(capability = name, %value, "Setting capability");
        self.protocol.send(&ClientMessage::CapabilitiesSet {
            name: name.to_string(),
            value,
        })?;

        match self.recv_skipping_notices()? {
            ServerMessage::Ok { .. } => Ok(()),
            ServerMessage::Error { code, msg, .. } => Err(XError::new(code, msg)),
            other => Err(unexpected(&other)),
        }
    }

    fn authenticate(&mut self, options: &ConnectionOptions) -> Result<(), XError> {
        let method = self.auth_method;
        debug!(method = method.as_str(), user = %options.user, "Authenticating");

        let initial = match method {
            AuthMethod::Plain => plain_auth_data(options),
            AuthMethod::Mysql41 => Bytes::new(),
        };
        self.protocol.send(&ClientMessage::AuthenticateStart {
            mech_name: method.as_str().to_string(),
            auth_data: initial,
        })?;

        let mut continued = false;
        loop {
            match self.recv_skipping_notices()? {
                ServerMessage::AuthenticateOk => return Ok(()),
                ServerMessage::Error { code, msg, .. } => return Err(XError::new(code, msg)),
                ServerMessage::AuthenticateContinue { auth_data }
                    if method == AuthMethod::Mysql41 && !continued =>
                {
                    continued = true;
                    self.protocol.send(&ClientMessage::AuthenticateContinue {
                        auth_data: mysql41_auth_data(options, &auth_data),
                    })?;
                }
                other => return Err(unexpected(&other)),
            }
        }
    }

    /// Receive the next non-notice message, capturing the client id on the way
    fn recv_skipping_notices(&mut self) -> Result<ServerMessage, XError> {
        loop {
            let message = self.protocol.recv_single_message()?;
            if let ServerMessage::Notice { .. } = message {
                if let Some(id) = message.assigned_client_id() {
                    self.client_id = id;
                }
                continue;
            }
            return Ok(message);
        }
    }
}

impl Session for XSession {
    fn setup_ssl(&mut self, options: &ConnectionOptions) {
        self.tls = tls::policy(&options.ssl);
    }

    fn setup_msg_callbacks(&mut self) {
        self.protocol.install_callbacks();
    }

    fn set_capability(&mut self, capability: Capability, value: bool) {
        self.capabilities.retain(|(c, _)| *c != capability);
        self.capabilities.push((capability, value));
    }

    fn set_auth_method(&mut self, method: AuthMethod) {
        self.auth_method = method;
    }

    fn set_ip_mode(&mut self, mode: IpMode) {
        self.ip_mode = mode;
    }

    fn setup_connection(&mut self, options: &ConnectionOptions) -> Result<(), XError> {
        self.connect(options, false)
    }

    fn setup_session(&mut self, options: &ConnectionOptions) -> Result<(), XError> {
        self.connect(options, true)
    }

    fn client_id(&self) -> u64 {
        self.client_id
    }

    fn protocol(&self) -> &dyn Protocol {
        &self.protocol
    }

    fn protocol_mut(&mut self) -> &mut dyn Protocol {
        &mut self.protocol
    }

    fn try_get_received_count(&self, message_name: &str) -> Option<u64> {
        self.protocol.received_count(message_name)
    }
}

impl Drop for XSession {
    fn drop(&mut self) {
        self.protocol.connection.close();
    }
}

/// Creates [`XSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct XSessionFactory;

impl SessionFactory for XSessionFactory {
    type Session = XSession;

    fn create(&mut self) -> XSession {
        XSession::new()
    }
}

/// PLAIN: schema \0 user \0 password
fn plain_auth_data(options: &ConnectionOptions) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(options.schema.as_bytes());
    buf.put_u8(0);
    buf.put_slice(options.user.as_bytes());
    buf.put_u8(0);
    buf.put_slice(options.password.as_bytes());
    buf.freeze()
}

/// MYSQL41: schema \0 user \0 *HEX(SHA1(pw) XOR SHA1(salt + SHA1(SHA1(pw))))
fn mysql41_auth_data(options: &ConnectionOptions, salt: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(options.schema.as_bytes());
    buf.put_u8(0);
    buf.put_slice(options.user.as_bytes());
    buf.put_u8(0);

    if !options.password.is_empty() {
        buf.put_u8(b'*');
        for byte in scramble(options.password.as_bytes(), salt) {
            buf.put_slice(format!("{:02X}", byte).as_bytes());
        }
    }
    buf.freeze()
}

fn scramble(password: &[u8], salt: &[u8]) -> [u8; 20] {
    // Servers may append a terminating zero to the 20 byte nonce
    let salt = &salt[..salt.len().min(20)];

    let hash1 = Sha1::digest(password);
    let hash2 = Sha1::digest(hash1);

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(hash2);
    let mix = hasher.finalize();

    let mut out = [0u8; 20];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = hash1[i] ^ mix[i];
    }
    out
}

fn unexpected(message: &ServerMessage) -> XError {
    XError::new(
        code::CR_MALFORMED_PACKET,
        format!("Unexpected response received from server: {}", message.summary()),
    )
}
