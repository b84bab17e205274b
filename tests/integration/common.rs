//! Scripted session doubles shared by the integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use xsession::console::SharedBuffer;
use xsession::error::code;
use xsession::protocol::{
    AuthMethod, Capability, ClientMessage, Connection, Protocol, ServerMessage, Session,
    SessionFactory,
};
use xsession::{ConnectionManager, ConnectionOptions, Console, IpMode, Variables, XError};

/// Ordered record of everything the sessions were asked to do
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.borrow().iter().any(|e| e == entry)
    }
}

/// How the session with a given client id behaves
#[derive(Clone)]
pub struct Script {
    pub connect_error: Option<XError>,
    /// Messages returned by successive receives
    pub replies: Vec<ServerMessage>,
    /// Fail every send
    pub broken_send: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect_error: None,
            replies: vec![ok("bye!")],
            broken_send: false,
        }
    }
}

pub fn ok(text: &str) -> ServerMessage {
    ServerMessage::Ok { msg: text.into() }
}

pub fn gone() -> XError {
    XError::new(code::CR_SERVER_GONE_ERROR, "MySQL server has gone away")
}

pub struct MockSession {
    id: u64,
    journal: Journal,
    script: Script,
    replies: VecDeque<ServerMessage>,
    connected: bool,
    auth_method: AuthMethod,
    received: Option<HashMap<&'static str, u64>>,
}

impl MockSession {
    fn connect(&mut self, options: &xsession::ConnectionOptions, authenticate: bool) -> Result<(), XError> {
        let auth = if authenticate {
            self.auth_method.as_str()
        } else {
            "none"
        };
        self.journal.record(format!(
            "connect {} user={} schema={} auth={}",
            self.id, options.user, options.schema, auth
        ));

        if let Some(e) = self.script.connect_error.take() {
            // A failed handshake leaves the socket open
            self.connected = true;
            return Err(e);
        }
        self.connected = true;
        self.replies = self.script.replies.clone().into();
        Ok(())
    }
}

impl Connection for MockSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        if self.connected {
            self.journal.record(format!("close {}", self.id));
        }
        self.connected = false;
    }
}

impl Protocol for MockSession {
    fn send(&mut self, message: &ClientMessage) -> Result<(), XError> {
        self.journal.record(format!("send {} {}", self.id, message.name()));
        if self.script.broken_send || !self.connected {
            return Err(gone());
        }
        Ok(())
    }

    fn recv_single_message(&mut self) -> Result<ServerMessage, XError> {
        let message = self.replies.pop_front().ok_or_else(gone)?;
        if let Some(counts) = self.received.as_mut() {
            *counts.entry(message.name()).or_insert(0) += 1;
        }
        Ok(message)
    }

    fn connection(&self) -> &dyn Connection {
        self
    }

    fn connection_mut(&mut self) -> &mut dyn Connection {
        self
    }
}

impl Session for MockSession {
    fn setup_ssl(&mut self, options: &xsession::ConnectionOptions) {
        self.journal
            .record(format!("ssl {} mode={}", self.id, options.ssl.ssl_mode));
    }

    fn setup_msg_callbacks(&mut self) {
        self.received.get_or_insert_with(HashMap::new);
    }

    fn set_capability(&mut self, capability: Capability, value: bool) {
        self.journal
            .record(format!("capability {} {}={}", self.id, capability.name(), value));
    }

    fn set_auth_method(&mut self, method: AuthMethod) {
        self.auth_method = method;
    }

    fn set_ip_mode(&mut self, mode: IpMode) {
        self.journal.record(format!("ip_mode {} {}", self.id, mode));
    }

    fn setup_connection(&mut self, options: &xsession::ConnectionOptions) -> Result<(), XError> {
        self.connect(options, false)
    }

    fn setup_session(&mut self, options: &xsession::ConnectionOptions) -> Result<(), XError> {
        self.connect(options, true)
    }

    fn client_id(&self) -> u64 {
        self.id
    }

    fn protocol(&self) -> &dyn Protocol {
        self
    }

    fn protocol_mut(&mut self) -> &mut dyn Protocol {
        self
    }

    fn try_get_received_count(&self, message_name: &str) -> Option<u64> {
        self.received
            .as_ref()
            .map(|counts| counts.get(message_name).copied().unwrap_or(0))
    }
}

/// Hands out sessions numbered from 1 in creation order
#[derive(Default)]
pub struct MockFactory {
    next_id: u64,
    journal: Journal,
    scripts: HashMap<u64, Script>,
}

impl MockFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Script the session that will get `client_id`
    pub fn script(mut self, client_id: u64, script: Script) -> Self {
        self.scripts.insert(client_id, script);
        self
    }
}

impl SessionFactory for MockFactory {
    type Session = MockSession;

    fn create(&mut self) -> MockSession {
        self.next_id += 1;
        MockSession {
            id: self.next_id,
            journal: self.journal.clone(),
            script: self.scripts.remove(&self.next_id).unwrap_or_default(),
            replies: VecDeque::new(),
            connected: false,
            auth_method: AuthMethod::default(),
            received: None,
        }
    }
}

pub type MockManager = ConnectionManager<MockFactory, Variables>;

pub fn options() -> ConnectionOptions {
    ConnectionOptions {
        user: "root".into(),
        password: "secret".into(),
        schema: "test".into(),
        ..Default::default()
    }
}

pub fn manager_with(factory: MockFactory, options: ConnectionOptions) -> (MockManager, SharedBuffer) {
    let (console, output) = Console::captured(false);
    (
        ConnectionManager::new(options, factory, Variables::new(), console),
        output,
    )
}

pub fn manager() -> (MockManager, Journal, SharedBuffer) {
    let journal = Journal::default();
    let (mgr, output) = manager_with(MockFactory::new(journal.clone()), options());
    (mgr, journal, output)
}
