//! Connection manager
//!
//! Owns the named sessions of a driver process and tracks which one is
//! active. The registry is the only owner of a session; the active session
//! is a name resolved through the registry on every access.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::state::CloseHandshake;
use crate::config::ConnectionOptions;
use crate::console::Console;
use crate::error::{code, Error, Result, UsageError};
use crate::metrics::METRICS;
use crate::protocol::{AuthMethod, Capability, Connection, Protocol, Session, SessionFactory};
use crate::variables::{self, VariableStore};

/// Name of the session created together with the manager
pub const DEFAULT_SESSION: &str = "";

/// User name requesting a connection without authentication
pub const NO_AUTH_USER: &str = "-";

/// Manages all named sessions
pub struct ConnectionManager<F: SessionFactory, V: VariableStore> {
    /// Base options captured at construction
    options: ConnectionOptions,
    factory: F,
    variables: V,
    console: Console,
    /// Session registry
    sessions: HashMap<String, F::Session>,
    /// Name of the active session
    active: Option<String>,
}

impl<F: SessionFactory, V: VariableStore> ConnectionManager<F, V> {
    /// Create a manager holding an unconnected default session
    pub fn new(
        options: ConnectionOptions,
        mut factory: F,
        mut variables: V,
        console: Console,
    ) -> Self {
        variables.set(variables::CLIENT_USER, options.user.clone());
        variables.set(variables::CLIENT_PASSWORD, options.password.clone());
        variables.set(variables::CLIENT_HOST, options.host.clone());
        variables.set(variables::CLIENT_SOCKET, options.socket.clone());
        variables.set(variables::CLIENT_SCHEMA, options.schema.clone());
        variables.set(variables::CLIENT_PORT, options.port.to_string());
        variables.set(variables::SSL_MODE, options.ssl.ssl_mode.clone());

        let mut sessions = HashMap::new();
        sessions.insert(DEFAULT_SESSION.to_string(), factory.create());

        Self {
            options,
            factory,
            variables,
            console,
            sessions,
            active: Some(DEFAULT_SESSION.to_string()),
        }
    }

    /// Connect the default session
    pub fn connect_default(
        &mut self,
        send_cap_password_expired: bool,
        no_auth: bool,
        use_plain_auth: bool,
    ) -> Result<()> {
        self.console.print_verbose("Connecting...\n");

        let known = self.known_names();
        let session = self
            .sessions
            .get_mut(DEFAULT_SESSION)
            .ok_or_else(|| UsageError::NoSuchSession {
                name: DEFAULT_SESSION.to_string(),
                known,
            })?;

        session.setup_ssl(&self.options);
        session.setup_msg_callbacks();

        if send_cap_password_expired {
            session.set_capability(Capability::CanHandleExpiredPassword, true);
        }
        session.set_auth_method(if use_plain_auth {
            AuthMethod::Plain
        } else {
            AuthMethod::Mysql41
        });
        session.set_ip_mode(self.options.ip_mode);

        let connected = if no_auth {
            session.setup_connection(&self.options)
        } else {
            session.setup_session(&self.options)
        };

        if let Err(error) = connected {
            METRICS.session_failed();
            // Close now unless the caller coordinates the close of a misconfigured TLS
            // session, so the server does not see the disconnect only after we exit
            if error.code() != code::CR_X_TLS_WRONG_CONFIGURATION || no_auth {
                session.close();
            }
            warn!(error = %error, no_auth, "Default session failed to connect");
            return Err(error.into());
        }

        let client_id = session.client_id();
        METRICS.session_opened();
        self.variables
            .set(variables::ACTIVE_CLIENT_ID, client_id.to_string());
        self.console
            .print_verbose(format_args!("Connected client #{}\n", client_id));
        info!(client_id, "Default session connected");
        Ok(())
    }

    /// Open a new named session and make it active
    pub fn create(
        &mut self,
        name: &str,
        user: &str,
        password: &str,
        db: &str,
        no_ssl: bool,
    ) -> Result<()> {
        if self.sessions.contains_key(name) {
            return Err(UsageError::SessionExists(name.to_string()).into());
        }

        self.console.print("connecting...\n");

        let mut options = self.options.clone();
        if no_ssl {
            options.ssl.clear();
        }
        if !user.is_empty() {
            options.user = user.to_string();
            options.password = password.to_string();
        }
        if !db.is_empty() {
            options.schema = db.to_string();
        }

        let mut session = self.factory.create();
        session.set_ip_mode(self.options.ip_mode);
        session.setup_ssl(&options);
        session.setup_msg_callbacks();

        let connected = if user == NO_AUTH_USER {
            session.setup_connection(&options)
        } else {
            session.setup_session(&options)
        };

        if let Err(error) = connected {
            METRICS.session_failed();
            session.close();
            warn!(session = %name, error = %error, "Session failed to connect");
            return Err(error.into());
        }

        let client_id = session.client_id();
        self.sessions.insert(name.to_string(), session);
        self.active = Some(name.to_string());
        METRICS.session_opened();

        self.variables
            .set(variables::ACTIVE_CLIENT_ID, client_id.to_string());
        self.console
            .print(format_args!("active session is now '{}'\n", name));
        self.console
            .print_verbose(format_args!("Connected client #{}\n", client_id));
        info!(session = %name, client_id, "Session created");
        Ok(())
    }

    /// Switch the active session
    pub fn set_active(&mut self, name: &str, be_quiet: bool) -> Result<()> {
        let Some(session) = self.sessions.get(name) else {
            return Err(UsageError::NoSuchSession {
                name: name.to_string(),
                known: self.known_names(),
            }
            .into());
        };

        let client_id = session.client_id();
        self.active = Some(name.to_string());
        self.variables
            .set(variables::ACTIVE_CLIENT_ID, client_id.to_string());

        if !be_quiet {
            self.console.print(format_args!(
                "switched to session {}\n",
                display_name(name)
            ));
        }
        debug!(session = %display_name(name), client_id, "Active session switched");
        Ok(())
    }

    /// Drop the active session without the close handshake
    pub fn abort_active(&mut self) -> Result<()> {
        let name = self.active_name_checked()?.to_string();

        if !name.is_empty() {
            self.console
                .print(format_args!("aborting session {}\n", name));
        }

        if let Some(mut session) = self.sessions.remove(&name) {
            // Closing the transport first keeps the session from running its own disconnect flow
            session.close();
        }
        METRICS.session_aborted();
        info!(session = %display_name(&name), "Session aborted");

        if name == DEFAULT_SESSION {
            // The default entry lives as long as the manager; start over unconnected
            self.sessions
                .insert(DEFAULT_SESSION.to_string(), self.factory.create());
            Ok(())
        } else {
            self.active = None;
            self.set_active(DEFAULT_SESSION, false)
        }
    }

    /// Close the active session with the Close / Ok(bye!) handshake.
    ///
    /// The session is removed and (unless `shutdown`) the default session made
    /// active on every path; a handshake error is returned after that cleanup.
    pub fn close_active(&mut self, shutdown: bool, be_quiet: bool) -> Result<()> {
        let Some(name) = self.active_name().map(str::to_string) else {
            return if shutdown {
                Ok(())
            } else {
                Err(UsageError::NoActiveSession.into())
            };
        };

        if name.is_empty() && !shutdown {
            return Err(UsageError::CloseDefault.into());
        }

        if !name.is_empty() && !be_quiet {
            self.console
                .print(format_args!("closing session {}\n", name));
        }

        let outcome = match self.sessions.get_mut(&name) {
            Some(session) => CloseHandshake::new(session.protocol_mut(), &self.console)
                .wait_for_disconnect(!self.options.dont_wait_for_disconnect)
                .quiet(be_quiet)
                .run(),
            None => Ok(()),
        };

        self.release(&name);
        match &outcome {
            Ok(()) => info!(session = %display_name(&name), "Session closed"),
            Err(e) => warn!(session = %display_name(&name), error = %e, "Session closed with error"),
        }

        self.active = None;
        let restored = if shutdown {
            Ok(())
        } else {
            self.set_active(DEFAULT_SESSION, be_quiet)
        };

        outcome.and(restored)
    }

    /// Close `name` during teardown, discarding every error
    pub fn safe_close(&mut self, name: &str) {
        let closed = self
            .set_active(name, true)
            .and_then(|_| self.close_active(true, true));

        if let Err(e) = closed {
            warn!(session = %display_name(name), error = %e, "Ignoring error while closing session");
        }
    }

    /// Close every session, named ones first and the default session last.
    /// Leaves the registry empty and is safe to call more than once.
    pub fn destroy(&mut self) {
        let named: Vec<String> = self
            .sessions
            .keys()
            .filter(|name| name.as_str() != DEFAULT_SESSION)
            .cloned()
            .collect();

        for name in named {
            self.safe_close(&name);
        }

        if self.sessions.contains_key(DEFAULT_SESSION) {
            self.safe_close(DEFAULT_SESSION);
        }

        for (name, mut session) in self.sessions.drain() {
            warn!(session = %display_name(&name), "Dropping session left after teardown");
            session.close();
        }
        self.active = None;
    }

    /// Name of the active session, if any
    pub fn active_name(&self) -> Option<&str> {
        self.active
            .as_deref()
            .filter(|name| self.sessions.contains_key(*name))
    }

    pub fn is_default_active(&self) -> bool {
        self.active_name() == Some(DEFAULT_SESSION)
    }

    /// Registered session names, sorted
    pub fn session_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sessions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Base user and password
    pub fn credentials(&self) -> (&str, &str) {
        (&self.options.user, &self.options.password)
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn variables(&self) -> &V {
        &self.variables
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn active_session(&self) -> Result<&F::Session> {
        let name = self.active_name_checked()?;
        self.sessions
            .get(name)
            .ok_or_else(|| UsageError::NoActiveSession.into())
    }

    pub fn active_session_mut(&mut self) -> Result<&mut F::Session> {
        let name = self.active_name_checked()?.to_string();
        self.sessions
            .get_mut(&name)
            .ok_or_else(|| UsageError::NoActiveSession.into())
    }

    pub fn active_protocol(&mut self) -> Result<&mut dyn Protocol> {
        Ok(self.active_session_mut()?.protocol_mut())
    }

    pub fn active_connection(&mut self) -> Result<&mut dyn Connection> {
        Ok(self.active_protocol()?.connection_mut())
    }

    /// How many messages named `message_name` the active session received;
    /// 0 when the session does not count them
    pub fn active_session_messages_received(&self, message_name: &str) -> Result<u64> {
        Ok(self
            .active_session()?
            .try_get_received_count(message_name)
            .unwrap_or(0))
    }

    fn active_name_checked(&self) -> Result<&str> {
        self.active_name()
            .ok_or_else(|| UsageError::NoActiveSession.into())
    }

    /// Remove `name` from the registry, closing its transport
    fn release(&mut self, name: &str) {
        if let Some(mut session) = self.sessions.remove(name) {
            session.close();
            METRICS.session_closed();
        }
    }

    fn known_names(&self) -> String {
        self.session_names().join(", ")
    }
}

impl<F: SessionFactory, V: VariableStore> Drop for ConnectionManager<F, V> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "default"
    } else {
        name
    }
}
