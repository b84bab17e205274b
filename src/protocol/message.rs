//! X Protocol messages used by the session layer
//!
//! Only the connection, session and notice messages are modelled; any other
//! server message is carried as [`ServerMessage::Other`] with its raw payload.

use bytes::Bytes;
use prost::Message;
use std::fmt;

use super::codec;
use super::mysqlx::{self, connection, datatypes, notice, session};
use crate::error::XError;

/// Client message type ids
pub mod client_id {
    pub const CON_CAPABILITIES_SET: u8 = 2;
    pub const CON_CLOSE: u8 = 3;
    pub const SESS_AUTHENTICATE_START: u8 = 4;
    pub const SESS_AUTHENTICATE_CONTINUE: u8 = 5;
}

/// Server message type ids
pub mod server_id {
    pub const OK: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CONN_CAPABILITIES: u8 = 2;
    pub const SESS_AUTHENTICATE_CONTINUE: u8 = 3;
    pub const SESS_AUTHENTICATE_OK: u8 = 4;
    pub const NOTICE: u8 = 11;
    pub const RESULTSET_COLUMN_META_DATA: u8 = 12;
    pub const RESULTSET_ROW: u8 = 13;
    pub const RESULTSET_FETCH_DONE: u8 = 14;
    pub const RESULTSET_FETCH_SUSPENDED: u8 = 15;
    pub const RESULTSET_FETCH_DONE_MORE_RESULTSETS: u8 = 16;
    pub const SQL_STMT_EXECUTE_OK: u8 = 17;
    pub const RESULTSET_FETCH_DONE_MORE_OUT_PARAMS: u8 = 18;
}

/// Texts the server may put into the `Ok` answering a `Close`
pub const BYE_TEXTS: [&str; 2] = ["bye!", "tchau!"];

/// Scalar capability value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Bool(bool),
    String(String),
}

impl From<&Scalar> for datatypes::Scalar {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Bool(v) => datatypes::Scalar {
                r#type: datatypes::ScalarType::VBool as i32,
                v_bool: Some(*v),
                ..Default::default()
            },
            Scalar::String(v) => datatypes::Scalar {
                r#type: datatypes::ScalarType::VString as i32,
                v_string: Some(datatypes::ScalarString {
                    value: v.as_bytes().to_vec(),
                    collation: None,
                }),
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    CapabilitiesSet { name: String, value: Scalar },
    AuthenticateStart { mech_name: String, auth_data: Bytes },
    AuthenticateContinue { auth_data: Bytes },
    Close,
}

impl ClientMessage {
    pub fn id(&self) -> u8 {
        match self {
            ClientMessage::CapabilitiesSet { .. } => client_id::CON_CAPABILITIES_SET,
            ClientMessage::AuthenticateStart { .. } => client_id::SESS_AUTHENTICATE_START,
            ClientMessage::AuthenticateContinue { .. } => client_id::SESS_AUTHENTICATE_CONTINUE,
            ClientMessage::Close => client_id::CON_CLOSE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::CapabilitiesSet { .. } => "Mysqlx.Connection.CapabilitiesSet",
            ClientMessage::AuthenticateStart { .. } => "Mysqlx.Session.AuthenticateStart",
            ClientMessage::AuthenticateContinue { .. } => "Mysqlx.Session.AuthenticateContinue",
            ClientMessage::Close => "Mysqlx.Connection.Close",
        }
    }

    /// Protobuf payload, without frame header
    pub fn encode_payload(&self) -> Bytes {
        let payload = match self {
            ClientMessage::CapabilitiesSet { name, value } => connection::CapabilitiesSet {
                capabilities: Some(connection::Capabilities {
                    capabilities: vec![connection::Capability {
                        name: name.clone(),
                        value: Some(datatypes::Any {
                            r#type: datatypes::AnyType::Scalar as i32,
                            scalar: Some(value.into()),
                        }),
                    }],
                }),
            }
            .encode_to_vec(),
            ClientMessage::AuthenticateStart {
                mech_name,
                auth_data,
            } => session::AuthenticateStart {
                mech_name: mech_name.clone(),
                auth_data: (!auth_data.is_empty()).then(|| auth_data.clone()),
                initial_response: None,
            }
            .encode_to_vec(),
            ClientMessage::AuthenticateContinue { auth_data } => session::AuthenticateContinue {
                auth_data: auth_data.clone(),
            }
            .encode_to_vec(),
            ClientMessage::Close => connection::Close {}.encode_to_vec(),
        };
        Bytes::from(payload)
    }

    /// Complete frame ready for the wire
    pub fn to_frame(&self) -> Bytes {
        codec::encode_frame(self.id(), &self.encode_payload())
    }
}

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fatal,
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Ok {
        msg: String,
    },
    Error {
        severity: Severity,
        code: u32,
        sql_state: String,
        msg: String,
    },
    Capabilities,
    AuthenticateContinue {
        auth_data: Bytes,
    },
    AuthenticateOk,
    Notice {
        kind: u32,
        local: bool,
        payload: Bytes,
    },
    Other {
        id: u8,
        payload: Bytes,
    },
}

impl ServerMessage {
    /// Decode a message from its type id and payload
    pub fn decode(id: u8, payload: Bytes) -> Result<Self, XError> {
        let message = match id {
            server_id::OK => {
                let ok = mysqlx::OkMsg::decode(payload).map_err(codec::malformed)?;
                ServerMessage::Ok {
                    msg: ok.msg.unwrap_or_default(),
                }
            }
            server_id::ERROR => {
                let err = mysqlx::ErrorMsg::decode(payload).map_err(codec::malformed)?;
                let severity = if err.severity == Some(mysqlx::ErrorSeverity::Fatal as i32) {
                    Severity::Fatal
                } else {
                    Severity::Error
                };
                ServerMessage::Error {
                    severity,
                    code: err.code,
                    sql_state: err.sql_state,
                    msg: err.msg,
                }
            }
            server_id::CONN_CAPABILITIES => ServerMessage::Capabilities,
            server_id::SESS_AUTHENTICATE_CONTINUE => {
                let challenge =
                    session::AuthenticateContinue::decode(payload).map_err(codec::malformed)?;
                ServerMessage::AuthenticateContinue {
                    auth_data: challenge.auth_data,
                }
            }
            server_id::SESS_AUTHENTICATE_OK => ServerMessage::AuthenticateOk,
            server_id::NOTICE => {
                let frame = notice::Frame::decode(payload).map_err(codec::malformed)?;
                ServerMessage::Notice {
                    kind: frame.r#type,
                    local: frame.scope == Some(notice::Scope::Local as i32),
                    payload: frame.payload.unwrap_or_default(),
                }
            }
            other => ServerMessage::Other { id: other, payload },
        };

        Ok(message)
    }

    pub fn id(&self) -> u8 {
        match self {
            ServerMessage::Ok { .. } => server_id::OK,
            ServerMessage::Error { .. } => server_id::ERROR,
            ServerMessage::Capabilities => server_id::CONN_CAPABILITIES,
            ServerMessage::AuthenticateContinue { .. } => server_id::SESS_AUTHENTICATE_CONTINUE,
            ServerMessage::AuthenticateOk => server_id::SESS_AUTHENTICATE_OK,
            ServerMessage::Notice { .. } => server_id::NOTICE,
            ServerMessage::Other { id, .. } => *id,
        }
    }

    /// Fully qualified message name, as used for received-message counters
    pub fn name(&self) -> &'static str {
        server_message_name(self.id())
    }

    /// Is this the `Ok` the server sends in response to `Close`
    pub fn is_bye(&self) -> bool {
        matches!(self, ServerMessage::Ok { msg } if BYE_TEXTS.contains(&msg.as_str()))
    }

    /// Connection id announced through a `SessionStateChanged` notice
    pub fn assigned_client_id(&self) -> Option<u64> {
        let ServerMessage::Notice { kind, payload, .. } = self else {
            return None;
        };
        if *kind != notice::FrameType::SessionStateChanged as u32 {
            return None;
        }

        let changed = notice::SessionStateChanged::decode(payload.clone()).ok()?;
        if changed.param != notice::Parameter::ClientIdAssigned as i32 {
            return None;
        }
        let scalar = changed.value.first()?;
        if scalar.r#type != datatypes::ScalarType::VUint as i32 {
            return None;
        }
        scalar.v_unsigned_int
    }

    /// One-line description used in diagnostics
    pub fn summary(&self) -> String {
        match self {
            ServerMessage::Ok { msg } => format!("{}({})", self.name(), msg),
            ServerMessage::Error { code, msg, .. } => {
                format!("{}({}: {})", self.name(), code, msg)
            }
            _ => self.name().to_string(),
        }
    }
}

pub fn server_message_name(id: u8) -> &'static str {
    match id {
        server_id::OK => "Mysqlx.Ok",
        server_id::ERROR => "Mysqlx.Error",
        server_id::CONN_CAPABILITIES => "Mysqlx.Connection.Capabilities",
        server_id::SESS_AUTHENTICATE_CONTINUE => "Mysqlx.Session.AuthenticateContinue",
        server_id::SESS_AUTHENTICATE_OK => "Mysqlx.Session.AuthenticateOk",
        server_id::NOTICE => "Mysqlx.Notice.Frame",
        server_id::RESULTSET_COLUMN_META_DATA => "Mysqlx.Resultset.ColumnMetaData",
        server_id::RESULTSET_ROW => "Mysqlx.Resultset.Row",
        server_id::RESULTSET_FETCH_DONE => "Mysqlx.Resultset.FetchDone",
        server_id::RESULTSET_FETCH_SUSPENDED => "Mysqlx.Resultset.FetchSuspended",
        server_id::RESULTSET_FETCH_DONE_MORE_RESULTSETS => {
            "Mysqlx.Resultset.FetchDoneMoreResultsets"
        }
        server_id::SQL_STMT_EXECUTE_OK => "Mysqlx.Sql.StmtExecuteOk",
        server_id::RESULTSET_FETCH_DONE_MORE_OUT_PARAMS => {
            "Mysqlx.Resultset.FetchDoneMoreOutParams"
        }
        _ => "Mysqlx.Unknown",
    }
}

/// Text rendering in the style of the protobuf text format
impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{", self.name())?;
        match self {
            ServerMessage::Ok { msg } => writeln!(f, "  msg: {:?}", msg)?,
            ServerMessage::Error {
                severity,
                code,
                sql_state,
                msg,
            } => {
                let severity = match severity {
                    Severity::Error => "ERROR",
                    Severity::Fatal => "FATAL",
                };
                writeln!(f, "  severity: {}", severity)?;
                writeln!(f, "  code: {}", code)?;
                writeln!(f, "  msg: {:?}", msg)?;
                writeln!(f, "  sql_state: {:?}", sql_state)?;
            }
            ServerMessage::Notice { kind, local, .. } => {
                writeln!(f, "  type: {}", kind)?;
                writeln!(f, "  scope: {}", if *local { "LOCAL" } else { "GLOBAL" })?;
            }
            ServerMessage::Other { id, payload } => {
                writeln!(f, "  id: {}", id)?;
                writeln!(f, "  payload_len: {}", payload.len())?;
            }
            _ => {}
        }
        writeln!(f, "}}")
    }
}
