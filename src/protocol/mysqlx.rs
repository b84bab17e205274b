//! Protobuf messages of the X Protocol
//!
//! Hand-derived with `prost` for the handful of messages the session layer
//! exchanges. Field numbers and labels follow the `mysqlx*.proto` files.

use bytes::Bytes;

/// Mysqlx.Ok
#[derive(Clone, PartialEq, prost::Message)]
pub struct OkMsg {
    #[prost(string, optional, tag = "1")]
    pub msg: Option<String>,
}

/// Mysqlx.Error
#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorMsg {
    #[prost(enumeration = "ErrorSeverity", optional, tag = "1")]
    pub severity: Option<i32>,
    #[prost(uint32, required, tag = "2")]
    pub code: u32,
    #[prost(string, required, tag = "3")]
    pub msg: String,
    #[prost(string, required, tag = "4")]
    pub sql_state: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ErrorSeverity {
    Error = 0,
    Fatal = 1,
}

pub mod datatypes {
    /// Mysqlx.Datatypes.Scalar
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Scalar {
        #[prost(enumeration = "ScalarType", required, tag = "1")]
        pub r#type: i32,
        #[prost(uint64, optional, tag = "3")]
        pub v_unsigned_int: Option<u64>,
        #[prost(bool, optional, tag = "8")]
        pub v_bool: Option<bool>,
        #[prost(message, optional, tag = "9")]
        pub v_string: Option<ScalarString>,
    }

    /// Mysqlx.Datatypes.Scalar.String
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ScalarString {
        #[prost(bytes = "vec", required, tag = "1")]
        pub value: Vec<u8>,
        #[prost(uint64, optional, tag = "2")]
        pub collation: Option<u64>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum ScalarType {
        VSint = 1,
        VUint = 2,
        VNull = 3,
        VOctets = 4,
        VDouble = 5,
        VFloat = 6,
        VBool = 7,
        VString = 8,
    }

    /// Mysqlx.Datatypes.Any, scalar form only
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Any {
        #[prost(enumeration = "AnyType", required, tag = "1")]
        pub r#type: i32,
        #[prost(message, optional, tag = "2")]
        pub scalar: Option<Scalar>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum AnyType {
        Scalar = 1,
        Object = 2,
        Array = 3,
    }
}

pub mod connection {
    use super::datatypes::Any;

    /// Mysqlx.Connection.Capability
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Capability {
        #[prost(string, required, tag = "1")]
        pub name: String,
        #[prost(message, optional, tag = "2")]
        pub value: Option<Any>,
    }

    /// Mysqlx.Connection.Capabilities
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Capabilities {
        #[prost(message, repeated, tag = "1")]
        pub capabilities: Vec<Capability>,
    }

    /// Mysqlx.Connection.CapabilitiesSet
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CapabilitiesSet {
        #[prost(message, optional, tag = "1")]
        pub capabilities: Option<Capabilities>,
    }

    /// Mysqlx.Connection.Close
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Close {}
}

pub mod session {
    use bytes::Bytes;

    /// Mysqlx.Session.AuthenticateStart
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AuthenticateStart {
        #[prost(string, required, tag = "1")]
        pub mech_name: String,
        #[prost(bytes = "bytes", optional, tag = "2")]
        pub auth_data: Option<Bytes>,
        #[prost(bytes = "bytes", optional, tag = "3")]
        pub initial_response: Option<Bytes>,
    }

    /// Mysqlx.Session.AuthenticateContinue, sent in both directions
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AuthenticateContinue {
        #[prost(bytes = "bytes", required, tag = "1")]
        pub auth_data: Bytes,
    }
}

pub mod notice {
    use super::datatypes::Scalar;
    use bytes::Bytes;

    /// Mysqlx.Notice.Frame
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Frame {
        #[prost(uint32, required, tag = "1")]
        pub r#type: u32,
        #[prost(enumeration = "Scope", optional, tag = "2")]
        pub scope: Option<i32>,
        #[prost(bytes = "bytes", optional, tag = "3")]
        pub payload: Option<Bytes>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum FrameType {
        Warning = 1,
        SessionVariableChanged = 2,
        SessionStateChanged = 3,
        GroupReplicationStateChanged = 4,
        ServerHello = 5,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Scope {
        Global = 1,
        Local = 2,
    }

    /// Mysqlx.Notice.SessionStateChanged
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SessionStateChanged {
        #[prost(enumeration = "Parameter", required, tag = "1")]
        pub param: i32,
        #[prost(message, repeated, tag = "2")]
        pub value: Vec<Scalar>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Parameter {
        CurrentSchema = 1,
        AccountExpired = 2,
        GeneratedInsertId = 3,
        RowsAffected = 4,
        RowsFound = 5,
        RowsMatched = 6,
        TrxCommitted = 7,
        TrxRolledback = 9,
        ProducedMessage = 10,
        ClientIdAssigned = 11,
        GeneratedDocumentIds = 12,
    }
}

impl datatypes::Scalar {
    pub fn unsigned(value: u64) -> Self {
        Self {
            r#type: datatypes::ScalarType::VUint as i32,
            v_unsigned_int: Some(value),
            ..Default::default()
        }
    }
}

impl notice::Frame {
    /// Local-scope notice wrapping an encoded inner message
    pub fn local(kind: notice::FrameType, payload: Bytes) -> Self {
        Self {
            r#type: kind as u32,
            scope: Some(notice::Scope::Local as i32),
            payload: Some(payload),
        }
    }
}
