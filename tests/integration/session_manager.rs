//! Connection manager behaviour against scripted sessions

use xsession::error::code;
use xsession::protocol::{ServerMessage, Severity};
use xsession::variables::{ACTIVE_CLIENT_ID, CLIENT_HOST, CLIENT_SCHEMA, SSL_MODE};
use xsession::{Error, UsageError, XError, DEFAULT_SESSION};

use crate::common::{self, ok, MockFactory, Script};

fn error_reply() -> ServerMessage {
    ServerMessage::Error {
        severity: Severity::Error,
        code: 5000,
        sql_state: "HY000".into(),
        msg: "Pending resultset".into(),
    }
}

#[test]
fn test_construct_publishes_options() {
    let (mgr, journal, _) = common::manager();

    assert_eq!(mgr.session_names(), vec![DEFAULT_SESSION]);
    assert_eq!(mgr.active_name(), Some(DEFAULT_SESSION));
    assert_eq!(mgr.variables().get(CLIENT_HOST), Some("localhost"));
    assert_eq!(mgr.variables().get(CLIENT_SCHEMA), Some("test"));
    assert_eq!(mgr.variables().get(SSL_MODE), Some(""));
    assert_eq!(mgr.variables().get(ACTIVE_CLIENT_ID), None);
    // Allocated but not connected
    assert!(journal.entries().is_empty());
}

#[test]
fn test_connect_default_sequence() {
    let (mut mgr, journal, _) = common::manager();

    mgr.connect_default(true, false, true).unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            "ssl 1 mode=",
            "capability 1 client.pwd_expire_ok=true",
            "ip_mode 1 ANY",
            "connect 1 user=root schema=test auth=PLAIN",
        ]
    );
    assert_eq!(mgr.variables().get(ACTIVE_CLIENT_ID), Some("1"));
}

#[test]
fn test_connect_default_without_auth() {
    let (mut mgr, journal, _) = common::manager();

    mgr.connect_default(false, true, false).unwrap();
    assert!(journal.contains("connect 1 user=root schema=test auth=none"));
    assert!(!journal.contains("capability 1 client.pwd_expire_ok=true"));
}

#[test]
fn test_connect_default_failure_closes_transport() {
    let journal = common::Journal::default();
    let factory = MockFactory::new(journal.clone()).script(
        1,
        Script {
            connect_error: Some(XError::new(1045, "Access denied for user 'root'")),
            ..Default::default()
        },
    );
    let (mut mgr, _) = common::manager_with(factory, common::options());

    let err = mgr.connect_default(false, false, false).unwrap_err();
    assert_eq!(err.code(), Some(1045));
    assert!(journal.contains("close 1"));
    assert_eq!(mgr.variables().get(ACTIVE_CLIENT_ID), None);
    assert_eq!(mgr.session_names(), vec![DEFAULT_SESSION]);
}

#[test]
fn test_tls_misconfiguration_left_open_for_caller() {
    let journal = common::Journal::default();
    let factory = MockFactory::new(journal.clone()).script(
        1,
        Script {
            connect_error: Some(XError::new(code::CR_X_TLS_WRONG_CONFIGURATION, "bad ca")),
            ..Default::default()
        },
    );
    let (mut mgr, _) = common::manager_with(factory, common::options());

    let err = mgr.connect_default(false, false, false).unwrap_err();
    assert_eq!(err.code(), Some(code::CR_X_TLS_WRONG_CONFIGURATION));
    assert!(!journal.contains("close 1"));

    // Teardown closes it
    mgr.destroy();
    assert!(journal.contains("close 1"));
}

// Scenario: create a named session
#[test]
fn test_create_registers_and_activates() {
    let (mut mgr, journal, output) = common::manager();

    mgr.create("s1", "u", "p", "db", false).unwrap();

    assert_eq!(mgr.session_names(), vec!["", "s1"]);
    assert_eq!(mgr.active_name(), Some("s1"));
    assert_eq!(mgr.variables().get(ACTIVE_CLIENT_ID), Some("2"));
    assert!(journal.contains("connect 2 user=u schema=db auth=MYSQL41"));
    assert_eq!(
        output.contents(),
        "connecting...\nactive session is now 's1'\n"
    );
}

#[test]
fn test_create_option_overrides() {
    let mut options = common::options();
    options.ssl.ssl_mode = "REQUIRED".into();
    options.ssl.ssl_ca = "ca.pem".into();

    let journal = common::Journal::default();
    let (mut mgr, _) = common::manager_with(MockFactory::new(journal.clone()), options);

    mgr.create("plain", "", "", "", true).unwrap();
    assert!(journal.contains("ssl 2 mode="));
    assert!(journal.contains("connect 2 user=root schema=test auth=MYSQL41"));

    mgr.create("tls", "-", "", "other", false).unwrap();
    assert!(journal.contains("ssl 3 mode=REQUIRED"));
    assert!(journal.contains("connect 3 user=- schema=other auth=none"));

    // The base options are untouched
    assert_eq!(mgr.options().ssl.ssl_mode, "REQUIRED");
    assert_eq!(mgr.credentials(), ("root", "secret"));
}

#[test]
fn test_failed_create_leaves_no_entry() {
    let journal = common::Journal::default();
    let factory = MockFactory::new(journal.clone()).script(
        2,
        Script {
            connect_error: Some(XError::new(code::CR_CONN_HOST_ERROR, "refused")),
            ..Default::default()
        },
    );
    let (mut mgr, _) = common::manager_with(factory, common::options());

    let err = mgr.create("s1", "u", "p", "", false).unwrap_err();
    assert_eq!(err.code(), Some(code::CR_CONN_HOST_ERROR));
    assert_eq!(mgr.session_names(), vec![""]);
    assert!(mgr.is_default_active());
    assert!(journal.contains("close 2"));
}

// Scenario: duplicate name
#[test]
fn test_duplicate_create_rejected() {
    let (mut mgr, journal, _) = common::manager();
    mgr.create("s1", "u", "p", "db", false).unwrap();
    mgr.set_active("", true).unwrap();
    let before = journal.entries().len();

    let err = mgr.create("s1", "x", "y", "", false).unwrap_err();
    assert_eq!(err.to_string(), "a session named s1 already exists");
    assert_eq!(mgr.session_names(), vec!["", "s1"]);
    assert_eq!(mgr.active_name(), Some(""));
    assert_eq!(journal.entries().len(), before);
}

#[test]
fn test_set_active_unknown_lists_names() {
    let (mut mgr, _, _) = common::manager();
    mgr.create("b", "", "", "", false).unwrap();
    mgr.create("a", "", "", "", false).unwrap();

    let err = mgr.set_active("zzz", false).unwrap_err();
    assert_eq!(err.to_string(), "no session named 'zzz': , a, b");
    assert_eq!(mgr.active_name(), Some("a"));
}

#[test]
fn test_set_active_messages() {
    let (mut mgr, _, output) = common::manager();
    mgr.create("s1", "", "", "", false).unwrap();
    output.clear();

    mgr.set_active("", false).unwrap();
    mgr.set_active("s1", false).unwrap();
    mgr.set_active("", true).unwrap();

    assert_eq!(
        output.contents(),
        "switched to session default\nswitched to session s1\n"
    );
    assert_eq!(mgr.variables().get(ACTIVE_CLIENT_ID), Some("1"));
}

// Scenario: clean close
#[test]
fn test_close_active_clean() {
    let (mut mgr, journal, output) = common::manager();
    mgr.create("s1", "u", "p", "db", false).unwrap();
    output.clear();

    mgr.close_active(false, false).unwrap();

    assert_eq!(mgr.session_names(), vec![""]);
    assert_eq!(mgr.active_name(), Some(""));
    assert!(journal.contains("send 2 Mysqlx.Connection.Close"));
    assert!(journal.contains("close 2"));

    let text = output.contents();
    assert!(text.starts_with("closing session s1\nMysqlx.Ok {\n  msg: \"bye!\"\n}\n"));
    assert!(text.ends_with("switched to session default\n"));
}

// Scenario: Error received instead of Ok
#[test]
fn test_close_active_violation_still_cleans_up() {
    let journal = common::Journal::default();
    let factory = MockFactory::new(journal.clone()).script(
        2,
        Script {
            replies: vec![error_reply()],
            ..Default::default()
        },
    );
    let (mut mgr, _) = common::manager_with(factory, common::options());
    mgr.create("s1", "u", "p", "db", false).unwrap();

    let err = mgr.close_active(false, true).unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation { .. }));
    let text = err.to_string();
    assert!(text.contains("Mysqlx.Error(5000: Pending resultset)"));
    assert!(text.contains("calls to -->recv are probably missing"));

    assert_eq!(mgr.session_names(), vec![""]);
    assert_eq!(mgr.active_name(), Some(""));
    assert!(journal.contains("close 2"));
}

#[test]
fn test_close_active_unexpected_ok_text() {
    let factory = MockFactory::default().script(
        2,
        Script {
            replies: vec![ok("ciao")],
            ..Default::default()
        },
    );
    let (mut mgr, _) = common::manager_with(factory, common::options());
    mgr.create("s1", "", "", "", false).unwrap();

    let err = mgr.close_active(false, true).unwrap_err();
    assert_eq!(err.code(), Some(code::CR_COMMANDS_OUT_OF_SYNC));
    assert!(mgr.is_default_active());
}

#[test]
fn test_close_active_transport_error_still_cleans_up() {
    let factory = MockFactory::default().script(
        2,
        Script {
            broken_send: true,
            ..Default::default()
        },
    );
    let (mut mgr, _) = common::manager_with(factory, common::options());
    mgr.create("s1", "", "", "", false).unwrap();

    let err = mgr.close_active(false, true).unwrap_err();
    assert_eq!(err.code(), Some(code::CR_SERVER_GONE_ERROR));
    assert_eq!(mgr.session_names(), vec![""]);
    assert!(mgr.is_default_active());
}

#[test]
fn test_close_active_reports_trailing_message() {
    let factory = MockFactory::default().script(
        2,
        Script {
            replies: vec![ok("bye!"), ok("late")],
            ..Default::default()
        },
    );
    let (console, output) = xsession::Console::captured(false);
    let mut mgr = xsession::ConnectionManager::new(
        common::options(),
        factory,
        xsession::Variables::new(),
        console,
    );
    mgr.create("s1", "", "", "", false).unwrap();

    mgr.close_active(false, false).unwrap();
    assert!(output
        .contents()
        .contains("Was expecting closure but got message:Mysqlx.Ok {\n  msg: \"late\"\n}"));
}

#[test]
fn test_close_default_needs_shutdown() {
    let (mut mgr, journal, _) = common::manager();
    mgr.connect_default(false, false, false).unwrap();

    let err = mgr.close_active(false, false).unwrap_err();
    assert_eq!(err, Error::Usage(UsageError::CloseDefault));
    assert_eq!(mgr.session_names(), vec![""]);
    assert!(!journal.contains("send 1 Mysqlx.Connection.Close"));
}

#[test]
fn test_close_skips_handshake_when_disconnected() {
    let (mut mgr, journal, _) = common::manager();

    // Default session never connected
    mgr.close_active(true, true).unwrap();
    assert!(mgr.is_empty());
    assert!(!journal.contains("send 1 Mysqlx.Connection.Close"));
}

#[test]
fn test_messages_received_before_callbacks_is_zero() {
    let (mgr, _, _) = common::manager();
    // Default session never connected, so it has no counters yet
    assert_eq!(mgr.active_session_messages_received("Mysqlx.Ok"), Ok(0));
    assert_eq!(
        mgr.active_session_messages_received("Mysqlx.Notice.Frame"),
        Ok(0)
    );
}

#[test]
fn test_messages_received_counter() {
    let (mut mgr, _, _) = common::manager();
    mgr.create("s1", "", "", "", false).unwrap();
    assert_eq!(mgr.active_session_messages_received("Mysqlx.Ok").unwrap(), 0);

    let reply = mgr.active_protocol().unwrap().recv_single_message().unwrap();
    assert!(reply.is_bye());
    assert_eq!(mgr.active_session_messages_received("Mysqlx.Ok").unwrap(), 1);
    assert_eq!(mgr.active_session_messages_received("Mysqlx.Error").unwrap(), 0);
    assert!(mgr.active_connection().unwrap().is_connected());
}

#[test]
fn test_abort_named_session() {
    let (mut mgr, journal, output) = common::manager();
    mgr.create("s1", "", "", "", false).unwrap();
    output.clear();

    mgr.abort_active().unwrap();

    assert_eq!(mgr.session_names(), vec![""]);
    assert!(mgr.is_default_active());
    assert!(journal.contains("close 2"));
    assert!(!journal.contains("send 2 Mysqlx.Connection.Close"));
    assert_eq!(
        output.contents(),
        "aborting session s1\nswitched to session default\n"
    );
}

#[test]
fn test_abort_default_keeps_registry_entry() {
    let (mut mgr, journal, _) = common::manager();
    mgr.connect_default(false, false, false).unwrap();

    mgr.abort_active().unwrap();
    assert!(journal.contains("close 1"));
    assert_eq!(mgr.session_names(), vec![""]);
    assert!(mgr.is_default_active());
    assert!(!mgr.active_connection().unwrap().is_connected());
}

#[test]
fn test_abort_without_active_session() {
    let (mut mgr, _, _) = common::manager();
    mgr.create("s1", "", "", "", false).unwrap();
    mgr.close_active(true, true).unwrap();
    let names: Vec<String> = mgr.session_names().iter().map(|s| s.to_string()).collect();

    assert_eq!(
        mgr.abort_active(),
        Err(Error::Usage(UsageError::NoActiveSession))
    );
    assert_eq!(mgr.session_names(), names);
    assert!(mgr.active_session().is_err());
    assert!(mgr.active_protocol().is_err());
}

#[test]
fn test_default_always_registered() {
    let (mut mgr, _, _) = common::manager();
    mgr.connect_default(false, false, false).unwrap();

    for round in 0..3 {
        let name = format!("s{}", round);
        mgr.create(&name, "", "", "", false).unwrap();
        assert!(mgr.contains(""));
        if round % 2 == 0 {
            mgr.close_active(false, true).unwrap();
        } else {
            mgr.abort_active().unwrap();
        }
        assert!(mgr.contains(""));
        assert!(mgr.is_default_active());
    }
    mgr.abort_active().unwrap();
    assert!(mgr.contains(""));
}

#[test]
fn test_destroy_empties_registry_when_every_close_fails() {
    let broken = || Script {
        broken_send: true,
        ..Default::default()
    };
    let journal = common::Journal::default();
    let factory = MockFactory::new(journal.clone())
        .script(1, broken())
        .script(2, broken())
        .script(3, broken());
    let (mut mgr, _) = common::manager_with(factory, common::options());
    mgr.connect_default(false, false, false).unwrap();
    mgr.create("a", "", "", "", false).unwrap();
    mgr.create("b", "", "", "", false).unwrap();

    mgr.destroy();

    assert!(mgr.is_empty());
    assert_eq!(mgr.active_name(), None);
    for id in 1..=3 {
        assert!(journal.contains(&format!("close {}", id)));
    }
    // Default session closes last
    let entries = journal.entries();
    assert_eq!(entries.last().map(String::as_str), Some("close 1"));
}

#[test]
fn test_drop_closes_sessions() {
    let journal = common::Journal::default();
    {
        let (mut mgr, _) =
            common::manager_with(MockFactory::new(journal.clone()), common::options());
        mgr.connect_default(false, false, false).unwrap();
        mgr.create("s1", "", "", "", false).unwrap();
    }
    assert!(journal.contains("send 2 Mysqlx.Connection.Close"));
    assert!(journal.contains("send 1 Mysqlx.Connection.Close"));
    assert!(journal.contains("close 1"));
}
