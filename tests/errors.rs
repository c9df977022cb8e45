//! Error reporting and connection lifecycle over a scripted server

mod common;

use common::Script;
use mysql_rowset::error::{CONNECTION_CLOSED_ERRNO, Error};

#[test]
fn closed_connection_reports_2006() {
    let (mut conn, written) = Script::new(1).connect();
    assert_eq!(conn.connection_id(), 1);
    assert_eq!(conn.server_version(), "8.0.36");

    conn.close().unwrap();
    let sent = written.borrow().len();
    assert!(written.borrow().ends_with(&[1, 0, 0, 0, 0x01]));
    conn.close().unwrap();
    assert!(conn.is_closed());
    assert_eq!(written.borrow().len(), sent);

    let err = conn.execute("SELECT 1").unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(err.number(), Some(CONNECTION_CLOSED_ERRNO));
    assert_eq!(CONNECTION_CLOSED_ERRNO, 2006);
    assert!(matches!(conn.prepare("SELECT 1"), Err(Error::ConnectionClosed)));
    assert!(matches!(conn.ping(), Err(Error::ConnectionClosed)));
}

#[test]
fn server_error_carries_the_query() {
    let mut script = Script::new(1);
    script.err(1146, "42S02", "Table 'test.nope' doesn't exist");
    script.ok(0, 0);
    let (mut conn, _) = script.connect();

    let err = conn.query_table("SELECT * FROM nope").unwrap_err();
    assert_eq!(err.number(), Some(1146));
    let message = err.to_string();
    assert!(message.contains("42S02"), "{message}");
    assert!(message.contains("during query: SELECT * FROM nope"), "{message}");

    // the connection stays usable
    conn.execute("DO 1").unwrap();
}

#[test]
fn prepare_error_carries_the_query() {
    let mut script = Script::new(1);
    script.err(1064, "42000", "You have an error in your SQL syntax");
    let (mut conn, _) = script.connect();

    let err = conn.prepare("SELEC ?").unwrap_err();
    assert_eq!(err.number(), Some(1064));
    assert!(err.to_string().contains("during query: SELEC ?"));
}

#[test]
fn lost_connection_becomes_closed() {
    // the script ends after the handshake, so the next read hits end of stream
    let (mut conn, _) = Script::new(1).connect();

    assert!(matches!(conn.execute("SELECT 1"), Err(Error::IoError(_))));
    assert!(conn.is_closed());
    let err = conn.execute("SELECT 1").unwrap_err();
    assert_eq!(err.number(), Some(2006));
}

#[test]
fn out_of_sequence_packet_closes_the_connection() {
    let mut script = Script::new(1);
    // the reply should start at sequence id 1
    script.at(5).next_ok(1, 0);
    let (mut conn, _) = script.connect();

    assert!(matches!(conn.execute("DO 1"), Err(Error::InvalidPacket)));
    assert!(conn.is_closed());
    let err = conn.execute("DO 1").unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(err.number(), Some(CONNECTION_CLOSED_ERRNO));
}

#[test]
fn server_rejects_login() {
    mysql_rowset::initialize_runtime();
    let mut script = Script::handshake_only(1);
    script
        .at(2)
        .next_err(1045, "28000", "Access denied for user 'test'");
    let (stream, _) = script.into_stream();

    let result = mysql_rowset::Conn::new_with_stream(stream, &mysql_rowset::Opts::default());
    match result {
        Err(err) => assert_eq!(err.number(), Some(1045)),
        Ok(_) => panic!("login should fail"),
    }
}
