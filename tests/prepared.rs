//! Prepared statements, binding and transactions over a scripted server

mod common;

use common::{Script, contains, col};
use mysql_rowset::constant::{ColumnType, ServerStatusFlags};
use mysql_rowset::error::Error;
use mysql_rowset::{Param, Protocol, QueryResult, SqlResult};
use pretty_assertions::assert_eq;

const INSERT: &str = "INSERT INTO test (id, value) VALUES (?, ?)";
const SELECT: &str = "SELECT id, value FROM test WHERE id = ?";

fn framed(seq: u8, payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u32).to_le_bytes();
    let mut out = vec![len[0], len[1], len[2], seq];
    out.extend_from_slice(payload);
    out
}

#[test]
fn bind_execute_and_rebind() {
    let cols = [
        col("id", ColumnType::MYSQL_TYPE_LONGLONG),
        col("value", ColumnType::MYSQL_TYPE_VAR_STRING),
    ];
    let mut script = Script::new(1);
    script.prepare_ok(7, 2, &[]);
    script.ok(1, 10);
    script.ok(1, 11);
    script.prepare_ok(8, 1, &cols);
    script
        .result_header(&cols)
        .binary_row(&[Some(&10i64.to_le_bytes()[..]), Some(&b"\x0210"[..])])
        .end(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT);
    let (mut conn, written) = script.connect();

    let mut insert = conn.prepare(INSERT).unwrap();
    assert_eq!(insert.param_count(), 2);
    assert!(insert.fields().is_empty());

    insert.bind_int(10).unwrap().bind_text("10").unwrap();
    let result = insert.execute(&mut conn).unwrap();
    assert_eq!(result.rows_affected(), 1);
    assert_eq!(result.insert_id(), 10);

    let mut expected = vec![0x17, 7, 0, 0, 0, 0x00, 1, 0, 0, 0];
    expected.extend_from_slice(&[0x00, 0x01, 0x03, 0x00, 0xfd, 0x00]);
    expected.extend_from_slice(&[10, 0, 0, 0, 2, b'1', b'0']);
    assert!(contains(&written.borrow(), &framed(0, &expected)));

    insert.clean_bind();
    let value = String::from("11");
    insert.bind(11i32).unwrap().bind(&value).unwrap();
    drop(value);
    assert_eq!(insert.execute(&mut conn).unwrap().insert_id(), 11);

    let mut select = conn.prepare(SELECT).unwrap();
    assert_eq!(select.fields().len(), 2);
    select.bind(10i64).unwrap();
    let table = select.query_table(&mut conn).unwrap();
    assert_eq!(table.protocol(), Protocol::Binary);
    assert_eq!(table.index_of("value"), Some(1));
    let row = table.row(0).unwrap();
    assert_eq!(row.value(0).unwrap().i64().unwrap(), 10);
    assert_eq!(row.value(1).unwrap().as_str().unwrap(), "10");
}

#[test]
fn null_parameters_set_the_bitmap() {
    let mut script = Script::new(1);
    script.prepare_ok(3, 3, &[]);
    script.ok(1, 0);
    let (mut conn, written) = script.connect();

    let mut stmt = conn.prepare("INSERT INTO test VALUES (?, ?, ?)").unwrap();
    stmt.bind(None::<i32>)
        .unwrap()
        .bind_blob(Some(&[]))
        .unwrap()
        .bind_null(ColumnType::MYSQL_TYPE_LONG)
        .unwrap();
    stmt.execute(&mut conn).unwrap();

    let mut expected = vec![0x17, 3, 0, 0, 0, 0x00, 1, 0, 0, 0];
    expected.extend_from_slice(&[0b0000_0101, 0x01, 0x06, 0x00, 0xfc, 0x00, 0x03, 0x00]);
    expected.push(0);
    assert!(contains(&written.borrow(), &framed(0, &expected)));
}

#[test]
fn unsigned_parameters_carry_the_unsigned_flag() {
    let mut script = Script::new(1);
    script.prepare_ok(4, 2, &[]);
    script.ok(1, 0);
    let (mut conn, written) = script.connect();

    let mut stmt = conn.prepare("INSERT INTO test VALUES (?, ?)").unwrap();
    stmt.bind(u64::MAX).unwrap().bind_int(-1).unwrap();
    stmt.execute(&mut conn).unwrap();

    let mut expected = vec![0x17, 4, 0, 0, 0, 0x00, 1, 0, 0, 0];
    expected.extend_from_slice(&[0b0000_0000, 0x01, 0x08, 0x80, 0x03, 0x00]);
    expected.extend_from_slice(&[0xFF; 8]);
    expected.extend_from_slice(&[0xFF; 4]);
    assert!(contains(&written.borrow(), &framed(0, &expected)));
}

#[test]
fn binding_errors() {
    let mut script = Script::new(1);
    script.prepare_ok(4, 2, &[]);
    let (mut conn, _) = script.connect();

    let mut stmt = conn.prepare(INSERT).unwrap();
    stmt.bind(Param::Int(1)).unwrap();
    assert!(matches!(
        stmt.execute(&mut conn),
        Err(Error::MissingParams { bound: 1, count: 2 })
    ));
    stmt.bind("x").unwrap();
    assert!(matches!(
        stmt.bind(2i64),
        Err(Error::BindOutOfBounds { index: 2, count: 2 })
    ));
}

#[test]
fn statement_on_another_connection() {
    let mut first = Script::new(1);
    first.prepare_ok(1, 1, &[]);
    first.ok(0, 0);
    let (mut conn1, _) = first.connect();
    let (mut conn2, _) = Script::new(2).connect();

    let mut stmt = conn1.prepare("DELETE FROM test WHERE id = ?").unwrap();
    stmt.bind(1i32).unwrap();
    assert!(matches!(
        stmt.execute(&mut conn2),
        Err(Error::ConnectionMismatch {
            expected: 1,
            actual: 2
        })
    ));

    let tx = conn1.begin().unwrap();
    assert!(matches!(
        tx.commit(&mut conn2),
        Err(Error::ConnectionMismatch {
            expected: 1,
            actual: 2
        })
    ));
}

#[test]
fn transaction_commit_and_rollback() {
    let mut script = Script::new(5);
    script.ok(0, 0);
    script.ok(0, 0);
    script.ok(0, 0);
    script.ok(0, 0);
    let (mut conn, written) = script.connect();

    let tx = conn.begin().unwrap();
    tx.commit(&mut conn).unwrap();
    let tx = conn.begin().unwrap();
    tx.rollback(&mut conn).unwrap();

    let written = written.borrow();
    assert!(contains(&written, b"\x03BEGIN"));
    assert!(contains(&written, b"\x03COMMIT"));
    assert!(contains(&written, b"\x03ROLLBACK"));
}

#[test]
fn close_sends_com_stmt_close() {
    let mut script = Script::new(1);
    script.prepare_ok(9, 0, &[]);
    let (mut conn, written) = script.connect();

    let stmt = conn.prepare("DO 1").unwrap();
    assert_eq!(stmt.sql(), "DO 1");
    stmt.close(&mut conn).unwrap();
    assert!(contains(&written.borrow(), &framed(0, &[0x19, 9, 0, 0, 0])));
}
