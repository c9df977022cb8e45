//! The driver surface over a scripted server

mod common;

use common::{Script, col, contains};
use mysql_rowset::constant::{ColumnType, ServerStatusFlags};
use mysql_rowset::driver::{self, DriverValue};
use mysql_rowset::error::Error;
use mysql_rowset::{Param, SqlResult};
use pretty_assertions::assert_eq;

#[test]
fn query_with_arguments_streams_rows() {
    let cols = [
        col("id", ColumnType::MYSQL_TYPE_LONGLONG),
        col("name", ColumnType::MYSQL_TYPE_VAR_STRING),
    ];
    let mut script = Script::new(1);
    script.prepare_ok(3, 1, &cols);
    script
        .result_header(&cols)
        .binary_row(&[Some(&1i64.to_le_bytes()[..]), Some(&b"\x01a"[..])])
        .binary_row(&[Some(&2i64.to_le_bytes()[..]), None])
        .end(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT);
    let (mut conn, written) = script.connect();

    {
        let mut rows =
            driver::query(&mut conn, "SELECT id, name FROM t WHERE id > ?", &[Param::from(0i64)])
                .unwrap();
        assert_eq!(rows.columns(), vec!["id", "name"]);

        let mut dest = vec![DriverValue::Null; 2];
        assert!(rows.next(&mut dest).unwrap());
        assert_eq!(dest, vec![DriverValue::Int(1), DriverValue::Text("a".to_string())]);
        assert!(rows.next(&mut dest).unwrap());
        assert_eq!(dest, vec![DriverValue::Int(2), DriverValue::Null]);
        assert!(!rows.next(&mut dest).unwrap());
        rows.close().unwrap();
    }

    assert!(written.borrow().ends_with(&[5, 0, 0, 0, 0x19, 3, 0, 0, 0]));
}

#[test]
fn destination_must_match_the_row() {
    let mut script = Script::new(1);
    script.text_result(
        &[col("a", ColumnType::MYSQL_TYPE_LONG)],
        &[vec![Some("1")]],
    );
    let (mut conn, _) = script.connect();

    let mut rows = driver::query(&mut conn, "SELECT 1", &[]).unwrap();
    let mut dest = vec![DriverValue::Null; 3];
    assert!(matches!(rows.next(&mut dest), Err(Error::BadUsageError(_))));
}

#[test]
fn exec_prepares_binds_and_closes() {
    let mut script = Script::new(1);
    script.prepare_ok(6, 2, &[]);
    script.ok(1, 99);
    script.ok(4, 0);
    let (mut conn, written) = script.connect();

    let result = driver::exec(
        &mut conn,
        "INSERT INTO t (a, b) VALUES (?, ?)",
        &[Param::from(5i32), Param::from("five")],
    )
    .unwrap();
    assert_eq!(result.rows_affected(), 1);
    assert_eq!(result.insert_id(), 99);
    assert!(written.borrow().ends_with(&[5, 0, 0, 0, 0x19, 6, 0, 0, 0]));

    let result = driver::exec(&mut conn, "DELETE FROM t", &[]).unwrap();
    assert_eq!(result.rows_affected(), 4);
    assert!(contains(&written.borrow(), b"\x03DELETE FROM t"));
}

#[test]
fn exec_with_too_many_arguments_still_closes() {
    let mut script = Script::new(1);
    script.prepare_ok(2, 1, &[]);
    let (mut conn, written) = script.connect();

    let err = driver::exec(
        &mut conn,
        "DELETE FROM t WHERE id = ?",
        &[Param::from(1i32), Param::from(2i32)],
    )
    .unwrap_err();
    assert!(matches!(err, Error::BindOutOfBounds { index: 1, count: 1 }));
    assert!(written.borrow().ends_with(&[5, 0, 0, 0, 0x19, 2, 0, 0, 0]));
}

#[test]
fn transaction_through_the_driver() {
    let mut script = Script::new(1);
    script.ok(0, 0);
    script.ok(0, 0);
    let (mut conn, written) = script.connect();

    let tx = driver::begin(&mut conn).unwrap();
    tx.rollback(&mut conn).unwrap();
    assert!(contains(&written.borrow(), b"\x03ROLLBACK"));
}
