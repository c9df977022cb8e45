//! A generic database-access surface over [`Conn`].
//!
//! Statements with arguments are prepared, bound positionally and closed again
//! after use; statements without arguments go through the text protocol. Rows
//! come back as owned [`DriverValue`]s, one per column.

use std::io::{Read, Write};

use tracing::warn;

use crate::error::{Error, Result};
use crate::param::Param;
use crate::reader::DataReader;
use crate::result::{ExecResult, QueryResult};
use crate::stmt::Stmt;
use crate::sync::{Conn, Stream};
use crate::value::{NaturalValue, Protocol};

pub use crate::sync::Transaction as Tx;

/// An owned cell in its natural representation
#[derive(Debug, Clone, PartialEq)]
pub enum DriverValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<NaturalValue<'_>> for DriverValue {
    fn from(value: NaturalValue<'_>) -> Self {
        match value {
            NaturalValue::Null => DriverValue::Null,
            NaturalValue::Int(value) => DriverValue::Int(value),
            NaturalValue::UInt(value) => DriverValue::UInt(value),
            NaturalValue::Float(value) => DriverValue::Float(value),
            NaturalValue::Text(value) => DriverValue::Text(value.to_string()),
            NaturalValue::Bytes(value) => DriverValue::Bytes(value.to_vec()),
        }
    }
}

/// Connect using a `mysql://` URL
pub fn open(url: &str) -> Result<Conn> {
    Conn::new(url)
}

/// Start a transaction
pub fn begin<S: Read + Write>(conn: &mut Conn<S>) -> Result<Tx> {
    conn.begin()
}

fn bind_all(stmt: &mut Stmt, args: &[Param<'_>]) -> Result<()> {
    stmt.clean_bind();
    for arg in args {
        stmt.bind(*arg)?;
    }
    Ok(())
}

/// Close `stmt`, keeping `result` as the outcome and only logging a close failure
/// when `result` is already an error
fn close_after<T, S: Read + Write>(
    stmt: Stmt,
    conn: &mut Conn<S>,
    result: Result<T>,
) -> Result<T> {
    let closed = stmt.close(conn);
    match (result, closed) {
        (Ok(value), closed) => closed.map(|()| value),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "failed to close statement");
            Err(err)
        }
    }
}

/// Execute `sql` with positional `args`
pub fn exec<S: Read + Write>(
    conn: &mut Conn<S>,
    sql: &str,
    args: &[Param<'_>],
) -> Result<ExecResult> {
    if args.is_empty() {
        return conn.execute(sql);
    }
    let mut stmt = conn.prepare(sql)?;
    let result = bind_all(&mut stmt, args).and_then(|()| stmt.execute(conn));
    close_after(stmt, conn, result)
}

/// Run `sql` with positional `args` and stream its rows
pub fn query<'c, S: Read + Write>(
    conn: &'c mut Conn<S>,
    sql: &str,
    args: &[Param<'_>],
) -> Result<Rows<'c, S>> {
    if args.is_empty() {
        let reader = conn.query_reader(sql)?;
        return Ok(Rows { reader, stmt: None });
    }

    let mut stmt = conn.prepare(sql)?;
    if let Err(err) = bind_all(&mut stmt, args) {
        return close_after(stmt, conn, Err(err));
    }
    let raw = match stmt.raw_execute(conn) {
        Ok(raw) => raw,
        Err(err) => return close_after(stmt, conn, Err(err)),
    };
    // the reader takes the connection, so the statement is closed with the rows
    Ok(Rows {
        reader: DataReader::open(conn, raw, Protocol::Binary),
        stmt: Some(stmt),
    })
}

/// Execute a prepared statement with a fresh set of arguments
pub fn stmt_exec<S: Read + Write>(
    stmt: &mut Stmt,
    conn: &mut Conn<S>,
    args: &[Param<'_>],
) -> Result<ExecResult> {
    bind_all(stmt, args)?;
    stmt.execute(conn)
}

/// Query a prepared statement with a fresh set of arguments
pub fn stmt_query<'c, S: Read + Write>(
    stmt: &mut Stmt,
    conn: &'c mut Conn<S>,
    args: &[Param<'_>],
) -> Result<Rows<'c, S>> {
    bind_all(stmt, args)?;
    let reader = stmt.query_reader(conn)?;
    Ok(Rows { reader, stmt: None })
}

/// Rows of a [`query`], read one at a time
pub struct Rows<'c, S: Read + Write = Stream> {
    reader: DataReader<'c, S>,
    /// Statement prepared for this query, closed together with the rows
    stmt: Option<Stmt>,
}

impl<S: Read + Write> Rows<'_, S> {
    pub fn columns(&self) -> Vec<&str> {
        self.reader.fields().iter().map(|field| field.name()).collect()
    }

    /// Fill `dest` with the next row; `false` once the rows are exhausted
    pub fn next(&mut self, dest: &mut [DriverValue]) -> Result<bool> {
        let Some(row) = self.reader.fetch_next()? else {
            return Ok(false);
        };
        if dest.len() != row.len() {
            return Err(Error::BadUsageError(format!(
                "destination holds {} values but the row has {} columns",
                dest.len(),
                row.len()
            )));
        }
        for (slot, value) in dest.iter_mut().zip(row.iter()) {
            *slot = value.natural()?.into();
        }
        Ok(true)
    }

    /// Release the rows and the statement behind them
    pub fn close(&mut self) -> Result<()> {
        let closed = self.reader.close();
        match self.stmt.take() {
            Some(stmt) => close_after(stmt, self.reader.conn_mut(), closed),
            None => closed,
        }
    }
}

impl<S: Read + Write> Drop for Rows<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close rows");
        }
    }
}
