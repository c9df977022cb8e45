//! Prepared statements and the parameter binder.
//!
//! Parameters are bound left to right. Each bind encodes its value straight
//! into the statement's buffer in binary protocol form, so the caller's data is
//! copied at bind time and may be dropped before execution. [`Stmt::clean_bind`]
//! rewinds to the first slot and keeps the buffer's capacity for the next round.
//!
//! NULL rule: `None` binds NULL; a present value of zero length binds an empty
//! string or blob.

use std::io::{Read, Write};
use std::ops::Range;
use std::sync::Arc;

use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::param::Param;
use crate::protocol::command::prepared::ParamWire;
use crate::protocol::primitive::write_bytes_lenenc;
use crate::reader::DataReader;
use crate::result::ExecResult;
use crate::sync::{Conn, RawResult, RawStmt};
use crate::table::DataTable;
use crate::value::Protocol;

/// One bound placeholder
#[derive(Debug, Clone)]
struct BindSlot {
    column_type: ColumnType,
    unsigned: bool,
    /// Encoded value inside the statement buffer, `None` for NULL
    value: Option<Range<usize>>,
}

/// A statement prepared on one connection
///
/// Executions and [`close`](Self::close) take that connection; passing another one
/// fails with [`Error::ConnectionMismatch`]. Closing the connection invalidates the
/// statement.
#[derive(Debug)]
pub struct Stmt {
    connection_id: u64,
    statement_id: u32,
    sql: Arc<str>,
    param_count: usize,
    fields: Arc<[Field]>,
    slots: Vec<BindSlot>,
    buffer: Vec<u8>,
}

impl Stmt {
    pub(crate) fn new(connection_id: u64, raw: RawStmt, sql: &str) -> Self {
        Self {
            connection_id,
            statement_id: raw.statement_id,
            sql: Arc::from(sql),
            param_count: raw.param_count,
            fields: raw.fields,
            slots: Vec::with_capacity(raw.param_count),
            buffer: Vec::new(),
        }
    }

    /// Number of placeholders
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Columns of the statement's result set, empty if it returns no rows
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement_id(&self) -> u32 {
        self.statement_id
    }

    /// Number of placeholders bound so far
    pub fn bound(&self) -> usize {
        self.slots.len()
    }

    fn push(
        &mut self,
        column_type: ColumnType,
        unsigned: bool,
        encode: Option<impl FnOnce(&mut Vec<u8>)>,
    ) -> Result<&mut Self> {
        if self.slots.len() >= self.param_count {
            return Err(Error::BindOutOfBounds {
                index: self.slots.len(),
                count: self.param_count,
            });
        }
        let value = encode.map(|encode| {
            let start = self.buffer.len();
            encode(&mut self.buffer);
            start..self.buffer.len()
        });
        self.slots.push(BindSlot {
            column_type,
            unsigned,
            value,
        });
        Ok(self)
    }

    fn push_le(
        &mut self,
        column_type: ColumnType,
        unsigned: bool,
        bytes: &[u8],
    ) -> Result<&mut Self> {
        self.push(
            column_type,
            unsigned,
            Some(|buffer: &mut Vec<u8>| buffer.extend_from_slice(bytes)),
        )
    }

    pub fn bind_tiny_int(&mut self, value: i8) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_TINY, false, &value.to_le_bytes())
    }

    pub fn bind_small_int(&mut self, value: i16) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_SHORT, false, &value.to_le_bytes())
    }

    pub fn bind_int(&mut self, value: i32) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_LONG, false, &value.to_le_bytes())
    }

    pub fn bind_big_int(&mut self, value: i64) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_LONGLONG, false, &value.to_le_bytes())
    }

    pub fn bind_float(&mut self, value: f32) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_FLOAT, false, &value.to_le_bytes())
    }

    pub fn bind_double(&mut self, value: f64) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_DOUBLE, false, &value.to_le_bytes())
    }

    /// Bind an unsigned TINYINT
    pub fn bind_unsigned_tiny_int(&mut self, value: u8) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_TINY, true, &value.to_le_bytes())
    }

    pub fn bind_unsigned_small_int(&mut self, value: u16) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_SHORT, true, &value.to_le_bytes())
    }

    pub fn bind_unsigned_int(&mut self, value: u32) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_LONG, true, &value.to_le_bytes())
    }

    pub fn bind_unsigned_big_int(&mut self, value: u64) -> Result<&mut Self> {
        self.push_le(ColumnType::MYSQL_TYPE_LONGLONG, true, &value.to_le_bytes())
    }

    /// Bind a string, sent as VAR_STRING with its byte length
    pub fn bind_text(&mut self, value: &str) -> Result<&mut Self> {
        self.push(
            ColumnType::MYSQL_TYPE_VAR_STRING,
            false,
            Some(|buffer: &mut Vec<u8>| write_bytes_lenenc(buffer, value.as_bytes())),
        )
    }

    /// Bind bytes as a BLOB; `None` binds NULL
    pub fn bind_blob(&mut self, value: Option<&[u8]>) -> Result<&mut Self> {
        self.push(
            ColumnType::MYSQL_TYPE_BLOB,
            false,
            value.map(|value| move |buffer: &mut Vec<u8>| write_bytes_lenenc(buffer, value)),
        )
    }

    /// Bind NULL, sent with `column_type`
    pub fn bind_null(&mut self, column_type: ColumnType) -> Result<&mut Self> {
        self.push(column_type, false, None::<fn(&mut Vec<u8>)>)
    }

    /// Bind any supported value by dispatching on its kind
    pub fn bind<'a>(&mut self, value: impl Into<Param<'a>>) -> Result<&mut Self> {
        match value.into() {
            Param::TinyInt(value) => self.bind_tiny_int(value),
            Param::SmallInt(value) => self.bind_small_int(value),
            Param::Int(value) => self.bind_int(value),
            Param::BigInt(value) => self.bind_big_int(value),
            Param::UTinyInt(value) => self.bind_unsigned_tiny_int(value),
            Param::USmallInt(value) => self.bind_unsigned_small_int(value),
            Param::UInt(value) => self.bind_unsigned_int(value),
            Param::UBigInt(value) => self.bind_unsigned_big_int(value),
            Param::Float(value) => self.bind_float(value),
            Param::Double(value) => self.bind_double(value),
            Param::Text(value) => self.bind_text(value),
            Param::Blob(value) => self.bind_blob(value),
            Param::Null(column_type) => self.bind_null(column_type),
        }
    }

    /// Forget every bound value and start again at the first placeholder
    pub fn clean_bind(&mut self) -> &mut Self {
        self.slots.clear();
        self.buffer.clear();
        self
    }

    fn check_connection<S: Read + Write>(&self, conn: &Conn<S>) -> Result<()> {
        let actual = conn.connection_id();
        if self.connection_id != actual {
            return Err(Error::ConnectionMismatch {
                expected: self.connection_id,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn raw_execute<S: Read + Write>(&self, conn: &mut Conn<S>) -> Result<RawResult> {
        self.check_connection(conn)?;
        if self.slots.len() != self.param_count {
            return Err(Error::MissingParams {
                bound: self.slots.len(),
                count: self.param_count,
            });
        }
        let buffer = &self.buffer;
        let params = self.slots.iter().map(move |slot| ParamWire {
            column_type: slot.column_type,
            unsigned: slot.unsigned,
            encoded: slot.value.clone().and_then(|range| buffer.get(range)),
        });
        conn.raw_stmt_execute(self.statement_id, params, &self.sql)
    }

    /// Execute with the bound values and report affected rows and the insert id
    pub fn execute<S: Read + Write>(&self, conn: &mut Conn<S>) -> Result<ExecResult> {
        let raw = self.raw_execute(conn)?;
        conn.finish_exec(raw)
    }

    /// Execute with the bound values and buffer every row
    pub fn query_table<S: Read + Write>(&self, conn: &mut Conn<S>) -> Result<DataTable> {
        let raw = self.raw_execute(conn)?;
        DataTable::fill(conn, raw, Protocol::Binary)
    }

    /// Execute with the bound values and stream the rows
    pub fn query_reader<'c, S: Read + Write>(
        &self,
        conn: &'c mut Conn<S>,
    ) -> Result<DataReader<'c, S>> {
        let raw = self.raw_execute(conn)?;
        Ok(DataReader::open(conn, raw, Protocol::Binary))
    }

    /// Deallocate the statement on the server
    pub fn close<S: Read + Write>(self, conn: &mut Conn<S>) -> Result<()> {
        self.check_connection(conn)?;
        conn.raw_close_stmt(self.statement_id)
    }

    /// Parameters as they will be sent, for inspection in tests
    #[cfg(test)]
    fn wire(&self) -> Vec<(ColumnType, Option<&[u8]>)> {
        self.slots
            .iter()
            .map(|slot| {
                (
                    slot.column_type,
                    slot.value.clone().and_then(|range| self.buffer.get(range)),
                )
            })
            .collect()
    }
}
