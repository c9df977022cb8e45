use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{ColumnType, CommandByte};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use crate::protocol::response::ErrPayloadBytes;

/// Prepared statement OK response (zero-copy)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct PrepareOk {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

impl PrepareOk {
    pub fn statement_id(&self) -> u32 {
        self.statement_id.get()
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns.get()
    }

    pub fn num_params(&self) -> u16 {
        self.num_params.get()
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count.get()
    }
}

/// Write COM_STMT_PREPARE command
pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Read COM_STMT_PREPARE response
pub fn read_prepare_ok(payload: &[u8]) -> Result<&PrepareOk> {
    let (status, data) = read_int_1(payload)?;
    match status {
        0x00 => {
            let (ok, _rest) = PrepareOk::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;
            Ok(ok)
        }
        0xFF => Err(ErrPayloadBytes(payload).into()),
        _ => Err(Error::InvalidPacket),
    }
}

/// One parameter as it goes over the wire in COM_STMT_EXECUTE
///
/// `encoded` is `None` for NULL; otherwise it holds the value already in its
/// binary protocol form (little-endian fixed width, or length-encoded bytes).
#[derive(Debug, Clone, Copy)]
pub struct ParamWire<'a> {
    pub column_type: ColumnType,
    pub unsigned: bool,
    pub encoded: Option<&'a [u8]>,
}

/// Write COM_STMT_EXECUTE command
pub fn write_execute<'a>(
    out: &mut Vec<u8>,
    statement_id: u32,
    params: impl ExactSizeIterator<Item = ParamWire<'a>> + Clone,
) {
    write_int_1(out, CommandByte::StmtExecute as u8);
    write_int_4(out, statement_id);
    // CURSOR_TYPE_NO_CURSOR
    write_int_1(out, 0x00);
    // iteration count
    write_int_4(out, 1);

    let num_params = params.len();
    if num_params == 0 {
        return;
    }

    let bitmap_start = out.len();
    out.resize(bitmap_start + num_params.div_ceil(8), 0);
    for (idx, param) in params.clone().enumerate() {
        if param.encoded.is_none() {
            out[bitmap_start + (idx >> 3)] |= 1 << (idx & 7);
        }
    }

    // new-params-bound-flag
    write_int_1(out, 0x01);
    for param in params.clone() {
        write_int_1(out, param.column_type as u8);
        write_int_1(out, if param.unsigned { 0x80 } else { 0x00 });
    }

    for param in params {
        if let Some(encoded) = param.encoded {
            out.extend_from_slice(encoded);
        }
    }
}

/// Write COM_STMT_CLOSE command
pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtClose as u8);
    write_int_4(out, statement_id);
}
