use crate::constant::ServerStatusFlags;
use crate::error::{Error, Result};
use crate::protocol::packet::MAX_PAYLOAD_LENGTH;
use crate::protocol::primitive::*;

/// OK packet payload (header `0x00`, or `0xFE` when it terminates a result set)
#[derive(Debug, Clone, Copy)]
pub struct OkPayloadBytes<'a>(pub &'a [u8]);

/// ERR packet payload (header `0xFF`)
#[derive(Debug, Clone, Copy)]
pub struct ErrPayloadBytes<'a>(pub &'a [u8]);

/// Classification of a packet received while reading rows
#[derive(Debug, Clone, Copy)]
pub enum RowPacket<'a> {
    Row(&'a [u8]),
    End(OkPayloadBytes<'a>),
}

/// Split a packet read in the row phase into row data, terminator or error
///
/// A row never starts with `0xFF`. A row may start with `0xFE` only when its first
/// cell is at least 16MB long, which makes the packet itself maximal in length.
pub fn classify_row_packet(payload: &[u8]) -> Result<RowPacket<'_>> {
    match payload.first() {
        None => Err(Error::InvalidPacket),
        Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
        Some(0xFE) if payload.len() < MAX_PAYLOAD_LENGTH => Ok(RowPacket::End(OkPayloadBytes(payload))),
        Some(_) => Ok(RowPacket::Row(payload)),
    }
}

/// OK packet response
#[derive(Debug, Clone)]
pub struct OkPayload {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
}

impl OkPayload {
    pub fn more_results(&self) -> bool {
        self.status_flags
            .contains(ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS)
    }

    /// Parse a legacy EOF packet (`0xFE`, warnings, status), sent in place of
    /// the terminating OK when CLIENT_DEPRECATE_EOF was not negotiated
    pub fn from_eof(bytes: OkPayloadBytes<'_>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        if header != 0xFE {
            return Err(Error::InvalidPacket);
        }
        let (warnings, rest) = read_int_2(data)?;
        let (status_flags, _rest) = read_int_2(rest)?;
        Ok(OkPayload {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
            warnings,
        })
    }
}

impl TryFrom<OkPayloadBytes<'_>> for OkPayload {
    type Error = Error;

    fn try_from(bytes: OkPayloadBytes<'_>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        if header != 0x00 && header != 0xFE {
            return Err(Error::InvalidPacket);
        }

        let (affected_rows, rest) = read_int_lenenc(data)?;
        let (last_insert_id, rest) = read_int_lenenc(rest)?;
        let (status_flags, rest) = read_int_2(rest)?;
        let (warnings, _info) = read_int_2(rest)?;

        Ok(OkPayload {
            affected_rows,
            last_insert_id,
            status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
            warnings,
        })
    }
}

/// ERR packet response
#[derive(Debug, Clone, thiserror::Error)]
#[error("ERROR {} ({}): {}", self.error_code, self.sql_state, self.message)]
pub struct ErrPayload {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

impl TryFrom<ErrPayloadBytes<'_>> for ErrPayload {
    type Error = Error;

    fn try_from(bytes: ErrPayloadBytes<'_>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        if header != 0xFF {
            return Err(Error::InvalidPacket);
        }

        let (error_code, data) = read_int_2(data)?;

        let (sql_state, message) = match data.split_first() {
            Some((b'#', rest)) => {
                let (state, message) = read_string_fix(rest, 5)?;
                (String::from_utf8_lossy(state).into_owned(), message)
            }
            _ => (String::new(), data),
        };

        Ok(ErrPayload {
            error_code,
            sql_state,
            message: String::from_utf8_lossy(message).into_owned(),
        })
    }
}
