use crate::constant::CommandByte;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, OkPayloadBytes};

/// Write COM_QUERY command
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// First packet of a COM_QUERY or COM_STMT_EXECUTE response
#[derive(Debug)]
pub enum QueryResponse<'a> {
    Ok(OkPayloadBytes<'a>),
    ResultSet { column_count: usize },
}

/// Read the first packet of a query response
///
/// - 0xFF: ERR packet
/// - 0x00: OK packet (no result set)
/// - 0xFB: LOCAL INFILE request (not supported)
/// - otherwise: column count of a result set
pub fn read_query_response(payload: &[u8]) -> Result<QueryResponse<'_>> {
    match payload.first() {
        None => Err(Error::InvalidPacket),
        Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
        Some(0x00) => Ok(QueryResponse::Ok(OkPayloadBytes(payload))),
        Some(0xFB) => Err(Error::BadUsageError(
            "LOAD DATA LOCAL INFILE is not supported".to_string(),
        )),
        Some(_) => {
            let (column_count, _rest) = read_int_lenenc(payload)?;
            let column_count = usize::try_from(column_count).map_err(|_| Error::InvalidPacket)?;
            Ok(QueryResponse::ResultSet { column_count })
        }
    }
}
