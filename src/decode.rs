//! Row decoding for both result set encodings.
//!
//! Decoding appends the cell bytes of one row to a caller-owned arena and
//! records one [`Span`] per column. It never performs I/O and reserves the
//! arena once per row, so a row costs at most one allocation (none once the
//! arena has grown to fit).

use crate::constant::BinaryLayout;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::protocol::binary::{NullBitmap, read_temporal};
use crate::protocol::primitive::*;
use crate::row::Span;
use crate::value::Protocol;

/// Upper bound on the rendered text of one binary temporal value
const TEMPORAL_TEXT_MAX: usize = 32;

/// Decode one row packet, appending to `bytes` and `cells`
///
/// On failure both buffers are restored to their previous lengths.
pub(crate) fn decode_row(
    protocol: Protocol,
    payload: &[u8],
    fields: &[Field],
    bytes: &mut Vec<u8>,
    cells: &mut Vec<Span>,
) -> Result<()> {
    let bytes_len = bytes.len();
    let cells_len = cells.len();
    let result = match protocol {
        Protocol::Text => decode_text_row(payload, fields.len(), bytes, cells),
        Protocol::Binary => decode_binary_row(payload, fields, bytes, cells),
    };
    if result.is_err() {
        bytes.truncate(bytes_len);
        cells.truncate(cells_len);
    }
    result
}

/// Text protocol row: one length-encoded string (or `0xFB` for NULL) per column
pub(crate) fn decode_text_row(
    payload: &[u8],
    num_columns: usize,
    bytes: &mut Vec<u8>,
    cells: &mut Vec<Span>,
) -> Result<()> {
    bytes.reserve(payload.len());
    cells.reserve(num_columns);

    let mut data = payload;
    for _ in 0..num_columns {
        let (cell, rest) = read_text_cell(data)?;
        data = rest;
        cells.push(cell.map(|value| push_bytes(bytes, value)));
    }
    if !data.is_empty() {
        return Err(Error::InvalidPacket);
    }
    Ok(())
}

/// Binary protocol row: `0x00`, NULL bitmap, then the non-NULL values in column order
pub(crate) fn decode_binary_row(
    payload: &[u8],
    fields: &[Field],
    bytes: &mut Vec<u8>,
    cells: &mut Vec<Span>,
) -> Result<()> {
    let (header, data) = read_int_1(payload)?;
    if header != 0x00 {
        return Err(Error::InvalidPacket);
    }
    let (bitmap, mut data) = read_string_fix(data, NullBitmap::result_set_len(fields.len()))?;
    let null_bitmap = NullBitmap::for_result_set(bitmap);

    let temporal_columns = fields
        .iter()
        .filter(|field| field.column_type().binary_layout() == BinaryLayout::Temporal)
        .count();
    bytes.reserve(data.len() + temporal_columns * TEMPORAL_TEXT_MAX);
    cells.reserve(fields.len());

    for (idx, field) in fields.iter().enumerate() {
        if null_bitmap.is_null(idx) {
            cells.push(None);
            continue;
        }
        let span = match field.column_type().binary_layout() {
            BinaryLayout::Empty => None,
            BinaryLayout::Fixed(width) => {
                let (value, rest) = read_string_fix(data, width)?;
                data = rest;
                Some(push_bytes(bytes, value))
            }
            BinaryLayout::LengthEncoded => {
                let (value, rest) = read_string_lenenc(data)?;
                data = rest;
                Some(push_bytes(bytes, value))
            }
            BinaryLayout::Temporal => {
                let start = bytes.len();
                data = read_temporal(field.column_type(), data, bytes)?;
                Some((start, bytes.len()))
            }
        };
        cells.push(span);
    }
    if !data.is_empty() {
        return Err(Error::InvalidPacket);
    }
    Ok(())
}

fn push_bytes(bytes: &mut Vec<u8>, value: &[u8]) -> (usize, usize) {
    let start = bytes.len();
    bytes.extend_from_slice(value);
    (start, bytes.len())
}
