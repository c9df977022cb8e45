use crate::error::{Error, Result};
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};

/// Length-encoded marker for a NULL column in a text protocol row
pub const LENENC_NULL: u8 = 0xFB;

fn split(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::UnexpectedEof);
    }
    Ok(data.split_at(len))
}

/// Read 1-byte integer
pub fn read_int_1(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&first, rest)) => Ok((first, rest)),
        None => Err(Error::UnexpectedEof),
    }
}

/// Read 2-byte little-endian integer
pub fn read_int_2(data: &[u8]) -> Result<(u16, &[u8])> {
    let (head, rest) = split(data, 2)?;
    let value = U16LE::read_from_bytes(head).map_err(|_| Error::InvalidPacket)?;
    Ok((value.get(), rest))
}

/// Read 3-byte little-endian integer
pub fn read_int_3(data: &[u8]) -> Result<(u32, &[u8])> {
    let (head, rest) = split(data, 3)?;
    let mut bytes = [0u8; 4];
    bytes[..3].copy_from_slice(head);
    Ok((u32::from_le_bytes(bytes), rest))
}

/// Read 4-byte little-endian integer
pub fn read_int_4(data: &[u8]) -> Result<(u32, &[u8])> {
    let (head, rest) = split(data, 4)?;
    let value = U32LE::read_from_bytes(head).map_err(|_| Error::InvalidPacket)?;
    Ok((value.get(), rest))
}

/// Read 8-byte little-endian integer
pub fn read_int_8(data: &[u8]) -> Result<(u64, &[u8])> {
    let (head, rest) = split(data, 8)?;
    let value = U64LE::read_from_bytes(head).map_err(|_| Error::InvalidPacket)?;
    Ok((value.get(), rest))
}

/// Read length-encoded integer
pub fn read_int_lenenc(data: &[u8]) -> Result<(u64, &[u8])> {
    let (first, rest) = read_int_1(data)?;
    match first {
        0xFC => read_int_2(rest).map(|(v, rest)| (u64::from(v), rest)),
        0xFD => read_int_3(rest).map(|(v, rest)| (u64::from(v), rest)),
        0xFE => read_int_8(rest),
        // 0xFB is NULL and 0xFF is an error header; neither is a valid integer
        0xFB | 0xFF => Err(Error::InvalidPacket),
        val => Ok((u64::from(val), rest)),
    }
}

/// Read fixed-length string
pub fn read_string_fix(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    split(data, len)
}

/// Read null-terminated string
pub fn read_string_null(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnexpectedEof)?;
    Ok((&data[..nul], &data[nul + 1..]))
}

/// Read length-encoded string
pub fn read_string_lenenc(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_int_lenenc(data)?;
    let len = usize::try_from(len).map_err(|_| Error::InvalidPacket)?;
    read_string_fix(rest, len)
}

/// Read a text protocol cell: `None` for the NULL marker, otherwise a length-encoded string
pub fn read_text_cell(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    match data.first() {
        Some(&LENENC_NULL) => Ok((None, &data[1..])),
        Some(_) => read_string_lenenc(data).map(|(bytes, rest)| (Some(bytes), rest)),
        None => Err(Error::UnexpectedEof),
    }
}

/// Write 1-byte integer
pub fn write_int_1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte little-endian integer
pub fn write_int_2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 3-byte little-endian integer
pub fn write_int_3(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Write 4-byte little-endian integer
pub fn write_int_4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 8-byte little-endian integer
pub fn write_int_8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write length-encoded integer
pub fn write_int_lenenc(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xFC);
        write_int_2(out, value as u16);
    } else if value < (1 << 24) {
        out.push(0xFD);
        write_int_3(out, value as u32);
    } else {
        out.push(0xFE);
        write_int_8(out, value);
    }
}

/// Write null-terminated string
pub fn write_string_null(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Write length-encoded bytes
pub fn write_bytes_lenenc(out: &mut Vec<u8>, data: &[u8]) {
    write_int_lenenc(out, data.len() as u64);
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenenc_int_boundaries() {
        for value in [0u64, 250, 251, 0xFFFF, 0x10000, 0xFF_FFFF, 0x100_0000, u64::MAX] {
            let mut out = Vec::new();
            write_int_lenenc(&mut out, value);
            let (decoded, rest) = read_int_lenenc(&out).unwrap();
            assert_eq!(decoded, value);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn lenenc_null_marker_is_not_an_integer() {
        assert!(matches!(read_int_lenenc(&[0xFB]), Err(Error::InvalidPacket)));
    }

    #[test]
    fn short_reads_are_eof() {
        assert!(matches!(read_int_4(&[1, 2, 3]), Err(Error::UnexpectedEof)));
        assert!(matches!(read_string_lenenc(&[5, b'a']), Err(Error::UnexpectedEof)));
        assert!(matches!(read_string_null(b"abc"), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn text_cells() {
        let data = [0xFB, 2, b'4', b'2'];
        let (first, rest) = read_text_cell(&data).unwrap();
        assert_eq!(first, None);
        let (second, rest) = read_text_cell(rest).unwrap();
        assert_eq!(second, Some(&b"42"[..]));
        assert!(rest.is_empty());
    }
}
