//! Binary protocol layouts that need more than a length prefix: the NULL
//! bitmap and the packed date/time structures.

use std::io::Write;

use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// DATE/DATETIME/TIMESTAMP - 4 bytes (date only)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Timestamp4 {
    pub year: U16LE,
    pub month: u8,
    pub day: u8,
}

/// DATE/DATETIME/TIMESTAMP - 7 bytes (without microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Timestamp7 {
    pub date: Timestamp4,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// DATE/DATETIME/TIMESTAMP - 11 bytes (with microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Timestamp11 {
    pub datetime: Timestamp7,
    pub microsecond: U32LE,
}

/// TIME - 8 bytes (without microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Time8 {
    pub is_negative: u8,
    pub days: U32LE,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// TIME - 12 bytes (with microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Time12 {
    pub time: Time8,
    pub microsecond: U32LE,
}

fn read_struct<T: FromBytes + KnownLayout + Immutable>(data: &[u8]) -> Result<&T> {
    T::ref_from_prefix(data)
        .map(|(value, _)| value)
        .map_err(|_| Error::UnexpectedEof)
}

/// Decode one binary temporal value and append its canonical text form to `out`
///
/// Returns the bytes following the value.
pub fn read_temporal<'a>(
    column_type: ColumnType,
    data: &'a [u8],
    out: &mut Vec<u8>,
) -> Result<&'a [u8]> {
    let (len, rest) = read_int_1(data)?;
    let len = usize::from(len);
    let (body, rest) = read_string_fix(rest, len)?;

    match column_type {
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => write_time(body, out)?,
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            write_date(body, out)?;
        }
        _ => {
            write_date(body, out)?;
            write_clock(body, out)?;
        }
    }
    Ok(rest)
}

fn write_date(body: &[u8], out: &mut Vec<u8>) -> Result<()> {
    if body.is_empty() {
        out.extend_from_slice(b"0000-00-00");
        return Ok(());
    }
    let date = read_struct::<Timestamp4>(body)?;
    write!(out, "{:04}-{:02}-{:02}", date.year.get(), date.month, date.day)?;
    Ok(())
}

fn write_clock(body: &[u8], out: &mut Vec<u8>) -> Result<()> {
    match body.len() {
        0 | 4 => out.extend_from_slice(b" 00:00:00"),
        7 => {
            let ts = read_struct::<Timestamp7>(body)?;
            write!(out, " {:02}:{:02}:{:02}", ts.hour, ts.minute, ts.second)?;
        }
        11 => {
            let ts = read_struct::<Timestamp11>(body)?;
            let clock = ts.datetime;
            write!(
                out,
                " {:02}:{:02}:{:02}.{:06}",
                clock.hour,
                clock.minute,
                clock.second,
                ts.microsecond.get()
            )?;
        }
        _ => return Err(Error::InvalidPacket),
    }
    Ok(())
}

fn write_time(body: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let (time, microsecond) = match body.len() {
        0 => {
            out.extend_from_slice(b"00:00:00");
            return Ok(());
        }
        8 => (*read_struct::<Time8>(body)?, None),
        12 => {
            let time = read_struct::<Time12>(body)?;
            (time.time, Some(time.microsecond.get()))
        }
        _ => return Err(Error::InvalidPacket),
    };

    if time.is_negative != 0 {
        out.push(b'-');
    }
    let hours = u64::from(time.days.get()) * 24 + u64::from(time.hour);
    write!(out, "{:02}:{:02}:{:02}", hours, time.minute, time.second)?;
    if let Some(microsecond) = microsecond {
        write!(out, ".{microsecond:06}")?;
    }
    Ok(())
}

/// NULL bitmap for the binary protocol
///
/// Result set rows shift the bitmap by 2 bits; statement parameters do not.
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a> {
    bitmap: &'a [u8],
    offset: usize,
}

impl<'a> NullBitmap<'a> {
    pub fn for_result_set(bitmap: &'a [u8]) -> Self {
        Self { bitmap, offset: 2 }
    }

    /// Number of bitmap bytes preceding the values of a row with `num_columns` columns
    pub fn result_set_len(num_columns: usize) -> usize {
        (num_columns + 7 + 2) >> 3
    }

    pub fn is_null(&self, idx: usize) -> bool {
        let bit_pos = idx + self.offset;
        match self.bitmap.get(bit_pos >> 3) {
            Some(byte) => byte & (1 << (bit_pos & 7)) != 0,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(column_type: ColumnType, data: &[u8]) -> String {
        let mut out = Vec::new();
        let rest = read_temporal(column_type, data, &mut out).unwrap();
        assert!(rest.is_empty());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn dates_and_datetimes() {
        assert_eq!(
            render(ColumnType::MYSQL_TYPE_DATE, &[4, 0xE8, 0x07, 2, 29]),
            "2024-02-29"
        );
        assert_eq!(
            render(ColumnType::MYSQL_TYPE_DATETIME, &[7, 0xE8, 0x07, 12, 31, 23, 59, 58]),
            "2024-12-31 23:59:58"
        );
        assert_eq!(
            render(
                ColumnType::MYSQL_TYPE_TIMESTAMP,
                &[11, 0xE8, 0x07, 1, 2, 3, 4, 5, 0x40, 0xE2, 0x01, 0x00]
            ),
            "2024-01-02 03:04:05.123456"
        );
        assert_eq!(render(ColumnType::MYSQL_TYPE_DATETIME, &[0]), "0000-00-00 00:00:00");
    }

    #[test]
    fn times() {
        assert_eq!(render(ColumnType::MYSQL_TYPE_TIME, &[0]), "00:00:00");
        assert_eq!(
            render(ColumnType::MYSQL_TYPE_TIME, &[8, 1, 1, 0, 0, 0, 2, 30, 0]),
            "-26:30:00"
        );
        assert_eq!(
            render(ColumnType::MYSQL_TYPE_TIME, &[12, 0, 0, 0, 0, 0, 10, 0, 1, 1, 0, 0, 0]),
            "10:00:01.000001"
        );
    }

    #[test]
    fn short_temporal_is_eof() {
        let mut out = Vec::new();
        assert!(matches!(
            read_temporal(ColumnType::MYSQL_TYPE_DATE, &[4, 0xE8], &mut out),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn null_bitmap_offsets() {
        // columns 0 and 6 are NULL: bits 2 and 8
        let bitmap = [0b0000_0100, 0b0000_0001];
        let nulls = NullBitmap::for_result_set(&bitmap);
        assert!(nulls.is_null(0));
        assert!(!nulls.is_null(1));
        assert!(nulls.is_null(6));
        assert_eq!(NullBitmap::result_set_len(6), 1);
        assert_eq!(NullBitmap::result_set_len(7), 2);
    }
}
