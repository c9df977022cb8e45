//! A single decoded cell and its conversions.
//!
//! A [`Value`] is a borrowed view: the bytes live in the arena of the row that
//! produced it and the metadata lives in the result's [`Field`] list.
//!
//! Conversion rules depend on the protocol the row arrived in:
//!
//! | column type                  | text protocol  | binary protocol            |
//! |------------------------------|----------------|----------------------------|
//! | TINY/SHORT/YEAR/INT24/LONG   | decimal digits | 1/2/2/4/4 bytes LE         |
//! | LONGLONG                     | decimal digits | 8 bytes LE                 |
//! | FLOAT / DOUBLE               | decimal text   | 4 / 8 bytes IEEE-754 LE    |
//! | DECIMAL / NEWDECIMAL         | decimal text   | decimal text               |
//! | DATE/TIME/DATETIME/TIMESTAMP | canonical text | rendered to canonical text |
//! | everything else              | raw bytes      | raw bytes                  |

use std::borrow::Cow;

use simdutf8::basic::from_utf8;

use crate::constant::{ColumnType, NaturalKind};
use crate::error::{Error, Result};
use crate::field::Field;

/// Row encoding a value was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// COM_QUERY results: every cell is text
    Text,
    /// COM_STMT_EXECUTE results: numeric cells are fixed-width binary
    Binary,
}

/// The representation a value converts to without being asked for a specific type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NaturalValue<'a> {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(&'a str),
    Bytes(&'a [u8]),
}

/// One decoded cell
#[derive(Debug, Clone, Copy)]
pub struct Value<'a> {
    field: &'a Field,
    protocol: Protocol,
    raw: Option<&'a [u8]>,
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol
            && self.field.column_type() == other.field.column_type()
            && self.raw == other.raw
    }
}

impl<'a> Value<'a> {
    /// `raw` is `None` for SQL NULL
    pub fn new(field: &'a Field, protocol: Protocol, raw: Option<&'a [u8]>) -> Self {
        Self {
            field,
            protocol,
            raw,
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    pub fn field(&self) -> &'a Field {
        self.field
    }

    pub fn column_type(&self) -> ColumnType {
        self.field.column_type()
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The stored bytes, `None` for NULL
    pub fn bytes(&self) -> Option<&'a [u8]> {
        self.raw
    }

    fn non_null(&self, requested: &'static str) -> Result<&'a [u8]> {
        self.raw
            .ok_or_else(|| Error::conversion(self.column_type(), requested, "value is NULL"))
    }

    fn is_binary_integer(&self) -> bool {
        self.protocol == Protocol::Binary && self.column_type().is_integer()
    }

    /// Decode a binary protocol integer, widening by the column's signedness
    fn binary_integer(&self, raw: &[u8]) -> Result<i128> {
        let width = match self.column_type() {
            ColumnType::MYSQL_TYPE_TINY => 1,
            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => 2,
            ColumnType::MYSQL_TYPE_INT24 | ColumnType::MYSQL_TYPE_LONG => 4,
            _ => 8,
        };
        if raw.len() < width {
            return Err(Error::UnexpectedEof);
        }
        if raw.len() > width {
            return Err(Error::InvalidPacket);
        }

        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(raw);
        let unsigned = u64::from_le_bytes(buf);
        if self.field.is_unsigned() {
            return Ok(i128::from(unsigned));
        }
        // sign-extend from `width` bytes
        let shift = 64 - width * 8;
        Ok(i128::from(((unsigned << shift) as i64) >> shift))
    }

    fn parse_text<T: std::str::FromStr>(&self, raw: &[u8], requested: &'static str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let text = from_utf8(raw)
            .map_err(|_| Error::conversion(self.column_type(), requested, "not valid UTF-8"))?;
        text.trim()
            .parse::<T>()
            .map_err(|e| Error::conversion(self.column_type(), requested, format!("{text:?}: {e}")))
    }

    /// Integer conversions share this: binary integers decode, decimals and text parse
    fn integer(&self, requested: &'static str) -> Result<i128> {
        let raw = self.non_null(requested)?;
        if self.is_binary_integer() {
            return self.binary_integer(raw);
        }
        if self.protocol == Protocol::Binary && !self.column_type().is_decimal() {
            return Err(Error::conversion(
                self.column_type(),
                requested,
                "column is not an integer type",
            ));
        }
        self.parse_text::<i128>(raw, requested)
    }

    fn narrow<T: TryFrom<i128>>(&self, value: i128, requested: &'static str) -> Result<T> {
        T::try_from(value).map_err(|_| {
            Error::conversion(self.column_type(), requested, format!("{value} is out of range"))
        })
    }

    pub fn i8(&self) -> Result<i8> {
        self.narrow(self.integer("i8")?, "i8")
    }

    pub fn i16(&self) -> Result<i16> {
        self.narrow(self.integer("i16")?, "i16")
    }

    pub fn i32(&self) -> Result<i32> {
        self.narrow(self.integer("i32")?, "i32")
    }

    pub fn i64(&self) -> Result<i64> {
        self.narrow(self.integer("i64")?, "i64")
    }

    pub fn u64(&self) -> Result<u64> {
        self.narrow(self.integer("u64")?, "u64")
    }

    pub fn f64(&self) -> Result<f64> {
        let raw = self.non_null("f64")?;
        if self.protocol == Protocol::Text || self.column_type().is_decimal() {
            return self.parse_text::<f64>(raw, "f64");
        }
        match self.column_type() {
            ColumnType::MYSQL_TYPE_FLOAT => {
                let bytes: [u8; 4] = fixed(raw)?;
                Ok(f64::from(f32::from_le_bytes(bytes)))
            }
            ColumnType::MYSQL_TYPE_DOUBLE => {
                let bytes: [u8; 8] = fixed(raw)?;
                Ok(f64::from_le_bytes(bytes))
            }
            ty if ty.is_integer() => Ok(self.binary_integer(raw)? as f64),
            ty => Err(Error::conversion(ty, "f64", "column is not a numeric type")),
        }
    }

    pub fn f32(&self) -> Result<f32> {
        let value = self.f64()?;
        let narrowed = value as f32;
        if value.is_finite() && !narrowed.is_finite() {
            return Err(Error::conversion(
                self.column_type(),
                "f32",
                format!("{value} is out of range"),
            ));
        }
        Ok(narrowed)
    }

    /// Text form of the value; numbers in binary rows are formatted
    pub fn as_str(&self) -> Result<Cow<'a, str>> {
        let raw = self.non_null("str")?;
        if self.protocol == Protocol::Binary {
            match self.column_type() {
                ty if ty.is_integer() => {
                    return Ok(Cow::Owned(self.binary_integer(raw)?.to_string()));
                }
                ColumnType::MYSQL_TYPE_FLOAT => {
                    let bytes: [u8; 4] = fixed(raw)?;
                    return Ok(Cow::Owned(f32::from_le_bytes(bytes).to_string()));
                }
                ColumnType::MYSQL_TYPE_DOUBLE => {
                    let bytes: [u8; 8] = fixed(raw)?;
                    return Ok(Cow::Owned(f64::from_le_bytes(bytes).to_string()));
                }
                _ => {}
            }
        }
        from_utf8(raw)
            .map(Cow::Borrowed)
            .map_err(|_| Error::conversion(self.column_type(), "str", "not valid UTF-8"))
    }

    /// Convert to the representation the column type implies
    ///
    /// Integer columns become `Int` (or `UInt` when unsigned), FLOAT and DOUBLE become
    /// `Float`, binary-charset string columns become `Bytes`, everything else `Text`.
    pub fn natural(&self) -> Result<NaturalValue<'a>> {
        let Some(raw) = self.raw else {
            return Ok(NaturalValue::Null);
        };
        match self.column_type().natural_kind() {
            NaturalKind::Integer if self.field.is_unsigned() => self.u64().map(NaturalValue::UInt),
            NaturalKind::Integer => self.i64().map(NaturalValue::Int),
            NaturalKind::Float => self.f64().map(NaturalValue::Float),
            NaturalKind::Text if self.field.is_binary() && is_byte_string(self.column_type()) => {
                Ok(NaturalValue::Bytes(raw))
            }
            NaturalKind::Text => from_utf8(raw)
                .map(NaturalValue::Text)
                .map_err(|_| Error::conversion(self.column_type(), "text", "not valid UTF-8")),
        }
    }
}

fn fixed<const N: usize>(raw: &[u8]) -> Result<[u8; N]> {
    if raw.len() < N {
        return Err(Error::UnexpectedEof);
    }
    raw.try_into().map_err(|_| Error::InvalidPacket)
}

fn is_byte_string(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_GEOMETRY
            | ColumnType::MYSQL_TYPE_BIT
    )
}
