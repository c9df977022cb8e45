use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result, eyre};
use crate::protocol::primitive::*;

/// Payload of a column definition packet
#[derive(Debug, Clone, Copy)]
pub struct ColumnDefinitionBytes<'a>(pub &'a [u8]);

/// The column definition parsed from `ColumnDefinitionBytes`
#[derive(Debug, Clone)]
pub struct ColumnDefinition<'a> {
    pub schema: &'a [u8],
    pub table_alias: &'a [u8],
    pub table_original: &'a [u8],
    pub name_alias: &'a [u8],
    pub name_original: &'a [u8],
    pub tail: &'a ColumnDefinitionTail,
}

impl<'a> TryFrom<ColumnDefinitionBytes<'a>> for ColumnDefinition<'a> {
    type Error = Error;

    fn try_from(bytes: ColumnDefinitionBytes<'a>) -> Result<Self> {
        let (_catalog, data) = read_string_lenenc(bytes.0)?;
        let (schema, data) = read_string_lenenc(data)?;
        let (table_alias, data) = read_string_lenenc(data)?;
        let (table_original, data) = read_string_lenenc(data)?;
        let (name_alias, data) = read_string_lenenc(data)?;
        let (name_original, data) = read_string_lenenc(data)?;

        // length of the fixed fields, always 0x0c
        let (_length, data) = read_int_lenenc(data)?;
        let (tail, _default_values) =
            ColumnDefinitionTail::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;

        Ok(Self {
            schema,
            table_alias,
            table_original,
            name_alias,
            name_original,
            tail,
        })
    }
}

/// Fixed-size tail of a column definition packet (12 bytes)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct ColumnDefinitionTail {
    charset: U16LE,
    column_length: U32LE,
    column_type: u8,
    flags: U16LE,
    decimals: u8,
    reserved: U16LE,
}

impl ColumnDefinitionTail {
    pub fn charset(&self) -> u16 {
        self.charset.get()
    }

    pub fn column_length(&self) -> u32 {
        self.column_length.get()
    }

    pub fn column_type(&self) -> Result<ColumnType> {
        ColumnType::from_u8(self.column_type).ok_or_else(|| {
            Error::LibraryBug(eyre!("unknown column type: 0x{:02X}", self.column_type))
        })
    }

    pub fn flags(&self) -> ColumnFlags {
        ColumnFlags::from_bits_truncate(self.flags.get())
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_definition_packet(name: &str, column_type: ColumnType, flags: u16) -> Vec<u8> {
        let mut out = Vec::new();
        for part in ["def", "test", "t", "t", name, name] {
            write_bytes_lenenc(&mut out, part.as_bytes());
        }
        write_int_lenenc(&mut out, 0x0c);
        write_int_2(&mut out, 45);
        write_int_4(&mut out, 11);
        write_int_1(&mut out, column_type as u8);
        write_int_2(&mut out, flags);
        write_int_1(&mut out, 0);
        write_int_2(&mut out, 0);
        out
    }

    #[test]
    fn parse_column_definition() {
        let packet = column_definition_packet(
            "id",
            ColumnType::MYSQL_TYPE_LONG,
            (ColumnFlags::NOT_NULL_FLAG | ColumnFlags::UNSIGNED_FLAG).bits(),
        );
        let def = ColumnDefinition::try_from(ColumnDefinitionBytes(&packet)).unwrap();
        assert_eq!(def.name_alias, b"id");
        assert_eq!(def.schema, b"test");
        assert_eq!(def.tail.column_type().unwrap(), ColumnType::MYSQL_TYPE_LONG);
        assert!(def.tail.flags().contains(ColumnFlags::UNSIGNED_FLAG));
        assert_eq!(def.tail.charset(), 45);
        assert_eq!(def.tail.column_length(), 11);
    }

    #[test]
    fn truncated_tail_is_eof() {
        let mut packet = column_definition_packet("id", ColumnType::MYSQL_TYPE_LONG, 0);
        packet.truncate(packet.len() - 3);
        assert!(matches!(
            ColumnDefinition::try_from(ColumnDefinitionBytes(&packet)),
            Err(Error::UnexpectedEof)
        ));
    }
}
