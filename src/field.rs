use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::command::ColumnDefinition;

/// MySQL binary charset number - indicates binary/non-text data
pub const BINARY_CHARSET: u16 = 63;

/// Metadata of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    column_type: ColumnType,
    flags: ColumnFlags,
    charset: u16,
    table: String,
    schema: String,
}

impl Field {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            flags: ColumnFlags::empty(),
            charset: 0,
            table: String::new(),
            schema: String::new(),
        }
    }

    pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_charset(mut self, charset: u16) -> Self {
        self.charset = charset;
        self
    }

    /// Column name as written in the query (alias if any)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn charset(&self) -> u16 {
        self.charset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }

    /// Whether string-typed values of this column are opaque bytes rather than text
    pub fn is_binary(&self) -> bool {
        self.charset == BINARY_CHARSET
    }
}

impl TryFrom<ColumnDefinition<'_>> for Field {
    type Error = Error;

    fn try_from(def: ColumnDefinition<'_>) -> Result<Self> {
        Ok(Self {
            name: String::from_utf8_lossy(def.name_alias).into_owned(),
            column_type: def.tail.column_type()?,
            flags: def.tail.flags(),
            charset: def.tail.charset(),
            table: String::from_utf8_lossy(def.table_alias).into_owned(),
            schema: String::from_utf8_lossy(def.schema).into_owned(),
        })
    }
}

/// Position of the column called `name`, if any
///
/// Exact matches win; otherwise the first ASCII case-insensitive match is returned,
/// since MySQL column names are case-insensitive.
pub fn index_of(fields: &[Field], name: &str) -> Option<usize> {
    fields
        .iter()
        .position(|field| field.name == name)
        .or_else(|| {
            fields
                .iter()
                .position(|field| field.name.eq_ignore_ascii_case(name))
        })
}
