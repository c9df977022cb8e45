use crate::constant::ColumnType;

/// A statement parameter of any supported kind
///
/// This is the dynamically typed form accepted by [`Stmt::bind`](crate::Stmt::bind).
/// Host values convert with `From`; `None` of any of them binds NULL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param<'a> {
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    UTinyInt(u8),
    USmallInt(u16),
    UInt(u32),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    Text(&'a str),
    /// `None` binds NULL; an empty slice binds an empty blob
    Blob(Option<&'a [u8]>),
    /// NULL sent with the given column type
    Null(ColumnType),
}

impl Param<'_> {
    /// Wire type the parameter is sent as
    pub fn column_type(&self) -> ColumnType {
        match self {
            Param::TinyInt(_) => ColumnType::MYSQL_TYPE_TINY,
            Param::SmallInt(_) => ColumnType::MYSQL_TYPE_SHORT,
            Param::Int(_) => ColumnType::MYSQL_TYPE_LONG,
            Param::BigInt(_) => ColumnType::MYSQL_TYPE_LONGLONG,
            Param::UTinyInt(_) => ColumnType::MYSQL_TYPE_TINY,
            Param::USmallInt(_) => ColumnType::MYSQL_TYPE_SHORT,
            Param::UInt(_) => ColumnType::MYSQL_TYPE_LONG,
            Param::UBigInt(_) => ColumnType::MYSQL_TYPE_LONGLONG,
            Param::Float(_) => ColumnType::MYSQL_TYPE_FLOAT,
            Param::Double(_) => ColumnType::MYSQL_TYPE_DOUBLE,
            Param::Text(_) => ColumnType::MYSQL_TYPE_VAR_STRING,
            Param::Blob(_) => ColumnType::MYSQL_TYPE_BLOB,
            Param::Null(column_type) => *column_type,
        }
    }

    /// Whether the integer is sent with the unsigned flag
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Param::UTinyInt(_) | Param::USmallInt(_) | Param::UInt(_) | Param::UBigInt(_)
        )
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Param<'_> {
                fn from(value: $ty) -> Self {
                    Param::$variant(value)
                }
            }
        )*
    };
}

impl_from! {
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => UTinyInt,
    u16 => USmallInt,
    u32 => UInt,
    u64 => UBigInt,
    f32 => Float,
    f64 => Double,
}

impl<'a> From<&'a str> for Param<'a> {
    fn from(value: &'a str) -> Self {
        Param::Text(value)
    }
}

impl<'a> From<&'a String> for Param<'a> {
    fn from(value: &'a String) -> Self {
        Param::Text(value)
    }
}

impl<'a> From<&'a [u8]> for Param<'a> {
    fn from(value: &'a [u8]) -> Self {
        Param::Blob(Some(value))
    }
}

impl<'a> From<&'a Vec<u8>> for Param<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Param::Blob(Some(value))
    }
}

impl<'a, T: Into<Param<'a>>> From<Option<T>> for Param<'a> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Param::Null(ColumnType::MYSQL_TYPE_NULL),
        }
    }
}
