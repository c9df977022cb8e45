use thiserror::Error;

use crate::constant::ColumnType;
use crate::protocol::response::{ErrPayload, ErrPayloadBytes};

pub use color_eyre::eyre::eyre;

/// Client-side error number reported when the connection is already gone (CR_SERVER_GONE_ERROR).
pub const CONNECTION_CLOSED_ERRNO: u16 = 2006;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection is closed (errno {CONNECTION_CLOSED_ERRNO})")]
    ConnectionClosed,

    #[error("Server Error: {payload}{}", query_suffix(.query))]
    ServerError {
        payload: ErrPayload,
        query: Option<String>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid packet")]
    InvalidPacket,

    #[error("Unexpected end of packet")]
    UnexpectedEof,

    #[error("Cannot read {column_type:?} as {requested}: {reason}")]
    Conversion {
        column_type: ColumnType,
        requested: &'static str,
        reason: String,
    },

    #[error("Bind index {index} is out of bounds for a statement with {count} parameters")]
    BindOutOfBounds { index: usize, count: usize },

    #[error("Only {bound} of {count} parameters are bound")]
    MissingParams { bound: usize, count: usize },

    #[error("Connection mismatch: expected connection {expected}, got {actual}")]
    ConnectionMismatch { expected: u64, actual: u64 },

    #[error("Bad usage: {0}")]
    BadUsageError(String),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Unsupported authentication plugin: {0}")]
    UnsupportedAuthPlugin(String),

    #[error("Library bug: {0}")]
    LibraryBug(color_eyre::Report),
}

fn query_suffix(query: &Option<String>) -> String {
    match query {
        Some(sql) if !sql.is_empty() => format!(" during query: {sql}"),
        _ => String::new(),
    }
}

impl Error {
    /// MySQL error number, if this error carries one
    pub fn number(&self) -> Option<u16> {
        match self {
            Error::ConnectionClosed => Some(CONNECTION_CLOSED_ERRNO),
            Error::ServerError { payload, .. } => Some(payload.error_code),
            _ => None,
        }
    }

    /// Attach the SQL text that produced a server error
    pub(crate) fn with_query(self, sql: &str) -> Self {
        match self {
            Error::ServerError { payload, query: None } => Error::ServerError {
                payload,
                query: Some(sql.to_string()),
            },
            other => other,
        }
    }

    pub(crate) fn conversion(
        column_type: ColumnType,
        requested: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Error::Conversion {
            column_type,
            requested,
            reason: reason.into(),
        }
    }
}

impl From<ErrPayload> for Error {
    fn from(payload: ErrPayload) -> Self {
        Error::ServerError {
            payload,
            query: None,
        }
    }
}

impl<'a> From<ErrPayloadBytes<'a>> for Error {
    fn from(value: ErrPayloadBytes) -> Self {
        match ErrPayload::try_from(value) {
            Ok(err_payload) => Error::from(err_payload),
            Err(err) => err,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl From<color_eyre::Report> for Error {
    fn from(report: color_eyre::Report) -> Self {
        Error::LibraryBug(report)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
