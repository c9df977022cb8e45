//! A blocking MySQL client that materializes results into buffered tables or
//! streams them row by row, with typed access to every cell.
//!
//! ```no_run
//! use mysql_rowset::{Conn, QueryResult};
//!
//! mysql_rowset::initialize_runtime();
//! let mut conn = Conn::new("mysql://root@localhost/test")?;
//! let table = conn.query_table("SELECT id, value FROM test ORDER BY id")?;
//! for row in table.rows() {
//!     let id = row.value(0)?.i64()?;
//!     let value = row.value(1)?.as_str()?;
//!     println!("{id} {value}");
//! }
//! # Ok::<(), mysql_rowset::Error>(())
//! ```

use std::sync::Once;

pub mod constant;
mod decode;
pub mod driver;
pub mod error;
mod field;
mod opts;
mod param;
pub mod protocol;
mod reader;
mod result;
mod row;
mod stmt;
pub mod sync;
mod table;
mod value;

pub use error::{Error, Result};
pub use field::{BINARY_CHARSET, Field};
pub use opts::Opts;
pub use param::Param;
pub use reader::{CursorState, DataReader};
pub use result::{ExecResult, QueryResult, SqlResult};
pub use row::{Row, RowRef};
pub use stmt::Stmt;
pub use sync::{Conn, Transaction};
pub use table::DataTable;
pub use value::{NaturalValue, Protocol, Value};

static RUNTIME: Once = Once::new();

/// Process-wide setup; call once at startup before opening any connection
///
/// Connecting fails with [`Error::BadUsageError`] until this has run. It leaves
/// panic and report hooks alone, so the application stays free to install its
/// own. Calling it again is a no-op.
pub fn initialize_runtime() {
    RUNTIME.call_once(|| tracing::debug!("runtime initialized"));
}

pub(crate) fn ensure_runtime() -> Result<()> {
    if RUNTIME.is_completed() {
        return Ok(());
    }
    Err(Error::BadUsageError(
        "initialize_runtime() must be called before connecting".to_string(),
    ))
}
