//! Blocking transport: the connection the result types read from.

mod conn;
mod stream;
mod transaction;

pub use conn::Conn;
pub(crate) use conn::{FetchStep, RawResult, RawStmt};
pub use stream::Stream;
pub use transaction::Transaction;
