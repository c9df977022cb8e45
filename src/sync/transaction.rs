use std::io::{Read, Write};

use super::Conn;
use crate::error::{Error, Result};

/// A transaction opened by [`Conn::begin`]
///
/// The connection is passed to `commit` and `rollback`, which send the
/// matching plain SQL statement. Dropping the transaction without either
/// leaves it open on the server.
#[derive(Debug)]
pub struct Transaction {
    connection_id: u64,
}

impl Transaction {
    pub(crate) fn new(connection_id: u64) -> Self {
        Self { connection_id }
    }

    fn check<S: Read + Write>(&self, conn: &Conn<S>) -> Result<()> {
        let actual = conn.connection_id();
        if self.connection_id != actual {
            return Err(Error::ConnectionMismatch {
                expected: self.connection_id,
                actual,
            });
        }
        Ok(())
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionMismatch` if `conn` is not the connection
    /// that started the transaction.
    pub fn commit<S: Read + Write>(self, conn: &mut Conn<S>) -> Result<()> {
        self.check(conn)?;
        conn.execute("COMMIT").map(drop)
    }

    /// Roll the transaction back
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionMismatch` if `conn` is not the connection
    /// that started the transaction.
    pub fn rollback<S: Read + Write>(self, conn: &mut Conn<S>) -> Result<()> {
        self.check(conn)?;
        conn.execute("ROLLBACK").map(drop)
    }
}
