use std::io::{Read, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::field::Field;
use crate::result::{QueryResult, SqlResult};
use crate::row::{RowRef, Span};
use crate::sync::{Conn, FetchStep, RawResult};
use crate::value::Protocol;

/// A fully buffered query result
///
/// Every row is read and the server-side result released before the table is
/// returned. All rows share one arena; row `i` owns cells `i * n .. (i + 1) * n`
/// where `n` is the column count.
#[derive(Debug, Clone)]
pub struct DataTable {
    fields: Arc<[Field]>,
    protocol: Protocol,
    arena: Vec<u8>,
    cells: Vec<Span>,
    row_count: usize,
    rows_affected: u64,
    insert_id: u64,
}

impl DataTable {
    fn empty(fields: Arc<[Field]>, protocol: Protocol) -> Self {
        Self {
            fields,
            protocol,
            arena: Vec::new(),
            cells: Vec::new(),
            row_count: 0,
            rows_affected: 0,
            insert_id: 0,
        }
    }

    /// Read every row of `raw`, then release the result
    ///
    /// The result is released on every path. When reading fails, the read error
    /// is returned and a failure to release is only logged.
    pub(crate) fn fill<S: Read + Write>(
        conn: &mut Conn<S>,
        raw: RawResult,
        protocol: Protocol,
    ) -> Result<Self> {
        let fields = match raw {
            RawResult::Done(ok) => {
                conn.raw_close_result()?;
                let mut table = Self::empty(Arc::from([]), protocol);
                table.rows_affected = ok.affected_rows;
                table.insert_id = ok.last_insert_id;
                return Ok(table);
            }
            RawResult::Rows(fields) => fields,
        };

        let mut table = Self::empty(fields, protocol);
        let filled = table.read_rows(conn);
        let released = conn.raw_close_result();
        match (filled, released) {
            (Ok(()), released) => released?,
            (Err(err), Ok(())) => return Err(err),
            (Err(err), Err(release_err)) => {
                warn!(error = %release_err, "failed to release result after read error");
                return Err(err);
            }
        }

        debug!(rows = table.row_count, "table filled");
        Ok(table)
    }

    fn read_rows<S: Read + Write>(&mut self, conn: &mut Conn<S>) -> Result<()> {
        loop {
            match conn.raw_fetch_next(&mut self.arena, &mut self.cells)? {
                FetchStep::Row => self.row_count += 1,
                FetchStep::End(ok) => {
                    self.rows_affected = self.row_count as u64;
                    self.insert_id = ok.last_insert_id;
                    return Ok(());
                }
            }
        }
    }

    fn row_at(&self, idx: usize) -> RowRef<'_> {
        let n = self.fields.len();
        let cells = self
            .cells
            .get(idx * n..(idx + 1) * n)
            .unwrap_or_default();
        RowRef::new(&self.fields, self.protocol, &self.arena, cells)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Row `idx`, `None` if out of range
    pub fn row(&self, idx: usize) -> Option<RowRef<'_>> {
        (idx < self.row_count).then(|| self.row_at(idx))
    }

    /// Rows in server order
    pub fn rows(&self) -> impl ExactSizeIterator<Item = RowRef<'_>> + '_ {
        (0..self.row_count).map(move |idx| self.row_at(idx))
    }
}

impl SqlResult for DataTable {
    /// Number of rows in the table, or the server's count for a statement without rows
    fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    fn insert_id(&self) -> u64 {
        self.insert_id
    }
}

impl QueryResult for DataTable {
    fn fields(&self) -> &[Field] {
        &self.fields
    }
}
