use std::io::{Read, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::field::Field;
use crate::result::{QueryResult, SqlResult};
use crate::row::{RowRef, Span};
use crate::sync::{Conn, FetchStep, RawResult, Stream};
use crate::value::Protocol;

/// Where a [`DataReader`] is in its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Rows may remain on the wire
    Open,
    /// The last row has been read
    Exhausted,
    /// Released; no further fetches are allowed
    Closed,
}

/// A query result read one row at a time
///
/// The reader holds the connection for as long as it lives. Only the current row
/// is kept: the [`RowRef`] returned by [`fetch_next`](Self::fetch_next) borrows the
/// reader and must be released (or copied with [`RowRef::to_row`]) before the
/// next fetch. Dropping an unclosed reader closes it.
pub struct DataReader<'c, S: Read + Write = Stream> {
    conn: &'c mut Conn<S>,
    fields: Arc<[Field]>,
    protocol: Protocol,
    bytes: Vec<u8>,
    cells: Vec<Span>,
    state: CursorState,
    rows_affected: u64,
    insert_id: u64,
}

impl<'c, S: Read + Write> DataReader<'c, S> {
    pub(crate) fn open(conn: &'c mut Conn<S>, raw: RawResult, protocol: Protocol) -> Self {
        let (fields, state, rows_affected, insert_id) = match raw {
            RawResult::Rows(fields) => (fields, CursorState::Open, 0, 0),
            RawResult::Done(ok) => (
                Arc::from([]),
                CursorState::Exhausted,
                ok.affected_rows,
                ok.last_insert_id,
            ),
        };
        let cells = Vec::with_capacity(fields.len());
        Self {
            conn,
            fields,
            protocol,
            bytes: Vec::new(),
            cells,
            state,
            rows_affected,
            insert_id,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Read the next row, `None` once the result is exhausted
    ///
    /// Fetching again after exhaustion keeps returning `None`. Fetching after
    /// [`close`](Self::close) is an error.
    ///
    /// A row that fails to decode is consumed: the error is returned, the reader
    /// stays open and the next call yields the row after it.
    pub fn fetch_next(&mut self) -> Result<Option<RowRef<'_>>> {
        match self.state {
            CursorState::Closed => Err(Error::BadUsageError(
                "fetch_next called on a closed reader".to_string(),
            )),
            CursorState::Exhausted => Ok(None),
            CursorState::Open => {
                self.bytes.clear();
                self.cells.clear();
                match self.conn.raw_fetch_next(&mut self.bytes, &mut self.cells) {
                    Ok(FetchStep::Row) => {
                        self.rows_affected += 1;
                        Ok(Some(RowRef::new(
                            &self.fields,
                            self.protocol,
                            &self.bytes,
                            &self.cells,
                        )))
                    }
                    Ok(FetchStep::End(ok)) => {
                        self.insert_id = ok.last_insert_id;
                        self.state = CursorState::Exhausted;
                        Ok(None)
                    }
                    Err(err) => {
                        // the server ends the result set when it reports an error
                        if matches!(err, Error::ServerError { .. } | Error::ConnectionClosed) {
                            self.state = CursorState::Exhausted;
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    /// Release the result, discarding any rows not yet read
    ///
    /// Safe to call more than once and before exhaustion.
    #[tracing::instrument(skip_all)]
    pub fn close(&mut self) -> Result<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        if self.state == CursorState::Open {
            debug!(rows = self.rows_affected, "reader closed early");
        }
        self.state = CursorState::Closed;
        self.conn.raw_close_result()
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Conn<S> {
        self.conn
    }
}

impl<S: Read + Write> SqlResult for DataReader<'_, S> {
    /// Rows fetched so far, or the server's count for a statement without rows
    fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    fn insert_id(&self) -> u64 {
        self.insert_id
    }
}

impl<S: Read + Write> QueryResult for DataReader<'_, S> {
    fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl<S: Read + Write> Drop for DataReader<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close reader");
        }
    }
}
