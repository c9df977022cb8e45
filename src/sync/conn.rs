use std::io::{BufReader, Read, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Stream, Transaction};
use crate::constant::CapabilityFlags;
use crate::decode::decode_row;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::opts::Opts;
use crate::protocol::command::prepared::{
    ParamWire, read_prepare_ok, write_close_statement, write_execute, write_prepare,
};
use crate::protocol::command::query::{QueryResponse, read_query_response, write_query};
use crate::protocol::command::utility::{write_ping, write_quit};
use crate::protocol::command::{ColumnDefinition, ColumnDefinitionBytes};
use crate::protocol::connection::{Handshake, HandshakeConfig, HandshakeResult, InitialHandshake};
use crate::protocol::packet::PacketCodec;
use crate::protocol::response::{
    ErrPayloadBytes, OkPayload, OkPayloadBytes, RowPacket, classify_row_packet,
};
use crate::reader::DataReader;
use crate::result::ExecResult;
use crate::row::Span;
use crate::stmt::Stmt;
use crate::table::DataTable;
use crate::value::Protocol;

/// Result set currently being read off the wire
#[derive(Debug)]
struct ActiveResult {
    fields: Arc<[Field]>,
    protocol: Protocol,
}

/// First response to a query or statement execution
#[derive(Debug)]
pub(crate) enum RawResult {
    /// No result set; the OK packet that ended the command
    Done(OkPayload),
    /// A result set is open; rows follow
    Rows(Arc<[Field]>),
}

/// Outcome of reading one packet of an open result set
#[derive(Debug)]
pub(crate) enum FetchStep {
    Row,
    End(OkPayload),
}

/// A statement prepared on the server
#[derive(Debug)]
pub(crate) struct RawStmt {
    pub(crate) statement_id: u32,
    pub(crate) param_count: usize,
    pub(crate) fields: Arc<[Field]>,
}

/// A blocking MySQL connection
///
/// One command at a time: a [`DataReader`] borrows the connection mutably until it
/// is dropped, so no other command can interleave with its rows. The connection is
/// not synchronized; share it across threads only behind the caller's own lock.
pub struct Conn<S: Read + Write = Stream> {
    stream: BufReader<S>,
    codec: PacketCodec,
    read_buffer: Vec<u8>,
    write_buffer: Vec<u8>,
    initial_handshake: Box<InitialHandshake>,
    capability_flags: CapabilityFlags,
    active: Option<ActiveResult>,
    more_results: bool,
    /// SQL text of the command in flight, attached to server errors
    query: String,
    closed: bool,
}

impl Conn {
    /// Connect to the server described by `opts`
    ///
    /// [`initialize_runtime`](crate::initialize_runtime) must have been called first.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts: Opts = opts.try_into()?;
        crate::ensure_runtime()?;
        let stream = Stream::connect(&opts)?;
        Self::new_with_stream(stream, &opts)
    }
}

impl<S: Read + Write> Conn<S> {
    /// Run the connection phase over an already connected stream
    #[tracing::instrument(skip_all)]
    pub fn new_with_stream(stream: S, opts: &Opts) -> Result<Self> {
        crate::ensure_runtime()?;

        let mut stream = BufReader::new(stream);
        let mut codec = PacketCodec::new();
        let mut buffer = Vec::new();
        let mut handshake = Handshake::new(HandshakeConfig {
            username: opts.user.clone(),
            password: opts.password.clone(),
            database: opts.db.clone(),
            capabilities: opts.capabilities(),
            charset: opts.collation_id()?,
        });

        let (initial_handshake, capability_flags) = loop {
            codec.read_payload(&mut stream, &mut buffer)?;
            match handshake.drive(&buffer)? {
                HandshakeResult::Write(payload) => {
                    codec.write_payload(stream.get_mut(), &payload)?;
                }
                HandshakeResult::Read => {}
                HandshakeResult::Connected {
                    initial_handshake,
                    capability_flags,
                } => break (initial_handshake, capability_flags),
            }
        };
        debug!(
            connection_id = initial_handshake.connection_id,
            server_version = %initial_handshake.server_version,
            "connected"
        );

        let mut conn = Self {
            stream,
            codec,
            read_buffer: buffer,
            write_buffer: Vec::new(),
            initial_handshake,
            capability_flags,
            active: None,
            more_results: false,
            query: String::new(),
            closed: false,
        };

        if let Some(init_command) = &opts.init_command {
            conn.execute(init_command)?;
        }
        Ok(conn)
    }

    /// Connection id assigned by the server
    pub fn connection_id(&self) -> u64 {
        u64::from(self.initial_handshake.connection_id)
    }

    pub fn server_version(&self) -> &str {
        &self.initial_handshake.server_version
    }

    /// Get the negotiated capability flags
    pub fn capability_flags(&self) -> CapabilityFlags {
        self.capability_flags
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Execute a statement and report affected rows and the insert id
    ///
    /// If the statement returns rows they are read and discarded; `rows_affected`
    /// then counts them.
    pub fn execute(&mut self, sql: &str) -> Result<ExecResult> {
        let raw = self.raw_execute(sql)?;
        self.finish_exec(raw)
    }

    /// Run a query and buffer every row
    pub fn query_table(&mut self, sql: &str) -> Result<DataTable> {
        let raw = self.raw_execute(sql)?;
        DataTable::fill(self, raw, Protocol::Text)
    }

    /// Run a query and stream its rows one at a time
    pub fn query_reader(&mut self, sql: &str) -> Result<DataReader<'_, S>> {
        let raw = self.raw_execute(sql)?;
        Ok(DataReader::open(self, raw, Protocol::Text))
    }

    /// Prepare a statement for repeated execution with bound parameters
    pub fn prepare(&mut self, sql: &str) -> Result<Stmt> {
        let raw = self.raw_prepare(sql)?;
        Ok(Stmt::new(self.connection_id(), raw, sql))
    }

    /// Start a transaction with a plain `BEGIN`
    pub fn begin(&mut self) -> Result<Transaction> {
        self.execute("BEGIN")?;
        Ok(Transaction::new(self.connection_id()))
    }

    #[tracing::instrument(skip_all)]
    pub fn ping(&mut self) -> Result<()> {
        self.begin_command()?;
        write_ping(&mut self.write_buffer);
        self.send_command()?;
        self.read_packet()?;
        match self.read_buffer.first() {
            Some(0x00) => Ok(()),
            Some(0xFF) => Err(ErrPayloadBytes(&self.read_buffer).into()),
            _ => Err(Error::InvalidPacket),
        }
    }

    /// Send COM_QUIT and mark the connection closed
    ///
    /// Closing twice is a no-op. Every later operation fails with
    /// [`Error::ConnectionClosed`].
    #[tracing::instrument(skip_all)]
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.active = None;
        self.more_results = false;

        self.write_buffer.clear();
        write_quit(&mut self.write_buffer);
        self.codec.reset();
        self.codec
            .write_payload(self.stream.get_mut(), &self.write_buffer)
    }

    pub(crate) fn finish_exec(&mut self, raw: RawResult) -> Result<ExecResult> {
        match raw {
            RawResult::Done(ok) => {
                self.raw_close_result()?;
                Ok(ExecResult::from(&ok))
            }
            RawResult::Rows(_) => {
                let mut bytes = Vec::new();
                let mut cells = Vec::new();
                let mut rows = 0;
                loop {
                    bytes.clear();
                    cells.clear();
                    match self.raw_fetch_next(&mut bytes, &mut cells)? {
                        FetchStep::Row => rows += 1,
                        FetchStep::End(ok) => {
                            self.raw_close_result()?;
                            return Ok(ExecResult::new(rows, ok.last_insert_id, ok.warnings));
                        }
                    }
                }
            }
        }
    }

    // ---- raw primitives ----

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Mark the connection unusable after an I/O failure or a framing error
    ///
    /// A packet out of sequence leaves the stream position unknown, so it is as
    /// fatal as a broken socket.
    fn check_io<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Err(Error::IoError(err)) => warn!(error = %err, "connection lost"),
            Err(Error::InvalidPacket) => warn!("packet out of sequence, closing connection"),
            _ => return result,
        }
        self.closed = true;
        self.active = None;
        self.more_results = false;
        result
    }

    fn read_packet(&mut self) -> Result<()> {
        let result = self
            .codec
            .read_payload(&mut self.stream, &mut self.read_buffer);
        self.check_io(result)
    }

    /// Prepare for a new command, draining anything left of the previous one
    fn begin_command(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.active.is_some() || self.more_results {
            self.raw_close_result()?;
        }
        self.write_buffer.clear();
        Ok(())
    }

    fn send_command(&mut self) -> Result<()> {
        self.codec.reset();
        let result = self
            .codec
            .write_payload(self.stream.get_mut(), &self.write_buffer);
        self.check_io(result)
    }

    fn deprecate_eof(&self) -> bool {
        self.capability_flags
            .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    fn parse_end(&self, end: OkPayloadBytes<'_>) -> Result<OkPayload> {
        if self.deprecate_eof() {
            OkPayload::try_from(end)
        } else {
            OkPayload::from_eof(end)
        }
    }

    fn read_fields(&mut self, count: usize) -> Result<Arc<[Field]>> {
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            self.read_packet()?;
            let def = ColumnDefinition::try_from(ColumnDefinitionBytes(&self.read_buffer))?;
            fields.push(Field::try_from(def)?);
        }
        if count > 0 && !self.deprecate_eof() {
            self.read_packet()?;
        }
        Ok(fields.into())
    }

    /// Read the first packet of a response and, for a result set, its column definitions
    fn read_result(&mut self, protocol: Protocol) -> Result<RawResult> {
        self.read_packet()?;
        let column_count = match read_query_response(&self.read_buffer)? {
            QueryResponse::Ok(ok) => {
                let ok = OkPayload::try_from(ok)?;
                self.more_results = ok.more_results();
                return Ok(RawResult::Done(ok));
            }
            QueryResponse::ResultSet { column_count } => column_count,
        };

        let fields = self.read_fields(column_count)?;
        debug!(columns = fields.len(), ?protocol, "result set opened");
        self.active = Some(ActiveResult {
            fields: Arc::clone(&fields),
            protocol,
        });
        Ok(RawResult::Rows(fields))
    }

    fn set_query(&mut self, sql: &str) {
        self.query.clear();
        self.query.push_str(sql);
    }

    /// Send COM_QUERY and read the response header
    #[tracing::instrument(skip_all)]
    pub(crate) fn raw_execute(&mut self, sql: &str) -> Result<RawResult> {
        self.begin_command()?;
        self.set_query(sql);
        write_query(&mut self.write_buffer, sql);
        self.send_command()?;
        self.read_result(Protocol::Text)
            .map_err(|e| e.with_query(sql))
    }

    /// Send COM_STMT_PREPARE and read the statement's metadata
    #[tracing::instrument(skip_all)]
    pub(crate) fn raw_prepare(&mut self, sql: &str) -> Result<RawStmt> {
        self.begin_command()?;
        self.set_query(sql);
        write_prepare(&mut self.write_buffer, sql);
        self.send_command()?;

        self.read_packet()?;
        let prepare_ok = *read_prepare_ok(&self.read_buffer).map_err(|e| e.with_query(sql))?;
        let param_count = usize::from(prepare_ok.num_params());
        for _ in 0..param_count {
            self.read_packet()?;
        }
        if param_count > 0 && !self.deprecate_eof() {
            self.read_packet()?;
        }
        let fields = self.read_fields(usize::from(prepare_ok.num_columns()))?;

        debug!(
            statement_id = prepare_ok.statement_id(),
            param_count,
            columns = fields.len(),
            "statement prepared"
        );
        Ok(RawStmt {
            statement_id: prepare_ok.statement_id(),
            param_count,
            fields,
        })
    }

    /// Send COM_STMT_EXECUTE and read the response header
    #[tracing::instrument(skip_all)]
    pub(crate) fn raw_stmt_execute<'p>(
        &mut self,
        statement_id: u32,
        params: impl ExactSizeIterator<Item = ParamWire<'p>> + Clone,
        sql: &str,
    ) -> Result<RawResult> {
        self.begin_command()?;
        self.set_query(sql);
        write_execute(&mut self.write_buffer, statement_id, params);
        self.send_command()?;
        self.read_result(Protocol::Binary)
            .map_err(|e| e.with_query(sql))
    }

    /// Read the next packet of the open result set
    ///
    /// A row is decoded by appending to `bytes` and `cells`. A server error ends the
    /// result set; a decode error leaves it open so that it can still be drained.
    pub(crate) fn raw_fetch_next(
        &mut self,
        bytes: &mut Vec<u8>,
        cells: &mut Vec<Span>,
    ) -> Result<FetchStep> {
        self.ensure_open()?;
        if self.active.is_none() {
            return Err(Error::BadUsageError("no result set is open".to_string()));
        }
        self.read_packet()?;

        let step = match classify_row_packet(&self.read_buffer) {
            Ok(RowPacket::Row(payload)) => match &self.active {
                Some(active) => decode_row(active.protocol, payload, &active.fields, bytes, cells)
                    .map(|()| FetchStep::Row),
                None => Err(Error::BadUsageError("no result set is open".to_string())),
            },
            Ok(RowPacket::End(end)) => self.parse_end(end).map(FetchStep::End),
            Err(err) => Err(err),
        };

        match &step {
            Ok(FetchStep::End(ok)) => {
                self.active = None;
                self.more_results = ok.more_results();
            }
            Err(Error::ServerError { .. }) => {
                self.active = None;
                self.more_results = false;
            }
            _ => {}
        }
        step.map_err(|e| e.with_query(&self.query))
    }

    /// Discard the rest of the open result set and any result sets after it
    ///
    /// Nothing to do when no result is pending or the connection is gone.
    #[tracing::instrument(skip_all)]
    pub(crate) fn raw_close_result(&mut self) -> Result<()> {
        while !self.closed && (self.active.is_some() || self.more_results) {
            if self.active.is_none() {
                self.more_results = false;
                self.read_result(Protocol::Text)
                    .map_err(|e| e.with_query(&self.query))?;
                continue;
            }

            self.read_packet()?;
            let end = match classify_row_packet(&self.read_buffer) {
                Ok(RowPacket::Row(_)) => None,
                Ok(RowPacket::End(end)) => Some(self.parse_end(end)?),
                Err(err) => {
                    self.active = None;
                    self.more_results = false;
                    return Err(err.with_query(&self.query));
                }
            };
            if let Some(ok) = end {
                self.active = None;
                self.more_results = ok.more_results();
            }
        }
        Ok(())
    }

    /// Send COM_STMT_CLOSE; the server does not answer
    #[tracing::instrument(skip_all)]
    pub(crate) fn raw_close_stmt(&mut self, statement_id: u32) -> Result<()> {
        self.begin_command()?;
        write_close_statement(&mut self.write_buffer, statement_id);
        self.send_command()?;
        debug!(statement_id, "statement closed");
        Ok(())
    }
}

impl<S: Read + Write> Drop for Conn<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "failed to send COM_QUIT");
        }
    }
}
