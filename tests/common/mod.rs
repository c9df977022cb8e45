//! An in-memory MySQL server that replays a prepared script of packets.
//!
//! Every response starts a new packet sequence at 1, matching a client that
//! resets to 0 for each command. Client writes are recorded, not interpreted.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{Cursor, Read, Write};
use std::rc::Rc;

use mysql_rowset::constant::{CapabilityFlags, ColumnFlags, ColumnType, ServerStatusFlags};
use mysql_rowset::{Conn, Opts};

pub struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    written: Rc<RefCell<Vec<u8>>>,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Column of a scripted result set
#[derive(Clone, Copy)]
pub struct Col {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
}

pub fn col(name: &'static str, column_type: ColumnType) -> Col {
    Col {
        name,
        column_type,
        flags: ColumnFlags::empty(),
    }
}

fn lenenc_int(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=250 => out.push(value as u8),
        251..=0xFFFF => {
            out.push(0xFC);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        _ => {
            out.push(0xFE);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn lenenc_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    lenenc_int(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub struct Script {
    bytes: Vec<u8>,
    seq: u8,
}

impl Script {
    /// A script that accepts the connection as `connection_id`
    pub fn new(connection_id: u32) -> Self {
        let mut script = Self::handshake_only(connection_id);
        script.packet(&ok_payload(0x00, 0, 0, ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
        script
    }

    /// Only the server greeting; the authentication result is left to the caller
    pub fn handshake_only(connection_id: u32) -> Self {
        let mut script = Self {
            bytes: Vec::new(),
            seq: 0,
        };
        script.packet(&initial_handshake(connection_id));
        // the client's handshake response takes sequence id 1
        script.at(2);
        script
    }

    /// Continue with sequence id `seq`
    pub fn at(&mut self, seq: u8) -> &mut Self {
        self.seq = seq;
        self
    }

    /// Start the response to the next command
    pub fn response(&mut self) -> &mut Self {
        self.seq = 1;
        self
    }

    pub fn packet(&mut self, payload: &[u8]) -> &mut Self {
        let len = (payload.len() as u32).to_le_bytes();
        self.bytes.extend_from_slice(&[len[0], len[1], len[2], self.seq]);
        self.bytes.extend_from_slice(payload);
        self.seq = self.seq.wrapping_add(1);
        self
    }

    pub fn ok(&mut self, affected_rows: u64, insert_id: u64) -> &mut Self {
        self.response().packet(&ok_payload(
            0x00,
            affected_rows,
            insert_id,
            ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT,
        ))
    }

    pub fn err(&mut self, code: u16, state: &str, message: &str) -> &mut Self {
        self.response().packet(&err_payload(code, state, message))
    }

    /// An OK that follows an earlier result of the same command
    pub fn next_ok(&mut self, affected_rows: u64, insert_id: u64) -> &mut Self {
        self.packet(&ok_payload(
            0x00,
            affected_rows,
            insert_id,
            ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT,
        ))
    }

    /// An error packet in the middle of a response, such as between rows
    pub fn next_err(&mut self, code: u16, state: &str, message: &str) -> &mut Self {
        self.packet(&err_payload(code, state, message))
    }

    fn columns(&mut self, cols: &[Col]) -> &mut Self {
        for col in cols {
            self.packet(&column_definition(col));
        }
        self
    }

    /// Column count and definitions of a result set
    pub fn result_header(&mut self, cols: &[Col]) -> &mut Self {
        self.response().next_result_header(cols)
    }

    /// Header of a result set that follows an earlier result of the same command
    pub fn next_result_header(&mut self, cols: &[Col]) -> &mut Self {
        let mut count = Vec::new();
        lenenc_int(&mut count, cols.len() as u64);
        self.packet(&count).columns(cols)
    }

    pub fn text_row(&mut self, cells: &[Option<&str>]) -> &mut Self {
        let mut payload = Vec::new();
        for cell in cells {
            match cell {
                Some(text) => lenenc_bytes(&mut payload, text.as_bytes()),
                None => payload.push(0xFB),
            }
        }
        self.packet(&payload)
    }

    /// Terminating OK of a result set
    pub fn end(&mut self, status: ServerStatusFlags) -> &mut Self {
        self.packet(&ok_payload(0xFE, 0, 0, status))
    }

    /// A complete text result set
    pub fn text_result(&mut self, cols: &[Col], rows: &[Vec<Option<&str>>]) -> &mut Self {
        self.result_header(cols);
        for row in rows {
            self.text_row(row);
        }
        self.end(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT)
    }

    /// COM_STMT_PREPARE response
    pub fn prepare_ok(&mut self, statement_id: u32, params: usize, cols: &[Col]) -> &mut Self {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&statement_id.to_le_bytes());
        payload.extend_from_slice(&(cols.len() as u16).to_le_bytes());
        payload.extend_from_slice(&(params as u16).to_le_bytes());
        payload.push(0);
        payload.extend_from_slice(&0u16.to_le_bytes());
        self.response().packet(&payload);
        for idx in 0..params {
            let name = if idx == 0 { "?" } else { "" };
            self.packet(&column_definition(&col(name, ColumnType::MYSQL_TYPE_VAR_STRING)));
        }
        self.columns(cols)
    }

    /// A binary protocol row; `values` are already encoded, `None` for NULL
    pub fn binary_row(&mut self, values: &[Option<&[u8]>]) -> &mut Self {
        let mut payload = vec![0x00];
        let bitmap_start = payload.len();
        payload.resize(bitmap_start + (values.len() + 2).div_ceil(8), 0);
        for (idx, value) in values.iter().enumerate() {
            match value {
                Some(bytes) => payload.extend_from_slice(bytes),
                // the first two bits of a result row bitmap are reserved
                None => payload[bitmap_start + ((idx + 2) >> 3)] |= 1 << ((idx + 2) & 7),
            }
        }
        self.packet(&payload)
    }

    pub fn into_stream(self) -> (ScriptedStream, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let stream = ScriptedStream {
            input: Cursor::new(self.bytes),
            written: Rc::clone(&written),
        };
        (stream, written)
    }

    /// Connect over the script; returns the connection and the log of client writes
    pub fn connect(self) -> (Conn<ScriptedStream>, Rc<RefCell<Vec<u8>>>) {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
        mysql_rowset::initialize_runtime();
        let (stream, written) = self.into_stream();
        let conn = Conn::new_with_stream(stream, &Opts::default()).unwrap();
        (conn, written)
    }
}

fn initial_handshake(connection_id: u32) -> Vec<u8> {
    let mut out = vec![10];
    out.extend_from_slice(b"8.0.36\0");
    out.extend_from_slice(&connection_id.to_le_bytes());
    out.extend_from_slice(b"abcdefgh");
    out.push(0);
    let caps = CapabilityFlags::all().bits();
    out.extend_from_slice(&(caps as u16).to_le_bytes());
    out.push(45);
    out.extend_from_slice(&ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT.bits().to_le_bytes());
    out.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
    out.push(21);
    out.extend_from_slice(&[0u8; 10]);
    out.extend_from_slice(b"ijklmnopqrst");
    out.push(0);
    out.extend_from_slice(b"mysql_native_password\0");
    out
}

fn ok_payload(header: u8, affected_rows: u64, insert_id: u64, status: ServerStatusFlags) -> Vec<u8> {
    let mut out = vec![header];
    lenenc_int(&mut out, affected_rows);
    lenenc_int(&mut out, insert_id);
    out.extend_from_slice(&status.bits().to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

fn err_payload(code: u16, state: &str, message: &str) -> Vec<u8> {
    let mut out = vec![0xFF];
    out.extend_from_slice(&code.to_le_bytes());
    out.push(b'#');
    out.extend_from_slice(state.as_bytes());
    out.extend_from_slice(message.as_bytes());
    out
}

fn column_definition(col: &Col) -> Vec<u8> {
    let mut out = Vec::new();
    lenenc_bytes(&mut out, b"def");
    lenenc_bytes(&mut out, b"test");
    lenenc_bytes(&mut out, b"t");
    lenenc_bytes(&mut out, b"t");
    lenenc_bytes(&mut out, col.name.as_bytes());
    lenenc_bytes(&mut out, col.name.as_bytes());
    out.push(0x0c);
    out.extend_from_slice(&45u16.to_le_bytes());
    out.extend_from_slice(&255u32.to_le_bytes());
    out.push(col.column_type as u8);
    out.extend_from_slice(&col.flags.bits().to_le_bytes());
    out.push(0);
    out.extend_from_slice(&[0, 0]);
    out
}

/// Whether `needle` occurs in `haystack`
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
