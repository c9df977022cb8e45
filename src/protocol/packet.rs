use std::io::{Read, Write};

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Largest payload a single packet can carry; longer payloads are split
pub const MAX_PAYLOAD_LENGTH: usize = 0xFF_FFFF;

/// MySQL packet header (zero-copy)
///
/// Layout matches MySQL wire protocol:
/// - length: 3 bytes (little-endian, payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        let len = (length as u32).to_le_bytes();
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }
}

/// Reads and writes whole payloads, tracking the packet sequence id
///
/// A command starts a new sequence at 0; every packet in either direction
/// advances it by one.
#[derive(Debug, Default)]
pub struct PacketCodec {
    sequence_id: u8,
    frame: Vec<u8>,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new command sequence
    pub fn reset(&mut self) {
        self.sequence_id = 0;
    }

    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Read one payload, concatenating packets that span multiple 16MB chunks
    #[tracing::instrument(skip_all)]
    pub fn read_payload<R: Read>(&mut self, reader: &mut R, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.clear();
        loop {
            let mut header = PacketHeader::new_zeroed();
            reader.read_exact(header.as_mut_bytes())?;
            if header.sequence_id != self.sequence_id {
                return Err(Error::InvalidPacket);
            }
            self.sequence_id = self.sequence_id.wrapping_add(1);

            let length = header.length();
            let start = buffer.len();
            buffer.resize(start + length, 0);
            reader.read_exact(&mut buffer[start..])?;

            if length < MAX_PAYLOAD_LENGTH {
                return Ok(());
            }
        }
    }

    /// Write one payload, splitting it into 16MB packets if necessary
    #[tracing::instrument(skip_all)]
    pub fn write_payload<W: Write>(&mut self, writer: &mut W, payload: &[u8]) -> Result<()> {
        self.frame.clear();
        let mut last_len = 0;
        for chunk in payload.chunks(MAX_PAYLOAD_LENGTH) {
            self.push_packet(chunk);
            last_len = chunk.len();
        }
        // An empty payload, or one ending exactly on a packet boundary, needs an empty terminator
        if payload.is_empty() || last_len == MAX_PAYLOAD_LENGTH {
            self.push_packet(&[]);
        }

        writer.write_all(&self.frame)?;
        writer.flush()?;
        Ok(())
    }

    fn push_packet(&mut self, chunk: &[u8]) {
        let header = PacketHeader::encode(chunk.len(), self.sequence_id);
        self.frame.extend_from_slice(header.as_bytes());
        self.frame.extend_from_slice(chunk);
        self.sequence_id = self.sequence_id.wrapping_add(1);
    }
}
