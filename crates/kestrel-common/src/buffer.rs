use crate::error::KestrelError;
use crate::types::Result;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Maximum encoded size of a varint covering the 32-bit range.
pub const MAX_VARINT_BYTES: usize = 5;

fn eof(what: &str) -> KestrelError {
    KestrelError::SocketFault(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("not enough bytes to read {}", what),
    ))
}

/// Growable byte buffer with a read cursor. All packet encoding and
/// decoding goes through this type; multi-byte integers are network
/// (big-endian) order.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    buffer: Vec<u8>,
    cursor: usize,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
        }
    }

    /// Wraps an existing byte vector; the cursor starts at 0.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: bytes,
            cursor: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Writes a varint: unsigned LEB128, 7 value bits per byte, high bit
    /// set on every byte except the last.
    pub fn write_varint(&mut self, value: i32) {
        let mut value = value as u32;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                self.buffer.push(byte | 0x80);
            } else {
                self.buffer.push(byte);
                break;
            }
        }
    }

    pub fn read_varint(&mut self) -> Result<i32> {
        self.read_varint_with_size().map(|(value, _)| value)
    }

    /// Reads a varint and reports how many bytes it occupied. Compressed
    /// frame parsing subtracts the size from an outer declared length.
    /// Fails with `MalformedVarint` if no terminating byte appears within
    /// five bytes.
    pub fn read_varint_with_size(&mut self) -> Result<(i32, usize)> {
        let mut result: u32 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = match self.buffer.get(self.cursor) {
                Some(b) => *b,
                None => return Err(eof("varint")),
            };
            self.cursor += 1;
            result |= ((byte & 0x7F) as u32) << (7 * i);

            if byte & 0x80 == 0 {
                return Ok((result as i32, i + 1));
            }
        }
        Err(KestrelError::MalformedVarint)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        match self.buffer.get(self.cursor) {
            Some(b) => {
                self.cursor += 1;
                Ok(*b)
            }
            None => Err(eof("u8")),
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn write_u16(&mut self, value: u16) {
        // Vec<u8> is io::Write; infallible.
        let _ = self.buffer.write_u16::<BigEndian>(value);
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut slice = self
            .buffer
            .get(self.cursor..self.cursor + 2)
            .ok_or_else(|| eof("u16"))?;
        let value = slice.read_u16::<BigEndian>()?;
        self.cursor += 2;
        Ok(value)
    }

    pub fn write_i64(&mut self, value: i64) {
        let _ = self.buffer.write_i64::<BigEndian>(value);
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut slice = self
            .buffer
            .get(self.cursor..self.cursor + 8)
            .ok_or_else(|| eof("i64"))?;
        let value = slice.read_i64::<BigEndian>()?;
        self.cursor += 8;
        Ok(value)
    }

    /// Writes a varint-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        self.write_varint(bytes.len() as i32);
        self.buffer.extend_from_slice(bytes);
    }

    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_varint()? as usize;
        let bytes = self
            .buffer
            .get(self.cursor..self.cursor + length)
            .ok_or_else(|| eof("string"))?;
        let value = String::from_utf8(bytes.to_vec()).map_err(|_| {
            KestrelError::SocketFault(io::Error::new(
                io::ErrorKind::InvalidData,
                "string is not valid UTF-8",
            ))
        })?;
        self.cursor += length;
        Ok(value)
    }

    pub fn write_uuid(&mut self, value: uuid::Uuid) {
        self.buffer.extend_from_slice(value.as_bytes());
    }

    pub fn read_uuid(&mut self) -> Result<uuid::Uuid> {
        let bytes = self
            .buffer
            .get(self.cursor..self.cursor + 16)
            .ok_or_else(|| eof("uuid"))?;
        let value = uuid::Uuid::from_slice(bytes).map_err(|_| eof("uuid"))?;
        self.cursor += 16;
        Ok(value)
    }

    pub fn write_bytes_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Reads `length` raw bytes.
    pub fn read_bytes_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let bytes = self
            .buffer
            .get(self.cursor..self.cursor + length)
            .ok_or_else(|| eof("raw bytes"))?
            .to_vec();
        self.cursor += length;
        Ok(bytes)
    }

    /// Remaining bytes from the cursor to the end of the buffer.
    pub fn read_rest(&mut self) -> Vec<u8> {
        let rest = self.buffer[self.cursor..].to_vec();
        self.cursor = self.buffer.len();
        rest
    }
}
