//! Primitive field codec.
//!
//! # Responsibilities
//! - Variable-length unsigned 32-bit integers (7-bit groups, little-endian,
//!   MSB continuation)
//! - Length-prefixed byte and string fields
//! - Fixed-width integers and booleans used by the handshake packets
//!
//! # Design Decisions
//! - Decoding works on a borrowed datagram; a field never reads past the
//!   end of the slice, whatever length it declares
//! - Encoding into a `Vec<u8>` cannot fail, so writer methods return `()`
//! - A varuint32 that has not terminated after 5 groups is rejected

use std::io::{self, Read, Write};

use thiserror::Error;

/// Maximum number of bits a varuint32 may span on the wire.
const VARUINT32_MAX_BITS: u32 = 35;

/// Errors raised while decoding packet fields.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No terminating byte within 5 groups.
    #[error("varuint32 overflows 35 bits")]
    MalformedVarint,

    /// The reader ran out of bytes in the middle of a field.
    #[error("unexpected end of packet")]
    UnexpectedEof,

    /// A length-prefixed field declared more bytes than remain.
    #[error("field declares {declared} bytes but only {remaining} remain")]
    TruncatedField { declared: usize, remaining: usize },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// The header carried a different packet id than the one decoded.
    #[error("unexpected packet id 0x{actual:02x}, expected 0x{expected:02x}")]
    UnexpectedPacketId { expected: u32, actual: u32 },

    /// A packet body was not fully consumed.
    #[error("{packet}: {remaining} unread bytes left")]
    TrailingBytes { packet: &'static str, remaining: usize },

    /// The datagram does not start with the batch marker.
    #[error("invalid batch marker 0x{0:02x}")]
    InvalidBatchMarker(u8),

    /// The batch contained no packets.
    #[error("batch contains no packets")]
    EmptyBatch,

    /// The decompressed batch is larger than allowed.
    #[error("batch exceeds {limit} bytes after decompression")]
    BatchTooLarge { limit: usize },

    /// Decompression of the batch body failed.
    #[error("decompress batch: {0}")]
    Decompress(#[source] io::Error),
}

/// Decode a varuint32 from a byte-at-a-time reader.
///
/// Fails with [`CodecError::MalformedVarint`] if no terminating byte
/// appears within 35 bits.
pub fn read_varuint32<R: Read>(r: &mut R) -> Result<u32, CodecError> {
    let mut value: u32 = 0;
    let mut byte = [0u8; 1];
    let mut shift = 0;
    while shift < VARUINT32_MAX_BITS {
        r.read_exact(&mut byte)
            .map_err(|_| CodecError::UnexpectedEof)?;
        value |= u32::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(CodecError::MalformedVarint)
}

/// Encode a varuint32 into any writer.
pub fn write_varuint32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    let mut u = value;
    while u >= 0x80 {
        w.write_all(&[(u as u8) | 0x80])?;
        u >>= 7;
    }
    w.write_all(&[u as u8])
}

/// Cursor over a single datagram.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// The unconsumed tail of the datagram.
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let (&b, rest) = self.buf.split_first().ok_or(CodecError::UnexpectedEof)?;
        self.buf = rest;
        Ok(b)
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    pub fn varuint32(&mut self) -> Result<u32, CodecError> {
        // `&[u8]` implements `Read` and advances itself.
        read_varuint32(&mut self.buf)
    }

    pub fn be_i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn le_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Varuint32 length-prefixed byte field.
    pub fn byte_slice(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.varuint32()? as usize;
        self.field(len)
    }

    /// Varuint32 length-prefixed UTF-8 string.
    pub fn string(&mut self) -> Result<String, CodecError> {
        let b = self.byte_slice()?;
        std::str::from_utf8(b)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// A field of `len` bytes whose length was declared by the peer.
    pub fn field(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if len > self.buf.len() {
            return Err(CodecError::TruncatedField {
                declared: len,
                remaining: self.buf.len(),
            });
        }
        let (field, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(field)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.buf.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }
}

/// Growable packet buffer.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, x: u8) {
        self.buf.push(x);
    }

    pub fn bool(&mut self, x: bool) {
        self.buf.push(u8::from(x));
    }

    pub fn varuint32(&mut self, x: u32) {
        // Writing into a Vec never fails.
        let _ = write_varuint32(&mut self.buf, x);
    }

    pub fn be_i32(&mut self, x: i32) {
        self.buf.extend_from_slice(&x.to_be_bytes());
    }

    pub fn le_u32(&mut self, x: u32) {
        self.buf.extend_from_slice(&x.to_le_bytes());
    }

    pub fn byte_slice(&mut self, x: &[u8]) {
        self.varuint32(x.len() as u32);
        self.buf.extend_from_slice(x);
    }

    pub fn string(&mut self, x: &str) {
        self.byte_slice(x.as_bytes());
    }

    pub fn raw(&mut self, x: &[u8]) {
        self.buf.extend_from_slice(x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(n: u32) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.varuint32(n);
        w.into_inner()
    }

    #[test]
    fn varuint32_round_trips_boundaries() {
        for n in [0, 1, 127, 128, 300, 16_383, 16_384, 1 << 21, 1 << 28, u32::MAX] {
            let bytes = encode(n);
            let mut r = PacketReader::new(&bytes);
            assert_eq!(r.varuint32().unwrap(), n);
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn varuint32_wire_format() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn varuint32_rejects_unterminated_stream() {
        let bytes = [0x80u8; 6];
        let mut r = PacketReader::new(&bytes);
        assert!(matches!(r.varuint32(), Err(CodecError::MalformedVarint)));
    }

    #[test]
    fn varuint32_reads_byte_at_a_time() {
        // An endless continuation stream must stop after 5 bytes.
        let mut endless = std::io::repeat(0xff);
        assert!(matches!(
            read_varuint32(&mut endless),
            Err(CodecError::MalformedVarint)
        ));
    }

    #[test]
    fn varuint32_eof_mid_value() {
        let bytes = [0x80u8, 0x80];
        let mut r = PacketReader::new(&bytes);
        assert!(matches!(r.varuint32(), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn byte_slice_leaves_reader_on_next_field() {
        let mut w = PacketWriter::new();
        w.byte_slice(b"abc");
        w.u8(0x42);
        let bytes = w.into_inner();

        let mut r = PacketReader::new(&bytes);
        assert_eq!(r.byte_slice().unwrap(), b"abc");
        assert_eq!(r.u8().unwrap(), 0x42);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn byte_slice_never_over_reads() {
        let mut w = PacketWriter::new();
        w.varuint32(10);
        w.raw(b"short");
        let bytes = w.into_inner();

        let mut r = PacketReader::new(&bytes);
        match r.byte_slice() {
            Err(CodecError::TruncatedField { declared, remaining }) => {
                assert_eq!(declared, 10);
                assert_eq!(remaining, 5);
            }
            other => panic!("expected TruncatedField, got {:?}", other),
        }
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut w = PacketWriter::new();
        w.byte_slice(&[0xff, 0xfe]);
        let bytes = w.into_inner();
        assert!(matches!(
            PacketReader::new(&bytes).string(),
            Err(CodecError::InvalidUtf8)
        ));
    }

    #[test]
    fn fixed_width_integers() {
        let mut w = PacketWriter::new();
        w.be_i32(-2);
        w.le_u32(0x0102_0304);
        let bytes = w.into_inner();
        assert_eq!(&bytes[..4], &[0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(&bytes[4..], &[0x04, 0x03, 0x02, 0x01]);

        let mut r = PacketReader::new(&bytes);
        assert_eq!(r.be_i32().unwrap(), -2);
        assert_eq!(r.le_u32().unwrap(), 0x0102_0304);
    }
}
