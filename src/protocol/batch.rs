//! Batch framing of game datagrams.
//!
//! Every datagram starts with [`BATCH_MARKER`]; the body that follows is a
//! (possibly DEFLATE compressed) sequence of varuint32 length-prefixed packets.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};

use crate::protocol::codec::{CodecError, PacketReader, PacketWriter};

/// First byte of every game datagram.
pub const BATCH_MARKER: u8 = 0xfe;

/// Upper bound for a decompressed batch body.
pub const MAX_BATCH_SIZE: usize = 4 * 1024 * 1024;

/// Compression applied to batch bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Raw DEFLATE, as sent by clients before network settings are negotiated.
    #[default]
    Flate,
    None,
}

/// Split a datagram into its packets.
///
/// The returned packets still carry their headers.
pub fn decode(datagram: &[u8], compression: Compression) -> Result<Vec<Vec<u8>>, CodecError> {
    let mut r = PacketReader::new(datagram);
    let marker = r.u8()?;
    if marker != BATCH_MARKER {
        return Err(CodecError::InvalidBatchMarker(marker));
    }

    let body = match compression {
        Compression::None => r.rest().to_vec(),
        Compression::Flate => inflate(r.rest())?,
    };

    let mut r = PacketReader::new(&body);
    let mut packets = Vec::new();
    while r.remaining() > 0 {
        packets.push(r.byte_slice()?.to_vec());
    }
    if packets.is_empty() {
        return Err(CodecError::EmptyBatch);
    }
    Ok(packets)
}

/// Wrap already marshalled packets into one datagram.
pub fn encode(packets: &[Vec<u8>], compression: Compression) -> io::Result<Vec<u8>> {
    let mut body = PacketWriter::new();
    for pk in packets {
        body.byte_slice(pk);
    }
    let body = body.into_inner();

    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(BATCH_MARKER);
    match compression {
        Compression::None => out.extend_from_slice(&body),
        Compression::Flate => {
            let mut enc = DeflateEncoder::new(out, flate2::Compression::default());
            enc.write_all(&body)?;
            out = enc.finish()?;
        }
    }
    Ok(out)
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    DeflateDecoder::new(compressed)
        .take(MAX_BATCH_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    if out.len() > MAX_BATCH_SIZE {
        return Err(CodecError::BatchTooLarge {
            limit: MAX_BATCH_SIZE,
        });
    }
    Ok(out)
}
