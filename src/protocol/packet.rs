//! Packet header and the two handshake packets the proxy understands.

use crate::protocol::codec::{CodecError, PacketReader, PacketWriter};

const PACKET_ID_MASK: u32 = 0x3ff;
const SUB_CLIENT_MASK: u32 = 0x3;
const SENDER_SHIFT: u32 = 10;
const TARGET_SHIFT: u32 = 12;

/// Packet header packed into a single varuint32:
/// `packet_id (bits 0-9) | sender (bits 10-11) | target (bits 12-13)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub packet_id: u32,
    pub sender_sub_client: u8,
    pub target_sub_client: u8,
}

impl Header {
    pub fn new(packet_id: u32) -> Self {
        Self {
            packet_id,
            ..Self::default()
        }
    }

    pub fn read(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        let value = r.varuint32()?;
        Ok(Self {
            packet_id: value & PACKET_ID_MASK,
            sender_sub_client: ((value >> SENDER_SHIFT) & SUB_CLIENT_MASK) as u8,
            target_sub_client: ((value >> TARGET_SHIFT) & SUB_CLIENT_MASK) as u8,
        })
    }

    pub fn write(&self, w: &mut PacketWriter) {
        let value = (self.packet_id & PACKET_ID_MASK)
            | ((u32::from(self.sender_sub_client) & SUB_CLIENT_MASK) << SENDER_SHIFT)
            | ((u32::from(self.target_sub_client) & SUB_CLIENT_MASK) << TARGET_SHIFT);
        w.varuint32(value);
    }
}

/// A packet that can be encoded to and decoded from its body.
pub trait Packet: Sized {
    /// Packet id carried in the header.
    const ID: u32;
    /// Name used in decode errors.
    const NAME: &'static str;

    fn marshal(&self, w: &mut PacketWriter);

    /// Decode the body; the header has already been consumed.
    fn unmarshal(r: &mut PacketReader<'_>) -> Result<Self, CodecError>;
}

/// Decode a single packet (header + body).
///
/// The header id must match `P::ID` and the body must be consumed in full.
pub fn unmarshal<P: Packet>(data: &[u8]) -> Result<P, CodecError> {
    let mut r = PacketReader::new(data);
    let header = Header::read(&mut r)?;
    if header.packet_id != P::ID {
        return Err(CodecError::UnexpectedPacketId {
            expected: P::ID,
            actual: header.packet_id,
        });
    }

    let pk = P::unmarshal(&mut r)?;
    if r.remaining() != 0 {
        return Err(CodecError::TrailingBytes {
            packet: P::NAME,
            remaining: r.remaining(),
        });
    }
    Ok(pk)
}

/// Encode a single packet (header + body).
pub fn marshal<P: Packet>(pk: &P) -> Vec<u8> {
    let mut w = PacketWriter::new();
    Header::new(P::ID).write(&mut w);
    pk.marshal(&mut w);
    w.into_inner()
}

/// First packet a client sends once the transport session is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub client_protocol: i32,
    /// Identity chain and client data, see [`crate::protocol::login`].
    pub connection_request: Vec<u8>,
}

impl Packet for Login {
    const ID: u32 = 0x01;
    const NAME: &'static str = "Login";

    fn marshal(&self, w: &mut PacketWriter) {
        w.be_i32(self.client_protocol);
        w.byte_slice(&self.connection_request);
    }

    fn unmarshal(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            client_protocol: r.be_i32()?,
            connection_request: r.byte_slice()?.to_vec(),
        })
    }
}

/// Sent to a client to end its session with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub hide_disconnect_screen: bool,
    pub message: String,
}

impl Disconnect {
    /// The screen is hidden when there is nothing to show.
    pub fn with_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            hide_disconnect_screen: message.is_empty(),
            message,
        }
    }
}

impl Packet for Disconnect {
    const ID: u32 = 0x05;
    const NAME: &'static str = "Disconnect";

    fn marshal(&self, w: &mut PacketWriter) {
        w.bool(self.hide_disconnect_screen);
        w.string(&self.message);
    }

    fn unmarshal(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            hide_disconnect_screen: r.bool()?,
            message: r.string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_every_sub_client_pair() {
        for packet_id in [0u32, 1, 0x05, 0x1ff, 1023] {
            for sender in 0..=3u8 {
                for target in 0..=3u8 {
                    let header = Header {
                        packet_id,
                        sender_sub_client: sender,
                        target_sub_client: target,
                    };
                    let mut w = PacketWriter::new();
                    header.write(&mut w);
                    let bytes = w.into_inner();
                    let decoded = Header::read(&mut PacketReader::new(&bytes)).unwrap();
                    assert_eq!(decoded, header);
                }
            }
        }
    }

    #[test]
    fn header_bit_layout() {
        let header = Header {
            packet_id: 0x01,
            sender_sub_client: 2,
            target_sub_client: 1,
        };
        let mut w = PacketWriter::new();
        header.write(&mut w);
        let bytes = w.into_inner();
        let value = crate::protocol::codec::read_varuint32(&mut bytes.as_slice()).unwrap();
        assert_eq!(value, 0x01 | (2 << 10) | (1 << 12));
    }

    #[test]
    fn login_decodes() {
        let login = Login {
            client_protocol: 407,
            connection_request: b"chain".to_vec(),
        };
        let bytes = marshal(&login);
        assert_eq!(unmarshal::<Login>(&bytes).unwrap(), login);
    }

    #[test]
    fn wrong_packet_id_is_rejected() {
        let bytes = marshal(&Disconnect::with_message("bye"));
        match unmarshal::<Login>(&bytes) {
            Err(CodecError::UnexpectedPacketId { expected, actual }) => {
                assert_eq!(expected, Login::ID);
                assert_eq!(actual, Disconnect::ID);
            }
            other => panic!("expected UnexpectedPacketId, got {:?}", other),
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = marshal(&Login {
            client_protocol: 1,
            connection_request: vec![1, 2, 3],
        });
        bytes.push(0x00);
        assert!(matches!(
            unmarshal::<Login>(&bytes),
            Err(CodecError::TrailingBytes { packet: "Login", remaining: 1 })
        ));
    }

    #[test]
    fn disconnect_hides_screen_only_without_message() {
        assert!(Disconnect::with_message("").hide_disconnect_screen);
        let pk = Disconnect::with_message("Server offline");
        assert!(!pk.hide_disconnect_screen);
        assert_eq!(unmarshal::<Disconnect>(&marshal(&pk)).unwrap(), pk);
    }
}
