//! Minimal Bedrock wire protocol.
//!
//! # Data Flow
//! ```text
//! datagram (bytes read from the transport)
//!     → batch.rs   (0xFE marker, decompression, packet split)
//!     → packet.rs  (header: id + sub-clients, Login / Disconnect bodies)
//!     → login.rs   (identity chain + client data → username, server address)
//! ```
//!
//! # Design Decisions
//! - Only the first handshake packet is decoded; everything after it is
//!   relayed as opaque bytes
//! - Decoding never buffers beyond a single datagram

pub mod batch;
pub mod codec;
pub mod login;
pub mod packet;

pub use batch::Compression;
pub use codec::{CodecError, PacketReader, PacketWriter};
pub use login::{ClaimsParser, LoginError, LoginIdentity, LoginParser};
pub use packet::{Disconnect, Header, Login, Packet};
