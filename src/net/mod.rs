//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Client session (RakNet or in-process)
//!     → transport.rs (Connection / Listener / Transport seams)
//!     → listener.rs (gateway accept loops, ping status)
//!     → proxy_header.rs (optional PROXY header from a load balancer)
//!     → connection.rs (provenance, captured handshake)
//!     → Hand off to processing
//! ```
//!
//! # Design Decisions
//! - Every stage talks to sessions through `dyn Connection`, so the
//!   pipeline runs unchanged over the in-process transport
//! - The RakNet adapter is compiled only with the `raknet` feature

pub mod connection;
pub mod listener;
pub mod memory;
pub mod proxy_header;
#[cfg(feature = "raknet")]
pub mod raknet;
pub mod transport;

pub use connection::{ConnectionId, ProcessedConnection, RawConnection, TunnelTracker};
pub use listener::{
    BoundGateway, Gateway, GatewayDescriptor, GatewayError, ListenerDescriptor, PingStatus,
};
pub use memory::{MemoryConnection, MemoryTransport};
pub use transport::{Conn, Connection, Listener, Transport};
