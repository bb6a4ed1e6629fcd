//! Tunnels: paired client and backend sessions.
//!
//! # Data Flow
//! ```text
//! Tunnel (from the router)
//!     → pool.rs (spawn relay)
//!     → client ⇄ backend copy loops
//!     → first loop to end closes both legs
//! ```
//!
//! # Design Decisions
//! - No idle timeout: a tunnel lives as long as both legs are open
//! - Packets are relayed as opaque datagrams, never decoded

pub mod pool;

pub use pool::{Tunnel, TunnelPool};
