//! Bedrock Edition reverse proxy.
//!
//! Routes players to backend servers by the address they typed in the
//! client, then relays their session untouched.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::listener ──▶ processing ──▶ routing ──▶ tunnel ◀──▶ backend
//!              (gateways)        (handshake)    (index,      (relay)
//!                                               dial, replay)
//!
//!   cross-cutting: config, hooks, lifecycle, observability, protocol
//! ```
//!
//! Each arrow is an unbounded channel; every stage runs as its own tokio
//! task(s).

// Core pipeline
pub mod net;
pub mod processing;
pub mod protocol;
pub mod routing;
pub mod tunnel;

// Cross-cutting concerns
pub mod config;
pub mod hooks;
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::{Proxy, Shutdown, StartupError};
pub use net::{MemoryTransport, Transport};
pub use protocol::{ClaimsParser, LoginParser};
