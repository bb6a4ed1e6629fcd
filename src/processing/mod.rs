//! Handshake processing subsystem.
//!
//! # Data Flow
//! ```text
//! RawConnection (from gateways)
//!     → processor.rs (PROXY header, first datagram, login decode)
//!     → ProcessedConnection (to the router)
//! ```
//!
//! # Design Decisions
//! - One pass per connection, no retries: any failure closes it
//! - Workers share one inbound queue; order across connections is not kept

pub mod processor;

pub use processor::{ConnProcessor, ProcessError};
