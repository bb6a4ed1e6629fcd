//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! ProcessedConnection (gateway id, requested host)
//!     → router.rs (lookup, allow-list check)
//!     → index.rs (gateway_id@domain → ServerDescriptor)
//!     → dial backend, replay handshake
//!     → Tunnel, or a disconnect rendered by template.rs
//!
//! Index Compilation (at startup):
//!     GatewayDescriptor[] + ServerDescriptor[]
//!     → reject unknown servers and colliding domains
//!     → Freeze as immutable RoutingIndex
//! ```
//!
//! # Design Decisions
//! - Index built at startup, immutable at runtime
//! - Domain matching is exact and case-insensitive
//! - A miss is answered, never treated as an error

pub mod index;
pub mod router;
pub mod template;

pub use index::{IndexError, RoutingIndex, ServerDescriptor};
pub use router::{Resolution, ServerRouter, DEFAULT_NOT_FOUND_MESSAGE};
pub use template::{render, TemplateVars};
