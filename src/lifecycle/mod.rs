//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Descriptors → Routing index → Hooks → Bind gateways → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop pipeline stages → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: an inconsistent routing table or a failed bind is fatal
//! - Listeners start last (traffic only when the pipeline is ready)
//! - In-flight tunnels are not drained; they end with the process

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{BoundProxy, Proxy, StartupError};
