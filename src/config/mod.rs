//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, written from the embedded default when missing)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → resolve.rs (apply defaults, build descriptors)
//!     → GatewayDescriptor / ServerDescriptor / Webhook (immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod resolve;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError, DEFAULT_CONFIG};
pub use schema::ProxyConfig;
pub use validation::{validate_config, ValidationError};
