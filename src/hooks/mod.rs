//! Player lifecycle hooks.
//!
//! # Data Flow
//! ```text
//! Router (tunnel created)     → dispatcher.rs → plugins (in process)
//! Tunnel pool (tunnel closed) →               → webhooks (HTTP POST, spawned)
//! ```
//!
//! # Design Decisions
//! - Hooks never block or fail a routing decision; failures are logged
//! - Plugins are linked statically and chosen by name from config

pub mod dispatcher;
pub mod event;
pub mod plugin;
pub mod webhook;

pub use dispatcher::{HookDispatcher, HookError};
pub use event::{Event, EventKind, Player};
pub use plugin::{PlayerLogPlugin, Plugin, PluginError, PluginRegistry};
pub use webhook::{Webhook, WebhookError};
