//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (gateways reference existing servers,
//!   servers reference existing webhooks)
//! - Validate value ranges and addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Domain collisions are left to the routing index, which sees the
//!   resolved gateway/server pairs

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::hooks::plugin::BUILTIN_PLUGINS;
use crate::hooks::EventKind;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.processing.workers == 0 {
        errors.push(ValidationError::new(
            "processing.workers",
            "must be at least 1",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid address {:?}", config.observability.metrics_address),
        ));
    }

    for (i, name) in config.plugins.enabled.iter().enumerate() {
        if !BUILTIN_PLUGINS.contains(&name.as_str()) {
            errors.push(ValidationError::new(
                format!("plugins.enabled[{}]", i),
                format!("unknown plugin {:?}", name),
            ));
        }
    }

    for (id, gateway) in &config.gateways {
        if gateway.listeners.is_empty() {
            errors.push(ValidationError::new(
                format!("gateways.{}.listeners", id),
                "gateway has no listeners",
            ));
        }
        for (i, listener) in gateway.listeners.iter().enumerate() {
            if listener.bind.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::new(
                    format!("gateways.{}.listeners[{}].bind", id, i),
                    format!("invalid address {:?}", listener.bind),
                ));
            }
        }
        for server_id in &gateway.servers {
            if !config.servers.contains_key(server_id) {
                errors.push(ValidationError::new(
                    format!("gateways.{}.servers", id),
                    format!("unknown server {:?}", server_id),
                ));
            }
        }
    }

    for (id, server) in &config.servers {
        if server.domains.is_empty() {
            errors.push(ValidationError::new(
                format!("servers.{}.domains", id),
                "server has no domains",
            ));
        }
        for (i, domain) in server.domains.iter().enumerate() {
            if domain.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("servers.{}.domains[{}]", id, i),
                    "domain is blank",
                ));
            }
        }
        if server.address.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("servers.{}.address", id),
                "address is empty",
            ));
        }
        if server.dial_timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                format!("servers.{}.dial_timeout_ms", id),
                "must be greater than 0",
            ));
        }
        for webhook_id in &server.webhooks {
            if !config.webhooks.contains_key(webhook_id) {
                errors.push(ValidationError::new(
                    format!("servers.{}.webhooks", id),
                    format!("unknown webhook {:?}", webhook_id),
                ));
            }
        }
    }

    for (id, webhook) in &config.webhooks {
        match url::Url::parse(&webhook.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("webhooks.{}.url", id),
                format!("unsupported scheme {:?}", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("webhooks.{}.url", id),
                e.to_string(),
            )),
        }
        for event in &webhook.events {
            if EventKind::from_name(event).is_none() {
                errors.push(ValidationError::new(
                    format!("webhooks.{}.events", id),
                    format!("unknown event {:?}", event),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
