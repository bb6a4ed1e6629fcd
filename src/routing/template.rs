//! Placeholder substitution for disconnect messages.
//!
//! Placeholders have the form `{{name}}`. Recognised names are replaced at
//! every occurrence; unknown placeholders are kept as written. Substituted
//! values are never scanned again.

use chrono::Utc;

use crate::net::connection::ProcessedConnection;

/// Values available to a message template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    pub username: String,
    pub now: String,
    pub remote_address: String,
    pub local_address: String,
    pub domain: String,
    pub server_address: String,
    pub gateway_id: String,
}

impl TemplateVars {
    /// Collect the variables of a processed connection.
    ///
    /// `server_address` falls back to the requested domain when no backend
    /// was resolved.
    pub fn from_connection(pc: &ProcessedConnection, server_address: Option<&str>) -> Self {
        Self {
            username: pc.username().to_string(),
            now: Utc::now().format("%d %b %y %H:%M UTC").to_string(),
            remote_address: pc.raw().remote_addr().to_string(),
            local_address: pc.raw().local_addr().to_string(),
            domain: pc.server_host().to_string(),
            server_address: server_address.unwrap_or(pc.server_host()).to_string(),
            gateway_id: pc.raw().gateway_id().to_string(),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "username" => &self.username,
            "now" => &self.now,
            "remoteAddress" => &self.remote_address,
            "localAddress" => &self.local_address,
            "domain" => &self.domain,
            "serverAddress" => &self.server_address,
            "gatewayID" => &self.gateway_id,
            _ => return None,
        };
        Some(value)
    }
}

/// Render `template` against `vars`.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => match vars.get(&after[..end]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[end + 2..];
                }
                None => {
                    // Keep the braces and rescan from the next character so a
                    // nested `{{{{name}}` still resolves its inner placeholder.
                    out.push_str("{{");
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
