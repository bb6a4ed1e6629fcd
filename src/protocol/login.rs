//! Login connection request parsing.
//!
//! # Responsibilities
//! - Split the connection request into the identity chain and client data
//! - Extract the claimed display name and the requested server address
//!
//! # Design Decisions
//! - Signatures are NOT validated; the proxy only needs a routing key and a
//!   name for log lines. Backends still validate the chain themselves since
//!   they receive the untouched handshake.
//! - The parser sits behind [`LoginParser`] so a validating implementation
//!   can be swapped in

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

use crate::protocol::codec::{CodecError, PacketReader};

/// Errors raised while extracting the login claims.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("malformed connection request: {0}")]
    Framing(#[from] CodecError),

    #[error("invalid identity chain: {0}")]
    Chain(#[source] serde_json::Error),

    #[error("malformed token: {0}")]
    Token(&'static str),

    #[error("invalid token claims: {0}")]
    Claims(#[source] serde_json::Error),

    #[error("identity chain carries no display name")]
    MissingDisplayName,
}

/// What the proxy learns from a login handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginIdentity {
    pub display_name: String,
    /// Address the client typed in, possibly with a port.
    pub server_address: String,
}

/// Extracts identity claims from a login connection request.
pub trait LoginParser: Send + Sync + std::fmt::Debug {
    fn parse(&self, connection_request: &[u8]) -> Result<LoginIdentity, LoginError>;
}

/// Reads the claims without verifying the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimsParser;

#[derive(Deserialize)]
struct Chain {
    chain: Vec<String>,
}

#[derive(Deserialize)]
struct IdentityClaims {
    #[serde(rename = "extraData")]
    extra_data: Option<ExtraData>,
}

#[derive(Deserialize)]
struct ExtraData {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Deserialize)]
struct ClientData {
    #[serde(rename = "ServerAddress", default)]
    server_address: String,
}

impl LoginParser for ClaimsParser {
    fn parse(&self, connection_request: &[u8]) -> Result<LoginIdentity, LoginError> {
        let mut r = PacketReader::new(connection_request);
        let chain_len = r.le_u32()? as usize;
        let chain = r.field(chain_len)?;
        let token_len = r.le_u32()? as usize;
        let token = r.field(token_len)?;

        let chain: Chain = serde_json::from_slice(chain).map_err(LoginError::Chain)?;

        // The display name sits in the last certificate that carries extraData.
        let mut display_name = None;
        for jwt in &chain.chain {
            let claims: IdentityClaims = decode_claims(jwt)?;
            if let Some(extra) = claims.extra_data {
                display_name = Some(extra.display_name);
            }
        }
        let display_name = display_name.ok_or(LoginError::MissingDisplayName)?;

        let token = std::str::from_utf8(token).map_err(|_| LoginError::Token("not UTF-8"))?;
        let client: ClientData = decode_claims(token)?;

        Ok(LoginIdentity {
            display_name,
            server_address: client.server_address,
        })
    }
}

fn decode_claims<T: for<'de> Deserialize<'de>>(jwt: &str) -> Result<T, LoginError> {
    let mut segments = jwt.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(LoginError::Token("expected three segments")),
    };
    let payload = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| LoginError::Token("payload is not base64url"))?;
    serde_json::from_slice(&payload).map_err(LoginError::Claims)
}
