//! The refresh_token grant.
//!
//! This module only executes the HTTP exchange. Preserving the old
//! `refresh_token` when a provider omits a new one is the refresh
//! coordinator's job, not this module's — callers
//! that invoke `refresh` directly are responsible for merging themselves.

use serde_json::Value;

use super::HttpClient;
use crate::error::{Error, Result};
use crate::token::Token;

/// Exchange a refresh token for a new access token.
pub fn refresh(
    http: &HttpClient,
    token_endpoint: &str,
    client_id: &str,
    client_secret: Option<&str>,
    refresh_token: &str,
) -> Result<Token> {
    let mut pairs = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
    ];
    if let Some(secret) = client_secret {
        pairs.push(("client_secret", secret));
    }
    let (status, body) = http.post_form(token_endpoint, &pairs)?;
    if status != 200 {
        return Err(Error::ServerError(format!(
            "refresh endpoint returned HTTP {status}: {body}"
        )));
    }
    let value: Value = serde_json::from_str(&body)?;
    Token::from_provider_response(&value)
}
