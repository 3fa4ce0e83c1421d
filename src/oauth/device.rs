//! RFC 8628 Device Authorization Grant.

use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{oauth_error_kind, HttpClient};
use crate::error::{Error, Result};
use crate::token::Token;

/// Minimum polling interval enforced regardless of what the server sent.
const MIN_INTERVAL_SECS: u64 = 5;
const MAX_INTERVAL_SECS: u64 = 300;
const DEFAULT_INTERVAL_SECS: u64 = 5;
/// Safety cap on polling iterations regardless of `expires_in`.
const MAX_POLL_ITERATIONS: u32 = 500;

/// The device authorization response.
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    pub interval: u64,
}

/// Request a device/user code pair from the device endpoint.
pub fn request_device_authorization(
    http: &HttpClient,
    device_endpoint: &str,
    client_id: &str,
    scope: Option<&str>,
) -> Result<DeviceAuthorization> {
    let mut pairs = vec![("client_id", client_id)];
    if let Some(scope) = scope {
        pairs.push(("scope", scope));
    }
    let (status, body) = http.post_form(device_endpoint, &pairs)?;
    if status != 200 {
        return Err(Error::ServerError(format!(
            "device endpoint returned HTTP {status}"
        )));
    }
    let value: Value = serde_json::from_str(&body)?;
    parse_device_authorization(&value)
}

fn parse_device_authorization(value: &Value) -> Result<DeviceAuthorization> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::ServerError("device authorization response must be an object".into()))?;
    let device_code = required_str(obj, "device_code")?;
    let user_code = required_str(obj, "user_code")?;
    let verification_uri = required_str(obj, "verification_uri")?;
    let verification_uri_complete = obj
        .get("verification_uri_complete")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let expires_in = obj
        .get("expires_in")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::ServerError("device authorization response missing `expires_in`".into()))?;
    // A server-sent interval over 300s is invalid and replaced by the
    // default; anything below the polling minimum is clamped up.
    let interval = match obj.get("interval").and_then(|v| v.as_u64()) {
        None => DEFAULT_INTERVAL_SECS,
        Some(v) if v > MAX_INTERVAL_SECS => DEFAULT_INTERVAL_SECS,
        Some(v) => v.max(MIN_INTERVAL_SECS),
    };

    Ok(DeviceAuthorization {
        device_code,
        user_code,
        verification_uri,
        verification_uri_complete,
        expires_in,
        interval,
    })
}

fn required_str(obj: &serde_json::Map<String, Value>, key: &str) -> Result<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::ServerError(format!("device authorization response missing `{key}`")))
}

/// Poll the token endpoint until the device flow reaches a terminal state.
/// Sleeps inline on the caller's thread — there is no background task.
pub fn poll_for_token(
    http: &HttpClient,
    token_endpoint: &str,
    client_id: &str,
    device_auth: &DeviceAuthorization,
) -> Result<Token> {
    let mut interval = device_auth.interval.max(MIN_INTERVAL_SECS);
    let deadline = Instant::now() + Duration::from_secs(device_auth.expires_in);
    let mut iterations = 0u32;

    loop {
        if Instant::now() >= deadline {
            return Err(Error::DeviceCodeExpired);
        }
        iterations += 1;
        if iterations > MAX_POLL_ITERATIONS {
            return Err(Error::DeviceCodeExpired);
        }

        thread::sleep(Duration::from_secs(interval));

        let (status, body) = http.post_form(
            token_endpoint,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("device_code", &device_auth.device_code),
                ("client_id", client_id),
            ],
        )?;
        let value: Value = serde_json::from_str(&body)?;

        // Providers (GitHub included) report `authorization_pending` and
        // `slow_down` with HTTP 200, not an error status, so the `error`
        // field must be interpreted before falling back to the status code.
        match value.get("error").and_then(|v| v.as_str()) {
            Some("authorization_pending") => {
                tracing::debug!("device flow still pending");
                continue;
            }
            Some("slow_down") => {
                interval += 5;
                tracing::warn!(interval, "device flow told to slow down");
                continue;
            }
            Some(_) => {
                return Err(oauth_error_kind(&value).unwrap_or(Error::ServerError(
                    "device flow returned an unrecognized error".into(),
                )))
            }
            None if status == 200 && value.get("access_token").is_some() => {
                return Token::from_provider_response(&value);
            }
            None => {
                return Err(Error::ServerError(format!(
                    "device token endpoint returned HTTP {status} with no `error` and no `access_token`"
                )))
            }
        }
    }
}
