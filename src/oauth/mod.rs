//! RFC 8628 Device Code, RFC 6749 + RFC 7636 Authorization Code with PKCE,
//! RFC 7591 Dynamic Client Registration, and the refresh grant.

pub mod authcode;
pub mod device;
pub mod registration;
pub mod refresh;

use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};

/// Response bodies are bounded at 1 MiB; anything larger is
/// `ResponseTooLarge` rather than silently truncated.
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Every OAuth endpoint must be `https://`, or one of the loopback
/// development exemptions: `http://localhost`, `http://127.0.0.1`, or
/// `http://[::1]`, with the host matched exactly rather than as a
/// prefix — `http://localhost.evil.com` and `http://127.0.0.1.attacker.com`
/// are not loopback hosts and must not pass.
pub fn enforce_https(url: &str) -> Result<()> {
    if url.starts_with("https://") {
        return Ok(());
    }
    const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];
    if let Some(rest) = url.strip_prefix("http://") {
        for host in LOOPBACK_HOSTS {
            if let Some(after_host) = rest.strip_prefix(host) {
                let host_ends_here = after_host.is_empty()
                    || after_host.starts_with(':')
                    || after_host.starts_with('/');
                if host_ends_here {
                    return Ok(());
                }
            }
        }
    }
    Err(Error::InsecureEndpoint(url.to_string()))
}

/// The blocking HTTP client shared by every flow in this module. A thin
/// wrapper over `reqwest::blocking::Client` exposing a single POST
/// primitive: `(url, body, content_type) -> (status, body)`, bounded to 1
/// MiB of response body.
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("building the default reqwest client must not fail"),
        }
    }

    /// POST `body` to `url` with the given `content_type`, always sending
    /// `Accept: application/json`. Returns `(status, body)`; the body is
    /// read with a 1 MiB cap.
    pub fn post(&self, url: &str, body: String, content_type: &str) -> Result<(u16, String)> {
        enforce_https(url)?;
        tracing::debug!(host = %host_of(url), "posting oauth request");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()?;
        let status = response.status().as_u16();
        let bytes = read_bounded(response)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        tracing::debug!(status, "received oauth response");
        Ok((status, text))
    }

    pub fn post_form(&self, url: &str, pairs: &[(&str, &str)]) -> Result<(u16, String)> {
        self.post(
            url,
            crate::urlencode::form_encode(pairs),
            "application/x-www-form-urlencoded",
        )
    }

    pub fn post_json(&self, url: &str, body: &Value) -> Result<(u16, String)> {
        self.post(url, serde_json::to_string(body)?, "application/json")
    }

    pub fn get_bearer(&self, url: &str, bearer_token: &str) -> Result<(u16, String)> {
        enforce_https(url)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(bearer_token)
            .send()?;
        let status = response.status().as_u16();
        let bytes = read_bounded(response)?;
        Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn put_bearer(&self, url: &str, bearer_token: &str, body: &Value) -> Result<(u16, String)> {
        enforce_https(url)?;
        let response = self
            .client
            .put(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(bearer_token)
            .body(serde_json::to_string(body)?)
            .send()?;
        let status = response.status().as_u16();
        let bytes = read_bounded(response)?;
        Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn delete_bearer(&self, url: &str, bearer_token: &str) -> Result<u16> {
        enforce_https(url)?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(bearer_token)
            .send()?;
        Ok(response.status().as_u16())
    }
}

fn read_bounded(response: reqwest::blocking::Response) -> Result<Vec<u8>> {
    use std::io::Read;
    let mut reader = response.take(MAX_RESPONSE_BYTES + 1);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(|e| Error::HttpError(e.to_string()))?;
    if buf.len() as u64 > MAX_RESPONSE_BYTES {
        return Err(Error::ResponseTooLarge);
    }
    Ok(buf)
}

fn host_of(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(url)
        .to_string()
}

/// Parse an OAuth JSON error response body and surface the matching
/// [`Error`] kind. Returns `None` if the body has no `error` field at all.
pub(crate) fn oauth_error_kind(body: &Value) -> Option<Error> {
    let error = body.get("error")?.as_str()?.to_string();
    Some(match error.as_str() {
        "access_denied" => Error::AuthorizationDenied,
        "expired_token" => Error::DeviceCodeExpired,
        other => Error::ServerError(format!("oauth error: {other}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enforce_https_accepts_loopback_exemptions() {
        assert!(enforce_https("https://example.com/token").is_ok());
        assert!(enforce_https("http://localhost:8080/token").is_ok());
        assert!(enforce_https("http://127.0.0.1:9999/token").is_ok());
        assert!(enforce_https("http://[::1]:9999/token").is_ok());
    }

    #[test]
    fn enforce_https_rejects_plain_http() {
        assert!(enforce_https("http://example.com/token").is_err());
    }

    #[test]
    fn enforce_https_rejects_spoofed_loopback_hosts() {
        assert!(enforce_https("http://localhost.evil.com/token").is_err());
        assert!(enforce_https("http://127.0.0.1.attacker.com/token").is_err());
        assert!(enforce_https("http://localhostx/token").is_err());
        assert!(enforce_https("http://[::1]evil/token").is_err());
    }

    #[test]
    fn enforce_https_accepts_loopback_without_port() {
        assert!(enforce_https("http://localhost/token").is_ok());
        assert!(enforce_https("http://127.0.0.1/token").is_ok());
        assert!(enforce_https("http://[::1]/token").is_ok());
    }

    #[test]
    fn oauth_error_kind_maps_known_errors() {
        assert!(matches!(
            oauth_error_kind(&json!({"error": "access_denied"})),
            Some(Error::AuthorizationDenied)
        ));
        assert!(matches!(
            oauth_error_kind(&json!({"error": "expired_token"})),
            Some(Error::DeviceCodeExpired)
        ));
        assert!(matches!(
            oauth_error_kind(&json!({"error": "invalid_grant"})),
            Some(Error::ServerError(_))
        ));
        assert!(oauth_error_kind(&json!({"access_token": "x"})).is_none());
    }
}
