//! RFC 7591 Dynamic Client Registration.

use serde_json::{Map, Value};

use super::HttpClient;
use crate::error::{Error, Result};

/// Metadata a caller supplies to register a new OAuth client. Only fields
/// that are present are sent; `redirect_uris` is the only field RFC 7591
/// requires.
#[derive(Debug, Clone, Default)]
pub struct ClientMetadata {
    pub redirect_uris: Vec<String>,
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub scope: Option<String>,
    pub token_endpoint_auth_method: Option<String>,
    /// Further OIDC knobs a caller wants passed through verbatim.
    pub extra: Map<String, Value>,
}

impl ClientMetadata {
    fn to_json(&self) -> Value {
        let mut obj = self.extra.clone();
        obj.insert(
            "redirect_uris".into(),
            Value::Array(self.redirect_uris.iter().cloned().map(Value::String).collect()),
        );
        if let Some(v) = &self.client_name {
            obj.insert("client_name".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.client_uri {
            obj.insert("client_uri".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.logo_uri {
            obj.insert("logo_uri".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.grant_types {
            obj.insert(
                "grant_types".into(),
                Value::Array(v.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(v) = &self.response_types {
            obj.insert(
                "response_types".into(),
                Value::Array(v.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(v) = &self.scope {
            obj.insert("scope".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.token_endpoint_auth_method {
            obj.insert("token_endpoint_auth_method".into(), Value::String(v.clone()));
        }
        Value::Object(obj)
    }
}

/// The server's registration response.
#[derive(Debug, Clone)]
pub struct RegistrationResponse {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub registration_access_token: Option<String>,
    pub registration_client_uri: Option<String>,
    pub raw: Value,
}

impl RegistrationResponse {
    fn from_value(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::ServerError("registration response must be an object".into()))?;
        let client_id = obj
            .get("client_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::ServerError("registration response missing `client_id`".into()))?
            .to_string();
        let client_secret = obj.get("client_secret").and_then(|v| v.as_str()).map(String::from);
        let registration_access_token = obj
            .get("registration_access_token")
            .and_then(|v| v.as_str())
            .map(String::from);
        let registration_client_uri = obj
            .get("registration_client_uri")
            .and_then(|v| v.as_str())
            .map(String::from);
        Ok(Self {
            client_id,
            client_secret,
            registration_access_token,
            registration_client_uri,
            raw: value,
        })
    }
}

/// POST a registration request. Accepts HTTP 200 or 201.
pub fn register(
    http: &HttpClient,
    registration_endpoint: &str,
    metadata: &ClientMetadata,
) -> Result<RegistrationResponse> {
    let (status, body) = http.post_json(registration_endpoint, &metadata.to_json())?;
    if status != 200 && status != 201 {
        return Err(Error::ServerError(format!(
            "registration endpoint returned HTTP {status}: {body}"
        )));
    }
    let value: Value = serde_json::from_str(&body)?;
    RegistrationResponse::from_value(value)
}

/// GET the client's own registration (RFC 7591 `registration_client_uri`).
/// Requires HTTP 200.
pub fn read(http: &HttpClient, registration_client_uri: &str, registration_access_token: &str) -> Result<Value> {
    let (status, body) = http.get_bearer(registration_client_uri, registration_access_token)?;
    if status != 200 {
        return Err(Error::ServerError(format!(
            "registration read returned HTTP {status}: {body}"
        )));
    }
    Ok(serde_json::from_str(&body)?)
}

/// PUT an update to the client's own registration. Requires HTTP 200.
pub fn update(
    http: &HttpClient,
    registration_client_uri: &str,
    registration_access_token: &str,
    metadata: &ClientMetadata,
) -> Result<RegistrationResponse> {
    let (status, body) = http.put_bearer(registration_client_uri, registration_access_token, &metadata.to_json())?;
    if status != 200 {
        return Err(Error::ServerError(format!(
            "registration update returned HTTP {status}: {body}"
        )));
    }
    let value: Value = serde_json::from_str(&body)?;
    RegistrationResponse::from_value(value)
}

/// DELETE the client's own registration. Requires HTTP 200 or 204.
pub fn delete(http: &HttpClient, registration_client_uri: &str, registration_access_token: &str) -> Result<()> {
    let status = http.delete_bearer(registration_client_uri, registration_access_token)?;
    if status != 200 && status != 204 {
        return Err(Error::ServerError(format!(
            "registration delete returned HTTP {status}"
        )));
    }
    Ok(())
}
