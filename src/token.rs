//! The in-memory credential record, its expiry arithmetic, and its JSON codec.

use std::time::{SystemTime, UNIX_EPOCH};

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A single OAuth credential, as issued by a provider or re-hydrated from storage.
///
/// `expires_at` is fixed at construction time and never mutated: a refresh
/// produces an entirely new `Token`, it never edits one in place.
#[derive(Clone)]
pub struct Token {
    pub access_token: SecretString,
    pub token_type: String,
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<u64>,
    pub expires_at: Option<u64>,
    pub scope: Option<String>,
    pub id_token: Option<SecretString>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("id_token", &self.id_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.token_type == other.token_type
            && secret_opt_eq(&self.refresh_token, &other.refresh_token)
            && self.expires_in == other.expires_in
            && self.expires_at == other.expires_at
            && self.scope == other.scope
            && secret_opt_eq(&self.id_token, &other.id_token)
    }
}
impl Eq for Token {}

fn secret_opt_eq(a: &Option<SecretString>, b: &Option<SecretString>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
        (None, None) => true,
        _ => false,
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Token {
    /// Parse a `Token` from a JSON object, as read back from a credential store.
    ///
    /// `access_token` and `token_type` are required strings. A negative
    /// `expires_in` or `expires_at` fails the parse outright rather than
    /// being silently clamped to zero.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidParameter("token JSON must be an object".into()))?;

        Ok(Token {
            access_token: SecretString::from(required_string(obj, "access_token")?),
            token_type: required_string(obj, "token_type")?,
            refresh_token: optional_string(obj, "refresh_token")?.map(SecretString::from),
            expires_in: optional_u64(obj, "expires_in")?,
            expires_at: optional_u64(obj, "expires_at")?,
            scope: optional_string(obj, "scope")?,
            id_token: optional_string(obj, "id_token")?.map(SecretString::from),
        })
    }

    /// Parse a provider's token-endpoint response and derive `expires_at`
    /// from `expires_in` when the provider didn't send an absolute timestamp.
    pub(crate) fn from_provider_response(value: &Value) -> Result<Self> {
        let mut token = Self::from_json(value)?;
        if let (Some(expires_in), None) = (token.expires_in, token.expires_at) {
            token.expires_at = Some(now_secs() + expires_in);
        }
        Ok(token)
    }

    /// Emit a canonical JSON object containing only the fields that are set.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "access_token".into(),
            Value::String(self.access_token.expose_secret().to_string()),
        );
        obj.insert("token_type".into(), Value::String(self.token_type.clone()));
        if let Some(rt) = &self.refresh_token {
            obj.insert(
                "refresh_token".into(),
                Value::String(rt.expose_secret().to_string()),
            );
        }
        if let Some(v) = self.expires_in {
            obj.insert("expires_in".into(), Value::from(v));
        }
        if let Some(v) = self.expires_at {
            obj.insert("expires_at".into(), Value::from(v));
        }
        if let Some(scope) = &self.scope {
            obj.insert("scope".into(), Value::String(scope.clone()));
        }
        if let Some(id_token) = &self.id_token {
            obj.insert(
                "id_token".into(),
                Value::String(id_token.expose_secret().to_string()),
            );
        }
        Value::Object(obj)
    }

    /// `true` once `expires_at` is at or before now. A token with no
    /// `expires_at` never expires.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now_secs(),
            None => false,
        }
    }

    /// `true` once fewer than `seconds` remain before `expires_at`.
    pub fn expires_within(&self, seconds: u64) -> bool {
        match self.expires_at {
            Some(expires_at) => now_secs().saturating_add(seconds) >= expires_at,
            None => false,
        }
    }

    /// Fraction of the token's lifetime remaining, clamped to `[0, 1]`.
    ///
    /// `None` when either `expires_at` or `expires_in` is absent — there is
    /// no lifetime to take a fraction of.
    pub fn remaining_fraction(&self) -> Option<f64> {
        let (expires_at, expires_in) = (self.expires_at?, self.expires_in?);
        if expires_in == 0 {
            return Some(0.0);
        }
        let now = now_secs();
        let remaining = expires_at.saturating_sub(now) as f64;
        Some((remaining / expires_in as f64).clamp(0.0, 1.0))
    }
}

fn required_string(obj: &Map<String, Value>, key: &str) -> Result<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(Error::InvalidParameter(format!("`{key}` must be a string"))),
        None => Err(Error::InvalidParameter(format!(
            "missing required field `{key}`"
        ))),
    }
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::InvalidParameter(format!("`{key}` must be a string"))),
    }
}

fn optional_u64(obj: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            Error::InvalidParameter(format!("`{key}` must be a non-negative integer"))
        }),
        Some(_) => Err(Error::InvalidParameter(format!(
            "`{key}` must be an integer"
        ))),
    }
}
