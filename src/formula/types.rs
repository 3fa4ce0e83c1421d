use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// The declarative provider description, schema `v2`.
#[derive(Debug, Clone, Deserialize)]
pub struct Formula {
    pub schema: String,
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub identity: Option<String>,
    pub methods: HashMap<String, MethodDef>,
    pub apis: HashMap<String, ApiDef>,
    #[serde(default)]
    pub clients: Vec<Client>,
    /// Unknown top-level fields are preserved rather than rejected,
    /// captured here instead of discarded, so a caller that re-serializes a
    /// `Formula` doesn't silently drop provider extensions.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Formula {
    /// Parse a `Formula` out of an already-loaded JSON value.
    /// Reading the formula file itself is a CLI front-end concern, not this
    /// crate's.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidSchema("formula document must be a JSON object".into()))?;

        match obj.get("schema") {
            Some(Value::String(s)) if s == "v2" => {}
            Some(Value::String(other)) => {
                return Err(Error::InvalidSchema(format!(
                    "unsupported formula schema version `{other}`"
                )))
            }
            Some(_) => return Err(Error::InvalidField("`schema` must be a string".into())),
            None => return Err(Error::MissingField("schema".into())),
        }
        for required in ["id", "label", "methods", "apis"] {
            if !obj.contains_key(required) {
                return Err(Error::MissingField(required.into()));
            }
        }
        serde_json::from_value(value.clone()).map_err(|err| Error::InvalidField(err.to_string()))
    }
}

/// A named authentication recipe within a formula. Its [`MethodKind`] is
/// derived from which endpoints are present, never declared directly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MethodDef {
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub dynamic_registration: Option<DynamicRegistration>,
    #[serde(default)]
    pub script: Option<Vec<ScriptStep>>,
    #[serde(default)]
    pub register: Option<Value>,
}

impl MethodDef {
    /// Derive this method's kind from which endpoints it declares:
    /// - `authorize` + `token`, no `device` → Authorization Code.
    /// - `device` + `token` → Device Code.
    /// - no endpoints → manual credential.
    /// - `dynamic_registration` present → Authorization Code with an RFC
    ///   7591 preflight.
    pub fn kind(&self) -> MethodKind {
        if self.dynamic_registration.is_some() {
            return MethodKind::AuthorizationCodeDynamic;
        }
        match (
            &self.endpoints.authorize,
            &self.endpoints.token,
            &self.endpoints.device,
        ) {
            (Some(_), Some(_), None) => MethodKind::AuthorizationCode,
            (_, Some(_), Some(_)) => MethodKind::Device,
            (None, None, None) => MethodKind::Manual,
            _ => MethodKind::Manual,
        }
    }
}

/// The derived kind of a [`MethodDef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    AuthorizationCode,
    AuthorizationCodeDynamic,
    Device,
    Manual,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Endpoints {
    #[serde(default)]
    pub authorize: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub registration: Option<String>,
}

/// RFC 7591 preflight configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DynamicRegistration {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    #[serde(default)]
    pub response_types: Option<Vec<String>>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
}

/// One of the formula's APIs — out of scope for the core token lifecycle
/// beyond being carried through as data.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDef {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A preconfigured OAuth client.
#[derive(Debug, Clone, Deserialize)]
pub struct Client {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Which methods may use this client. `None` means any method may.
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// The agent-visible instruction list a method renders while it executes.
pub type Script = Vec<ScriptStep>;

/// A single step of a [`Script`].
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// The kind of a [`ScriptStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    OpenUrl,
    EnterCode,
    WaitForCallback,
    WaitForToken,
    CopyKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_missing_required_fields() {
        let err = Formula::from_value(&json!({"schema": "v2", "id": "x"})).unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let err = Formula::from_value(&json!({
            "schema": "v1", "id": "x", "label": "X", "methods": {}, "apis": {}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn method_kind_derivation_covers_all_branches() {
        let auth_code = MethodDef {
            endpoints: Endpoints {
                authorize: Some("https://x/authorize".into()),
                token: Some("https://x/token".into()),
                device: None,
                registration: None,
            },
            ..Default::default()
        };
        assert_eq!(auth_code.kind(), MethodKind::AuthorizationCode);

        let device = MethodDef {
            endpoints: Endpoints {
                authorize: None,
                token: Some("https://x/token".into()),
                device: Some("https://x/device".into()),
                registration: None,
            },
            ..Default::default()
        };
        assert_eq!(device.kind(), MethodKind::Device);

        let manual = MethodDef::default();
        assert_eq!(manual.kind(), MethodKind::Manual);

        let mut dynamic = auth_code.clone();
        dynamic.dynamic_registration = Some(DynamicRegistration {
            client_name: None,
            redirect_uris: vec!["http://127.0.0.1:0/callback".into()],
            grant_types: None,
            response_types: None,
            token_endpoint_auth_method: None,
        });
        assert_eq!(dynamic.kind(), MethodKind::AuthorizationCodeDynamic);
    }
}
