//! The declarative provider description (schema `v2`) and the interpreter
//! that turns (formula, method, overrides) into an executable plan.
//!
//! Loading a formula document from disk is the CLI front-end's job: it
//! reads the JSON file and hands this crate an already-parsed
//! [`serde_json::Value`]; `Formula::from_value` is the supported entry
//! point.

mod script;
mod types;

pub use script::{Context, ResolvedScript};
pub use types::{ApiDef, Client, Formula, MethodDef, MethodKind, Script, ScriptStep};

use crate::error::{Error, Result};

/// Overrides a caller may supply on top of whatever a formula/method/client
/// combination would otherwise produce.
#[derive(Default, Debug, Clone)]
pub struct Overrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub identity: Option<String>,
}

/// The fully-resolved plan produced by the formula interpreter: which
/// method/client to use, and the storage key the resulting token will be
/// saved under. Executing the plan against the OAuth endpoints is a
/// separate step, handled by [`crate::engine`].
#[derive(Debug, Clone)]
pub struct Plan {
    pub formula_id: String,
    pub method_name: String,
    pub kind: MethodKind,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub storage_key: String,
}

impl Formula {
    /// Select a method and client and resolve the plan's static parts —
    /// everything that doesn't require network I/O.
    ///
    /// Authorization-Code loopback binding, PKCE/state generation, and the
    /// device-authorization POST all happen in [`crate::oauth`] once this
    /// plan is hand off to it; they are not part of interpretation.
    pub fn resolve_plan(
        &self,
        method: Option<&str>,
        client: Option<&str>,
        overrides: &Overrides,
    ) -> Result<Plan> {
        let client_def = self.select_client(client, &overrides.client_id)?;
        let method_name = self.select_method(method, client_def)?;
        let method_def = self.methods.get(&method_name).ok_or_else(|| {
            Error::ConfigurationError(format!("method `{method_name}` not found in formula"))
        })?;
        let kind = method_def.kind();

        let client_id = overrides
            .client_id
            .clone()
            .or_else(|| client_def.map(|c| c.id.clone()))
            .ok_or(Error::MissingClientId)?;
        let client_secret = overrides
            .client_secret
            .clone()
            .or_else(|| client_def.and_then(|c| c.secret.clone()));
        let redirect_uri = overrides
            .redirect_uri
            .clone()
            .or_else(|| client_def.and_then(|c| c.redirect_uri.clone()));
        let scope = overrides
            .scope
            .clone()
            .or_else(|| method_def.scope.clone());

        let storage_key = storage_key(&self.id, &method_name, overrides.identity.as_deref())?;

        Ok(Plan {
            formula_id: self.id.clone(),
            method_name,
            kind,
            client_id,
            client_secret,
            redirect_uri,
            scope,
            storage_key,
        })
    }

    /// Resolve which client definition is in play, if any.
    ///
    /// If the caller names a client it must exist. If no client is named
    /// and no `client_id` override is given, the formula's first listed
    /// client (if any) is adopted by default.
    fn select_client(&self, client_name: Option<&str>, client_id_override: &Option<String>) -> Result<Option<&Client>> {
        if let Some(name) = client_name {
            let client = self
                .clients
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| Error::ConfigurationError(format!("client `{name}` not found in formula")))?;
            return Ok(Some(client));
        }
        if client_id_override.is_some() {
            return Ok(None);
        }
        Ok(self.clients.first())
    }

    /// Derive the method to execute.
    ///
    /// An explicit method must exist, and if a client restricts which
    /// methods it may use, the chosen method must be in that list. With no
    /// explicit method, exactly one compatible method must exist or
    /// selection fails with an enumeration of the compatible candidates.
    fn select_method(&self, method: Option<&str>, client: Option<&Client>) -> Result<String> {
        if let Some(name) = method {
            if !self.methods.contains_key(name) {
                return Err(Error::ConfigurationError(format!(
                    "method `{name}` not found in formula"
                )));
            }
            if let Some(client) = client {
                if let Some(allowed) = &client.methods {
                    if !allowed.iter().any(|m| m == name) {
                        return Err(Error::ConfigurationError(format!(
                            "client `{}` cannot use method `{name}`",
                            client.name
                        )));
                    }
                }
            }
            return Ok(name.to_string());
        }

        let compatible: Vec<&String> = self
            .methods
            .keys()
            .filter(|name| match client.and_then(|c| c.methods.as_ref()) {
                Some(allowed) => allowed.iter().any(|m| m.as_str() == name.as_str()),
                None => true,
            })
            .collect();

        match compatible.as_slice() {
            [one] => Ok((*one).clone()),
            [] => Err(Error::ConfigurationError(
                "no method is compatible with the selected client".into(),
            )),
            many => {
                let mut names: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
                names.sort_unstable();
                Err(Error::ConfigurationError(format!(
                    "method is ambiguous; compatible methods: {}",
                    names.join(", ")
                )))
            }
        }
    }
}

/// Compute the storage key for `(formula_id, method, identity)`:
/// `{formula_id}:{method}` or `{formula_id}:{method}:{identity}`.
pub fn storage_key(formula_id: &str, method: &str, identity: Option<&str>) -> Result<String> {
    let key = match identity {
        Some(identity) => format!("{formula_id}:{method}:{identity}"),
        None => format!("{formula_id}:{method}"),
    };
    crate::store::validate_key(&key)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device_formula() -> Formula {
        Formula::from_value(&json!({
            "schema": "v2",
            "id": "github",
            "label": "GitHub",
            "methods": {
                "device": {
                    "endpoints": {
                        "device": "https://github.com/login/device/code",
                        "token": "https://github.com/login/oauth/access_token"
                    }
                }
            },
            "apis": {},
            "clients": [
                {"name": "default", "id": "abc123"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn derives_device_kind_from_endpoints() {
        let formula = device_formula();
        let plan = formula.resolve_plan(None, None, &Overrides::default()).unwrap();
        assert_eq!(plan.kind, MethodKind::Device);
        assert_eq!(plan.client_id, "abc123");
        assert_eq!(plan.storage_key, "github:device");
    }

    #[test]
    fn fails_without_client_id_when_no_client_listed() {
        let mut formula = device_formula();
        formula.clients.clear();
        let err = formula.resolve_plan(None, None, &Overrides::default()).unwrap_err();
        assert!(matches!(err, Error::MissingClientId));
    }

    #[test]
    fn override_client_id_wins_over_formula_client() {
        let formula = device_formula();
        let overrides = Overrides {
            client_id: Some("override-id".into()),
            ..Default::default()
        };
        let plan = formula.resolve_plan(None, None, &overrides).unwrap();
        assert_eq!(plan.client_id, "override-id");
    }

    #[test]
    fn identity_is_folded_into_storage_key() {
        let formula = device_formula();
        let overrides = Overrides {
            identity: Some("alice".into()),
            ..Default::default()
        };
        let plan = formula.resolve_plan(None, None, &overrides).unwrap();
        assert_eq!(plan.storage_key, "github:device:alice");
    }

    #[test]
    fn ambiguous_method_lists_candidates() {
        let formula = Formula::from_value(&json!({
            "schema": "v2",
            "id": "multi",
            "label": "Multi",
            "methods": {
                "device": {"endpoints": {"device": "https://x/device", "token": "https://x/token"}},
                "manual": {}
            },
            "apis": {}
        }))
        .unwrap();
        let err = formula.resolve_plan(None, None, &Overrides::default()).unwrap_err();
        match err {
            Error::ConfigurationError(msg) => {
                assert!(msg.contains("device"));
                assert!(msg.contains("manual"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
