//! Ties a resolved [`Plan`] to the OAuth flow it names and persists the
//! resulting [`Token`] through a [`Store`].
//!
//! Interactive authentication enters here after formula interpretation: the
//! caller already has a `Plan` (and the `MethodDef` it was resolved from);
//! this module drives whichever flow the plan's [`MethodKind`] selects and
//! saves the outcome under the plan's storage key. Anything that requires
//! showing the user a script step or opening a browser is the caller's job —
//! this module only performs the network exchange.

use crate::error::{Error, Result};
use crate::formula::{Context, MethodDef, MethodKind, Plan};
use crate::oauth::{authcode, device, registration, HttpClient};
use crate::store::Store;
use crate::token::Token;

/// Everything produced while driving an Authorization Code plan that a
/// caller needs in order to render the `open_url` / `wait_for_callback`
/// script steps before the exchange completes.
pub struct AuthorizationCodeSession {
    pub authorize_url: String,
    pub context: Context,
    request: authcode::AuthorizationRequest,
    listener: std::net::TcpListener,
}

/// Drive a Device Code plan end to end: request the device/user code pair,
/// hand the caller a [`Context`] to render its script against, then poll
/// until the flow resolves and save the resulting token.
///
/// `on_authorization` is invoked once the device/user code pair is known,
/// before polling begins, so a caller can render `open_url`/`enter_code`
/// steps; it receives the same [`Context`] that would drive script
/// expansion.
pub fn run_device_flow(
    http: &HttpClient,
    store: &Store,
    method: &MethodDef,
    plan: &Plan,
    on_authorization: impl FnOnce(&Context),
) -> Result<Token> {
    if plan.kind != MethodKind::Device {
        return Err(Error::ConfigurationError(
            "run_device_flow called with a non-device plan".into(),
        ));
    }
    let device_endpoint = method
        .endpoints
        .device
        .as_deref()
        .ok_or_else(|| Error::ConfigurationError("device method missing `device` endpoint".into()))?;
    let token_endpoint = method
        .endpoints
        .token
        .as_deref()
        .ok_or_else(|| Error::ConfigurationError("device method missing `token` endpoint".into()))?;

    let device_auth = device::request_device_authorization(
        http,
        device_endpoint,
        &plan.client_id,
        plan.scope.as_deref(),
    )?;

    let context = Context {
        authorize_url: None,
        pkce_verifier: None,
        state: None,
        redirect_uri: None,
        device_code: Some(device_auth.device_code.clone()),
        user_code: Some(device_auth.user_code.clone()),
        verification_uri: Some(device_auth.verification_uri.clone()),
        verification_uri_complete: device_auth.verification_uri_complete.clone(),
        interval: Some(device_auth.interval),
        expires_in: Some(device_auth.expires_in),
    };
    on_authorization(&context);

    let token = device::poll_for_token(http, token_endpoint, &plan.client_id, &device_auth)?;
    store.save(&plan.storage_key, &token)?;
    Ok(token)
}

/// Start an Authorization Code plan: optionally perform RFC 7591 dynamic
/// registration, bind the loopback listener, and build the authorize URL.
/// The caller renders `open_url` with `authorize_url` and then calls
/// [`finish_authorization_code_flow`] to block on the callback and exchange.
pub fn start_authorization_code_flow(
    http: &HttpClient,
    method: &MethodDef,
    plan: &mut Plan,
) -> Result<AuthorizationCodeSession> {
    if !matches!(
        plan.kind,
        MethodKind::AuthorizationCode | MethodKind::AuthorizationCodeDynamic
    ) {
        return Err(Error::ConfigurationError(
            "start_authorization_code_flow called with a non-authorization-code plan".into(),
        ));
    }
    let authorize_endpoint = method
        .endpoints
        .authorize
        .as_deref()
        .ok_or_else(|| Error::ConfigurationError("authorization code method missing `authorize` endpoint".into()))?;

    if plan.kind == MethodKind::AuthorizationCodeDynamic {
        let dynamic = method.dynamic_registration.as_ref().ok_or_else(|| {
            Error::ConfigurationError("dynamic registration method missing `dynamic_registration` block".into())
        })?;
        let registration_endpoint = method.endpoints.registration.as_deref().ok_or_else(|| {
            Error::ConfigurationError("dynamic registration method missing `registration` endpoint".into())
        })?;
        let metadata = registration::ClientMetadata {
            redirect_uris: dynamic.redirect_uris.clone(),
            client_name: dynamic.client_name.clone(),
            grant_types: dynamic.grant_types.clone(),
            response_types: dynamic.response_types.clone(),
            token_endpoint_auth_method: dynamic.token_endpoint_auth_method.clone(),
            ..Default::default()
        };
        let registered = registration::register(http, registration_endpoint, &metadata)?;
        plan.client_id = registered.client_id;
        plan.client_secret = registered.client_secret;
    }

    let redirect_uri = plan
        .redirect_uri
        .clone()
        .unwrap_or_else(|| "http://127.0.0.1:0/callback".to_string());
    let (listener, redirect_uri, request) = if is_ephemeral_loopback(&redirect_uri) {
        let path = path_of(&redirect_uri);
        let (listener, bound_uri) = authcode::bind_loopback(&path)?;
        let request = authcode::build_authorization_request(
            authorize_endpoint,
            &plan.client_id,
            &bound_uri,
            plan.scope.as_deref(),
        )?;
        (listener, bound_uri, request)
    } else {
        let (listener, _) = authcode::bind_loopback("/callback")?;
        let request = authcode::build_authorization_request(
            authorize_endpoint,
            &plan.client_id,
            &redirect_uri,
            plan.scope.as_deref(),
        )?;
        (listener, redirect_uri, request)
    };

    let context = Context {
        authorize_url: Some(request.authorize_url.clone()),
        pkce_verifier: Some(request.pkce.verifier().to_string()),
        state: Some(request.state.clone()),
        redirect_uri: Some(redirect_uri),
        device_code: None,
        user_code: None,
        verification_uri: None,
        verification_uri_complete: None,
        interval: None,
        expires_in: None,
    };

    Ok(AuthorizationCodeSession {
        authorize_url: request.authorize_url.clone(),
        context,
        request,
        listener,
    })
}

/// Block on the loopback callback, exchange the code, and save the result.
pub fn finish_authorization_code_flow(
    http: &HttpClient,
    store: &Store,
    method: &MethodDef,
    plan: &Plan,
    session: AuthorizationCodeSession,
) -> Result<Token> {
    let token_endpoint = method
        .endpoints
        .token
        .as_deref()
        .ok_or_else(|| Error::ConfigurationError("authorization code method missing `token` endpoint".into()))?;
    let token = authcode::complete_authorization(
        http,
        &session.listener,
        &session.request,
        token_endpoint,
        &plan.client_id,
        plan.client_secret.as_deref(),
    )?;
    store.save(&plan.storage_key, &token)?;
    Ok(token)
}

/// A manual credential plan performs no network exchange; the caller
/// captures a credential (API key, PAT) via its own terminal I/O
/// collaborator and saves it directly through the [`Store`]. Core has
/// nothing to drive here beyond validating that this really is a manual
/// plan and constructing the Token the caller already holds.
pub fn save_manual_credential(store: &Store, plan: &Plan, token: Token) -> Result<Token> {
    if plan.kind != MethodKind::Manual {
        return Err(Error::ConfigurationError(
            "save_manual_credential called with a non-manual plan".into(),
        ));
    }
    store.save(&plan.storage_key, &token)?;
    Ok(token)
}

fn is_ephemeral_loopback(redirect_uri: &str) -> bool {
    redirect_uri.starts_with("http://127.0.0.1:0")
        || redirect_uri.starts_with("http://localhost:0")
}

fn path_of(redirect_uri: &str) -> String {
    redirect_uri
        .split_once("://")
        .and_then(|(_, rest)| rest.split_once('/'))
        .map(|(_, path)| format!("/{path}"))
        .unwrap_or_else(|| "/callback".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_flow_rejects_non_device_plan() {
        let store = Store::Memory(crate::store::MemoryStore::new());
        let http = HttpClient::new();
        let method = MethodDef::default();
        let plan = sample_plan(MethodKind::AuthorizationCode);
        let err = run_device_flow(&http, &store, &method, &plan, |_| {}).unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[test]
    fn manual_save_rejects_non_manual_plan() {
        let store = Store::Memory(crate::store::MemoryStore::new());
        let plan = sample_plan(MethodKind::Device);
        let token = Token {
            access_token: secrecy::SecretString::from("x".to_string()),
            token_type: "bearer".into(),
            refresh_token: None,
            expires_in: None,
            expires_at: None,
            scope: None,
            id_token: None,
        };
        let err = save_manual_credential(&store, &plan, token).unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[test]
    fn is_ephemeral_loopback_detects_port_zero() {
        assert!(is_ephemeral_loopback("http://127.0.0.1:0/callback"));
        assert!(!is_ephemeral_loopback("http://127.0.0.1:4000/callback"));
    }

    fn sample_plan(kind: MethodKind) -> Plan {
        Plan {
            formula_id: "acme".into(),
            method_name: "m".into(),
            kind,
            client_id: "client".into(),
            client_secret: None,
            redirect_uri: None,
            scope: None,
            storage_key: "acme:m".into(),
        }
    }
}
