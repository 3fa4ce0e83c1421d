//! Authorization Code flow with PKCE.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde_json::Value;

use super::HttpClient;
use crate::error::{Error, Result};
use crate::pkce::Pkce;
use crate::token::Token;
use crate::urlencode;

/// The callback wait budget.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);
const STATE_BYTES: usize = 16;

/// Everything needed to send the user to the provider and then exchange
/// whatever comes back on the loopback callback.
pub struct AuthorizationRequest {
    pub authorize_url: String,
    pub state: String,
    pub pkce: Pkce,
    pub redirect_uri: String,
}

/// Generate a 16-byte random state, base64url-no-pad encoded (22 chars).
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Bind a loopback listener on `127.0.0.1` at an OS-assigned port, returning
/// the listener and the concrete `http://127.0.0.1:{port}{path}` redirect
/// URI.
pub fn bind_loopback(path: &str) -> Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| Error::IoError(e))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::IoError(e))?
        .port();
    Ok((listener, format!("http://127.0.0.1:{port}{path}")))
}

/// Build the authorize URL and the accompanying PKCE/state, ready to hand
/// to the user.
pub fn build_authorization_request(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: Option<&str>,
) -> Result<AuthorizationRequest> {
    super::enforce_https(authorize_endpoint)?;
    let pkce = Pkce::generate();
    let state = generate_state();

    let mut pairs = vec![
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("state", state.as_str()),
        ("code_challenge", pkce.challenge()),
        ("code_challenge_method", crate::pkce::CHALLENGE_METHOD),
    ];
    if let Some(scope) = scope {
        pairs.push(("scope", scope));
    }
    let query = urlencode::form_encode(&pairs);
    let authorize_url = format!("{authorize_endpoint}?{query}");

    Ok(AuthorizationRequest {
        authorize_url,
        state,
        pkce,
        redirect_uri: redirect_uri.to_string(),
    })
}

/// What the loopback callback received.
#[derive(Debug, Clone, Default)]
struct CallbackResult {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Accept exactly one inbound HTTP request on `listener`, parse its request
/// line, and respond with a minimal fixed HTML page.
fn accept_callback(listener: &TcpListener, timeout: Duration) -> Result<CallbackResult> {
    listener
        .set_nonblocking(false)
        .map_err(Error::IoError)?;
    listener
        .set_ttl(64)
        .ok();
    let deadline = Instant::now() + timeout;
    // std::net::TcpListener has no built-in accept timeout; poll with a
    // short nonblocking window instead so the 120s budget is enforceable.
    listener.set_nonblocking(true).map_err(Error::IoError)?;
    loop {
        match listener.accept() {
            Ok((stream, _)) => return handle_connection(stream),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(Error::Timeout("authorization callback".into()));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(Error::IoError(e)),
        }
    }
}

fn handle_connection(mut stream: TcpStream) -> Result<CallbackResult> {
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .map_err(Error::IoError)?;
    let mut reader = BufReader::new(stream.try_clone().map_err(Error::IoError)?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).map_err(Error::IoError)?;

    let path_and_query = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    let query = path_and_query.split_once('?').map(|(_, q)| q).unwrap_or("");
    let pairs = urlencode::parse_query(query);

    let mut result = CallbackResult::default();
    for (key, value) in pairs {
        match key.as_str() {
            "code" => result.code = Some(value),
            "state" => result.state = Some(value),
            "error" => result.error = Some(value),
            "error_description" => result.error_description = Some(value),
            _ => {}
        }
    }

    let is_error = result.error.is_some();
    let (status_line, html) = if is_error {
        ("HTTP/1.1 400 Bad Request", ERROR_HTML)
    } else {
        ("HTTP/1.1 200 OK", SUCCESS_HTML)
    };
    let response = format!(
        "{status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{html}",
        html.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    Ok(result)
}

const SUCCESS_HTML: &str = "<html><body><h1>Authorization complete</h1><p>You may close this window.</p></body></html>";
const ERROR_HTML: &str = "<html><body><h1>Authorization failed</h1><p>You may close this window.</p></body></html>";

/// Run the full Authorization Code + PKCE exchange end to end: wait for the
/// callback, validate `state`, and exchange the code for a token.
pub fn complete_authorization(
    http: &HttpClient,
    listener: &TcpListener,
    request: &AuthorizationRequest,
    token_endpoint: &str,
    client_id: &str,
    client_secret: Option<&str>,
) -> Result<Token> {
    super::enforce_https(token_endpoint)?;
    let callback = accept_callback(listener, CALLBACK_TIMEOUT)?;

    if let Some(returned_state) = &callback.state {
        if returned_state != &request.state {
            return Err(Error::InvalidState);
        }
    }
    if callback.error.is_some() {
        tracing::warn!(
            description = callback.error_description.as_deref().unwrap_or(""),
            "authorization callback reported an error"
        );
        return Err(Error::AuthorizationDenied);
    }
    let code = callback
        .code
        .ok_or_else(|| Error::ServerError("callback did not include an authorization code".into()))?;

    let mut pairs = vec![
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", request.redirect_uri.as_str()),
        ("client_id", client_id),
        ("code_verifier", request.pkce.verifier()),
    ];
    if let Some(secret) = client_secret {
        pairs.push(("client_secret", secret));
    }

    let (status, body) = http.post_form(token_endpoint, &pairs)?;
    if status != 200 {
        return Err(Error::ServerError(format!(
            "token endpoint returned HTTP {status}: {body}"
        )));
    }
    let value: Value = serde_json::from_str(&body)?;
    Token::from_provider_response(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn authorize_url_contains_required_params() {
        let req = build_authorization_request(
            "https://example.com/authorize",
            "client-1",
            "http://127.0.0.1:4000/callback",
            Some("repo"),
        )
        .unwrap();
        assert!(req.authorize_url.contains("code_challenge_method=S256"));
        assert!(req.authorize_url.contains("response_type=code"));
        assert!(req.authorize_url.contains(&format!("state={}", req.state)));
        assert_eq!(req.state.len(), 22);
    }

    #[test]
    fn rejects_insecure_authorize_endpoint() {
        let err = build_authorization_request(
            "http://example.com/authorize",
            "client-1",
            "http://127.0.0.1:4000/callback",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InsecureEndpoint(_)));
    }

    #[test]
    fn bind_loopback_assigns_a_port() {
        let (_listener, redirect_uri) = bind_loopback("/callback").unwrap();
        assert!(redirect_uri.starts_with("http://127.0.0.1:"));
        assert!(redirect_uri.ends_with("/callback"));
    }

    #[test]
    fn state_mismatch_fails_before_token_call() {
        let (listener, redirect_uri) = bind_loopback("/callback").unwrap();
        let port = listener.local_addr().unwrap().port();
        let request = AuthorizationRequest {
            authorize_url: String::new(),
            state: "expected-state".into(),
            pkce: Pkce::generate(),
            redirect_uri,
        };

        let handle = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream
                .write_all(b"GET /callback?code=C&state=TAMPERED HTTP/1.1\r\nHost: x\r\n\r\n")
                .unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf);
        });

        let http = HttpClient::new();
        let err = complete_authorization(
            &http,
            &listener,
            &request,
            "https://example.com/token",
            "client-1",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidState));
        handle.join().unwrap();
    }

    #[test]
    fn callback_error_yields_authorization_denied() {
        let (listener, redirect_uri) = bind_loopback("/callback").unwrap();
        let port = listener.local_addr().unwrap().port();
        let request = AuthorizationRequest {
            authorize_url: String::new(),
            state: "s".into(),
            pkce: Pkce::generate(),
            redirect_uri,
        };

        let handle = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream
                .write_all(b"GET /callback?error=access_denied&state=s HTTP/1.1\r\nHost: x\r\n\r\n")
                .unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf);
        });

        let http = HttpClient::new();
        let err = complete_authorization(
            &http,
            &listener,
            &request,
            "https://example.com/token",
            "client-1",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied));
        handle.join().unwrap();
    }
}
