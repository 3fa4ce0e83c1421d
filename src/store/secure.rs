use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::platform;
use crate::store::file::FileStore;
use crate::token::Token;

/// Bytes that must never appear in a `service`/`account` argument passed to
/// a keyring subprocess: shell metacharacters and the bytes
/// that would let a crafted key smuggle a second argument or command.
const FORBIDDEN_BYTES: &[u8] = b" $|&;><";

/// The OS-native credential manager, reached by shelling out to the
/// platform's keychain tool. Falls back to a per-user file store when the
/// native tool is unavailable or fails.
pub struct SecureStore {
    app: String,
    fallback: FileStore,
}

impl SecureStore {
    pub fn for_app(app: impl Into<String>) -> Self {
        let app = app.into();
        let fallback = FileStore::at(platform::secure_fallback_dir(&app));
        Self { app, fallback }
    }

    fn validate_arg(value: &str, what: &str) -> Result<()> {
        if value.is_empty() {
            return Err(Error::InvalidParameter(format!("{what} must not be empty")));
        }
        if value.starts_with('-') {
            return Err(Error::InvalidParameter(format!(
                "{what} must not start with '-'"
            )));
        }
        if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n' || FORBIDDEN_BYTES.contains(&b)) {
            return Err(Error::InvalidParameter(format!(
                "{what} contains a forbidden byte"
            )));
        }
        Ok(())
    }

    pub(crate) fn save(&self, key: &str, token: &Token) -> Result<()> {
        Self::validate_arg(&self.app, "service")?;
        Self::validate_arg(key, "account")?;
        let body = serde_json::to_string(&token.to_json())?;

        let outcome = if cfg!(target_os = "macos") {
            self.save_macos(key, &body)
        } else if cfg!(target_os = "linux") {
            self.save_linux(key, &body)
        } else {
            None
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "keyring subprocess failed, falling back to file storage");
                self.fallback.save(key, token)
            }
            None => self.fallback.save(key, token),
        }
    }

    pub(crate) fn load(&self, key: &str) -> Result<Option<Token>> {
        Self::validate_arg(&self.app, "service")?;
        Self::validate_arg(key, "account")?;

        let outcome = if cfg!(target_os = "macos") {
            self.load_macos(key)
        } else if cfg!(target_os = "linux") {
            self.load_linux(key)
        } else {
            None
        };

        match outcome {
            Some(Ok(Some(body))) => {
                let value: serde_json::Value = serde_json::from_str(&body)?;
                Ok(Some(Token::from_json(&value)?))
            }
            Some(Ok(None)) => Ok(None),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "keyring subprocess failed, falling back to file storage");
                self.fallback.load(key)
            }
            None => self.fallback.load(key),
        }
    }

    pub(crate) fn delete(&self, key: &str) -> Result<()> {
        Self::validate_arg(&self.app, "service")?;
        Self::validate_arg(key, "account")?;

        let outcome = if cfg!(target_os = "macos") {
            self.delete_macos(key)
        } else if cfg!(target_os = "linux") {
            self.delete_linux(key)
        } else {
            None
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "keyring subprocess failed, falling back to file storage");
                self.fallback.delete(key)
            }
            None => self.fallback.delete(key),
        }
    }

    fn save_macos(&self, key: &str, body: &str) -> Option<std::io::Result<()>> {
        Some(
            Command::new("security")
                .args([
                    "add-generic-password",
                    "-U",
                    "-s",
                    &self.app,
                    "-a",
                    key,
                    "-w",
                    body,
                ])
                .output()
                .and_then(require_success),
        )
    }

    fn load_macos(&self, key: &str) -> Option<std::io::Result<Option<String>>> {
        let output = Command::new("security")
            .args(["find-generic-password", "-s", &self.app, "-a", key, "-w"])
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                Some(Ok(Some(text.trim_end_matches('\n').to_string())))
            }
            Ok(_) => Some(Ok(None)),
            Err(err) => Some(Err(err)),
        }
    }

    fn delete_macos(&self, key: &str) -> Option<std::io::Result<()>> {
        let output = Command::new("security")
            .args(["delete-generic-password", "-s", &self.app, "-a", key])
            .output();
        match output {
            Ok(out) if out.status.success() => Some(Ok(())),
            Ok(out) if out.status.code() == Some(44) => Some(Ok(())), // item not found
            Ok(out) => Some(Err(status_error(out))),
            Err(err) => Some(Err(err)),
        }
    }

    fn save_linux(&self, key: &str, body: &str) -> Option<std::io::Result<()>> {
        let mut child = match Command::new("secret-tool")
            .args([
                "store",
                "--label",
                &format!("{} ({})", self.app, key),
                "service",
                &self.app,
                "account",
                key,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => return Some(Err(err)),
        };
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(body.as_bytes()) {
                return Some(Err(err));
            }
        }
        Some(child.wait_with_output().and_then(require_success))
    }

    fn load_linux(&self, key: &str) -> Option<std::io::Result<Option<String>>> {
        let output = Command::new("secret-tool")
            .args(["lookup", "service", &self.app, "account", key])
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                Some(Ok(Some(text.to_string())))
            }
            Ok(_) => Some(Ok(None)),
            Err(err) => Some(Err(err)),
        }
    }

    fn delete_linux(&self, key: &str) -> Option<std::io::Result<()>> {
        let output = Command::new("secret-tool")
            .args(["clear", "service", &self.app, "account", key])
            .output();
        match output {
            Ok(out) if out.status.success() => Some(Ok(())),
            Ok(out) => Some(Err(status_error(out))),
            Err(err) => Some(Err(err)),
        }
    }
}

fn require_success(out: std::process::Output) -> std::io::Result<()> {
    if out.status.success() {
        Ok(())
    } else {
        Err(status_error(out))
    }
}

fn status_error(out: std::process::Output) -> std::io::Error {
    std::io::Error::other(format!(
        "keyring subprocess exited with {}: {}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_leading_dash() {
        assert!(SecureStore::validate_arg("", "account").is_err());
        assert!(SecureStore::validate_arg("-x", "account").is_err());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        for bad in ["a;b", "a|b", "a&b", "a$b", "a b", "a>b", "a<b"] {
            assert!(SecureStore::validate_arg(bad, "account").is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejects_control_bytes() {
        assert!(SecureStore::validate_arg("a\nb", "account").is_err());
        assert!(SecureStore::validate_arg("a\rb", "account").is_err());
        assert!(SecureStore::validate_arg("a\0b", "account").is_err());
    }

    #[test]
    fn accepts_ordinary_keys() {
        assert!(SecureStore::validate_arg("github:device", "account").is_ok());
    }

    #[test]
    fn falls_back_to_file_store_on_unsupported_platform() {
        if cfg!(not(any(target_os = "macos", target_os = "linux"))) {
            let dir = tempfile::tempdir().unwrap();
            std::env::set_var("LOCALAPPDATA", dir.path());
            let store = SecureStore::for_app("schlussel-test-secure");
            let token = Token {
                access_token: secrecy::SecretString::from("t".to_string()),
                token_type: "bearer".into(),
                refresh_token: None,
                expires_in: None,
                expires_at: None,
                scope: None,
                id_token: None,
            };
            store.save("k", &token).unwrap();
            assert_eq!(store.load("k").unwrap().unwrap(), token);
        }
    }
}
