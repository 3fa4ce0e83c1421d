//! Uniform credential storage over in-memory, plaintext-file, and
//! OS-keyring backends.
//!
//! The set of backends is closed and small, so this crate models it as a
//! tagged enum rather than a trait object: callers match on the kind they
//! configured instead of paying for dynamic dispatch over three known
//! variants.

mod file;
mod memory;
mod secure;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use secure::SecureStore;

use crate::error::{Error, Result};
use crate::token::Token;

/// Maximum length of a storage key.
pub const MAX_KEY_LEN: usize = 255;

/// Validate a storage (or lock) key against the allowed grammar:
/// `[A-Za-z0-9_\-.]+`, not starting with `.`, not containing `..`, `/`, `\`,
/// NUL, CR, or LF, and no longer than 255 bytes.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidParameter("storage key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidParameter(format!(
            "storage key exceeds {MAX_KEY_LEN} bytes"
        )));
    }
    if key.starts_with('.') {
        return Err(Error::InvalidParameter(
            "storage key must not start with '.'".into(),
        ));
    }
    if key.contains("..") || key.contains('/') || key.contains('\\') {
        return Err(Error::InvalidParameter(
            "storage key must not contain path traversal sequences".into(),
        ));
    }
    if key.contains(['\0', '\r', '\n']) {
        return Err(Error::InvalidParameter(
            "storage key must not contain control characters".into(),
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':')
    {
        return Err(Error::InvalidParameter(
            "storage key contains characters outside [A-Za-z0-9_.:-]".into(),
        ));
    }
    Ok(())
}

/// Derive the lock-file stem from a storage key: `:` becomes `_`.
pub fn lock_key(storage_key: &str) -> String {
    storage_key.replace(':', "_")
}

/// A credential-store backend. The three variants share one call surface;
/// callers match on the kind they configured, they don't depend on a trait
/// object.
pub enum Store {
    Memory(MemoryStore),
    File(FileStore),
    Secure(SecureStore),
}

impl Store {
    pub fn save(&self, key: &str, token: &Token) -> Result<()> {
        validate_key(key)?;
        match self {
            Store::Memory(s) => s.save(key, token),
            Store::File(s) => s.save(key, token),
            Store::Secure(s) => s.save(key, token),
        }
    }

    pub fn load(&self, key: &str) -> Result<Option<Token>> {
        validate_key(key)?;
        match self {
            Store::Memory(s) => s.load(key),
            Store::File(s) => s.load(key),
            Store::Secure(s) => s.load(key),
        }
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match self {
            Store::Memory(s) => s.delete(key),
            Store::File(s) => s.delete(key),
            Store::Secure(s) => s.delete(key),
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.load(key)?.is_some())
    }
}
