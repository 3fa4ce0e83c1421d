use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::platform;
use crate::token::Token;

/// Reads are bounded at 1 MiB; a larger file on disk is
/// treated as corrupt rather than parsed.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Plaintext-JSON file credential store: `{base}/{key}.json`.
///
/// `base` is created with owner-only permissions on first write; every file
/// written gets mode `0600` where the OS supports it. Keys are validated by
/// [`crate::store::validate_key`] before `Store::save`/`load`/`delete`
/// dispatch here, so this module never needs to defend against traversal
/// itself — but it still resolves paths by joining under `base` only.
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    /// A file store rooted at the platform-appropriate data directory for
    /// `app`.
    pub fn for_app(app: &str) -> Self {
        Self {
            base: platform::data_dir(app),
        }
    }

    /// A file store rooted at an explicit directory, for tests or callers
    /// that manage their own layout.
    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }

    pub(crate) fn save(&self, key: &str, token: &Token) -> Result<()> {
        platform::ensure_private_dir(&self.base)?;
        let path = self.path_for(key);
        let body = serde_json::to_vec(&token.to_json())?;
        write_atomically(&path, &body)?;
        platform::restrict_file_perms(&path)?;
        Ok(())
    }

    pub(crate) fn load(&self, key: &str) -> Result<Option<Token>> {
        let path = self.path_for(key);
        let bytes = match read_bounded(&path, MAX_FILE_BYTES) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::IoError(err)),
        };
        let value = serde_json::from_slice(&bytes)?;
        Ok(Some(Token::from_json(&value)?))
    }

    pub(crate) fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::IoError(err)),
        }
    }
}

/// Write-temp-then-rename in place of a non-atomic in-place write.
fn write_atomically(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("token"),
        std::process::id()
    ));
    loop {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(mut f) => {
                use std::io::Write;
                f.write_all(body)?;
                f.sync_all()?;
                break;
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                tmp_path = dir.join(format!(
                    ".{}.tmp-{}-{}",
                    path.file_name().and_then(|n| n.to_str()).unwrap_or("token"),
                    std::process::id(),
                    rand_suffix()
                ));
                continue;
            }
            Err(err) => return Err(err),
        }
    }
    std::fs::rename(&tmp_path, path)
}

fn rand_suffix() -> u32 {
    use rand::RngCore;
    rand::rng().next_u32()
}

fn read_bounded(path: &Path, max_bytes: u64) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    let mut limited = (&mut file).take(max_bytes + 1);
    let mut buf = Vec::new();
    limited.read_to_end(&mut buf)?;
    if buf.len() as u64 > max_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "stored token file exceeds the maximum allowed size",
        ));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn token() -> Token {
        Token {
            access_token: SecretString::from("tok".to_string()),
            token_type: "bearer".into(),
            refresh_token: Some(SecretString::from("r".to_string())),
            expires_in: None,
            expires_at: None,
            scope: None,
            id_token: None,
        }
    }

    #[test]
    fn save_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::at(dir.path());
        store.save("github:device", &token()).unwrap();
        let loaded = store.load("github:device").unwrap().unwrap();
        assert_eq!(loaded, token());
        store.delete("github:device").unwrap();
        assert_eq!(store.load("github:device").unwrap(), None);
    }

    #[test]
    fn delete_of_absent_key_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::at(dir.path());
        store.delete("nope").unwrap();
    }

    #[test]
    fn load_of_absent_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::at(dir.path());
        assert_eq!(store.load("nope").unwrap(), None);
    }

    #[test]
    fn last_writer_wins_on_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::at(dir.path());
        let mut t2 = token();
        t2.access_token = SecretString::from("tok2".to_string());
        store.save("k", &token()).unwrap();
        store.save("k", &t2).unwrap();
        assert_eq!(store.load("k").unwrap().unwrap(), t2);
    }

    #[test]
    fn oversize_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::at(dir.path());
        platform::ensure_private_dir(dir.path()).unwrap();
        let path = dir.path().join("big.json");
        let oversized = vec![b'a'; (MAX_FILE_BYTES + 1) as usize];
        std::fs::write(&path, oversized).unwrap();
        assert!(store.load("big").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn creates_files_and_dir_with_owner_only_perms() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested");
        let store = FileStore::at(&base);
        store.save("k", &token()).unwrap();
        let dir_mode = std::fs::metadata(&base).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        let file_mode = std::fs::metadata(base.join("k.json"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(file_mode, 0o600);
    }
}
