//! Platform-appropriate base directories for the file store, the keyring
//! fallback, and the cross-process lock directory.

use std::path::PathBuf;

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Base directory for persisted credentials: `{data_dir}/{app}`.
///
/// - Linux: `$XDG_DATA_HOME` else `$HOME/.local/share/{app}`.
/// - macOS: `$HOME/Library/Application Support/{app}`.
/// - Windows: `%LOCALAPPDATA%\{app}`.
/// - Otherwise: `/tmp/{app}`.
pub fn data_dir(app: &str) -> PathBuf {
    if cfg!(target_os = "macos") {
        if let Some(home) = env_nonempty("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join(app);
        }
    } else if cfg!(target_os = "windows") {
        if let Some(local) = env_nonempty("LOCALAPPDATA") {
            return PathBuf::from(local).join(app);
        }
    } else if let Some(xdg) = env_nonempty("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join(app);
    } else if let Some(home) = env_nonempty("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(app);
    }
    PathBuf::from("/tmp").join(app)
}

/// Base directory for the per-user keyring fallback store, used when the
/// native keyring tool is unavailable (Windows, or any OS where the
/// subprocess failed). Shares the same base as [`data_dir`], under a
/// `keyring-fallback` child so it never collides with the plaintext-file
/// backend an operator has also opted into.
pub fn secure_fallback_dir(app: &str) -> PathBuf {
    data_dir(app).join("keyring-fallback")
}

/// Base directory for cross-process lock files.
///
/// - Linux: `$XDG_RUNTIME_DIR/{app}/locks`.
/// - macOS: `$HOME/Library/Caches/{app}/locks`.
/// - Windows: `%LOCALAPPDATA%\{app}\locks`.
/// - Otherwise: `/tmp/{app}/locks`.
pub fn lock_dir(app: &str) -> PathBuf {
    if cfg!(target_os = "macos") {
        if let Some(home) = env_nonempty("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Caches")
                .join(app)
                .join("locks");
        }
    } else if cfg!(target_os = "windows") {
        if let Some(local) = env_nonempty("LOCALAPPDATA") {
            return PathBuf::from(local).join(app).join("locks");
        }
    } else if let Some(runtime) = env_nonempty("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join(app).join("locks");
    }
    PathBuf::from("/tmp").join(app).join("locks")
}

/// Create `dir` (and parents) with owner-only permissions where the OS
/// supports it (mode `0700`).
pub fn ensure_private_dir(dir: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Restrict a file's permissions to owner-only (mode `0600`) where the OS
/// supports it.
pub fn restrict_file_perms(path: &std::path::Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
