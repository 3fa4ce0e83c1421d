//! The refresh coordinator: the check-then-refresh protocol that makes
//! token renewal safe across concurrent processes sharing one store.

use crate::error::{Error, Result};
use crate::lock::RefreshLock;
use crate::oauth::{refresh, HttpClient};
use crate::store::{lock_key, Store};
use crate::token::Token;

/// Refresh when fewer than this fraction of a token's lifetime remains.
/// `0.0` means "only once already expired".
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// What a provider and client needed to run the refresh grant for one key.
/// Threaded through so the coordinator never has to reach back into a
/// `Formula`/`Plan` to know where to POST.
pub struct RefreshTarget<'a> {
    pub token_endpoint: &'a str,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
}

/// Coordinates reads and refreshes of stored tokens across processes that
/// share a [`Store`] and lock directory. One coordinator per `app`
/// namespace; safe to share across threads since `Store` and `RefreshLock`
/// are themselves safe to use concurrently.
pub struct RefreshCoordinator<'s> {
    app: String,
    store: &'s Store,
    http: HttpClient,
}

impl<'s> RefreshCoordinator<'s> {
    pub fn new(app: impl Into<String>, store: &'s Store) -> Self {
        Self {
            app: app.into(),
            store,
            http: HttpClient::new(),
        }
    }

    /// Returns a token valid for immediate use, refreshing it first if
    /// fewer than `threshold` of its lifetime remains:
    ///
    /// 1. Load the stored token. `TokenNotFound` if there is none.
    /// 2. If it isn't expired and isn't within `threshold` of expiring,
    ///    return it as-is — no lock is ever taken on the fast path.
    /// 3. Otherwise the token needs a refresh. Fail immediately with
    ///    `NoRefreshToken` if it has none to refresh with.
    /// 4. Acquire the cross-process lock for this key.
    /// 5. Re-load and re-check under the lock: another process may have
    ///    refreshed (or deleted) it while we were waiting.
    /// 6. Run the refresh grant, merge the old `refresh_token` back in if
    ///    the provider didn't send a new one, and save the result.
    /// 7. Release the lock on every exit path (including errors).
    pub fn get_valid_token(
        &self,
        key: &str,
        threshold: f64,
        target: &RefreshTarget<'_>,
    ) -> Result<Token> {
        let current = self.store.load(key)?.ok_or(Error::TokenNotFound)?;
        if !needs_refresh(&current, threshold) {
            return Ok(current);
        }
        if current.refresh_token.is_none() {
            return Err(Error::NoRefreshToken);
        }

        let mut lock = RefreshLock::acquire(&self.app, &lock_key(key))?;
        let result = self.refresh_under_lock(key, threshold, target);
        let _ = lock.release();
        result
    }

    fn refresh_under_lock(
        &self,
        key: &str,
        threshold: f64,
        target: &RefreshTarget<'_>,
    ) -> Result<Token> {
        // Someone may have refreshed (or deleted) this key while we waited
        // for the lock; re-check before doing any network I/O.
        let current = self.store.load(key)?.ok_or(Error::TokenNotFound)?;
        if !needs_refresh(&current, threshold) {
            return Ok(current);
        }
        let refresh_token = current
            .refresh_token
            .as_ref()
            .ok_or(Error::NoRefreshToken)?;

        let mut refreshed = refresh::refresh(
            &self.http,
            target.token_endpoint,
            target.client_id,
            target.client_secret,
            secrecy::ExposeSecret::expose_secret(refresh_token),
        )?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = current.refresh_token.clone();
        }

        self.store.save(key, &refreshed)?;
        Ok(refreshed)
    }
}

/// A token needs a refresh once it is already expired, or once fewer than
/// `threshold` of its lifetime remains. A token with no lifetime
/// information (`remaining_fraction` is `None`) only refreshes once it has
/// actually expired.
fn needs_refresh(token: &Token, threshold: f64) -> bool {
    if token.is_expired() {
        return true;
    }
    match token.remaining_fraction() {
        Some(fraction) => fraction <= threshold,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use secrecy::SecretString;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn fresh_token() -> Token {
        Token {
            access_token: SecretString::from("a".to_string()),
            token_type: "bearer".into(),
            refresh_token: Some(SecretString::from("r".to_string())),
            expires_in: Some(3600),
            expires_at: Some(now_secs() + 3600),
            scope: None,
            id_token: None,
        }
    }

    fn near_expiry_token() -> Token {
        Token {
            access_token: SecretString::from("a".to_string()),
            token_type: "bearer".into(),
            refresh_token: Some(SecretString::from("r".to_string())),
            expires_in: Some(3600),
            expires_at: Some(now_secs() + 60),
            scope: None,
            id_token: None,
        }
    }

    #[test]
    fn fast_path_returns_token_untouched_when_fresh() {
        let store = Store::Memory(MemoryStore::new());
        store.save("k", &fresh_token()).unwrap();
        let coordinator = RefreshCoordinator::new("schlussel-coord-test-1", &store);
        let target = RefreshTarget {
            token_endpoint: "https://example.com/token",
            client_id: "c",
            client_secret: None,
        };
        let got = coordinator.get_valid_token("k", DEFAULT_THRESHOLD, &target).unwrap();
        assert_eq!(got, fresh_token());
    }

    #[test]
    fn missing_key_is_token_not_found() {
        let store = Store::Memory(MemoryStore::new());
        let coordinator = RefreshCoordinator::new("schlussel-coord-test-2", &store);
        let target = RefreshTarget {
            token_endpoint: "https://example.com/token",
            client_id: "c",
            client_secret: None,
        };
        let err = coordinator
            .get_valid_token("missing", DEFAULT_THRESHOLD, &target)
            .unwrap_err();
        assert!(matches!(err, Error::TokenNotFound));
    }

    #[test]
    fn near_expiry_without_refresh_token_fails_fast() {
        let store = Store::Memory(MemoryStore::new());
        let mut token = near_expiry_token();
        token.refresh_token = None;
        store.save("k", &token).unwrap();
        let coordinator = RefreshCoordinator::new("schlussel-coord-test-3", &store);
        let target = RefreshTarget {
            token_endpoint: "https://example.com/token",
            client_id: "c",
            client_secret: None,
        };
        let err = coordinator
            .get_valid_token("k", DEFAULT_THRESHOLD, &target)
            .unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[test]
    fn needs_refresh_respects_threshold() {
        assert!(!needs_refresh(&fresh_token(), DEFAULT_THRESHOLD));
        assert!(needs_refresh(&near_expiry_token(), DEFAULT_THRESHOLD));
    }

    #[test]
    fn zero_threshold_only_refreshes_on_actual_expiry() {
        assert!(!needs_refresh(&near_expiry_token(), 0.0));
        let mut expired = near_expiry_token();
        expired.expires_at = Some(now_secs() - 1);
        assert!(needs_refresh(&expired, 0.0));
    }
}
