use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::token::Token;

/// An in-process, in-memory credential store: a mapping from key to
/// serialized token, last-writer-wins. The in-process mutex serializes
/// Memory-store mutations; it gives no cross-process guarantee (that's the
/// lock in [`crate::coordinator`]).
#[derive(Default)]
pub struct MemoryStore {
    tokens: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn save(&self, key: &str, token: &Token) -> Result<()> {
        self.tokens.lock().insert(key.to_string(), token.to_json());
        Ok(())
    }

    pub(crate) fn load(&self, key: &str) -> Result<Option<Token>> {
        match self.tokens.lock().get(key) {
            Some(value) => Ok(Some(Token::from_json(value)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn delete(&self, key: &str) -> Result<()> {
        self.tokens.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn token(access: &str) -> Token {
        Token {
            access_token: SecretString::from(access.to_string()),
            token_type: "bearer".into(),
            refresh_token: None,
            expires_in: None,
            expires_at: None,
            scope: None,
            id_token: None,
        }
    }

    #[test]
    fn last_writer_wins() {
        let store = MemoryStore::new();
        store.save("k", &token("t1")).unwrap();
        store.save("k", &token("t2")).unwrap();
        let loaded = store.load("k").unwrap().unwrap();
        assert_eq!(loaded, token("t2"));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.delete("absent").unwrap();
        store.save("k", &token("t1")).unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.load("k").unwrap(), None);
    }
}
