//! PKCE (RFC 7636) verifier/challenge generation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// The code challenge method this crate always uses.
pub const CHALLENGE_METHOD: &str = "S256";

const VERIFIER_BYTES: usize = 32;
const VERIFIER_LEN: usize = 43;

/// A verifier/challenge pair for the Authorization Code flow with PKCE.
#[derive(Clone, Debug)]
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    /// Generate a fresh verifier (32 random bytes, base64url-no-pad) and its
    /// S256 challenge.
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_from_verifier(&verifier);
        Self { verifier, challenge }
    }

    /// Recompute a `Pkce` pair from an existing verifier.
    ///
    /// Fails with [`Error::InvalidParameter`] unless `verifier` is exactly 43
    /// characters, matching what [`Pkce::generate`] produces.
    pub fn from_verifier(verifier: impl Into<String>) -> Result<Self> {
        let verifier = verifier.into();
        if verifier.len() != VERIFIER_LEN {
            return Err(Error::InvalidParameter(format!(
                "PKCE verifier must be {VERIFIER_LEN} characters, got {}",
                verifier.len()
            )));
        }
        let challenge = challenge_from_verifier(&verifier);
        Ok(Self { verifier, challenge })
    }

    /// The code verifier, sent in the token exchange as `code_verifier`.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The S256 code challenge, sent in the authorize URL as `code_challenge`.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

fn challenge_from_verifier(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_correct_lengths_and_charset() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier().len(), VERIFIER_LEN);
        assert_eq!(pkce.challenge().len(), VERIFIER_LEN);
        assert!(pkce
            .verifier()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn challenge_matches_manual_sha256() {
        let pkce = Pkce::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier().as_bytes()));
        assert_eq!(pkce.challenge(), expected);
    }

    #[test]
    fn from_verifier_recomputes_same_challenge() {
        let original = Pkce::generate();
        let recomputed = Pkce::from_verifier(original.verifier().to_string()).unwrap();
        assert_eq!(original.challenge(), recomputed.challenge());
    }

    #[test]
    fn from_verifier_rejects_wrong_length() {
        let err = Pkce::from_verifier("too-short").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn generate_produces_distinct_pairs() {
        let a = Pkce::generate();
        let b = Pkce::generate();
        assert_ne!(a.verifier(), b.verifier());
    }
}
