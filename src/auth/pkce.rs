/// PKCE (Proof Key for Code Exchange) Implementation
///
/// Implements RFC 7636 with the S256 method and keeps the verifier for each
/// pending authorization until the callback for its `state` arrives.
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// The only challenge method this client sends.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Generate a cryptographically random code_verifier
///
/// 32 random bytes, base64url-encoded without padding (43 characters, all from
/// the RFC 7636 unreserved set).
pub fn generate_code_verifier() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Calculate code_challenge from code_verifier using S256 method
///
/// Per RFC 7636: code_challenge = BASE64URL(SHA256(ASCII(code_verifier)))
pub fn code_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Pending code verifiers keyed by authorization `state`.
///
/// Entries have no expiry of their own: the caller validates the correlated
/// CSRF state before taking the verifier.
#[derive(Debug, Default)]
pub struct CodeVerifierStore {
    verifiers: RwLock<HashMap<String, String>>,
}

impl CodeVerifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `verifier` with `state`, replacing any previous verifier.
    pub async fn store(&self, state: &str, verifier: String) {
        let mut verifiers = self.verifiers.write().await;
        if verifiers.insert(state.to_string(), verifier).is_some() {
            debug!("Replaced PKCE verifier for pending state");
        }
    }

    /// Remove and return the verifier for `state`, or an empty string.
    pub async fn take(&self, state: &str) -> String {
        self.verifiers
            .write()
            .await
            .remove(state)
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.verifiers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
