// OAuth State Store
// Single-use anti-replay tokens for the OIDC authorization round trip

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How long an issued state stays acceptable.
pub const STATE_LIFETIME_MINUTES: i64 = 10;

/// Issued OAuth state tokens and their expiry.
///
/// There is no sweeper: an expired entry stays until a validation attempt
/// for the same token removes it.
#[derive(Debug)]
pub struct StateStore {
    lifetime: Duration,
    states: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            lifetime: Duration::minutes(STATE_LIFETIME_MINUTES),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a fresh state token.
    pub async fn new_state(&self) -> String {
        self.new_state_at(Utc::now()).await
    }

    pub(crate) async fn new_state_at(&self, now: DateTime<Utc>) -> String {
        let state = super::random_token();
        let expires_at = now + self.lifetime;

        self.states.write().await.insert(state.clone(), expires_at);
        debug!("Issued OAuth state (expires: {})", expires_at);

        state
    }

    /// Consume `state`. True only if it was issued here and has not expired.
    ///
    /// A present token is removed whatever the outcome, so a second call with
    /// the same token always fails.
    pub async fn validate_state(&self, state: &str) -> bool {
        self.validate_state_at(state, Utc::now()).await
    }

    pub(crate) async fn validate_state_at(&self, state: &str, now: DateTime<Utc>) -> bool {
        let Some(expires_at) = self.states.write().await.remove(state) else {
            return false;
        };

        if now < expires_at {
            true
        } else {
            warn!("OAuth state presented after expiry");
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
