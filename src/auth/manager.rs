/// Session Manager
///
/// Owns the session table, the OAuth state store and the PKCE verifier
/// store. Handlers never touch those directly; every session is created,
/// resolved and deleted through this type.
use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::config::AuthConfig;
use super::error::AuthError;
use super::oidc::OidcTokenPayload;
use super::pkce::CodeVerifierStore;
use super::session::{OidcTokens, Session, SessionCredentials, SessionStore};
use super::state::StateStore;

pub struct SessionManager {
    config: AuthConfig,
    /// Context assigned to OIDC and local sessions
    default_context: String,
    sessions: SessionStore,
    states: StateStore,
    verifiers: CodeVerifierStore,
}

impl SessionManager {
    pub fn new(config: AuthConfig, default_context: impl Into<String>) -> Self {
        Self {
            config,
            default_context: default_context.into(),
            sessions: SessionStore::new(),
            states: StateStore::new(),
            verifiers: CodeVerifierStore::new(),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn default_context(&self) -> &str {
        &self.default_context
    }

    /// Session backed by provider tokens. Expiry comes from the provider.
    pub async fn new_session_from_oidc(
        &self,
        subject: &str,
        payload: OidcTokenPayload,
    ) -> Session {
        let session = Session {
            id: super::random_token(),
            subject: subject.to_string(),
            context: self.default_context.clone(),
            created_at: Utc::now(),
            expires_at: payload.expiry,
            credentials: SessionCredentials::Oidc(OidcTokens {
                access_token: payload.access_token,
                refresh_token: payload.refresh_token,
                token_type: payload.token_type,
            }),
        };

        self.store(session).await
    }

    /// Session backed by a pasted kubeconfig bundle.
    pub async fn new_session_from_kubeconfig(
        &self,
        subject: &str,
        bundle: &str,
        context: &str,
    ) -> Session {
        let now = Utc::now();
        let session = Session {
            id: super::random_token(),
            subject: subject.to_string(),
            context: context.to_string(),
            created_at: now,
            expires_at: Some(now + self.config.session_duration()),
            credentials: SessionCredentials::RawCredential {
                bundle: bundle.to_string(),
            },
        };

        self.store(session).await
    }

    /// Session for a verified local account.
    pub async fn new_session_from_local(&self, username: &str, role: &str, context: &str) -> Session {
        let now = Utc::now();
        let session = Session {
            id: super::random_token(),
            subject: username.to_string(),
            context: context.to_string(),
            created_at: now,
            expires_at: Some(now + self.config.session_duration()),
            credentials: SessionCredentials::Local {
                role: role.to_string(),
            },
        };

        self.store(session).await
    }

    async fn store(&self, session: Session) -> Session {
        self.sessions.insert(session.clone()).await;
        info!(
            "Created {} session for {} (context: {:?})",
            session.source(),
            session.subject,
            session.context
        );
        session
    }

    /// Look up a live session.
    ///
    /// Non-OIDC sessions past `expires_at` are reported missing (they stay in
    /// the table). OIDC sessions are returned regardless of expiry.
    pub async fn session_by_id(&self, id: &str) -> Option<Session> {
        self.session_by_id_at(id, Utc::now()).await
    }

    pub(crate) async fn session_by_id_at(&self, id: &str, now: DateTime<Utc>) -> Option<Session> {
        let session = self.sessions.get(id).await?;
        if session.is_expired_at(now) {
            debug!("Session for {} has expired", session.subject);
            return None;
        }
        Some(session)
    }

    /// Remove a session. Unknown IDs are ignored.
    pub async fn delete_session(&self, id: &str) {
        if let Some(session) = self.sessions.remove(id).await {
            info!("Deleted {} session for {}", session.source(), session.subject);
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    // State helpers -----------------------------------------------------------

    pub async fn new_state(&self) -> String {
        self.states.new_state().await
    }

    pub async fn validate_state(&self, state: &str) -> bool {
        self.states.validate_state(state).await
    }

    pub async fn store_code_verifier(&self, state: &str, verifier: String) {
        self.verifiers.store(state, verifier).await;
    }

    /// Remove and return the verifier stored for `state` (empty if none).
    pub async fn take_code_verifier(&self, state: &str) -> String {
        self.verifiers.take(state).await
    }

    pub async fn pending_states(&self) -> usize {
        self.states.len().await
    }

    pub async fn pending_verifiers(&self) -> usize {
        self.verifiers.len().await
    }

    // Cookie helpers ----------------------------------------------------------

    pub fn cookie_name(&self) -> &str {
        self.config.cookie_name()
    }

    /// `Set-Cookie` value carrying `session_id`.
    pub fn session_cookie(&self, session_id: &str) -> Result<HeaderValue, AuthError> {
        self.build_cookie(session_id, self.config.session_ttl)
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn clear_session_cookie(&self) -> Result<HeaderValue, AuthError> {
        self.build_cookie("", 0)
    }

    fn build_cookie(&self, value: &str, max_age: u64) -> Result<HeaderValue, AuthError> {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name(),
            value,
            max_age
        );
        if !self.config.session_domain.is_empty() {
            cookie.push_str("; Domain=");
            cookie.push_str(&self.config.session_domain);
        }
        if self.config.session_secure {
            cookie.push_str("; Secure");
        }

        HeaderValue::from_str(&cookie)
            .map_err(|e| AuthError::Internal(format!("Invalid session cookie: {}", e)))
    }

    /// Session ID from the request's `Cookie` headers, if present and non-empty.
    pub fn session_id_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let name = self.cookie_name();
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .find_map(|cookie| {
                let (key, value) = cookie.trim().split_once('=')?;
                (key == name && !value.is_empty()).then(|| value.to_string())
            })
    }

    /// Resolve the caller's session. Missing cookie, unknown ID and expired
    /// session all give `None`.
    pub async fn session_from_headers(&self, headers: &HeaderMap) -> Option<Session> {
        let session_id = self.session_id_from_headers(headers)?;
        self.session_by_id(&session_id).await
    }
}
