// Authentication Session Management
// Session model shared by the OIDC, kubeconfig and local login paths

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

/// Which credential flow produced a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionSource {
    #[serde(rename = "oidc")]
    Oidc,
    #[serde(rename = "kubeconfig")]
    RawCredential,
    #[serde(rename = "local")]
    Local,
}

impl SessionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionSource::Oidc => "oidc",
            SessionSource::RawCredential => "kubeconfig",
            SessionSource::Local => "local",
        }
    }
}

impl fmt::Display for SessionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens returned by the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct OidcTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
}

impl fmt::Debug for OidcTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcTokens")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Credential material, one variant per session source
#[derive(Clone, PartialEq, Eq)]
pub enum SessionCredentials {
    Oidc(OidcTokens),
    RawCredential { bundle: String },
    Local { role: String },
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCredentials::Oidc(tokens) => f.debug_tuple("Oidc").field(tokens).finish(),
            SessionCredentials::RawCredential { .. } => f
                .debug_struct("RawCredential")
                .field("bundle", &"[redacted]")
                .finish(),
            SessionCredentials::Local { role } => {
                f.debug_struct("Local").field("role", role).finish()
            }
        }
    }
}

/// An authenticated session
///
/// Immutable once stored; the only lifecycle change is deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub subject: String,
    /// Cluster context the session operates on (may be empty)
    pub context: String,
    pub created_at: DateTime<Utc>,
    /// Unset when an OIDC provider reported no token lifetime
    pub expires_at: Option<DateTime<Utc>>,
    pub credentials: SessionCredentials,
}

impl Session {
    pub fn source(&self) -> SessionSource {
        match self.credentials {
            SessionCredentials::Oidc(_) => SessionSource::Oidc,
            SessionCredentials::RawCredential { .. } => SessionSource::RawCredential,
            SessionCredentials::Local { .. } => SessionSource::Local,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        matches!(
            &self.credentials,
            SessionCredentials::Oidc(OidcTokens { refresh_token: Some(token), .. }) if !token.is_empty()
        )
    }

    pub fn oidc_tokens(&self) -> Option<&OidcTokens> {
        match &self.credentials {
            SessionCredentials::Oidc(tokens) => Some(tokens),
            _ => None,
        }
    }

    pub fn kubeconfig(&self) -> Option<&str> {
        match &self.credentials {
            SessionCredentials::RawCredential { bundle } => Some(bundle),
            _ => None,
        }
    }

    /// Whether lookups at `now` should treat the session as gone.
    ///
    /// OIDC sessions are never expired here, whatever their `expires_at`.
    /// No refresh path exists, so whether this is intended is still open.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.credentials {
            SessionCredentials::Oidc(_) => false,
            SessionCredentials::RawCredential { .. } | SessionCredentials::Local { .. } => {
                self.expires_at.is_some_and(|expires_at| expires_at < now)
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from(self)
    }
}

/// Client-facing view of a session. Never carries token material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub subject: String,
    pub source: SessionSource,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
    pub has_refresh: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            subject: session.subject.clone(),
            source: session.source(),
            context: session.context.clone(),
            has_refresh: session.has_refresh_token(),
            expires_at: session
                .expires_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

/// In-memory session table keyed by opaque session ID
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Returns the removed session, if there was one.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
