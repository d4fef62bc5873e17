// Authentication Error Types
// One taxonomy for the OIDC, kubeconfig and local login paths

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::kubeconfig::KubeconfigError;
use super::users::UserStoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    // Configuration errors
    #[error("OIDC provider is not configured")]
    OidcNotConfigured,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Validation errors
    #[error("bad request")]
    BadRequest,

    #[error("Invalid kubeconfig: {0}")]
    InvalidKubeconfig(#[from] KubeconfigError),

    #[error("Unknown kubeconfig context: {0}")]
    UnknownContext(String),

    #[error("Invalid setup request: {0}")]
    InvalidSetup(String),

    // CSRF / replay
    #[error("invalid OIDC state")]
    InvalidState,

    // Local credentials. One message for unknown user and wrong password.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("initial setup has already been completed")]
    SetupAlreadyCompleted,

    #[error("user already exists")]
    UserAlreadyExists,

    // Upstream provider errors
    #[error("OIDC discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("OAuth2 code exchange failed: {0}")]
    CodeExchangeFailed(String),

    #[error("ID token verification failed: {0}")]
    IdTokenVerificationFailed(String),

    /// Token exchange or JWKS fetch outlived the client timeout
    #[error("Provider communication timeout")]
    Timeout,

    // Session errors
    #[error("unauthorized")]
    NoSession,

    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::OidcNotConfigured | AuthError::ConfigError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            AuthError::BadRequest
            | AuthError::InvalidKubeconfig(_)
            | AuthError::UnknownContext(_)
            | AuthError::InvalidSetup(_)
            | AuthError::InvalidState
            | AuthError::CodeExchangeFailed(_)
            | AuthError::IdTokenVerificationFailed(_)
            | AuthError::Timeout => StatusCode::BAD_REQUEST,

            AuthError::InvalidCredentials | AuthError::NoSession => StatusCode::UNAUTHORIZED,

            AuthError::SetupAlreadyCompleted => StatusCode::FORBIDDEN,

            AuthError::UserAlreadyExists => StatusCode::CONFLICT,

            AuthError::DiscoveryFailed(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Errors raised while talking to the identity provider. Never retried here.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AuthError::DiscoveryFailed(_)
                | AuthError::CodeExchangeFailed(_)
                | AuthError::IdTokenVerificationFailed(_)
                | AuthError::Timeout
        )
    }
}

impl From<UserStoreError> for AuthError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::AlreadyExists => AuthError::UserAlreadyExists,
            UserStoreError::SetupCompleted => AuthError::SetupAlreadyCompleted,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "authentication request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "authentication request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
