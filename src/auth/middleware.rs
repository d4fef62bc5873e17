/// Authentication Middleware
///
/// Resolves the caller's session from the session cookie and injects it into
/// request extensions. Handlers behind the middleware use the
/// `CurrentSession` extractor.
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::error::AuthError;
use super::manager::SessionManager;
use super::session::Session;

/// Session of the authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// Reject requests without a live session with 401 `{"error":"unauthorized"}`.
///
/// With `dev_bypass` enabled every request passes through untouched.
pub async fn require_session(
    State(manager): State<Arc<SessionManager>>,
    mut req: Request,
    next: Next,
) -> Response {
    if manager.config().dev_bypass {
        return next.run(req).await;
    }

    match manager.session_from_headers(req.headers()).await {
        Some(session) => {
            req.extensions_mut().insert(CurrentSession(session));
            next.run(req).await
        }
        None => {
            debug!("Rejected request to {} without a session", req.uri().path());
            AuthError::NoSession.into_response()
        }
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(AuthError::NoSession)
    }
}
