/// Authentication Routes
///
/// HTTP handlers for the three login paths, initial setup, session info and
/// logout. Mounted under `/api/auth`.
use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::AuthError;
use super::kubeconfig::Kubeconfig;
use super::manager::SessionManager;
use super::oidc::OidcClient;
use super::session::{Session, SessionSummary};
use super::users::{ADMIN_ROLE, CredentialStore};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 6;

/// Shared state for the authentication routes
#[derive(Clone)]
pub struct AuthState {
    pub manager: Arc<SessionManager>,
    /// `None` when OIDC is not configured or discovery failed
    pub oidc: Option<Arc<OidcClient>>,
    pub users: Arc<dyn CredentialStore>,
}

impl AuthState {
    pub fn new(
        manager: Arc<SessionManager>,
        oidc: Option<Arc<OidcClient>>,
        users: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            manager,
            oidc,
            users,
        }
    }

    fn oidc_client(&self) -> Result<&OidcClient, AuthError> {
        self.oidc.as_deref().ok_or(AuthError::OidcNotConfigured)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatusResponse {
    pub needs_setup: bool,
    pub auth_methods: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct OidcStartResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OidcCallbackParams {
    pub state: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct KubeconfigLoginRequest {
    pub kubeconfig: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Set the session cookie and return the session summary
fn session_response(manager: &SessionManager, session: &Session) -> Result<Response, AuthError> {
    let cookie = manager.session_cookie(&session.id)?;
    Ok(([(header::SET_COOKIE, cookie)], Json(session.summary())).into_response())
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        warn!("Rejected request body: {}", rejection.body_text());
        AuthError::BadRequest
    })
}

/// Whether initial setup is still pending and which login methods exist
async fn auth_status(State(state): State<AuthState>) -> Result<Json<AuthStatusResponse>, AuthError> {
    let count = state.users.count_users().await?;

    let mut auth_methods = vec!["local"];
    if state.oidc.is_some() {
        auth_methods.push("oidc");
    }

    Ok(Json(AuthStatusResponse {
        needs_setup: count == 0,
        auth_methods,
    }))
}

/// Begin the OIDC flow: issue a state token and the provider URL to visit
async fn oidc_start(State(state): State<AuthState>) -> Result<Json<OidcStartResponse>, AuthError> {
    let client = state.oidc_client()?;

    let csrf_state = state.manager.new_state().await;
    let request = client.authorization_url(&csrf_state)?;
    state
        .manager
        .store_code_verifier(&csrf_state, request.code_verifier)
        .await;

    Ok(Json(OidcStartResponse {
        url: request.url,
        state: csrf_state,
    }))
}

/// Provider redirect target. Validates state, exchanges the code and opens a session.
async fn oidc_callback(
    State(state): State<AuthState>,
    Query(params): Query<OidcCallbackParams>,
) -> Result<Response, AuthError> {
    let client = state.oidc_client()?;

    if !state.manager.validate_state(&params.state).await {
        warn!("OIDC callback with invalid state");
        return Err(AuthError::InvalidState);
    }

    if params.code.is_empty() {
        return Err(AuthError::BadRequest);
    }

    let code_verifier = state.manager.take_code_verifier(&params.state).await;
    let payload = client
        .exchange(&params.code, &code_verifier)
        .await
        .inspect_err(|e| {
            if e.is_upstream() {
                warn!("OIDC code exchange failed: {}", e);
            }
        })?;

    let subject = payload.display_name().to_string();
    let session = state.manager.new_session_from_oidc(&subject, payload).await;

    session_response(&state.manager, &session)
}

/// Log in with a pasted kubeconfig
async fn kubeconfig_login(
    State(state): State<AuthState>,
    payload: Result<Json<KubeconfigLoginRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let request = json_body(payload)?;

    let kubeconfig = Kubeconfig::parse(&request.kubeconfig)?;
    let context = kubeconfig
        .resolve_context(&request.context)
        .ok_or_else(|| {
            let requested = request.context.trim();
            AuthError::UnknownContext(if requested.is_empty() {
                kubeconfig.current_context.clone()
            } else {
                requested.to_string()
            })
        })?;

    let subject = if request.user.is_empty() {
        context.name.as_str()
    } else {
        request.user.as_str()
    };

    let session = state
        .manager
        .new_session_from_kubeconfig(subject, &request.kubeconfig, &context.name)
        .await;

    session_response(&state.manager, &session)
}

/// Log in with a local username and password
async fn local_login(
    State(state): State<AuthState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let request = json_body(payload)?;
    if request.username.is_empty() || request.password.is_empty() {
        return Err(AuthError::BadRequest);
    }

    let identity = state
        .users
        .verify_credentials(&request.username, &request.password)
        .await?
        .ok_or_else(|| {
            info!("Failed local login attempt");
            AuthError::InvalidCredentials
        })?;

    let session = state
        .manager
        .new_session_from_local(
            &identity.username,
            &identity.role,
            state.manager.default_context(),
        )
        .await;

    session_response(&state.manager, &session)
}

/// Create the first admin account. Refused once any account exists.
async fn initial_setup(
    State(state): State<AuthState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    if state.users.count_users().await? > 0 {
        return Err(AuthError::SetupAlreadyCompleted);
    }

    let request = json_body(payload)?;
    validate_setup(&request)?;

    let identity = state
        .users
        .create_initial_user(&request.username, &request.password, ADMIN_ROLE)
        .await?;
    info!("Initial setup completed, admin user {}", identity.username);

    let session = state
        .manager
        .new_session_from_local(
            &identity.username,
            &identity.role,
            state.manager.default_context(),
        )
        .await;

    session_response(&state.manager, &session)
}

fn validate_setup(request: &CredentialsRequest) -> Result<(), AuthError> {
    let username_len = request.username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username_len) {
        return Err(AuthError::InvalidSetup(format!(
            "username must be {} to {} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }

    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidSetup(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    Ok(())
}

/// Summary of the caller's session
async fn session_info(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<SessionSummary>, AuthError> {
    state
        .manager
        .session_from_headers(&headers)
        .await
        .map(|session| Json(session.summary()))
        .ok_or(AuthError::NoSession)
}

/// Drop the caller's session (if any) and clear the cookie. Always 204.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = state.manager.session_id_from_headers(&headers) {
        state.manager.delete_session(&session_id).await;
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    match state.manager.clear_session_cookie() {
        Ok(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
        Err(e) => warn!("Could not build clearing cookie: {}", e),
    }
    response
}

/// Create authentication router with all routes
pub fn create_auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/status", get(auth_status))
        .route("/oidc/start", get(oidc_start))
        .route("/oidc/callback", get(oidc_callback))
        .route("/kubeconfig", post(kubeconfig_login))
        .route("/login", post(local_login))
        .route("/setup", post(initial_setup))
        .route("/session", get(session_info))
        .route("/logout", post(logout))
        .with_state(state)
}
