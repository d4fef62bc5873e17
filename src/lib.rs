use anyhow::Context;
use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

pub mod auth;
pub mod config;

use auth::{AuthState, CredentialStore, InMemoryUserStore, OidcClient, SessionManager};
use config::Config;

/// Build metadata captured by `build.rs`
pub fn version_info() -> serde_json::Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "gitSha": option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "gitCommitTimestamp": option_env!("VERGEN_GIT_COMMIT_TIMESTAMP").unwrap_or("unknown"),
        "buildTimestamp": option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
    })
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid allowed origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    // Credentialed requests need explicit origins
    cors.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Assemble the HTTP application
pub fn build_router(config: &Config, state: AuthState) -> Router {
    let manager = state.manager.clone();

    let protected = Router::new()
        .route("/api/version", get(|| async { Json(version_info()) }))
        .layer(from_fn_with_state(manager, auth::require_session));

    Router::new()
        .route("/healthz", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/readyz", get(|| async { Json(json!({ "status": "ready" })) }))
        .nest("/api/auth", auth::create_auth_router(state))
        .merge(protected)
        .layer(cors_layer(config))
}

/// Discover the OIDC provider when one is configured. Failures are logged and
/// leave the OIDC routes disabled.
pub async fn connect_oidc(config: &Config) -> Option<Arc<OidcClient>> {
    if !config.auth.oidc_requested() {
        info!("OIDC not configured, OIDC login disabled");
        return None;
    }

    match OidcClient::discover(config.auth.oidc()).await {
        Ok(client) => {
            info!("OIDC provider {} ready", client.metadata().issuer);
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("OIDC setup failed, OIDC login disabled: {}", e);
            None
        }
    }
}

/// Build state from configuration and serve until `shutdown` resolves
pub async fn start_server(
    config: Config,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    config
        .auth
        .validate()
        .context("Invalid authentication configuration")?;

    if config.auth.dev_bypass {
        warn!("Authentication dev bypass is enabled; protected routes are open");
    }

    let manager = Arc::new(SessionManager::new(
        config.auth.clone(),
        config.kube_context.clone(),
    ));
    let oidc = connect_oidc(&config).await;
    let users: Arc<dyn CredentialStore> = Arc::new(InMemoryUserStore::new());

    let app = build_router(&config, AuthState::new(manager, oidc, users));

    let listener = TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("Failed to bind {}", config.address))?;
    info!("Listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
