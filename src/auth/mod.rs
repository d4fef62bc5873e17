// Authentication Module
// OIDC, kubeconfig and local username/password logins converging on one
// cookie-transported session

pub mod config;
pub mod error;
pub mod kubeconfig;
pub mod manager;
pub mod middleware;
pub mod oidc;
pub mod pkce;
pub mod routes;
pub mod session;
pub mod state;
pub mod users;

pub use config::{AuthConfig, OidcConfig};
pub use error::AuthError;
pub use manager::SessionManager;
pub use middleware::{CurrentSession, require_session};
pub use oidc::{OidcClient, OidcTokenPayload};
pub use routes::{AuthState, create_auth_router};
pub use session::{Session, SessionCredentials, SessionSource, SessionSummary};
pub use users::{CredentialStore, InMemoryUserStore, UserIdentity, UserStoreError};

/// 128 random bits, hex encoded. Used for session IDs and state tokens.
pub(crate) fn random_token() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
