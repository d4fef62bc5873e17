// Authentication Configuration
// Session cookie policy and OIDC provider settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::AuthError;

pub const DEFAULT_COOKIE_NAME: &str = "kz_session";

const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];

/// Upper bound for `session_ttl` (one year)
const MAX_SESSION_TTL: u64 = 365 * 24 * 60 * 60;

/// Authentication configuration, read from `KZ_AUTH_*` variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Disable session enforcement entirely (local development only)
    pub dev_bypass: bool,

    /// Session cookie name
    pub session_name: String,

    /// Session lifetime in seconds, also used as the cookie Max-Age
    pub session_ttl: u64,

    /// Secure flag (HTTPS only)
    pub session_secure: bool,

    /// Cookie domain (empty = current host)
    pub session_domain: String,

    pub oidc_issuer: String,
    pub oidc_client_id: String,
    pub oidc_client_secret: String,
    pub oidc_redirect_url: String,

    /// Comma separated scope list
    pub oidc_scopes: String,

    /// Timeout in seconds for each call to the identity provider
    pub oidc_timeout: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_bypass: true,
            session_name: DEFAULT_COOKIE_NAME.to_string(),
            session_ttl: 24 * 60 * 60,
            session_secure: true,
            session_domain: String::new(),
            oidc_issuer: String::new(),
            oidc_client_id: String::new(),
            oidc_client_secret: String::new(),
            oidc_redirect_url: String::new(),
            oidc_scopes: DEFAULT_SCOPES.join(","),
            oidc_timeout: 30,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.session_ttl == 0 {
            return Err(AuthError::ConfigError(
                "session_ttl must be at least 1 second".to_string(),
            ));
        }

        if self.session_ttl > MAX_SESSION_TTL {
            return Err(AuthError::ConfigError(
                "session_ttl must not exceed one year".to_string(),
            ));
        }

        if self.session_name.contains([';', '=', ' ']) {
            return Err(AuthError::ConfigError(format!(
                "session_name {:?} is not a valid cookie name",
                self.session_name
            )));
        }

        Ok(())
    }

    pub fn cookie_name(&self) -> &str {
        if self.session_name.is_empty() {
            DEFAULT_COOKIE_NAME
        } else {
            &self.session_name
        }
    }

    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl.min(MAX_SESSION_TTL) as i64)
    }

    pub fn scopes(&self) -> Vec<String> {
        let scopes: Vec<String> = self
            .oidc_scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if scopes.is_empty() {
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            scopes
        }
    }

    /// True when any OIDC setting is present. Discovery still decides
    /// whether the provider is usable.
    pub fn oidc_requested(&self) -> bool {
        !(self.oidc_issuer.is_empty()
            && self.oidc_client_id.is_empty()
            && self.oidc_client_secret.is_empty()
            && self.oidc_redirect_url.is_empty())
    }

    pub fn oidc(&self) -> OidcConfig {
        OidcConfig {
            issuer_url: self.oidc_issuer.clone(),
            client_id: self.oidc_client_id.clone(),
            client_secret: self.oidc_client_secret.clone(),
            redirect_url: self.oidc_redirect_url.clone(),
            scopes: self.scopes(),
            timeout: Duration::from_secs(self.oidc_timeout.max(1)),
        }
    }
}

/// Settings needed to talk to one OIDC provider
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

impl OidcConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        let required = [
            ("issuer URL", &self.issuer_url),
            ("client ID", &self.client_id),
            ("client secret", &self.client_secret),
            ("redirect URL", &self.redirect_url),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(AuthError::ConfigError(format!(
                "oidc configuration incomplete: missing {}",
                missing.join(", ")
            )));
        }

        url::Url::parse(&self.redirect_url)
            .map_err(|e| AuthError::ConfigError(format!("Invalid redirect URL: {}", e)))?;
        url::Url::parse(&self.issuer_url)
            .map_err(|e| AuthError::ConfigError(format!("Invalid issuer URL: {}", e)))?;

        Ok(())
    }
}
