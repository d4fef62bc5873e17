use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;

/// Configuration for the kubezen server
///
/// Read from `KZ_*` environment variables; `KZ_AUTH_*` variables fill `auth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `development` or `production`; production switches logs to JSON
    pub env: String,
    pub address: String,
    /// Comma separated origins, `*` for any
    pub allowed_origins: String,
    /// Cluster context for OIDC and local sessions
    pub kube_context: String,
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            address: "0.0.0.0:8080".to_string(),
            allowed_origins: "*".to_string(),
            kube_context: String::new(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Layered sources: defaults, then `KZ_*`, then `KZ_AUTH_*`
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(
                Env::prefixed("KZ_")
                    .filter(|key| !key.as_str().to_ascii_lowercase().starts_with("auth_")),
            )
            .merge(Env::prefixed("KZ_AUTH_").map(|key| format!("auth.{}", key.as_str()).into()))
    }

    pub fn from_env() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn allows_any_origin(&self) -> bool {
        let origins = self.allowed_origins();
        origins.is_empty() || origins.iter().any(|origin| origin == "*")
    }
}
