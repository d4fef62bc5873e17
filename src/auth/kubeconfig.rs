// Kubeconfig Credential Bundles
// Minimal reader for pasted kubeconfig documents: enough to check that the
// bundle parses and names the context a session will use.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("kubeconfig is empty")]
    Empty,

    #[error("kubeconfig is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unexpected document kind {0:?}, expected Config")]
    WrongKind(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub current_context: String,

    #[serde(default)]
    pub contexts: Vec<NamedContext>,

    #[serde(default)]
    pub clusters: Vec<NamedEntry>,

    #[serde(default)]
    pub users: Vec<NamedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: ContextRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextRef {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Cluster or user entry; only the name matters here
#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntry {
    pub name: String,
}

impl Kubeconfig {
    pub fn parse(raw: &str) -> Result<Self, KubeconfigError> {
        if raw.trim().is_empty() {
            return Err(KubeconfigError::Empty);
        }

        let config: Kubeconfig = serde_yaml::from_str(raw)?;

        if let Some(kind) = &config.kind
            && !kind.is_empty()
            && kind != "Config"
        {
            return Err(KubeconfigError::WrongKind(kind.clone()));
        }

        Ok(config)
    }

    pub fn context(&self, name: &str) -> Option<&NamedContext> {
        self.contexts.iter().find(|ctx| ctx.name == name)
    }

    /// Resolve the context a login asked for.
    ///
    /// `requested` is trimmed; when empty the bundle's `current-context` is
    /// used. Returns `None` when the resulting name is not defined.
    pub fn resolve_context(&self, requested: &str) -> Option<&NamedContext> {
        let requested = requested.trim();
        let name = if requested.is_empty() {
            self.current_context.as_str()
        } else {
            requested
        };

        if name.is_empty() {
            return None;
        }

        self.context(name)
    }

    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.iter().map(|ctx| ctx.name.as_str()).collect()
    }
}
