// Local User Accounts
// Credential verification boundary used by the username/password login path

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Role given to the account created by initial setup
pub const ADMIN_ROLE: &str = "admin";

/// Identity returned after a successful credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub role: String,
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("user already exists")]
    AlreadyExists,

    #[error("initial setup has already been completed")]
    SetupCompleted,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted user accounts, consumed only through this trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn count_users(&self) -> Result<usize, UserStoreError>;

    async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<UserIdentity, UserStoreError>;

    /// Create the first account. Fails with `SetupCompleted` when any
    /// account exists at the moment of insertion.
    async fn create_initial_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<UserIdentity, UserStoreError>;

    /// `Ok(None)` for an unknown user and for a wrong password alike.
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserIdentity>, UserStoreError>;
}

#[derive(Debug, Clone)]
struct StoredUser {
    username: String,
    password_hash: String,
    role: String,
}

/// Argon2-hashed accounts held in memory
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, StoredUser>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash outside the lock, then check and insert under one write lock.
    async fn insert_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
        require_empty: bool,
    ) -> Result<UserIdentity, UserStoreError> {
        if self.users.read().await.contains_key(username) {
            return Err(UserStoreError::AlreadyExists);
        }

        let password_hash = hash_password_blocking(password).await?;

        let mut users = self.users.write().await;
        if require_empty && !users.is_empty() {
            return Err(UserStoreError::SetupCompleted);
        }
        if users.contains_key(username) {
            return Err(UserStoreError::AlreadyExists);
        }
        users.insert(
            username.to_string(),
            StoredUser {
                username: username.to_string(),
                password_hash,
                role: role.to_string(),
            },
        );
        drop(users);

        info!("Created local user {} (role: {})", username, role);

        Ok(UserIdentity {
            username: username.to_string(),
            role: role.to_string(),
        })
    }
}

#[async_trait]
impl CredentialStore for InMemoryUserStore {
    async fn count_users(&self) -> Result<usize, UserStoreError> {
        Ok(self.users.read().await.len())
    }

    async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<UserIdentity, UserStoreError> {
        self.insert_user(username, password, role, false).await
    }

    async fn create_initial_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<UserIdentity, UserStoreError> {
        self.insert_user(username, password, role, true).await
    }

    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserIdentity>, UserStoreError> {
        let user = self.users.read().await.get(username).cloned();

        let Some(user) = user else {
            // Burn a comparable amount of work so unknown names are not faster
            let password = password.to_string();
            tokio::task::spawn_blocking(move || {
                if let Some(dummy) = dummy_hash() {
                    verify_password(dummy, &password);
                }
            })
            .await
            .map_err(|e| UserStoreError::Hashing(e.to_string()))?;
            return Ok(None);
        };

        if verify_password_blocking(user.password_hash, password).await? {
            Ok(Some(UserIdentity {
                username: user.username,
                role: user.role,
            }))
        } else {
            Ok(None)
        }
    }
}

async fn hash_password_blocking(password: &str) -> Result<String, UserStoreError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| UserStoreError::Hashing(e.to_string()))?
}

async fn verify_password_blocking(hash: String, password: &str) -> Result<bool, UserStoreError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .map_err(|e| UserStoreError::Hashing(e.to_string()))
}

fn hash_password(password: &str) -> Result<String, UserStoreError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| UserStoreError::Hashing(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserStoreError::Hashing(e.to_string()))
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("kubezen-dummy-password").ok())
        .as_deref()
}
