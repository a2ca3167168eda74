//! Account Authentication
//!
//! Credential storage behind the [`CredentialStore`] trait. The bundled
//! [`MemoryCredentialStore`] keeps salted SHA-256 digests in memory and can
//! mirror them to a JSON file so accounts survive restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Longest accepted username, in bytes.
pub const MAX_USERNAME_LEN: usize = 31;

/// Longest accepted password, in bytes.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// JSON file the credential store is mirrored to. In-memory only if None.
    pub credentials_path: Option<PathBuf>,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            credentials_path: std::env::var("TELEPHONE_CREDENTIALS")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Open the configured store.
    pub async fn open_store(&self) -> Result<MemoryCredentialStore, CredentialError> {
        match &self.credentials_path {
            Some(path) => MemoryCredentialStore::open(path).await,
            None => Ok(MemoryCredentialStore::new()),
        }
    }
}

/// Numeric account identifier assigned at signup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

/// A verified account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Display name.
    pub username: String,
    /// Preferred language tag.
    pub lang: String,
}

/// Credential store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Username already taken.
    #[error("username {0:?} is already taken")]
    Conflict(String),
    /// Password does not match.
    #[error("wrong password")]
    WrongPassword,
    /// No such account.
    #[error("no account named {0:?}")]
    NotFound(String),
    /// Rejected field.
    #[error("{0}")]
    Invalid(String),
    /// Backing file could not be read or written.
    #[error("credential storage failed: {0}")]
    Storage(String),
}

/// Keyed account store, unique by username.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create an account.
    async fn signup(&self, username: &str, password: &str, lang: &str) -> Result<AccountId, CredentialError>;

    /// Check a password and return the account.
    async fn login(&self, username: &str, password: &str) -> Result<Account, CredentialError>;
}

/// Session-level authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Name already has a live session.
    #[error("{0} is already logged in")]
    AlreadyLoggedIn(String),
    /// Unknown user or wrong password.
    #[error("invalid username or password")]
    InvalidCredentials,
    /// This connection already has a session.
    #[error("this connection is already logged in as {0}")]
    SessionActive(String),
    /// Store failure.
    #[error("{0}")]
    Store(String),
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::WrongPassword | CredentialError::NotFound(_) | CredentialError::Invalid(_) => {
                AuthError::InvalidCredentials
            }
            other => AuthError::Store(other.to_string()),
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Check a username: 1..=31 bytes, printable, no whitespace.
pub fn validate_username(username: &str) -> Result<(), CredentialError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(CredentialError::Invalid(format!(
            "username must be 1 to {MAX_USERNAME_LEN} bytes"
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CredentialError::Invalid(
            "username must not contain spaces or control characters".to_string(),
        ));
    }
    Ok(())
}

/// Check a password: 1..=64 bytes.
pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    if password.is_empty() || password.len() > MAX_PASSWORD_LEN {
        return Err(CredentialError::Invalid(format!(
            "password must be 1 to {MAX_PASSWORD_LEN} bytes"
        )));
    }
    Ok(())
}

/// Check a language tag: 2..=8 ASCII letters (`en`, `it`, `pt`).
pub fn validate_lang(lang: &str) -> Result<(), CredentialError> {
    if (2..=8).contains(&lang.len()) && lang.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(CredentialError::Invalid(format!(
            "language {lang:?} must be 2 to 8 letters, like en or it"
        )))
    }
}

/// Salted digest of a password.
fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"telephone-credential:");
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredAccount {
    id: AccountId,
    username: String,
    lang: String,
    salt: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl StoredAccount {
    fn account(&self) -> Account {
        Account {
            id: self.id,
            username: self.username.clone(),
            lang: self.lang.clone(),
        }
    }
}

/// In-memory credential store with optional JSON file mirroring.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    accounts: RwLock<BTreeMap<String, StoredAccount>>,
    next_id: AtomicU64,
    path: Option<PathBuf>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCredentialStore {
    /// Create an empty, memory-only store.
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            path: None,
        }
    }

    /// Load accounts from `path` (created on first signup if missing).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        let accounts: Vec<StoredAccount> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CredentialError::Storage(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CredentialError::Storage(format!("{}: {}", path.display(), e))),
        };

        let next_id = accounts.iter().map(|a| a.id.0).max().unwrap_or(0) + 1;
        info!("Loaded {} accounts from {}", accounts.len(), path.display());

        Ok(Self {
            accounts: RwLock::new(
                accounts.into_iter().map(|a| (a.username.clone(), a)).collect(),
            ),
            next_id: AtomicU64::new(next_id),
            path: Some(path),
        })
    }

    /// Number of accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// True when no account exists.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    async fn persist(&self, accounts: &BTreeMap<String, StoredAccount>) -> Result<(), CredentialError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let records: Vec<&StoredAccount> = accounts.values().collect();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| CredentialError::Storage(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| CredentialError::Storage(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn signup(&self, username: &str, password: &str, lang: &str) -> Result<AccountId, CredentialError> {
        validate_username(username)?;
        validate_password(password)?;
        validate_lang(lang)?;

        // Held across the file write so snapshots land in order.
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(username) {
            return Err(CredentialError::Conflict(username.to_string()));
        }

        let id = AccountId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let record = StoredAccount {
            id,
            username: username.to_string(),
            lang: lang.to_ascii_lowercase(),
            password_hash: hash_password(&salt, password),
            salt,
            created_at: Utc::now(),
        };
        accounts.insert(username.to_string(), record);

        if let Err(e) = self.persist(&accounts).await {
            accounts.remove(username);
            return Err(e);
        }

        debug!("Account {} created for {}", id.0, username);
        Ok(id)
    }

    async fn login(&self, username: &str, password: &str) -> Result<Account, CredentialError> {
        let accounts = self.accounts.read().await;
        let record = accounts
            .get(username)
            .ok_or_else(|| CredentialError::NotFound(username.to_string()))?;

        if hash_password(&record.salt, password) != record.password_hash {
            return Err(CredentialError::WrongPassword);
        }
        Ok(record.account())
    }
}

// =============================================================================
// TESTS
// =============================================================================
