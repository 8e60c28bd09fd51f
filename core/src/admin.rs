//! Admin auth: a static credential pair guarding the certificate listing.
//!
//! The credential check sits behind [`CredentialVerifier`] so a real
//! backend can replace [`StaticCredentials`] without touching callers. The
//! authenticated flag lives in a [`SessionStore`] under [`ADMIN_AUTH_KEY`].
//!
//! There is no hashing, no expiry and no lockout.

use std::collections::HashMap;
use std::sync::Arc;

/// Session key holding the admin flag.
pub const ADMIN_AUTH_KEY: &str = "adminAuth";

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Please enter both username and password")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    NotAuthenticated,
}

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Verbatim comparison against one fixed username/password pair.
#[derive(Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
    }
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }
}

/// Process-local string key/value store.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    entries: HashMap<String, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }
}

/// One admin session: a verifier plus the store holding its flag.
pub struct AdminGate {
    verifier: Arc<dyn CredentialVerifier>,
    session: SessionStore,
}

impl std::fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGate")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl AdminGate {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self::with_session(verifier, SessionStore::new())
    }

    /// Resume from an existing store; a flag already present stays valid.
    fn with_session(verifier: Arc<dyn CredentialVerifier>, session: SessionStore) -> Self {
        Self { verifier, session }
    }

    /// Blank input is rejected before the verifier is consulted.
    pub fn login(&mut self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if self.verifier.verify(username, password) {
            self.session.set(ADMIN_AUTH_KEY, "true");
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    pub fn logout(&mut self) {
        self.session.remove(ADMIN_AUTH_KEY);
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.get(ADMIN_AUTH_KEY) == Some("true")
    }

    pub fn require_authenticated(&self) -> Result<(), AuthError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(AuthError::NotAuthenticated)
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }
}
