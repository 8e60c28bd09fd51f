//! CertificateManager: owns the registry and the admin sessions.
//!
//! Every registry mutation happens under one `tokio::sync::Mutex`, so id
//! generation and insertion are atomic with respect to concurrent issuers.
//! The verification delay is awaited before that lock is taken.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use certd_core::config::AppConfig;
use certd_core::{
    AdminGate, AuthError, Certificate, CredentialVerifier, FieldErrors, IssuanceError,
    IssueRequest, Issuer, Registry, RegistryError, VerifyError, Verifier,
};
use certd_protocol::{
    AdminListResult, AdminLoginResult, AdminLogoutResult, CertVerifyResult, ServiceStatusResult,
};
use tokio::sync::Mutex;

/// Error type for manager operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("unknown session: {session_id}")]
    UnknownSession { session_id: String },

    #[error("certificate not found: {id}")]
    NotFound { id: String },

    #[error("infrastructure error: {0}")]
    Infra(String),
}

impl From<RegistryError> for ManagerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { id } => ManagerError::NotFound { id },
            other @ RegistryError::IdSpaceExhausted { .. } => {
                ManagerError::Infra(other.to_string())
            }
        }
    }
}

impl From<IssuanceError> for ManagerError {
    fn from(err: IssuanceError) -> Self {
        match err {
            IssuanceError::Validation(fields) => ManagerError::Validation(fields),
            IssuanceError::Registry(err) => err.into(),
        }
    }
}

impl From<VerifyError> for ManagerError {
    fn from(err: VerifyError) -> Self {
        ManagerError::InvalidRequest {
            reason: err.to_string(),
        }
    }
}

/// Upper bound on concurrently open admin sessions.
pub const MAX_ADMIN_SESSIONS: usize = 64;

/// Open admin sessions in login order; the oldest is evicted past the cap.
#[derive(Debug, Default)]
struct SessionTable {
    entries: HashMap<String, (u64, AdminGate)>,
    next_seq: u64,
}

impl SessionTable {
    fn insert(&mut self, session_id: String, gate: AdminGate, max: usize) {
        while self.entries.len() >= max.max(1) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                    tracing::info!("Evicted oldest admin session {id}");
                }
                None => break,
            }
        }
        self.entries.insert(session_id, (self.next_seq, gate));
        self.next_seq += 1;
    }

    fn get(&self, session_id: &str) -> Option<&AdminGate> {
        self.entries.get(session_id).map(|(_, gate)| gate)
    }

    fn remove(&mut self, session_id: &str) -> Option<AdminGate> {
        self.entries.remove(session_id).map(|(_, gate)| gate)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Serves issuance, verification and admin calls for one process.
pub struct CertificateManager {
    registry: Arc<Mutex<Registry>>,
    /// Logged-in admin sessions, keyed by session id.
    sessions: Arc<Mutex<SessionTable>>,
    max_sessions: usize,
    issuer: Issuer,
    verifier: Verifier,
    credentials: Arc<dyn CredentialVerifier>,
    /// Service start time.
    started_at: Instant,
    /// Last activity timestamp for idle timeout.
    last_activity: Arc<Mutex<Instant>>,
    /// Active connection count for idle timeout tracking.
    connection_count: Arc<AtomicU32>,
}

impl CertificateManager {
    pub fn new(
        registry: Registry,
        issuer: Issuer,
        verifier: Verifier,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let now = Instant::now();
        Self {
            registry: Arc::new(Mutex::new(registry)),
            sessions: Arc::new(Mutex::new(SessionTable::default())),
            max_sessions: MAX_ADMIN_SESSIONS,
            issuer,
            verifier,
            credentials,
            started_at: now,
            last_activity: Arc::new(Mutex::new(now)),
            connection_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.build_registry(),
            config.build_issuer(),
            config.build_verifier(),
            Arc::new(config.build_credentials()),
        )
    }

    /// Override the admin session cap.
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Service uptime in seconds.
    pub fn uptime_s(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Update last activity timestamp to now.
    pub async fn touch_activity(&self) {
        let mut ts = self.last_activity.lock().await;
        *ts = Instant::now();
    }

    /// Time elapsed since last activity.
    pub async fn last_activity_elapsed(&self) -> std::time::Duration {
        let ts = self.last_activity.lock().await;
        ts.elapsed()
    }

    pub fn inc_connections(&self) -> u32 {
        self.connection_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dec_connections(&self) -> u32 {
        self.connection_count
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1)
    }

    pub fn connection_count(&self) -> u32 {
        self.connection_count.load(Ordering::Relaxed)
    }

    pub async fn certificate_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Public flows
    // ─────────────────────────────────────────────────────────────────────

    pub async fn issue(&self, request: &IssueRequest) -> Result<Certificate, ManagerError> {
        let mut registry = self.registry.lock().await;
        self.issuer
            .issue(&mut registry, request)
            .map_err(ManagerError::from)
    }

    pub async fn verify(&self, query: &str) -> Result<CertVerifyResult, ManagerError> {
        let searched_id = Verifier::normalize(query)?;
        self.verifier.pause().await;

        let outcome = {
            let registry = self.registry.lock().await;
            Verifier::lookup(&registry, searched_id)
        };
        tracing::debug!("Verification of {searched_id}: valid={}", outcome.is_valid());
        Ok(CertVerifyResult::from_outcome(searched_id, outcome))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Admin flows
    // ─────────────────────────────────────────────────────────────────────

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AdminLoginResult, ManagerError> {
        let mut gate = AdminGate::new(Arc::clone(&self.credentials));
        if let Err(err) = gate.login(username, password) {
            if err != AuthError::MissingCredentials {
                tracing::warn!("Admin login failed for {username:?}");
            }
            return Err(err.into());
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), gate, self.max_sessions);
        tracing::info!("Admin {username:?} logged in");

        Ok(AdminLoginResult {
            session_id,
            authenticated: true,
        })
    }

    pub async fn logout(&self, session_id: &str) -> Result<AdminLogoutResult, ManagerError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(session_id) {
            Some(mut gate) => {
                gate.logout();
                Ok(AdminLogoutResult {
                    authenticated: gate.is_authenticated(),
                })
            }
            None => Err(ManagerError::UnknownSession {
                session_id: session_id.to_string(),
            }),
        }
    }

    async fn require_session(&self, session_id: &str) -> Result<(), ManagerError> {
        let sessions = self.sessions.lock().await;
        let gate = sessions
            .get(session_id)
            .ok_or_else(|| ManagerError::UnknownSession {
                session_id: session_id.to_string(),
            })?;
        gate.require_authenticated().map_err(ManagerError::from)
    }

    pub async fn list(&self, session_id: &str) -> Result<AdminListResult, ManagerError> {
        self.require_session(session_id).await?;
        let registry = self.registry.lock().await;
        let certificates = registry.all().to_vec();
        Ok(AdminListResult {
            total: certificates.len(),
            certificates,
        })
    }

    pub async fn show(&self, session_id: &str, id: &str) -> Result<Certificate, ManagerError> {
        self.require_session(session_id).await?;
        let registry = self.registry.lock().await;
        registry
            .find(id.trim())
            .cloned()
            .ok_or_else(|| ManagerError::NotFound { id: id.to_string() })
    }

    pub async fn revoke(&self, session_id: &str, id: &str) -> Result<Certificate, ManagerError> {
        self.require_session(session_id).await?;
        let mut registry = self.registry.lock().await;
        let cert = registry.revoke(id.trim())?.clone();
        tracing::info!("Revoked certificate {}", cert.id);
        Ok(cert)
    }

    pub async fn status(&self) -> ServiceStatusResult {
        ServiceStatusResult {
            uptime_s: self.uptime_s(),
            certificates: self.certificate_count().await,
            sessions: self.session_count().await,
        }
    }
}
