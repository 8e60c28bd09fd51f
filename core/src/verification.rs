//! Verification flow: trimmed id in, found / not-found out.
//!
//! A fixed cosmetic latency precedes the lookup. It is injected through
//! [`Delay`] so tests run without sleeping; the lookup itself is synchronous.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::certificate::Certificate;
use crate::registry::Registry;

/// Latency applied before each lookup unless configured otherwise.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(500);

#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Real timer on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Delay for NoDelay {
    async fn wait(&self, _duration: Duration) {}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("certificate id must not be empty")]
    EmptyQuery,
}

/// Result of one lookup. A miss is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Found(Certificate),
    NotFound { searched_id: String },
}

impl VerifyOutcome {
    /// Found and not revoked.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Found(cert) if cert.is_valid())
    }
}

/// The three states a verification panel can show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VerificationState {
    #[default]
    NotSearched,
    Found(Certificate),
    NotFound {
        searched_id: String,
    },
}

impl From<VerifyOutcome> for VerificationState {
    fn from(outcome: VerifyOutcome) -> Self {
        match outcome {
            VerifyOutcome::Found(cert) => VerificationState::Found(cert),
            VerifyOutcome::NotFound { searched_id } => VerificationState::NotFound { searched_id },
        }
    }
}

#[derive(Clone)]
pub struct Verifier {
    delay: Arc<dyn Delay>,
    latency: Duration,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(Arc::new(TokioDelay), DEFAULT_LATENCY)
    }
}

impl Verifier {
    pub fn new(delay: Arc<dyn Delay>, latency: Duration) -> Self {
        Self { delay, latency }
    }

    /// A verifier that never waits.
    pub fn immediate() -> Self {
        Self::new(Arc::new(NoDelay), Duration::ZERO)
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Trim and reject an empty query. Returns the id to search for.
    pub fn normalize(query: &str) -> Result<&str, VerifyError> {
        match query.trim() {
            "" => Err(VerifyError::EmptyQuery),
            trimmed => Ok(trimmed),
        }
    }

    /// Wait out the cosmetic latency. Callers holding a lock on the registry
    /// should call this before acquiring it.
    pub async fn pause(&self) {
        self.delay.wait(self.latency).await;
    }

    /// The lookup half, without any delay.
    pub fn lookup(registry: &Registry, searched_id: &str) -> VerifyOutcome {
        match registry.find(searched_id) {
            Some(cert) => VerifyOutcome::Found(cert.clone()),
            None => VerifyOutcome::NotFound {
                searched_id: searched_id.to_string(),
            },
        }
    }

    pub async fn verify(
        &self,
        registry: &Registry,
        query: &str,
    ) -> Result<VerifyOutcome, VerifyError> {
        let searched_id = Self::normalize(query)?;
        self.pause().await;
        let outcome = Self::lookup(registry, searched_id);
        tracing::debug!("Verification of {searched_id}: valid={}", outcome.is_valid());
        Ok(outcome)
    }
}
