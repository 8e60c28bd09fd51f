//! Registry: the authoritative in-memory certificate store.
//!
//! Append-only ordered collection for the lifetime of the process. The
//! presentation surfaces reach it only through `add`, `find` and
//! `generate_id` (plus the admin projections below); nothing holds the
//! underlying vector directly.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use rand::Rng;

use crate::DEFAULT_ISSUER;
use crate::certificate::{Certificate, CertificateStatus};
use crate::clock::{Clock, SystemClock};

/// Characters used for the random id suffix.
const ID_SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the random id suffix.
const ID_SUFFIX_LEN: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("certificate not found: {id}")]
    NotFound { id: String },

    #[error("no unused certificate id after {attempts} attempts")]
    IdSpaceExhausted { attempts: u32 },
}

pub struct Registry {
    certificates: Vec<Certificate>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.certificates.len())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Registry {
    /// An empty registry on the system clock.
    pub fn empty() -> Self {
        Self {
            certificates: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// A registry pre-populated with the three demo certificates.
    pub fn seeded() -> Self {
        Self {
            certificates: seed_certificates(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for id years and issued dates.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Read-only view of every record, in insertion order.
    pub fn all(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Append a certificate. The caller supplies an id from
    /// [`Registry::generate_id`]; no uniqueness check happens here.
    pub fn add(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    /// Case-insensitive exact match on `id`; first hit in insertion order.
    pub fn find(&self, id: &str) -> Option<&Certificate> {
        let needle = id.to_lowercase();
        self.certificates
            .iter()
            .find(|cert| cert.id.to_lowercase() == needle)
    }

    /// `CERT-{year}-{seq}-{rand}` where `seq` is `len() + 1` padded to three
    /// digits. Advisory only: nothing here checks the result is unused.
    pub fn generate_id(&self) -> String {
        self.generate_id_with(&mut rand::rng())
    }

    pub fn generate_id_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let year = self.clock.today().year();
        let seq = self.certificates.len() + 1;
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| {
                let idx = rng.random_range(0..ID_SUFFIX_ALPHABET.len());
                char::from(ID_SUFFIX_ALPHABET[idx])
            })
            .collect();
        format!("CERT-{year}-{seq:03}-{suffix}")
    }

    /// Generate ids until one misses [`Registry::find`].
    pub fn generate_unique_id(&self, max_attempts: u32) -> Result<String, RegistryError> {
        self.generate_unique_id_with(&mut rand::rng(), max_attempts)
    }

    pub fn generate_unique_id_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        max_attempts: u32,
    ) -> Result<String, RegistryError> {
        for attempt in 1..=max_attempts {
            let candidate = self.generate_id_with(rng);
            if self.find(&candidate).is_none() {
                return Ok(candidate);
            }
            tracing::debug!("Certificate id collision on attempt {attempt}: {candidate}");
        }
        Err(RegistryError::IdSpaceExhausted {
            attempts: max_attempts,
        })
    }

    /// Mark a certificate revoked. Revoking twice is a no-op.
    pub fn revoke(&mut self, id: &str) -> Result<&Certificate, RegistryError> {
        let needle = id.to_lowercase();
        let cert = self
            .certificates
            .iter_mut()
            .find(|cert| cert.id.to_lowercase() == needle)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;

        if cert.status != CertificateStatus::Revoked {
            cert.status = CertificateStatus::Revoked;
            tracing::info!("Certificate {} revoked", cert.id);
        }
        Ok(cert)
    }
}

fn seed_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn seed_certificates() -> Vec<Certificate> {
    let seed = |id: &str, name: &str, email: &str, event: &str, held: NaiveDate, issued| {
        Certificate {
            id: id.to_string(),
            participant_name: name.to_string(),
            email: email.to_string(),
            event_name: event.to_string(),
            event_date: held,
            issuer: DEFAULT_ISSUER.to_string(),
            issued_date: issued,
            status: CertificateStatus::Valid,
        }
    };

    vec![
        seed(
            "CERT-2024-001-XK9P",
            "Alex Morgan",
            "alex.morgan@example.com",
            "Advanced Cybersecurity Workshop 2024",
            seed_date(2024, 3, 15),
            seed_date(2024, 3, 16),
        ),
        seed(
            "CERT-2024-002-LM4T",
            "Sarah Chen",
            "sarah.chen@example.com",
            "Ethical Hacking Bootcamp",
            seed_date(2024, 2, 20),
            seed_date(2024, 2, 21),
        ),
        seed(
            "CERT-2024-003-QW7R",
            "Marcus Rodriguez",
            "marcus.r@example.com",
            "Web3 Security Summit",
            seed_date(2024, 1, 10),
            seed_date(2024, 1, 11),
        ),
    ]
}
