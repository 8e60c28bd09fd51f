//! The certificate record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    #[default]
    Valid,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateStatus::Valid => "valid",
            CertificateStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record attesting that a participant completed an event.
///
/// Every field except `status` is fixed once the record enters the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    /// `CERT-<year>-<seq3>-<rand4>`, unique within the registry.
    pub id: String,
    pub participant_name: String,
    pub email: String,
    pub event_name: String,
    /// Serialized as `YYYY-MM-DD`.
    pub event_date: NaiveDate,
    pub issuer: String,
    /// Date of the issuance moment, serialized as `YYYY-MM-DD`.
    pub issued_date: NaiveDate,
    #[serde(default)]
    pub status: CertificateStatus,
}

impl Certificate {
    pub fn is_valid(&self) -> bool {
        self.status == CertificateStatus::Valid
    }
}
