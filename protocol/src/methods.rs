//! Method parameter and result types.

use certd_core::{Certificate, IssueRequest, VerifyOutcome};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Error codes (JSON-RPC error.code)
// ─────────────────────────────────────────────────────────────────────────────

/// Standard JSON-RPC errors.
pub const ERR_INVALID_REQUEST: i64 = -32600;
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
pub const ERR_INVALID_PARAMS: i64 = -32602;

/// Service-specific error codes.
pub const ERR_VALIDATION: i64 = 10;
pub const ERR_AUTH_FAILED: i64 = 11;
pub const ERR_UNAUTHENTICATED: i64 = 12;
pub const ERR_NOT_FOUND: i64 = 13;
pub const ERR_INFRA: i64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloParams {
    pub protocol_version: String,
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResult {
    pub protocol_version: String,
    pub service_version: String,
    pub capabilities: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// cert.issue
// ─────────────────────────────────────────────────────────────────────────────

/// Issuance form fields. Missing fields deserialize as empty strings so the
/// service reports them as validation errors rather than malformed params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertIssueParams {
    #[serde(default)]
    pub participant_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub event_date: String,
}

impl From<CertIssueParams> for IssueRequest {
    fn from(params: CertIssueParams) -> Self {
        IssueRequest {
            participant_name: params.participant_name,
            email: params.email,
            event_name: params.event_name,
            event_date: params.event_date,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// cert.verify
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertVerifyParams {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupState {
    Found,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertVerifyResult {
    pub state: LookupState,
    pub searched_id: String,
    /// Found and not revoked.
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl CertVerifyResult {
    pub fn from_outcome(searched_id: impl Into<String>, outcome: VerifyOutcome) -> Self {
        let valid = outcome.is_valid();
        match outcome {
            VerifyOutcome::Found(cert) => Self {
                state: LookupState::Found,
                searched_id: searched_id.into(),
                valid,
                certificate: Some(cert),
            },
            VerifyOutcome::NotFound { searched_id } => Self {
                state: LookupState::NotFound,
                searched_id,
                valid,
                certificate: None,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// admin.*
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct AdminLoginParams {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminLoginParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminLoginParams")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLoginResult {
    pub session_id: String,
    pub authenticated: bool,
}

/// Params for `admin.logout` and `admin.list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParams {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLogoutResult {
    pub authenticated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminListResult {
    pub certificates: Vec<Certificate>,
    pub total: usize,
}

/// Params for `admin.show` and `admin.revoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCertParams {
    pub session_id: String,
    pub id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// service.status
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatusResult {
    pub uptime_s: u64,
    pub certificates: usize,
    pub sessions: usize,
}
