//! Certificate registry primitives shared by the `certd` service and CLI.
//!
//! - [`registry`]: the in-memory, append-only certificate collection
//! - [`issuance`]: form validation and the generate+add sequence
//! - [`verification`]: lookup by id behind a cosmetic, injectable delay
//! - [`admin`]: static-credential gate for the admin listing
//! - [`config`]: layered configuration (defaults, TOML file, `CERTD_*` env)

pub mod admin;
pub mod certificate;
pub mod clock;
pub mod config;
pub mod issuance;
pub mod registry;
pub mod verification;

pub use admin::{AdminGate, AuthError, CredentialVerifier, SessionStore, StaticCredentials};
pub use certificate::{Certificate, CertificateStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use issuance::{FieldErrors, IssuanceError, IssueRequest, Issuer};
pub use registry::{Registry, RegistryError};
pub use verification::{
    Delay, NoDelay, TokioDelay, VerificationState, VerifyError, VerifyOutcome, Verifier,
};

/// Organization name stamped on every certificate unless configured otherwise.
pub const DEFAULT_ISSUER: &str = "0x0 PIR4T3S Team";
