//! Issuance flow: validate the submitted form, then generate+add.
//!
//! Validation is all-or-nothing. A request with any field error never
//! reaches the registry, so a rejected submission cannot change its size.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_ISSUER;
use crate::certificate::{Certificate, CertificateStatus};
use crate::registry::{Registry, RegistryError};

/// `local@domain.tld`, no whitespace, exactly one `@`.
static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Default number of id candidates tried before giving up.
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 16;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

/// Raw form input, exactly as submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueRequest {
    #[serde(default)]
    pub participant_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub event_name: String,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub event_date: String,
}

/// Per-field validation messages. `None` means the field passed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldErrors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.participant_name.is_none()
            && self.email.is_none()
            && self.event_name.is_none()
            && self.event_date.is_none()
    }

    /// `(field, message)` pairs in form order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("participant_name", self.participant_name.as_deref()),
            ("email", self.email.as_deref()),
            ("event_name", self.event_name.as_deref()),
            ("event_date", self.event_date.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, msg)| msg.map(|m| (field, m)))
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IssuanceError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Form input after trimming and date parsing.
struct ValidatedForm {
    participant_name: String,
    email: String,
    event_name: String,
    event_date: NaiveDate,
}

impl IssueRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        self.validated().map(|_| ())
    }

    fn validated(&self) -> Result<ValidatedForm, FieldErrors> {
        let mut errors = FieldErrors::default();

        let participant_name = self.participant_name.trim();
        if participant_name.is_empty() {
            errors.participant_name = Some("Participant name is required".to_string());
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.email = Some("Email is required".to_string());
        } else if !is_valid_email(&self.email) {
            errors.email = Some("Please enter a valid email address".to_string());
        }

        let event_name = self.event_name.trim();
        if event_name.is_empty() {
            errors.event_name = Some("Event name is required".to_string());
        }

        let event_date = match self.event_date.trim() {
            "" => {
                errors.event_date = Some("Event date is required".to_string());
                None
            }
            raw => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.event_date = Some("Please enter a valid event date".to_string());
                    None
                }
            },
        };

        match event_date {
            Some(event_date) if errors.is_empty() => Ok(ValidatedForm {
                participant_name: participant_name.to_string(),
                email: email.to_string(),
                event_name: event_name.to_string(),
                event_date,
            }),
            _ => Err(errors),
        }
    }
}

/// Stamps new certificates with the issuing organization.
#[derive(Debug, Clone)]
pub struct Issuer {
    organization: String,
    max_id_attempts: u32,
}

impl Default for Issuer {
    fn default() -> Self {
        Self::new(DEFAULT_ISSUER, DEFAULT_MAX_ID_ATTEMPTS)
    }
}

impl Issuer {
    pub fn new(organization: impl Into<String>, max_id_attempts: u32) -> Self {
        Self {
            organization: organization.into(),
            max_id_attempts,
        }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Validate `request`, then generate an unused id and append the record.
    pub fn issue(
        &self,
        registry: &mut Registry,
        request: &IssueRequest,
    ) -> Result<Certificate, IssuanceError> {
        let form = request.validated().map_err(IssuanceError::Validation)?;
        let id = registry.generate_unique_id(self.max_id_attempts)?;

        let certificate = Certificate {
            id,
            participant_name: form.participant_name,
            email: form.email,
            event_name: form.event_name,
            event_date: form.event_date,
            issuer: self.organization.clone(),
            issued_date: registry.clock().today(),
            status: CertificateStatus::Valid,
        };

        registry.add(certificate.clone());
        tracing::info!(
            "Issued certificate {} for event {:?}",
            certificate.id,
            certificate.event_name
        );
        Ok(certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap_or_default()
    }

    fn registry() -> Registry {
        Registry::seeded().with_clock(Arc::new(FixedClock(today())))
    }

    fn jane() -> IssueRequest {
        IssueRequest {
            participant_name: "Jane Doe".to_string(),
            email: "jane@x.com".to_string(),
            event_name: "Conf".to_string(),
            event_date: "2025-06-01".to_string(),
        }
    }

    #[test]
    fn issues_a_valid_findable_certificate() {
        let mut registry = registry();
        let cert = match Issuer::default().issue(&mut registry, &jane()) {
            Ok(cert) => cert,
            Err(err) => panic!("issue failed: {err}"),
        };

        assert_eq!(cert.status, CertificateStatus::Valid);
        assert_eq!(cert.issued_date, today());
        assert_eq!(cert.issuer, DEFAULT_ISSUER);
        assert_eq!(cert.event_date.to_string(), "2025-06-01");
        assert!(cert.id.starts_with("CERT-2026-004-"), "got {}", cert.id);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.find(&cert.id), Some(&cert));
    }

    #[test]
    fn empty_participant_name_is_rejected_without_side_effects() {
        let mut registry = registry();
        let mut request = jane();
        request.participant_name = "   ".to_string();

        let err = Issuer::default().issue(&mut registry, &request);
        let expected = FieldErrors {
            participant_name: Some("Participant name is required".to_string()),
            ..FieldErrors::default()
        };
        assert_eq!(err, Err(IssuanceError::Validation(expected)));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn email_shape_is_enforced() {
        let mut request = jane();
        request.email = "not-an-email".to_string();
        let errors = request.validate().err().unwrap_or_default();
        assert_eq!(
            errors.email.as_deref(),
            Some("Please enter a valid email address")
        );

        request.email = "a@b.co".to_string();
        assert_eq!(request.validate(), Ok(()));
    }

    #[test]
    fn padded_email_fails_the_pattern() {
        let mut registry = registry();
        let mut request = jane();
        request.email = " jane@x.com ".to_string();
        let errors = request.validate().err().unwrap_or_default();
        assert_eq!(
            errors.email.as_deref(),
            Some("Please enter a valid email address")
        );
        assert!(Issuer::default().issue(&mut registry, &request).is_err());
        assert_eq!(registry.len(), 3);

        request.email = "   ".to_string();
        let errors = request.validate().err().unwrap_or_default();
        assert_eq!(errors.email.as_deref(), Some("Email is required"));
    }

    #[test]
    fn email_pattern_edge_cases() {
        for bad in ["a@b", "a b@c.d", "a@@b.c", "@b.co", "a@.co x", "a@b.co@d.ef"] {
            assert!(!is_valid_email(bad), "{bad:?} should be rejected");
        }
        for good in ["a@b.co", "first.last+tag@sub.example.org", "x@y.z"] {
            assert!(is_valid_email(good), "{good:?} should be accepted");
        }
    }

    #[test]
    fn all_field_errors_are_collected() {
        let errors = IssueRequest::default().validate().err().unwrap_or_default();
        let fields: Vec<&str> = errors.iter().map(|(field, _)| field).collect();
        assert_eq!(
            fields,
            vec!["participant_name", "email", "event_name", "event_date"]
        );
        assert_eq!(errors.event_date.as_deref(), Some("Event date is required"));
    }

    #[test]
    fn malformed_event_date_is_rejected() {
        let mut request = jane();
        request.event_date = "06/01/2025".to_string();
        let errors = request.validate().err().unwrap_or_default();
        assert_eq!(
            errors.event_date.as_deref(),
            Some("Please enter a valid event date")
        );
    }

    #[test]
    fn fields_are_stored_trimmed() {
        let mut registry = registry();
        let request = IssueRequest {
            participant_name: "  Jane Doe ".to_string(),
            email: "jane@x.com".to_string(),
            event_name: "\tConf\n".to_string(),
            event_date: "2025-06-01".to_string(),
        };
        let cert = match Issuer::new("Example Org", 4).issue(&mut registry, &request) {
            Ok(cert) => cert,
            Err(err) => panic!("issue failed: {err}"),
        };
        assert_eq!(cert.participant_name, "Jane Doe");
        assert_eq!(cert.email, "jane@x.com");
        assert_eq!(cert.event_name, "Conf");
        assert_eq!(cert.issuer, "Example Org");
    }

    #[test]
    fn field_errors_display_lists_each_field() {
        let errors = FieldErrors {
            email: Some("Email is required".to_string()),
            event_name: Some("Event name is required".to_string()),
            ..FieldErrors::default()
        };
        assert_eq!(
            errors.to_string(),
            "email: Email is required; event_name: Event name is required"
        );
    }
}
