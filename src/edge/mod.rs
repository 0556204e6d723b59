//! Edge provider view of certificates: zone lookup, certificate pack status, validation
//! records and revalidation requests.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

mod cloudflare;

pub use cloudflare::CloudflareClient;

/// Lifecycle status of a certificate pack. The vocabulary is closed: anything else the
/// provider returns is reported as [`EdgeError::UnknownStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    Initializing,
    PendingValidation,
    Active,
    ValidationTimedOut,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Initializing => "initializing",
            CertificateStatus::PendingValidation => "pending_validation",
            CertificateStatus::Active => "active",
            CertificateStatus::ValidationTimedOut => "validation_timed_out",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = EdgeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "initializing" => Ok(CertificateStatus::Initializing),
            "pending_validation" => Ok(CertificateStatus::PendingValidation),
            "active" => Ok(CertificateStatus::Active),
            "validation_timed_out" => Ok(CertificateStatus::ValidationTimedOut),
            other => Err(EdgeError::UnknownStatus(other.to_string())),
        }
    }
}

/// One TXT (name, value) pair the certificate authority expects to find published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRecord {
    pub txt_name: String,
    pub txt_value: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePack {
    pub id: String,
    pub status: CertificateStatus,
    pub validation_records: Vec<ValidationRecord>,
}

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("edge provider request failed: {0}")]
    Transport(String),
    #[error("edge provider rejected the credentials: {0}")]
    Unauthorized(String),
    #[error("edge provider returned nothing")]
    EmptyResponse,
    #[error("edge provider did not return any result in the response")]
    NoResult,
    #[error("certificate pack status '{0}' is unknown")]
    UnknownStatus(String),
    #[error("edge provider API error: {0}")]
    Api(String),
    #[error("edge provider returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("unexpected status after revalidation, expected: initializing, got: {0}")]
    UnexpectedRevalidation(String),
}

impl EdgeError {
    /// A structurally empty, malformed or unauthenticated answer means the upstream cannot be
    /// trusted, so every other domain in the batch would fail the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EdgeError::EmptyResponse | EdgeError::MalformedResponse(_) | EdgeError::Unauthorized(_)
        )
    }
}

/// Certificate status client and validation record source of the edge provider.
pub trait EdgeProvider: Send + Sync {
    fn zone_id(&self, hostname: &str) -> Result<String, EdgeError>;

    fn certificate_pack(&self, zone_id: &str) -> Result<CertificatePack, EdgeError>;

    /// Desired validation records, in provider order.
    fn validation_records(&self, zone_id: &str) -> Result<Vec<ValidationRecord>, EdgeError>;

    fn trigger_revalidation(&self, zone_id: &str, pack_id: &str) -> Result<(), EdgeError>;
}
