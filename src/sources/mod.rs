//! Remote literature services behind trait-based clients.
//!
//! Two traits describe what the pipeline needs from the outside world:
//!
//! - [`ReferenceSource`] searches for bibliographic records and resolves bare
//!   identifiers to records.
//! - [`FullTextSource`] retrieves the body of one article in a single format.
//!
//! Concrete clients:
//!
//! - [`EuropePmcClient`] - Europe PMC REST search, identifier lookup and JATS full text
//! - [`UnpaywallClient`] - best open-access PDF, reduced to plain text
//! - [`CrossrefClient`] - publisher PDF links registered with Crossref
//! - [`FpbaseClient`] - curated protein to reference links from FPbase
//! - [`MockReferenceSource`] / [`MockFullTextSource`] - in-memory stand-ins for tests
//!
//! Every failure of a remote call is a [`SourceError`]; whether it is worth
//! retrying is carried in the type, never inferred from message text.

mod crossref;
mod europe_pmc;
mod fpbase;
pub mod mock;
mod pdf_link;
mod unpaywall;

pub use crossref::{CrossrefClient, CROSSREF_BASE_URL};

pub use europe_pmc::{EuropePmcClient, EUROPE_PMC_BASE_URL};
pub use fpbase::{FpbaseClient, ProteinReference, FPBASE_GRAPHQL_URL};
pub use mock::{MockFullTextSource, MockReferenceSource};
pub use unpaywall::{UnpaywallClient, UNPAYWALL_BASE_URL};

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{
    ArticleId, ArticleReference, DocumentFormat, FullTextDocument, SearchPage, SearchQuery,
};

/// A service that can be searched for article metadata.
#[async_trait]
pub trait ReferenceSource: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs (e.g. "europe_pmc")
    fn id(&self) -> &str;

    /// Fetch one page of results, preserving the service's ordering
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError>;

    /// Resolve an identifier to its record.
    ///
    /// Sources without identifier lookup report every identifier as unknown.
    async fn lookup(&self, _id: &ArticleId) -> Result<Option<ArticleReference>, SourceError> {
        Ok(None)
    }
}

/// A service that can deliver article bodies in one format.
#[async_trait]
pub trait FullTextSource: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs and as document origin
    fn id(&self) -> &str;

    /// Format of every document this source returns
    fn format(&self) -> DocumentFormat;

    /// Whether the reference carries the identifiers this source needs
    fn can_serve(&self, _reference: &ArticleReference) -> bool {
        true
    }

    /// Retrieve the full text; `Ok(None)` means the source does not offer it
    async fn full_text(
        &self,
        reference: &ArticleReference,
    ) -> Result<Option<FullTextDocument>, SourceError>;
}

/// Failure of a call to a remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error(
    "{service} request failed{}: {message}",
    .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
)]
pub struct RemoteServiceError {
    /// Service that failed (e.g. "europe_pmc")
    pub service: String,
    /// HTTP status, when the service answered at all
    pub status: Option<u16>,
    /// Whether the same request may succeed if repeated later
    pub retryable: bool,
    pub message: String,
}

impl RemoteServiceError {
    /// Classify an HTTP status: 5xx and 429 are retryable, other codes are not
    pub fn from_status(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: Some(status),
            retryable: status >= 500 || status == 429,
            message: message.into(),
        }
    }

    /// The call did not complete within its deadline
    pub fn timeout(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: None,
            retryable: true,
            message: message.into(),
        }
    }

    /// Transport failure before any status was received
    pub fn network(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: None,
            retryable: true,
            message: message.into(),
        }
    }

    /// The service answered but the body could not be decoded
    pub fn malformed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: None,
            retryable: false,
            message: message.into(),
        }
    }

    /// Classify a reqwest failure for the named service
    pub fn from_reqwest(service: impl Into<String>, err: &reqwest::Error) -> Self {
        let service = service.into();
        if err.is_timeout() {
            Self::timeout(service, err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(service, status.as_u16(), err.to_string())
        } else if err.is_decode() {
            Self::malformed(service, err.to_string())
        } else {
            Self::network(service, err.to_string())
        }
    }
}

impl From<reqwest::Error> for RemoteServiceError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .and_then(|url| url.host_str())
            .unwrap_or("remote")
            .to_string();
        Self::from_reqwest(service, &err)
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SourceError {
    /// Caller-supplied input is unusable; never retried
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The remote service failed
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),
}

impl SourceError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::InvalidInput(_) => false,
            SourceError::Remote(err) => err.retryable,
        }
    }

    /// HTTP status of a remote failure, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::InvalidInput(_) => None,
            SourceError::Remote(err) => err.status,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Remote(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(RemoteServiceError::from_status("europe_pmc", 503, "unavailable").retryable);
        assert!(RemoteServiceError::from_status("europe_pmc", 500, "boom").retryable);
        assert!(RemoteServiceError::from_status("europe_pmc", 429, "slow down").retryable);
        assert!(!RemoteServiceError::from_status("europe_pmc", 400, "bad query").retryable);
        assert!(!RemoteServiceError::from_status("europe_pmc", 404, "missing").retryable);
    }

    #[test]
    fn test_timeout_is_retryable_without_status() {
        let err: SourceError = RemoteServiceError::timeout("unpaywall", "deadline elapsed").into();
        assert!(err.is_retryable());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_invalid_input_is_never_retryable() {
        let err = SourceError::InvalidInput("empty".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_display_includes_status() {
        let err = RemoteServiceError::from_status("europe_pmc", 502, "bad gateway");
        assert_eq!(err.to_string(), "europe_pmc request failed (HTTP 502): bad gateway");
        let err = RemoteServiceError::network("europe_pmc", "connection refused");
        assert_eq!(err.to_string(), "europe_pmc request failed: connection refused");
    }
}
