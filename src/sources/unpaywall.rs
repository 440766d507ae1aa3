//! Unpaywall open-access PDF source.
//!
//! Looks up the best open-access location of a DOI and reduces the PDF found
//! there to plain text. API documentation: <https://unpaywall.org/products/api>

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Settings;
use crate::models::{ArticleReference, DocumentFormat, FullTextDocument};
use crate::sources::pdf_link::{doi_path, pdf_document};
use crate::sources::{FullTextSource, RemoteServiceError, SourceError};
use crate::utils::{with_retry, HttpClient, RetryConfig};

/// Unpaywall REST API base URL
pub const UNPAYWALL_BASE_URL: &str = "https://api.unpaywall.org/v2";

const SERVICE: &str = "unpaywall";

/// Unpaywall client
///
/// The API requires a contact email address (free, no key needed).
#[derive(Debug, Clone)]
pub struct UnpaywallClient {
    client: HttpClient,
    base_url: String,
    email: String,
    retry: RetryConfig,
}

impl UnpaywallClient {
    pub fn new(client: HttpClient, email: impl Into<String>) -> Self {
        Self {
            client,
            base_url: UNPAYWALL_BASE_URL.to_string(),
            email: email.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Build a client from configuration; `None` when disabled or no email is configured
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, SourceError> {
        let section = &settings.unpaywall;
        let email = match section.email.as_deref().map(str::trim) {
            Some(email) if section.enabled && !email.is_empty() => email.to_string(),
            _ => {
                tracing::debug!("Unpaywall disabled (enabled = {}, email set = {})",
                    section.enabled, section.email.is_some());
                return Ok(None);
            }
        };

        let client = HttpClient::new(section.timeout())?;
        Ok(Some(
            Self::new(client, email)
                .with_base_url(&section.base_url)
                .with_retry(settings.retry.to_retry_config(section.timeout())),
        ))
    }

    /// Point the client at another deployment (or a test server)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn record_url(&self, doi: &str) -> String {
        format!("{}/{}", self.base_url, doi_path(doi))
    }

    /// Location of the best open-access PDF for a DOI, if Unpaywall knows one
    pub async fn best_pdf_url(&self, doi: &str) -> Result<Option<String>, SourceError> {
        let url = self.record_url(doi);
        let client = &self.client;
        let email = self.email.as_str();
        let url_ref = url.as_str();

        let result = with_retry(self.retry, SERVICE, move || async move {
            let response = client
                .send(SERVICE, client.get(url_ref).query(&[("email", email)]))
                .await?;
            response
                .text()
                .await
                .map_err(|e| SourceError::from(RemoteServiceError::from_reqwest(SERVICE, &e)))
        })
        .await;

        let body = match result {
            Ok(body) => body,
            Err(err) if err.status() == Some(404) => {
                tracing::debug!("Unpaywall has no record for {}", doi);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let record: UnpaywallRecord = serde_json::from_str(&body).map_err(|e| {
            RemoteServiceError::malformed(SERVICE, format!("failed to parse record for {}: {}", doi, e))
        })?;

        Ok(record.pdf_url())
    }
}

#[async_trait]
impl FullTextSource for UnpaywallClient {
    fn id(&self) -> &str {
        SERVICE
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::PlainText
    }

    fn can_serve(&self, reference: &ArticleReference) -> bool {
        reference.doi().is_some()
    }

    async fn full_text(
        &self,
        reference: &ArticleReference,
    ) -> Result<Option<FullTextDocument>, SourceError> {
        let Some(doi) = reference.doi() else {
            return Ok(None);
        };
        let Some(pdf_url) = self.best_pdf_url(doi).await? else {
            return Ok(None);
        };
        pdf_document(&self.client, self.retry, SERVICE, reference, pdf_url).await
    }
}

/// Unpaywall DOI record (only the fields used here)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UnpaywallRecord {
    is_oa: bool,
    best_oa_location: Option<OaLocation>,
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

impl UnpaywallRecord {
    fn pdf_url(self) -> Option<String> {
        if !self.is_oa {
            return None;
        }
        self.best_oa_location
            .into_iter()
            .chain(self.oa_locations)
            .filter_map(|location| location.url_for_pdf)
            .find(|url| !url.trim().is_empty())
    }
}
