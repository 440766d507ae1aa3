//! Crossref publisher full-text links.
//!
//! Crossref records often carry the publisher's own links to the article
//! body. The PDF link is followed and reduced to plain text, which makes
//! Crossref the last resort after Europe PMC and Unpaywall.
//! API documentation: <https://api.crossref.org/swagger-ui/index.html>

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Settings;
use crate::models::{ArticleReference, DocumentFormat, FullTextDocument};
use crate::sources::pdf_link::{doi_path, pdf_document};
use crate::sources::{FullTextSource, RemoteServiceError, SourceError};
use crate::utils::{with_retry, HttpClient, RetryConfig};

/// Crossref REST API base URL
pub const CROSSREF_BASE_URL: &str = "https://api.crossref.org";

const SERVICE: &str = "crossref";

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Crossref client
#[derive(Debug, Clone)]
pub struct CrossrefClient {
    client: HttpClient,
    base_url: String,
    mailto: Option<String>,
    retry: RetryConfig,
}

impl CrossrefClient {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: CROSSREF_BASE_URL.to_string(),
            mailto: None,
            retry: RetryConfig::default(),
        }
    }

    /// Build a client from configuration; `None` when disabled
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, SourceError> {
        let section = &settings.crossref;
        if !section.enabled {
            tracing::debug!("Crossref disabled");
            return Ok(None);
        }

        let client = HttpClient::new(section.timeout())?;
        let mut crossref = Self::new(client)
            .with_base_url(&section.base_url)
            .with_retry(settings.retry.to_retry_config(section.timeout()));
        if let Some(mailto) = section.mailto.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            crossref = crossref.with_mailto(mailto);
        }
        Ok(Some(crossref))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Contact address for Crossref's polite pool
    pub fn with_mailto(mut self, mailto: &str) -> Self {
        self.mailto = Some(mailto.to_string());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Publisher PDF link registered for a DOI, if any
    pub async fn pdf_url(&self, doi: &str) -> Result<Option<String>, SourceError> {
        let url = format!("{}/works/{}", self.base_url, doi_path(doi));
        let client = &self.client;
        let url_ref = url.as_str();
        let mailto = self.mailto.as_deref();

        let result = with_retry(self.retry, SERVICE, move || async move {
            let mut request = client.get(url_ref);
            if let Some(mailto) = mailto {
                request = request.query(&[("mailto", mailto)]);
            }
            let response = client.send(SERVICE, request).await?;
            response
                .text()
                .await
                .map_err(|e| SourceError::from(RemoteServiceError::from_reqwest(SERVICE, &e)))
        })
        .await;

        let body = match result {
            Ok(body) => body,
            Err(err) if err.status() == Some(404) => {
                tracing::debug!("Crossref has no record for {}", doi);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let work: WorkResponse = serde_json::from_str(&body).map_err(|e| {
            RemoteServiceError::malformed(SERVICE, format!("failed to parse work {}: {}", doi, e))
        })?;

        Ok(work.message.pdf_url())
    }
}

#[async_trait]
impl FullTextSource for CrossrefClient {
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
        let Some(pdf_url) = self.pdf_url(doi).await? else {
            return Ok(None);
        };
        pdf_document(&self.client, self.retry, SERVICE, reference, pdf_url).await
    }
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    message: Work,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Work {
    link: Vec<WorkLink>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkLink {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "content-type")]
    content_type: String,
}

impl Work {
    fn pdf_url(self) -> Option<String> {
        self.link
            .into_iter()
            .find(|link| {
                link.content_type.eq_ignore_ascii_case(PDF_CONTENT_TYPE) && !link.url.trim().is_empty()
            })
            .map(|link| link.url)
    }
}
