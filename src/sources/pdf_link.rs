//! Downloading an open-access PDF and reducing it to plain text.
//!
//! Shared by the sources that only discover a PDF link (Unpaywall, Crossref).

use crate::models::{ArticleReference, DocumentFormat, FullTextDocument};
use crate::sources::{RemoteServiceError, SourceError};
use crate::utils::{extract_pdf_text, is_pdf, with_retry, HttpClient, PdfExtractError, RetryConfig};

/// A DOI as a URL path: each segment percent-encoded, slashes kept
pub(crate) fn doi_path(doi: &str) -> String {
    doi.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Statuses meaning the resource is simply not offered to us
pub(crate) const NOT_OFFERED: &[u16] = &[401, 403, 404, 410];

/// Download a PDF; `None` if the host refuses or serves something that is not a PDF
pub(crate) async fn download_pdf(
    client: &HttpClient,
    retry: RetryConfig,
    service: &str,
    url: &str,
) -> Result<Option<Vec<u8>>, SourceError> {
    let result = with_retry(retry, service, move || async move {
        let response = client.send(service, client.get(url)).await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| SourceError::from(RemoteServiceError::from_reqwest(service, &e)))
    })
    .await;

    let bytes = match result {
        Ok(bytes) => bytes,
        Err(err) if err.status().is_some_and(|s| NOT_OFFERED.contains(&s)) => {
            tracing::debug!("PDF host refused {}: {}", url, err);
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    if !is_pdf(&bytes) {
        tracing::warn!("{} link {} did not serve a PDF", service, url);
        return Ok(None);
    }
    Ok(Some(bytes))
}

/// Fetch the PDF at `url` and turn its text layer into a plain-text document.
///
/// Refused downloads, non-PDF bodies and image-only PDFs all yield `None`.
pub(crate) async fn pdf_document(
    client: &HttpClient,
    retry: RetryConfig,
    service: &str,
    reference: &ArticleReference,
    url: String,
) -> Result<Option<FullTextDocument>, SourceError> {
    let Some(bytes) = download_pdf(client, retry, service, &url).await? else {
        return Ok(None);
    };

    let extracted = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
        .await
        .map_err(|e| RemoteServiceError::malformed(service, format!("PDF extraction task failed: {}", e)))?;

    match extracted {
        Ok(text) => Ok(Some(
            FullTextDocument::new(reference.id(), DocumentFormat::PlainText, text).with_origin(url),
        )),
        Err(PdfExtractError::NoText) => {
            tracing::info!("PDF for {} has no text layer, skipping", reference.id());
            Ok(None)
        }
        Err(err) => Err(RemoteServiceError::malformed(service, err.to_string()).into()),
    }
}
