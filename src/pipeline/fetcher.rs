//! Full-text retrieval over an ordered set of sources.

use std::sync::Arc;

use crate::models::{
    ArticleId, ArticleReference, Availability, DocumentFormat, FullTextDocument, ReferenceBuilder,
};
use crate::sources::{FullTextSource, ReferenceSource, SourceError};

fn richness(format: DocumentFormat) -> u8 {
    match format {
        DocumentFormat::StructuredMarkup => 0,
        DocumentFormat::PlainText => 1,
        DocumentFormat::Unavailable => 2,
    }
}

/// Fetches the richest available rendition of an article.
///
/// Sources are tried structured markup first. A source that does not offer
/// the article is skipped silently; a source that fails is skipped with a
/// warning, and its error is returned only when no later source succeeds.
#[derive(Debug, Clone)]
pub struct FullTextFetcher {
    sources: Vec<Arc<dyn FullTextSource>>,
}

impl FullTextFetcher {
    pub fn new(mut sources: Vec<Arc<dyn FullTextSource>>) -> Self {
        // stable, so sources of one format keep their given order
        sources.sort_by_key(|s| richness(s.format()));
        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn FullTextSource>] {
        &self.sources
    }

    /// Retrieve the full text of `reference`.
    ///
    /// A reference whose availability flags rule out full text yields an
    /// unavailable document without any request.
    pub async fn fetch(&self, reference: &ArticleReference) -> Result<FullTextDocument, SourceError> {
        if !reference.may_have_full_text() {
            tracing::debug!("{} advertises no full text", reference.id());
            return Ok(FullTextDocument::unavailable(reference.id()));
        }

        let mut first_error: Option<SourceError> = None;

        for source in self.sources.iter().filter(|s| s.can_serve(reference)) {
            tracing::debug!("Requesting full text of {} from {}", reference.id(), source.id());
            match source.full_text(reference).await {
                Ok(Some(document)) if document.is_available() => {
                    tracing::info!(
                        "Fetched {} full text of {} from {}",
                        document.format(),
                        reference.id(),
                        source.id()
                    );
                    return Ok(document);
                }
                Ok(_) => {
                    tracing::debug!("{} does not offer {}", source.id(), reference.id());
                }
                Err(err) => {
                    tracing::warn!(
                        "Full text of {} from {} failed, trying next source: {}",
                        reference.id(),
                        source.id(),
                        err
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::info!("No full text found for {}", reference.id());
                Ok(FullTextDocument::unavailable(reference.id()))
            }
        }
    }

    /// Resolve an identifier through `lookup` and fetch its full text.
    ///
    /// A DOI or PMCID the lookup source does not know is still offered to the
    /// sources that can work from that identifier alone. A bare PMID that is
    /// not found yields an unavailable document named after the identifier.
    pub async fn fetch_by_id(
        &self,
        lookup: &dyn ReferenceSource,
        id: &ArticleId,
    ) -> Result<(Option<ArticleReference>, FullTextDocument), SourceError> {
        if let Some(reference) = lookup.lookup(id).await? {
            let document = self.fetch(&reference).await?;
            return Ok((Some(reference), document));
        }

        match bare_reference(id) {
            Some(reference) => {
                tracing::info!("{} not found by {}, trying full-text sources directly", id, lookup.id());
                Ok((None, self.fetch(&reference).await?))
            }
            None => {
                tracing::info!("No reference found for {}", id);
                Ok((None, FullTextDocument::unavailable(id.to_string())))
            }
        }
    }
}

/// Placeholder reference carrying only an identifier full-text sources accept
fn bare_reference(id: &ArticleId) -> Option<ArticleReference> {
    let builder = ReferenceBuilder::new(id.to_string(), "");
    let reference = match id {
        ArticleId::Doi(doi) => builder.doi(doi.clone()).availability(Availability::PDF),
        ArticleId::Pmcid(pmcid) => builder.pmcid(pmcid.clone()).availability(Availability::FULL_TEXT),
        ArticleId::Pmid(_) => return None,
    };
    Some(reference.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Availability, ReferenceBuilder};
    use crate::sources::{MockFullTextSource, MockReferenceSource, RemoteServiceError};

    fn open_access(id: &str) -> ArticleReference {
        ReferenceBuilder::new(id, "A bright red protein")
            .pmcid("PMC1")
            .availability(Availability::FULL_TEXT | Availability::OPEN_ACCESS)
            .build()
    }

    #[tokio::test]
    async fn test_markup_is_preferred_regardless_of_registration_order() {
        let pdf = Arc::new(
            MockFullTextSource::new("pdf", DocumentFormat::PlainText).with_document("MED:1", "text"),
        );
        let xml = Arc::new(
            MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
                .with_document("MED:1", "<article/>"),
        );
        let fetcher = FullTextFetcher::new(vec![pdf.clone(), xml.clone()]);

        let doc = fetcher.fetch(&open_access("MED:1")).await.unwrap();

        assert_eq!(doc.format(), DocumentFormat::StructuredMarkup);
        assert_eq!(pdf.calls(), 0);
        assert_eq!(xml.calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_plain_text() {
        let xml = Arc::new(MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup));
        let pdf = Arc::new(
            MockFullTextSource::new("pdf", DocumentFormat::PlainText).with_document("MED:1", "body"),
        );
        let fetcher = FullTextFetcher::new(vec![xml, pdf]);

        let doc = fetcher.fetch(&open_access("MED:1")).await.unwrap();

        assert_eq!(doc.format(), DocumentFormat::PlainText);
        assert_eq!(doc.content(), "body");
        assert_eq!(doc.origin(), Some("pdf"));
    }

    #[tokio::test]
    async fn test_no_availability_means_no_request() {
        let xml = Arc::new(
            MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
                .with_document("MED:2", "<article/>"),
        );
        let fetcher = FullTextFetcher::new(vec![xml.clone()]);
        let closed = ReferenceBuilder::new("MED:2", "Closed access").build();

        let doc = fetcher.fetch(&closed).await.unwrap();

        assert_eq!(doc.format(), DocumentFormat::Unavailable);
        assert_eq!(xml.calls(), 0);
    }

    #[tokio::test]
    async fn test_error_only_surfaces_when_nothing_succeeds() {
        let outage: SourceError = RemoteServiceError::from_status("xml", 503, "down").into();
        let failing = || {
            Arc::new(
                MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
                    .with_failure("MED:1", outage.clone()),
            )
        };

        let rescued = FullTextFetcher::new(vec![
            failing(),
            Arc::new(
                MockFullTextSource::new("pdf", DocumentFormat::PlainText)
                    .with_document("MED:1", "body"),
            ),
        ]);
        assert!(rescued.fetch(&open_access("MED:1")).await.unwrap().is_available());

        let stranded = FullTextFetcher::new(vec![
            failing(),
            Arc::new(MockFullTextSource::new("pdf", DocumentFormat::PlainText)),
        ]);
        let err = stranded.fetch(&open_access("MED:1")).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_nothing_offered_is_unavailable_not_error() {
        let fetcher = FullTextFetcher::new(vec![Arc::new(MockFullTextSource::new(
            "xml",
            DocumentFormat::StructuredMarkup,
        ))]);

        let doc = fetcher.fetch(&open_access("MED:1")).await.unwrap();
        assert!(!doc.is_available());
        assert_eq!(doc.reference_id(), "MED:1");
    }

    #[tokio::test]
    async fn test_fetch_by_id() {
        let lookup = MockReferenceSource::new();
        lookup.add_known(open_access("MED:1"));
        let fetcher = FullTextFetcher::new(vec![Arc::new(
            MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
                .with_document("MED:1", "<article><p>GFP</p></article>"),
        )]);

        let id = ArticleId::parse("PMC1").unwrap();
        let (reference, doc) = fetcher.fetch_by_id(&lookup, &id).await.unwrap();
        assert_eq!(reference.unwrap().id(), "MED:1");
        assert!(doc.is_available());

        let unknown = ArticleId::parse("12345").unwrap();
        let (reference, doc) = fetcher.fetch_by_id(&lookup, &unknown).await.unwrap();
        assert!(reference.is_none());
        assert_eq!(doc.format(), DocumentFormat::Unavailable);
    }

    #[tokio::test]
    async fn test_unindexed_doi_still_reaches_pdf_sources() {
        let lookup = MockReferenceSource::new();
        let pdf = Arc::new(
            MockFullTextSource::new("pdf", DocumentFormat::PlainText)
                .with_document("doi:10.1234/fp.7", "mScarlet-I was brighter."),
        );
        let fetcher = FullTextFetcher::new(vec![pdf.clone() as Arc<dyn FullTextSource>]);

        let id = ArticleId::parse("https://doi.org/10.1234/fp.7").unwrap();
        let (reference, doc) = fetcher.fetch_by_id(&lookup, &id).await.unwrap();

        assert!(reference.is_none());
        assert_eq!(doc.format(), DocumentFormat::PlainText);
        assert_eq!(doc.content(), "mScarlet-I was brighter.");
        assert_eq!(pdf.calls(), 1);
    }
}
