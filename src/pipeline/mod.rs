//! Composition of search, ranking, fetching and extraction.
//!
//! Every stage can be called on its own through [`EvidencePipeline`], or all
//! of them at once through [`EvidencePipeline::collect_evidence`], which
//! processes the best-ranked references concurrently and hands results back
//! in ranked order.

mod fetcher;
mod ranker;

pub use fetcher::FullTextFetcher;
pub use ranker::{normalize_name, rank, PARTIAL_CEILING};

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::extract::{extract_tables, search_terms, ContextWindow};
use crate::models::{
    ArticleId, ArticleReference, DocumentFormat, FullTextDocument, RankedReference, ResultType,
    SearchPage, SearchQuery, TableExtraction, TermSearch, DEFAULT_PAGE_SIZE,
};
use crate::sources::{
    CrossrefClient, EuropePmcClient, FullTextSource, ReferenceSource, RemoteServiceError, SourceError,
    UnpaywallClient,
};

/// Tunables shared by every pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub page_size: usize,
    pub result_type: ResultType,
    /// Pages followed when collecting candidates
    pub max_pages: usize,
    pub relevance_floor: f64,
    pub context: ContextWindow,
    /// Upper bound on references processed at the same time
    pub max_concurrent: usize,
    /// Deadline for fetching and extracting one reference
    pub call_timeout: Duration,
    /// Ranked references processed by evidence collection
    pub top_n: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            result_type: ResultType::Core,
            max_pages: 1,
            relevance_floor: 0.2,
            context: ContextWindow::characters(100),
            max_concurrent: 4,
            call_timeout: Duration::from_secs(120),
            top_n: 5,
        }
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            page_size: settings.search.page_size,
            result_type: settings.search.result_type,
            max_pages: settings.search.max_pages,
            relevance_floor: settings.ranking.relevance_floor,
            context: ContextWindow {
                radius: settings.terms.context_radius,
                unit: settings.terms.unit,
            },
            max_concurrent: settings.pipeline.max_concurrent,
            call_timeout: settings.pipeline.call_timeout(),
            top_n: settings.pipeline.top_n,
        }
    }
}

/// Tables and term matches found in one article
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub format: DocumentFormat,
    pub origin: Option<String>,
    pub tables: TableExtraction,
    pub terms: TermSearch,
}

/// Result of processing one ranked reference
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvidenceOutcome {
    Collected(Evidence),
    Failed { error: SourceError },
}

#[derive(Debug, Clone, Serialize)]
pub struct EvidenceItem {
    pub reference: RankedReference,
    pub outcome: EvidenceOutcome,
}

/// Everything evidence collection found for one protein
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceReport {
    pub protein: String,
    pub total_hits: Option<u64>,
    /// References returned by search
    pub candidates: usize,
    /// References that passed the relevance floor
    pub relevant: usize,
    /// One entry per processed reference, in ranked order
    pub items: Vec<EvidenceItem>,
}

impl EvidenceReport {
    pub fn failures(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, EvidenceOutcome::Failed { .. }))
            .count()
    }
}

/// Search, rank, fetch and extract, as separate stages or all together
#[derive(Debug, Clone)]
pub struct EvidencePipeline {
    references: Arc<dyn ReferenceSource>,
    fetcher: FullTextFetcher,
    options: PipelineOptions,
}

impl EvidencePipeline {
    pub fn new(
        references: Arc<dyn ReferenceSource>,
        fetcher: FullTextFetcher,
        options: PipelineOptions,
    ) -> Self {
        Self {
            references,
            fetcher,
            options,
        }
    }

    /// Europe PMC for search and markup, then Unpaywall and Crossref PDFs when configured
    pub fn from_settings(settings: &Settings) -> Result<Self, SourceError> {
        let europe_pmc = Arc::new(EuropePmcClient::from_settings(settings)?);
        let mut full_text: Vec<Arc<dyn FullTextSource>> = vec![europe_pmc.clone()];
        match UnpaywallClient::from_settings(settings)? {
            Some(unpaywall) => full_text.push(Arc::new(unpaywall)),
            None => tracing::info!("Unpaywall disabled or no contact email configured"),
        }
        if let Some(crossref) = CrossrefClient::from_settings(settings)? {
            full_text.push(Arc::new(crossref));
        }

        Ok(Self::new(
            europe_pmc,
            FullTextFetcher::new(full_text),
            PipelineOptions::from_settings(settings),
        ))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn fetcher(&self) -> &FullTextFetcher {
        &self.fetcher
    }

    /// First-page query carrying the configured page size and result type
    pub fn query(&self, text: impl Into<String>) -> SearchQuery {
        SearchQuery::new(text)
            .page_size(self.options.page_size)
            .result_type(self.options.result_type)
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        self.references.search(query).await
    }

    /// Follow cursors for up to `max_pages` pages.
    ///
    /// References are concatenated in service order. The returned cursor
    /// continues after the last page read.
    pub async fn search_all(
        &self,
        query: &SearchQuery,
        max_pages: usize,
    ) -> Result<SearchPage, SourceError> {
        let mut page = self.references.search(query).await?;
        let mut combined = SearchPage::new(std::mem::take(&mut page.references));
        combined.total_hits = page.total_hits;
        combined.next_cursor = page.next_cursor.take();

        for _ in 1..max_pages.max(1) {
            let Some(cursor) = combined.next_cursor.take() else {
                break;
            };
            let mut next = self.references.search(&query.next_page(cursor)).await?;
            combined.references.append(&mut next.references);
            combined.next_cursor = next.next_cursor;
        }

        tracing::debug!(
            "Collected {} references for '{}'",
            combined.references.len(),
            query.query
        );
        Ok(combined)
    }

    pub fn rank(
        &self,
        protein: &str,
        candidates: Vec<ArticleReference>,
    ) -> Result<Vec<RankedReference>, SourceError> {
        rank(protein, candidates, self.options.relevance_floor)
    }

    pub async fn lookup(&self, id: &ArticleId) -> Result<Option<ArticleReference>, SourceError> {
        self.references.lookup(id).await
    }

    pub async fn fetch(&self, reference: &ArticleReference) -> Result<FullTextDocument, SourceError> {
        self.fetcher.fetch(reference).await
    }

    /// Resolve a bare identifier and fetch its full text
    pub async fn fetch_by_id(
        &self,
        id: &ArticleId,
    ) -> Result<(Option<ArticleReference>, FullTextDocument), SourceError> {
        self.fetcher.fetch_by_id(self.references.as_ref(), id).await
    }

    async fn evidence_for(
        &self,
        reference: &ArticleReference,
        terms: &[String],
    ) -> Result<Evidence, SourceError> {
        let document = self.fetcher.fetch(reference).await?;
        Ok(Evidence {
            format: document.format(),
            origin: document.origin().map(str::to_string),
            tables: extract_tables(&document),
            terms: search_terms(&document, terms, self.options.context),
        })
    }

    /// Search for `protein`, rank the hits and extract evidence from the best ones.
    ///
    /// At most `max_concurrent` references are fetched at once and each gets
    /// its own deadline. A reference that fails does not affect the others;
    /// its error is reported in its slot. Terms default to the protein name.
    pub async fn collect_evidence(
        &self,
        protein: &str,
        terms: &[String],
    ) -> Result<EvidenceReport, SourceError> {
        let query = self.query(protein);
        query.validated_query()?;

        let page = self.search_all(&query, self.options.max_pages).await?;
        let candidates = page.references.len();
        let ranked = self.rank(protein, page.references)?;
        let relevant = ranked.len();

        let terms: Vec<String> = if terms.iter().all(|t| t.trim().is_empty()) {
            vec![protein.trim().to_string()]
        } else {
            terms.to_vec()
        };
        let deadline = self.options.call_timeout;

        let items: Vec<EvidenceItem> = stream::iter(ranked.into_iter().take(self.options.top_n))
            .map(|reference| {
                let terms = &terms;
                async move {
                    let outcome = match tokio::time::timeout(
                        deadline,
                        self.evidence_for(reference.reference(), terms),
                    )
                    .await
                    {
                        Ok(Ok(evidence)) => EvidenceOutcome::Collected(evidence),
                        Ok(Err(error)) => EvidenceOutcome::Failed { error },
                        Err(_) => EvidenceOutcome::Failed {
                            error: RemoteServiceError::timeout(
                                "pipeline",
                                format!("no result for {} within {:?}", reference.reference().id(), deadline),
                            )
                            .into(),
                        },
                    };
                    if let EvidenceOutcome::Failed { error } = &outcome {
                        tracing::warn!("Evidence for {} failed: {}", reference.reference().id(), error);
                    }
                    EvidenceItem { reference, outcome }
                }
            })
            .buffered(self.options.max_concurrent.max(1))
            .collect()
            .await;

        let report = EvidenceReport {
            protein: protein.trim().to_string(),
            total_hits: page.total_hits,
            candidates,
            relevant,
            items,
        };
        tracing::info!(
            "Evidence for '{}': {} candidates, {} relevant, {} processed, {} failed",
            report.protein,
            report.candidates,
            report.relevant,
            report.items.len(),
            report.failures()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Availability, ReferenceBuilder};
    use crate::sources::{MockFullTextSource, MockReferenceSource};

    fn reference(id: &str, title: &str) -> ArticleReference {
        ReferenceBuilder::new(id, title)
            .availability(Availability::FULL_TEXT)
            .build()
    }

    fn pipeline(references: MockReferenceSource, xml: MockFullTextSource) -> EvidencePipeline {
        EvidencePipeline::new(
            Arc::new(references),
            FullTextFetcher::new(vec![Arc::new(xml)]),
            PipelineOptions::default(),
        )
    }

    #[test]
    fn test_from_settings_orders_full_text_sources() {
        let mut settings = Settings::default();
        settings.unpaywall.email = Some("curator@example.org".to_string());

        let pipeline = EvidencePipeline::from_settings(&settings).unwrap();
        let ids: Vec<&str> = pipeline.fetcher().sources().iter().map(|s| s.id()).collect();
        assert_eq!(ids, ["europe_pmc", "unpaywall", "crossref"]);

        settings.unpaywall.email = None;
        settings.crossref.enabled = false;
        let pipeline = EvidencePipeline::from_settings(&settings).unwrap();
        assert_eq!(pipeline.fetcher().sources().len(), 1);
    }

    #[tokio::test]
    async fn test_search_all_follows_cursor() {
        let source = MockReferenceSource::new();
        source.push_page(Ok(SearchPage::new(vec![reference("MED:1", "a")])
            .next_cursor(Some("AoE1".to_string()))
            .total_hits(3)));
        source.push_page(Ok(SearchPage::new(vec![reference("MED:2", "b")])
            .next_cursor(Some("AoE2".to_string()))));
        source.push_page(Ok(SearchPage::new(vec![reference("MED:3", "c")])));
        let source = Arc::new(source);
        let pipeline = EvidencePipeline::new(
            source.clone(),
            FullTextFetcher::new(Vec::new()),
            PipelineOptions::default(),
        );

        let page = pipeline.search_all(&pipeline.query("GFP"), 2).await.unwrap();

        let ids: Vec<&str> = page.references.iter().map(|r| r.id()).collect();
        assert_eq!(ids, ["MED:1", "MED:2"]);
        assert_eq!(page.next_cursor.as_deref(), Some("AoE2"));
        assert_eq!(page.total_hits, Some(3));

        let queries = source.queries();
        assert_eq!(queries[0].cursor, None);
        assert_eq!(queries[1].cursor.as_deref(), Some("AoE1"));
    }

    #[tokio::test]
    async fn test_collect_evidence_keeps_ranked_order() {
        let with_abstract = ReferenceBuilder::new("MED:abstract", "Red proteins")
            .abstract_text("compared with mCherry")
            .availability(Availability::FULL_TEXT)
            .build();
        let source = MockReferenceSource::new();
        source.push_page(Ok(SearchPage::new(vec![
            with_abstract,
            reference("MED:title", "mCherry brightness"),
            reference("MED:none", "Plant biology"),
        ])));
        let xml = MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
            .with_document("MED:title", "<article><p>mCherry is red.</p></article>")
            .with_delay(Duration::from_millis(20));

        let report = pipeline(source, xml)
            .collect_evidence("mCherry", &[])
            .await
            .unwrap();

        assert_eq!(report.candidates, 3);
        assert_eq!(report.relevant, 2);
        let ids: Vec<&str> = report.items.iter().map(|i| i.reference.reference().id()).collect();
        assert_eq!(ids, ["MED:title", "MED:abstract"]);

        match &report.items[0].outcome {
            EvidenceOutcome::Collected(evidence) => {
                assert_eq!(evidence.terms.matches.len(), 1);
                assert_eq!(evidence.terms.matches[0].term, "mCherry");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // nothing offered for the abstract match: unavailable, not failed
        match &report.items[1].outcome {
            EvidenceOutcome::Collected(evidence) => {
                assert_eq!(evidence.format, DocumentFormat::Unavailable)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(report.failures(), 0);
    }

    #[tokio::test]
    async fn test_slow_reference_times_out_without_affecting_others() {
        let source = MockReferenceSource::new();
        source.push_page(Ok(SearchPage::new(vec![
            reference("MED:1", "GFP one"),
            // no availability flags, so no request is made
            ReferenceBuilder::new("MED:2", "GFP two").build(),
        ])));
        let slow = MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
            .with_document("MED:1", "<p>GFP</p>")
            .with_delay(Duration::from_millis(500));
        let options = PipelineOptions {
            call_timeout: Duration::from_millis(20),
            ..PipelineOptions::default()
        };
        let pipeline = EvidencePipeline::new(
            Arc::new(source),
            FullTextFetcher::new(vec![Arc::new(slow)]),
            options,
        );

        let report = pipeline
            .collect_evidence("GFP", &["GFP".to_string()])
            .await
            .unwrap();

        assert_eq!(report.items.len(), 2);
        match &report.items[0].outcome {
            EvidenceOutcome::Failed { error } => assert!(error.is_retryable()),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(matches!(report.items[1].outcome, EvidenceOutcome::Collected(_)));
        assert_eq!(report.failures(), 1);
    }

    #[tokio::test]
    async fn test_blank_protein_is_invalid_input() {
        let pipeline = pipeline(
            MockReferenceSource::new(),
            MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup),
        );
        let err = pipeline.collect_evidence("   ", &[]).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidInput(_)));
    }
}
