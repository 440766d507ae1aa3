//! Mock sources for testing purposes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{ArticleId, ArticleReference, DocumentFormat, FullTextDocument, SearchPage, SearchQuery};
use crate::sources::{FullTextSource, ReferenceSource, SourceError};

/// A reference source that replays queued pages.
#[derive(Debug, Default)]
pub struct MockReferenceSource {
    pages: Mutex<VecDeque<Result<SearchPage, SourceError>>>,
    known: Mutex<Vec<ArticleReference>>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl MockReferenceSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page (or failure) to return from the next search.
    pub fn push_page(&self, page: Result<SearchPage, SourceError>) {
        if let Ok(mut guard) = self.pages.lock() {
            guard.push_back(page);
        }
    }

    /// Make a reference resolvable by [`ReferenceSource::lookup`].
    pub fn add_known(&self, reference: ArticleReference) {
        if let Ok(mut guard) = self.known.lock() {
            guard.push(reference);
        }
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReferenceSource for MockReferenceSource {
    fn id(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        query.validated_query()?;
        if let Ok(mut guard) = self.queries.lock() {
            guard.push(query.clone());
        }
        let next = self.pages.lock().ok().and_then(|mut guard| guard.pop_front());
        next.unwrap_or_else(|| Ok(SearchPage::new(Vec::new())))
    }

    async fn lookup(&self, id: &ArticleId) -> Result<Option<ArticleReference>, SourceError> {
        let guard = match self.known.lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(None),
        };
        let value = id.value();
        Ok(guard
            .iter()
            .find(|r| {
                r.pmid() == Some(value) || r.pmcid() == Some(value) || r.doi() == Some(value)
            })
            .cloned())
    }
}

/// A full-text source serving canned bodies keyed by reference id.
#[derive(Debug)]
pub struct MockFullTextSource {
    name: String,
    format: DocumentFormat,
    documents: HashMap<String, Result<String, SourceError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFullTextSource {
    pub fn new(name: impl Into<String>, format: DocumentFormat) -> Self {
        Self {
            name: name.into(),
            format,
            documents: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Serve `content` for the reference with this id.
    pub fn with_document(mut self, reference_id: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.insert(reference_id.into(), Ok(content.into()));
        self
    }

    /// Fail every request for the reference with this id.
    pub fn with_failure(mut self, reference_id: impl Into<String>, error: SourceError) -> Self {
        self.documents.insert(reference_id.into(), Err(error));
        self
    }

    /// Sleep before answering, to exercise timeouts and ordering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FullTextSource for MockFullTextSource {
    fn id(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DocumentFormat {
        self.format
    }

    async fn full_text(
        &self,
        reference: &ArticleReference,
    ) -> Result<Option<FullTextDocument>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.documents.get(reference.id()) {
            Some(Ok(content)) => Ok(Some(
                FullTextDocument::new(reference.id(), self.format, content.clone())
                    .with_origin(self.name.clone()),
            )),
            Some(Err(err)) => Err(err.clone()),
            None => Ok(None),
        }
    }
}
