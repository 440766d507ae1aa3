//! Tool handlers mapping JSON arguments onto pipeline operations.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::tools::ToolHandler;
use crate::extract::{document_text, extract_tables, search_terms, ContextUnit, ContextWindow};
use crate::models::{ArticleId, ArticleReference, FullTextDocument, ResultType};
use crate::pipeline::EvidencePipeline;
use crate::sources::{FpbaseClient, RemoteServiceError, SourceError};

/// Service name for failures inside this crate rather than a remote service
const INTERNAL: &str = "fp-evidence";

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, SourceError> {
    serde_json::to_value(value).map_err(|e| {
        RemoteServiceError::malformed(INTERNAL, format!("result could not be serialized: {}", e))
            .into()
    })
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, SourceError> {
    serde_json::from_value(args).map_err(|e| SourceError::InvalidInput(e.to_string()))
}

/// Fetch the document named by an `article_id` argument
async fn document_for(
    pipeline: &EvidencePipeline,
    article_id: &str,
) -> Result<(Option<ArticleReference>, FullTextDocument), SourceError> {
    let id = ArticleId::parse(article_id)?;
    pipeline.fetch_by_id(&id).await
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    cursor: Option<String>,
    page_size: Option<usize>,
    result_type: Option<ResultType>,
    max_pages: Option<usize>,
}

/// Handler for searching references
#[derive(Debug)]
pub struct SearchReferencesHandler {
    pub pipeline: Arc<EvidencePipeline>,
}

#[async_trait::async_trait]
impl ToolHandler for SearchReferencesHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: SearchArgs = parse_args(args)?;

        let mut query = self.pipeline.query(args.query);
        if let Some(size) = args.page_size {
            query = query.page_size(size);
        }
        if let Some(result_type) = args.result_type {
            query = query.result_type(result_type);
        }
        if let Some(cursor) = args.cursor {
            query = query.cursor(cursor);
        }

        let page = self
            .pipeline
            .search_all(&query, args.max_pages.unwrap_or(1))
            .await?;
        to_value(&page)
    }
}

#[derive(Debug, Deserialize)]
struct RankArgs {
    protein: String,
    /// Candidates to rank; searched for by protein name when absent
    references: Option<Vec<ArticleReference>>,
    query: Option<String>,
}

/// Handler for ranking references against a protein name
#[derive(Debug)]
pub struct RankReferencesHandler {
    pub pipeline: Arc<EvidencePipeline>,
}

#[async_trait::async_trait]
impl ToolHandler for RankReferencesHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: RankArgs = parse_args(args)?;

        let candidates = match args.references {
            Some(references) => references,
            None => {
                let text = args.query.unwrap_or_else(|| args.protein.clone());
                let query = self.pipeline.query(text);
                self.pipeline
                    .search_all(&query, self.pipeline.options().max_pages)
                    .await?
                    .references
            }
        };

        let ranked = self.pipeline.rank(&args.protein, candidates)?;
        to_value(&ranked)
    }
}

#[derive(Debug, Deserialize)]
struct ArticleArgs {
    article_id: String,
}

/// Handler for fetching the full text of an article
#[derive(Debug)]
pub struct FetchFullTextHandler {
    pub pipeline: Arc<EvidencePipeline>,
}

#[async_trait::async_trait]
impl ToolHandler for FetchFullTextHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: ArticleArgs = parse_args(args)?;
        let (reference, document) = document_for(&self.pipeline, &args.article_id).await?;
        Ok(json!({
            "reference": to_value(&reference)?,
            "document": to_value(&document)?,
        }))
    }
}

/// Handler returning the readable text of an article
#[derive(Debug)]
pub struct ArticleTextHandler {
    pub pipeline: Arc<EvidencePipeline>,
}

#[async_trait::async_trait]
impl ToolHandler for ArticleTextHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: ArticleArgs = parse_args(args)?;
        let (_, document) = document_for(&self.pipeline, &args.article_id).await?;
        let (text, diagnostic) = document_text(&document);
        Ok(json!({
            "reference_id": document.reference_id(),
            "format": document.format(),
            "text": text,
            "diagnostics": to_value(&diagnostic.into_iter().collect::<Vec<_>>())?,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct TablesArgs {
    article_id: String,
    #[serde(default)]
    markdown: bool,
}

/// Handler for extracting tables from an article
#[derive(Debug)]
pub struct ExtractTablesHandler {
    pub pipeline: Arc<EvidencePipeline>,
}

#[async_trait::async_trait]
impl ToolHandler for ExtractTablesHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: TablesArgs = parse_args(args)?;
        let (_, document) = document_for(&self.pipeline, &args.article_id).await?;
        let extraction = extract_tables(&document);

        if args.markdown {
            let rendered: Vec<String> = extraction.tables.iter().map(|t| t.to_markdown()).collect();
            return Ok(json!({
                "reference_id": document.reference_id(),
                "format": document.format(),
                "tables": rendered,
                "diagnostics": to_value(&extraction.diagnostics)?,
            }));
        }

        Ok(json!({
            "reference_id": document.reference_id(),
            "format": document.format(),
            "tables": to_value(&extraction.tables)?,
            "diagnostics": to_value(&extraction.diagnostics)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct TermsArgs {
    article_id: String,
    terms: Vec<String>,
    context_radius: Option<usize>,
    unit: Option<ContextUnit>,
}

/// Handler for locating terms in an article
#[derive(Debug)]
pub struct SearchTermsHandler {
    pub pipeline: Arc<EvidencePipeline>,
}

#[async_trait::async_trait]
impl ToolHandler for SearchTermsHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: TermsArgs = parse_args(args)?;
        let defaults = self.pipeline.options().context;
        let window = ContextWindow {
            radius: args.context_radius.unwrap_or(defaults.radius),
            unit: args.unit.unwrap_or(defaults.unit),
        };

        let (_, document) = document_for(&self.pipeline, &args.article_id).await?;
        let search = search_terms(&document, &args.terms, window);
        Ok(json!({
            "reference_id": document.reference_id(),
            "format": document.format(),
            "matches": to_value(&search.matches)?,
            "diagnostics": to_value(&search.diagnostics)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ProteinArgs {
    protein: String,
}

/// Handler listing the articles FPbase links to a protein
#[derive(Debug)]
pub struct ProteinReferencesHandler {
    pub fpbase: Arc<FpbaseClient>,
}

#[async_trait::async_trait]
impl ToolHandler for ProteinReferencesHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: ProteinArgs = parse_args(args)?;
        let references = self.fpbase.references_for(&args.protein).await?;
        let ids: Vec<Value> = references
            .iter()
            .filter_map(|r| r.article_id())
            .map(|id| json!({ "kind": id.kind(), "value": id.value() }))
            .collect();
        Ok(json!({
            "protein": args.protein,
            "article_ids": ids,
            "references": to_value(&references)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct EvidenceArgs {
    protein: String,
    #[serde(default)]
    terms: Vec<String>,
}

/// Handler running search, ranking and extraction end to end
#[derive(Debug)]
pub struct CollectEvidenceHandler {
    pub pipeline: Arc<EvidencePipeline>,
}

#[async_trait::async_trait]
impl ToolHandler for CollectEvidenceHandler {
    async fn execute(&self, args: Value) -> Result<Value, SourceError> {
        let args: EvidenceArgs = parse_args(args)?;
        let report = self.pipeline.collect_evidence(&args.protein, &args.terms).await?;
        to_value(&report)
    }
}
