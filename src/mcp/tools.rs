//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::handlers::{
    ArticleTextHandler, CollectEvidenceHandler, ExtractTablesHandler, FetchFullTextHandler,
    ProteinReferencesHandler, RankReferencesHandler, SearchReferencesHandler, SearchTermsHandler,
};
use crate::models::{MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::pipeline::EvidencePipeline;
use crate::sources::{FpbaseClient, SourceError};

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_references")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, SourceError>;
}

fn article_id_schema() -> Value {
    json!({
        "type": "string",
        "description": "PMID (e.g. '35468954'), PMCID (e.g. 'PMC9159365') or DOI (e.g. '10.1038/s41587-022-01278-2')"
    })
}

/// Registry for all MCP tools
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Register every pipeline tool, plus `protein_references` when FPbase is available
    pub fn new(pipeline: Arc<EvidencePipeline>, fpbase: Option<Arc<FpbaseClient>>) -> Self {
        let mut registry = Self::default();
        registry.register_pipeline_tools(&pipeline);
        if let Some(fpbase) = fpbase {
            registry.register_fpbase_tools(fpbase);
        }
        registry
    }

    fn register_pipeline_tools(&mut self, pipeline: &Arc<EvidencePipeline>) {
        let options = pipeline.options();

        self.register(Tool {
            name: "search_references".to_string(),
            description: "Search Europe PMC for articles matching a protein name or boolean query. \
                          Returns one page of references in service order and a cursor for the next page."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Free-text or boolean query (e.g. 'mCherry AND photostability')"
                    },
                    "cursor": {
                        "type": "string",
                        "description": "Opaque cursor returned by a previous call; omit for the first page"
                    },
                    "page_size": {
                        "type": "integer",
                        "description": format!("References per page, clamped to {}..={}", MIN_PAGE_SIZE, MAX_PAGE_SIZE),
                        "default": options.page_size
                    },
                    "result_type": {
                        "type": "string",
                        "enum": ["lite", "core"],
                        "default": options.result_type.as_str()
                    },
                    "max_pages": {
                        "type": "integer",
                        "description": "Follow the cursor for up to this many pages",
                        "default": 1
                    }
                },
                "required": ["query"]
            }),
            handler: Arc::new(SearchReferencesHandler {
                pipeline: pipeline.clone(),
            }),
        });

        self.register(Tool {
            name: "rank_references".to_string(),
            description: "Score references by how relevant they are to a protein name. \
                          Without explicit references, the protein name is searched first."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "protein": {
                        "type": "string",
                        "description": "Protein name (e.g. 'mNeonGreen')"
                    },
                    "references": {
                        "type": "array",
                        "description": "References as returned by search_references",
                        "items": { "type": "object" }
                    },
                    "query": {
                        "type": "string",
                        "description": "Search query used when no references are given (defaults to the protein name)"
                    }
                },
                "required": ["protein"]
            }),
            handler: Arc::new(RankReferencesHandler {
                pipeline: pipeline.clone(),
            }),
        });

        self.register(Tool {
            name: "fetch_full_text".to_string(),
            description: "Fetch the full text of an article, JATS XML when available, otherwise text \
                          from an open-access PDF. Unavailable full text is reported, not an error."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "article_id": article_id_schema() },
                "required": ["article_id"]
            }),
            handler: Arc::new(FetchFullTextHandler {
                pipeline: pipeline.clone(),
            }),
        });

        self.register(Tool {
            name: "article_text".to_string(),
            description: "Readable plain text of an article's full text.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "article_id": article_id_schema() },
                "required": ["article_id"]
            }),
            handler: Arc::new(ArticleTextHandler {
                pipeline: pipeline.clone(),
            }),
        });

        self.register(Tool {
            name: "extract_tables".to_string(),
            description: "Extract every table of an article as a rectangular grid with caption and \
                          footnote. Broken tables are skipped and listed in diagnostics."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "article_id": article_id_schema(),
                    "markdown": {
                        "type": "boolean",
                        "description": "Render tables as Markdown instead of JSON grids",
                        "default": false
                    }
                },
                "required": ["article_id"]
            }),
            handler: Arc::new(ExtractTablesHandler {
                pipeline: pipeline.clone(),
            }),
        });

        self.register(Tool {
            name: "search_terms".to_string(),
            description: "Find every case-insensitive occurrence of the given terms in an article, \
                          with surrounding context."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "article_id": article_id_schema(),
                    "terms": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Terms to look for (e.g. protein names, 'quantum yield')"
                    },
                    "context_radius": {
                        "type": "integer",
                        "description": "Context kept on each side of a match",
                        "default": options.context.radius
                    },
                    "unit": {
                        "type": "string",
                        "enum": ["characters", "words"],
                        "default": "characters"
                    }
                },
                "required": ["article_id", "terms"]
            }),
            handler: Arc::new(SearchTermsHandler {
                pipeline: pipeline.clone(),
            }),
        });

        self.register(Tool {
            name: "collect_evidence".to_string(),
            description: format!(
                "Search for a protein, rank the hits and extract tables and term matches from the \
                 top {} references.",
                options.top_n
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "protein": {
                        "type": "string",
                        "description": "Protein name"
                    },
                    "terms": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Terms to locate in each article (defaults to the protein name)"
                    }
                },
                "required": ["protein"]
            }),
            handler: Arc::new(CollectEvidenceHandler {
                pipeline: pipeline.clone(),
            }),
        });
    }

    fn register_fpbase_tools(&mut self, fpbase: Arc<FpbaseClient>) {
        self.register(Tool {
            name: "protein_references".to_string(),
            description: "List the articles FPbase cites for a fluorescent protein, as DOI or PMID."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "protein": {
                        "type": "string",
                        "description": "Protein name as known to FPbase (e.g. 'EGFP')"
                    }
                },
                "required": ["protein"]
            }),
            handler: Arc::new(ProteinReferencesHandler { fpbase }),
        });
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// All tools, sorted by name
    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, SourceError> {
        let tool = self
            .get(name)
            .ok_or_else(|| SourceError::InvalidInput(format!("Tool '{}' not found", name)))?;

        tool.handler.execute(args).await
    }
}
