//! # fp-evidence
//!
//! Literature evidence for fluorescent proteins: find candidate articles for a
//! protein name, rank them, retrieve their full text and extract the tables
//! and passages a curator needs to verify database records.
//!
//! ## Architecture
//!
//! - [`models`]: References, documents, tables, term matches and diagnostics
//! - [`sources`]: Europe PMC, Unpaywall and FPbase clients behind source traits
//! - [`pipeline`]: Ranking, full-text fetching and end-to-end evidence collection
//! - [`extract`]: Table extraction and term search over full text
//! - [`mcp`]: MCP tool surface and server
//! - [`utils`]: HTTP client, retry with backoff, PDF text
//! - [`config`]: Layered configuration

pub mod config;
pub mod extract;
pub mod mcp;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use models::{ArticleReference, FullTextDocument, RankedReference};
pub use pipeline::EvidencePipeline;
pub use sources::SourceError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
