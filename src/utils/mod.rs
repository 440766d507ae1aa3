//! Utility modules supporting remote calls.
//!
//! - [`HttpClient`]: shared reqwest client that classifies failed responses
//! - [`RetryConfig`]: configuration for retry logic with exponential backoff
//! - [`with_retry`]: execute an operation with automatic retry on retryable errors
//! - [`extract_pdf_text`]: text layer of an in-memory PDF
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use fp_evidence::sources::SourceError;
//! use fp_evidence::utils::{with_retry, HttpClient, RetryConfig, DEFAULT_TIMEOUT};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(DEFAULT_TIMEOUT)?;
//! let body = with_retry(RetryConfig::default(), "example", || async {
//!     let response = client.send("example", client.get("https://example.org")).await?;
//!     response.text().await.map_err(SourceError::from)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod pdf;
mod retry;

pub use http::{HttpClient, DEFAULT_TIMEOUT};
pub use pdf::{extract_text as extract_pdf_text, is_pdf, PdfExtractError};
pub use retry::{with_retry, RetryConfig};
