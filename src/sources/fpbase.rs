//! FPbase GraphQL client for curated protein references.
//!
//! FPbase links each fluorescent protein to the articles its data was curated
//! from, which makes it a precise alternative to free-text search.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Settings;
use crate::models::ArticleId;
use crate::pipeline::normalize_name;
use crate::sources::{RemoteServiceError, SourceError};
use crate::utils::{with_retry, HttpClient, RetryConfig};

/// FPbase GraphQL endpoint
pub const FPBASE_GRAPHQL_URL: &str = "https://www.fpbase.org/graphql/";

const SERVICE: &str = "fpbase";

const REFERENCES_QUERY: &str = "{
  references {
    doi
    pmid
    proteins { edges { node { id name } } }
  }
}";

/// An article FPbase associates with a protein
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinReference {
    pub doi: Option<String>,
    pub pmid: Option<String>,
    /// Names of all proteins FPbase links to this article
    pub proteins: Vec<String>,
}

impl ProteinReference {
    /// Identifier to fetch this article by: DOI if known, else PMID
    pub fn article_id(&self) -> Option<ArticleId> {
        self.doi
            .as_deref()
            .or(self.pmid.as_deref())
            .and_then(|raw| ArticleId::parse(raw).ok())
    }
}

/// FPbase client
#[derive(Debug, Clone)]
pub struct FpbaseClient {
    client: HttpClient,
    url: String,
    retry: RetryConfig,
}

impl FpbaseClient {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            url: FPBASE_GRAPHQL_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Build a client from configuration
    pub fn from_settings(settings: &Settings) -> Result<Self, SourceError> {
        let client = HttpClient::new(settings.fpbase.timeout())?;
        Ok(Self::new(client)
            .with_url(&settings.fpbase.url)
            .with_retry(settings.retry.to_retry_config(settings.fpbase.timeout())))
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Every reference FPbase knows, with its linked proteins
    pub async fn references(&self) -> Result<Vec<ProteinReference>, SourceError> {
        let client = &self.client;
        let url = self.url.as_str();
        let body = json!({ "query": REFERENCES_QUERY });
        let body = &body;

        let text = with_retry(self.retry, SERVICE, move || async move {
            let response = client.send(SERVICE, client.post(url).json(body)).await?;
            response
                .text()
                .await
                .map_err(|e| SourceError::from(RemoteServiceError::from_reqwest(SERVICE, &e)))
        })
        .await?;

        let response: GraphQlResponse = serde_json::from_str(&text).map_err(|e| {
            RemoteServiceError::malformed(SERVICE, format!("failed to parse GraphQL response: {}", e))
        })?;

        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(RemoteServiceError::malformed(
                SERVICE,
                format!("GraphQL query failed: {}", messages.join("; ")),
            )
            .into());
        }

        let references = response
            .data
            .map(|data| data.references)
            .unwrap_or_default()
            .into_iter()
            .map(RawReference::into_reference)
            .collect::<Vec<_>>();

        tracing::debug!("FPbase returned {} references", references.len());
        Ok(references)
    }

    /// References linked to a protein, matched after case and hyphen normalization
    pub async fn references_for(&self, protein: &str) -> Result<Vec<ProteinReference>, SourceError> {
        let target = normalize_name(protein);
        if target.is_empty() {
            return Err(SourceError::InvalidInput(
                "protein name must not be empty".to_string(),
            ));
        }

        Ok(filter_by_protein(self.references().await?, &target))
    }
}

fn filter_by_protein(references: Vec<ProteinReference>, normalized: &str) -> Vec<ProteinReference> {
    references
        .into_iter()
        .filter(|r| r.proteins.iter().any(|p| normalize_name(p) == normalized))
        .collect()
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ReferencesData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ReferencesData {
    references: Vec<RawReference>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    doi: Option<String>,
    pmid: Option<String>,
    proteins: ProteinConnection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProteinConnection {
    edges: Vec<ProteinEdge>,
}

#[derive(Debug, Deserialize)]
struct ProteinEdge {
    node: ProteinNode,
}

#[derive(Debug, Deserialize)]
struct ProteinNode {
    name: String,
}

impl RawReference {
    fn into_reference(self) -> ProteinReference {
        let non_empty = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        ProteinReference {
            doi: non_empty(self.doi),
            pmid: non_empty(self.pmid),
            proteins: self.proteins.edges.into_iter().map(|e| e.node.name).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<ProteinReference> {
        let response: GraphQlResponse = serde_json::from_str(json).unwrap();
        response
            .data
            .unwrap()
            .references
            .into_iter()
            .map(RawReference::into_reference)
            .collect()
    }

    const RESPONSE: &str = r#"{"data": {"references": [
        {"doi": "10.1038/s41587-022-01278-2", "pmid": "35468954",
         "proteins": {"edges": [{"node": {"id": "1", "name": "StayGold"}}]}},
        {"doi": "", "pmid": "15558047",
         "proteins": {"edges": [{"node": {"id": "2", "name": "mCherry"}},
                                {"node": {"id": "3", "name": "mOrange"}}]}}
    ]}}"#;

    #[test]
    fn test_filter_is_case_and_hyphen_insensitive() {
        let refs = filter_by_protein(parse(RESPONSE), &normalize_name("M-Cherry"));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].pmid.as_deref(), Some("15558047"));
        assert_eq!(refs[0].doi, None);
    }

    #[test]
    fn test_article_id_prefers_doi() {
        let refs = parse(RESPONSE);
        assert_eq!(
            refs[0].article_id(),
            Some(ArticleId::Doi("10.1038/s41587-022-01278-2".to_string()))
        );
        assert_eq!(refs[1].article_id(), Some(ArticleId::Pmid("15558047".to_string())));
    }

    #[test]
    fn test_unknown_protein_yields_nothing() {
        assert!(filter_by_protein(parse(RESPONSE), "mneongreen").is_empty());
    }
}
