//! Europe PMC client using the REST API.
//!
//! Europe PMC indexes PubMed, PMC and preprints. Search results carry the
//! availability flags the fetcher relies on, and PMC-hosted articles can be
//! downloaded as JATS XML.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::config::Settings;
use crate::models::{
    ArticleId, ArticleReference, Availability, DocumentFormat, FullTextDocument, ReferenceBuilder,
    ResultType, SearchPage, SearchQuery,
};
use crate::sources::{FullTextSource, ReferenceSource, RemoteServiceError, SourceError};
use crate::utils::{with_retry, HttpClient, RetryConfig};

/// Europe PMC REST API base URL
pub const EUROPE_PMC_BASE_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";

const SERVICE: &str = "europe_pmc";

/// Cursor value requesting the first page
const FIRST_CURSOR: &str = "*";

/// Europe PMC search and full-text client
#[derive(Debug, Clone)]
pub struct EuropePmcClient {
    client: HttpClient,
    base_url: String,
    retry: RetryConfig,
}

impl EuropePmcClient {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: EUROPE_PMC_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Build a client from configuration
    pub fn from_settings(settings: &Settings) -> Result<Self, SourceError> {
        let client = HttpClient::new(settings.europe_pmc.timeout())?;
        Ok(Self::new(client)
            .with_base_url(&settings.europe_pmc.base_url)
            .with_retry(settings.retry.to_retry_config(settings.europe_pmc.timeout())))
    }

    /// Point the client at another deployment (or a test server)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Query parameters for one search page
    fn search_params(query: &SearchQuery) -> Result<Vec<(&'static str, String)>, SourceError> {
        let text = query.validated_query()?;
        Ok(vec![
            ("query", text.to_string()),
            ("format", "json".to_string()),
            ("resultType", query.result_type.as_str().to_string()),
            ("pageSize", query.effective_page_size().to_string()),
            (
                "cursorMark",
                query.cursor.clone().unwrap_or_else(|| FIRST_CURSOR.to_string()),
            ),
        ])
    }

    /// Query string that finds exactly one article by identifier
    fn lookup_query(id: &ArticleId) -> String {
        match id {
            ArticleId::Pmid(pmid) => format!("ext_id:{} src:med", pmid),
            ArticleId::Doi(doi) => format!("DOI:\"{}\"", doi),
            ArticleId::Pmcid(pmcid) => {
                let unversioned = pmcid.split('.').next().unwrap_or(pmcid);
                format!("PMCID:{}", unversioned)
            }
        }
    }

    /// GET a URL and return the body, retrying transient failures
    async fn get_text(&self, url: &str, params: &[(&str, String)]) -> Result<String, SourceError> {
        let client = &self.client;
        tracing::debug!("Europe PMC request: {} {:?}", url, params);

        with_retry(self.retry, SERVICE, move || async move {
            let response = client.send(SERVICE, client.get(url).query(params)).await?;
            response
                .text()
                .await
                .map_err(|e| SourceError::from(RemoteServiceError::from_reqwest(SERVICE, &e)))
        })
        .await
    }

    /// Download the JATS XML of a PMC article; `None` if Europe PMC does not host it
    pub async fn full_text_xml(&self, pmcid: &str) -> Result<Option<String>, SourceError> {
        let url = format!("{}/{}/fullTextXML", self.base_url, urlencoding::encode(pmcid));

        match self.get_text(&url, &[]).await {
            Ok(body) if body.trim().is_empty() => Ok(None),
            Ok(body) => {
                if !body.trim_start().starts_with('<') {
                    return Err(RemoteServiceError::malformed(
                        SERVICE,
                        format!("full text for {} is not XML", pmcid),
                    )
                    .into());
                }
                Ok(Some(body))
            }
            Err(err) if err.status() == Some(404) => {
                tracing::debug!("Europe PMC has no full text for {}", pmcid);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ReferenceSource for EuropePmcClient {
    fn id(&self) -> &str {
        SERVICE
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        let params = Self::search_params(query)?;
        let url = format!("{}/search", self.base_url);
        let body = self.get_text(&url, &params).await?;

        let response: SearchResponse = serde_json::from_str(&body).map_err(|e| {
            RemoteServiceError::malformed(SERVICE, format!("failed to parse search response: {}", e))
        })?;

        let sent_cursor = query.cursor.as_deref().unwrap_or(FIRST_CURSOR);
        let next_cursor = response.next_cursor();
        let references: Vec<ArticleReference> = response
            .result_list
            .result
            .into_iter()
            .filter_map(ResultItem::into_reference)
            .collect();

        // The last page repeats the cursor it was requested with
        let next_cursor = next_cursor.filter(|next| next != sent_cursor && !references.is_empty());

        tracing::debug!(
            "Europe PMC returned {} references (hits: {:?}, more: {})",
            references.len(),
            response.hit_count,
            next_cursor.is_some()
        );

        let mut page = SearchPage::new(references).next_cursor(next_cursor);
        if let Some(total) = response.hit_count {
            page = page.total_hits(total);
        }
        Ok(page)
    }

    async fn lookup(&self, id: &ArticleId) -> Result<Option<ArticleReference>, SourceError> {
        let query = SearchQuery::new(Self::lookup_query(id))
            .page_size(1)
            .result_type(ResultType::Core);
        let page = self.search(&query).await?;
        Ok(page.references.into_iter().next())
    }
}

#[async_trait]
impl FullTextSource for EuropePmcClient {
    fn id(&self) -> &str {
        SERVICE
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::StructuredMarkup
    }

    fn can_serve(&self, reference: &ArticleReference) -> bool {
        reference.pmcid().is_some()
    }

    async fn full_text(
        &self,
        reference: &ArticleReference,
    ) -> Result<Option<FullTextDocument>, SourceError> {
        let Some(pmcid) = reference.pmcid() else {
            return Ok(None);
        };

        let xml = self.full_text_xml(pmcid).await?;
        Ok(xml.map(|xml| {
            FullTextDocument::new(reference.id(), DocumentFormat::StructuredMarkup, xml)
                .with_origin(format!("{}/{}/fullTextXML", self.base_url, pmcid))
        }))
    }
}

/// Search response envelope.
///
/// Both pagination fields are absent on the last page.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SearchResponse {
    hit_count: Option<u64>,
    next_cursor_mark: Option<String>,
    next_page_url: Option<String>,
    result_list: ResultList,
}

impl SearchResponse {
    /// Cursor for the next page, falling back to the one embedded in `nextPageUrl`
    fn next_cursor(&self) -> Option<String> {
        if let Some(cursor) = self.next_cursor_mark.as_deref().filter(|c| !c.is_empty()) {
            return Some(cursor.to_string());
        }

        let url = self.next_page_url.as_deref()?;
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "cursorMark")
            .and_then(|(_, value)| urlencoding::decode(value).ok())
            .map(|value| value.into_owned())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResultList {
    result: Vec<ResultItem>,
}

/// Individual search result
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ResultItem {
    id: Option<String>,
    source: Option<String>,
    pmid: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    author_string: Option<String>,
    author_list: Option<AuthorList>,
    journal_info: Option<JournalInfo>,
    journal_title: Option<String>,
    pub_year: Option<String>,
    first_publication_date: Option<String>,
    abstract_text: Option<String>,
    keyword_list: Option<KeywordList>,
    is_open_access: Option<String>,
    #[serde(rename = "inEPMC")]
    in_epmc: Option<String>,
    #[serde(rename = "hasPDF")]
    has_pdf: Option<String>,
    full_text_id_list: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorList {
    author: Vec<Author>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Author {
    full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JournalInfo {
    journal: Option<Journal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Journal {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeywordList {
    keyword: Vec<String>,
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref() == Some("Y")
}

impl ResultItem {
    fn availability(&self) -> Availability {
        let mut availability = Availability::empty();
        if flag(&self.in_epmc) {
            availability |= Availability::FULL_TEXT;
        }
        if self.full_text_id_list.is_some() {
            availability |= Availability::TABLE_OF_CONTENTS;
        }
        if flag(&self.is_open_access) {
            availability |= Availability::OPEN_ACCESS;
        }
        if flag(&self.has_pdf) {
            availability |= Availability::PDF;
        }
        availability
    }

    fn published(&self) -> Option<NaiveDate> {
        self.first_publication_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .or_else(|| {
                self.pub_year
                    .as_deref()
                    .and_then(|y| y.trim().parse::<i32>().ok())
                    .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
            })
    }

    fn authors(&self) -> Vec<String> {
        let listed: Vec<String> = self
            .author_list
            .iter()
            .flat_map(|list| list.author.iter())
            .filter_map(|a| a.full_name.clone())
            .collect();
        if !listed.is_empty() {
            return listed;
        }

        self.author_string
            .as_deref()
            .unwrap_or_default()
            .split(", ")
            .map(|name| name.trim().trim_end_matches('.').to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Convert to a reference; records without any identifier are dropped
    fn into_reference(self) -> Option<ArticleReference> {
        let id = match (&self.source, &self.id) {
            (Some(source), Some(id)) => format!("{}:{}", source, id),
            _ => self
                .pmid
                .clone()
                .or_else(|| self.pmcid.clone())
                .or_else(|| self.doi.clone())?,
        };

        let availability = self.availability();
        let published = self.published();
        let authors = self.authors();
        let venue = self
            .journal_info
            .as_ref()
            .and_then(|info| info.journal.as_ref())
            .and_then(|journal| journal.title.clone())
            .or(self.journal_title)
            .unwrap_or_default();

        let mut builder = ReferenceBuilder::new(id, self.title.unwrap_or_default())
            .authors(authors)
            .venue(venue)
            .availability(availability)
            .pmid(self.pmid.unwrap_or_default())
            .pmcid(self.pmcid.unwrap_or_default())
            .doi(self.doi.unwrap_or_default())
            .abstract_text(self.abstract_text.unwrap_or_default())
            .keywords(self.keyword_list.map(|k| k.keyword).unwrap_or_default());
        if let Some(date) = published {
            builder = builder.published(date);
        }
        Some(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORE_RESULT: &str = r#"{
        "hitCount": 2,
        "nextCursorMark": "AoIIP+3x/Q==",
        "resultList": {"result": [{
            "id": "35468954",
            "source": "MED",
            "pmid": "35468954",
            "pmcid": "PMC9276953",
            "doi": "10.1038/s41587-022-01278-2",
            "title": "StayGold: a highly photostable green fluorescent protein.",
            "authorString": "Hirano M, Ando R, Shimozono S.",
            "authorList": {"author": [{"fullName": "Hirano M"}, {"fullName": "Ando R"}]},
            "journalInfo": {"journal": {"title": "Nature biotechnology"}},
            "pubYear": "2022",
            "firstPublicationDate": "2022-04-25",
            "abstractText": "A green fluorescent protein...",
            "keywordList": {"keyword": ["GFP", "photostability"]},
            "isOpenAccess": "N",
            "inEPMC": "Y",
            "hasPDF": "Y",
            "fullTextIdList": {"fullTextId": ["PMC9276953"]}
        }]}
    }"#;

    #[test]
    fn test_search_params() {
        let query = SearchQuery::new(" GFP AND photostable ").page_size(5000);
        let params = EuropePmcClient::search_params(&query).unwrap();

        assert!(params.contains(&("query", "GFP AND photostable".to_string())));
        assert!(params.contains(&("pageSize", "1000".to_string())));
        assert!(params.contains(&("cursorMark", "*".to_string())));
        assert!(params.contains(&("resultType", "core".to_string())));
    }

    #[test]
    fn test_blank_query_rejected_before_request() {
        let err = EuropePmcClient::search_params(&SearchQuery::new("  ")).unwrap_err();
        assert!(matches!(err, SourceError::InvalidInput(_)));
    }

    #[test]
    fn test_lookup_queries() {
        assert_eq!(
            EuropePmcClient::lookup_query(&ArticleId::Pmid("35468954".into())),
            "ext_id:35468954 src:med"
        );
        assert_eq!(
            EuropePmcClient::lookup_query(&ArticleId::Doi("10.1/x".into())),
            "DOI:\"10.1/x\""
        );
        assert_eq!(
            EuropePmcClient::lookup_query(&ArticleId::Pmcid("PMC123.2".into())),
            "PMCID:PMC123"
        );
    }

    #[test]
    fn test_parse_core_result() {
        let response: SearchResponse = serde_json::from_str(CORE_RESULT).unwrap();
        assert_eq!(response.next_cursor().as_deref(), Some("AoIIP+3x/Q=="));

        let item = response.result_list.result.into_iter().next().unwrap();
        let reference = item.into_reference().unwrap();

        assert_eq!(reference.id(), "MED:35468954");
        assert_eq!(reference.authors(), ["Hirano M", "Ando R"]);
        assert_eq!(reference.venue(), Some("Nature biotechnology"));
        assert_eq!(reference.published(), NaiveDate::from_ymd_opt(2022, 4, 25));
        assert_eq!(reference.keywords(), ["GFP", "photostability"]);
        assert_eq!(
            reference.availability(),
            Availability::FULL_TEXT | Availability::TABLE_OF_CONTENTS | Availability::PDF
        );
    }

    #[test]
    fn test_lite_result_falls_back_to_author_string_and_year() {
        let item: ResultItem = serde_json::from_str(
            r#"{"id": "PPR1", "source": "PPR", "title": "mCherry variants",
                "authorString": "Shaner NC, Tsien RY.", "journalTitle": "bioRxiv",
                "pubYear": "2004"}"#,
        )
        .unwrap();
        let reference = item.into_reference().unwrap();

        assert_eq!(reference.authors(), ["Shaner NC", "Tsien RY"]);
        assert_eq!(reference.venue(), Some("bioRxiv"));
        assert_eq!(reference.published(), NaiveDate::from_ymd_opt(2004, 1, 1));
        assert!(reference.availability().is_empty());
    }

    #[test]
    fn test_missing_pagination_fields() {
        let response: SearchResponse =
            serde_json::from_str(r#"{"hitCount": 0, "resultList": {"result": []}}"#).unwrap();
        assert_eq!(response.next_cursor(), None);

        let response: SearchResponse = serde_json::from_str(
            r#"{"nextPageUrl": "https://x/search?query=gfp&cursorMark=AoE%2Fabc&pageSize=2"}"#,
        )
        .unwrap();
        assert_eq!(response.next_cursor().as_deref(), Some("AoE/abc"));
    }
}
