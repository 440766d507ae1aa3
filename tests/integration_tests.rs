//! Integration tests for the evidence pipeline.
//!
//! Remote services are replaced by the in-memory mock sources so these tests
//! exercise search, ranking, fetching and extraction end to end.

use fp_evidence::extract::{extract_tables, search_terms, ContextWindow};
use fp_evidence::mcp::{McpServer, ToolRegistry};
use fp_evidence::models::{
    ArticleReference, Availability, DiagnosticKind, DocumentFormat, FullTextDocument,
    ReferenceBuilder, SearchPage,
};
use fp_evidence::pipeline::{EvidenceOutcome, EvidencePipeline, FullTextFetcher, PipelineOptions};
use fp_evidence::sources::{MockFullTextSource, MockReferenceSource, RemoteServiceError};
use serde_json::json;
use std::sync::Arc;

const THREE_TABLES: &str = r#"<article>
<body>
  <sec><title>Results</title><p>mStayGold photostability was compared with mEGFP.</p>
  <table-wrap id="t1">
    <label>Table 1</label>
    <caption><p>Spectral properties</p></caption>
    <table>
      <thead><tr><th>Protein</th><th>Ex (nm)</th><th>Em (nm)</th></tr></thead>
      <tbody>
        <tr><td>mStayGold</td><td>497</td><td>504</td></tr>
        <tr><td>mEGFP</td><td>488</td></tr>
      </tbody>
    </table>
    <table-wrap-foot><fn><p>Ex, excitation; Em, emission.</p></fn></table-wrap-foot>
  </table-wrap>
  <table-wrap id="t2">
    <label>Table 2</label>
    <table>
      <tbody>
        <tr><td>broken<td>row</tr>
      </tbody>
    </table>
  </table-wrap>
  <table-wrap id="t3">
    <caption><p>Photobleaching half-times</p></caption>
    <table>
      <tbody><tr><td>mStayGold</td><td>10<sup>3</sup> s</td></tr></tbody>
    </table>
  </table-wrap>
  </sec>
</body>
</article>"#;

fn open_access(id: &str, title: &str) -> ArticleReference {
    ReferenceBuilder::new(id, title)
        .pmcid(format!("PMC{}", id.trim_start_matches("MED:")))
        .availability(Availability::FULL_TEXT | Availability::OPEN_ACCESS)
        .build()
}

#[test]
fn test_broken_table_is_skipped_and_others_survive() {
    let doc = FullTextDocument::new("PMC1", DocumentFormat::StructuredMarkup, THREE_TABLES);

    let extraction = extract_tables(&doc);

    assert_eq!(extraction.tables.len(), 2);
    assert_eq!(extraction.tables[0].index(), 0);
    assert_eq!(extraction.tables[1].index(), 2);
    assert_eq!(extraction.diagnostics.len(), 1);
    assert_eq!(extraction.diagnostics[0].table_index, Some(1));
    assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::MalformedTable);

    let first = &extraction.tables[0];
    assert_eq!(first.title().as_deref(), Some("Table 1: Spectral properties"));
    assert_eq!(first.footnote(), Some("Ex, excitation; Em, emission."));
    assert_eq!(first.rows()[2], ["mEGFP", "488", ""]);

    let third = &extraction.tables[1];
    assert_eq!(third.caption(), Some("Photobleaching half-times"));
    assert_eq!(third.rows()[0], ["mStayGold", "10^3 s"]);
}

#[test]
fn test_every_table_is_rectangular() {
    let doc = FullTextDocument::new("PMC1", DocumentFormat::StructuredMarkup, THREE_TABLES);
    for table in extract_tables(&doc).tables {
        assert!(table.rows().iter().all(|row| row.len() == table.column_count()));
    }
}

#[test]
fn test_unavailable_documents_yield_nothing() {
    let doc = FullTextDocument::unavailable("MED:1");

    assert!(extract_tables(&doc).tables.is_empty());
    for terms in [vec!["GFP"], vec![], vec!["a", "b", "c"]] {
        let search = search_terms(&doc, &terms, ContextWindow::characters(5));
        assert!(search.matches.is_empty());
    }
}

#[test]
fn test_terms_do_not_span_table_cells() {
    let doc = FullTextDocument::new(
        "PMC1",
        DocumentFormat::StructuredMarkup,
        "<table><tr><td>Stay</td><td>Gold</td></tr></table><p>StayGold</p>",
    );
    let search = search_terms(&doc, &["staygold"], ContextWindow::characters(20));
    assert_eq!(search.matches.len(), 1);
    assert_eq!(search.matches[0].element.as_deref(), Some("p"));
}

fn pipeline_with(
    references: MockReferenceSource,
    sources: Vec<Arc<MockFullTextSource>>,
) -> EvidencePipeline {
    let sources = sources
        .into_iter()
        .map(|s| s as Arc<dyn fp_evidence::sources::FullTextSource>)
        .collect();
    EvidencePipeline::new(
        Arc::new(references),
        FullTextFetcher::new(sources),
        PipelineOptions::default(),
    )
}

#[tokio::test]
async fn test_evidence_end_to_end_with_fallback_and_failure() {
    let references = MockReferenceSource::new();
    references.push_page(Ok(SearchPage::new(vec![
        open_access("MED:3", "Oligomeric state of several FPs"),
        open_access("MED:1", "mStayGold: a monomeric StayGold"),
        open_access("MED:2", "Photostability of mStayGold in neurons"),
    ])
    .total_hits(3)));

    let xml = Arc::new(
        MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
            .with_document("MED:1", THREE_TABLES)
            .with_failure(
                "MED:2",
                RemoteServiceError::from_status("xml", 502, "bad gateway").into(),
            ),
    );
    let text = Arc::new(
        MockFullTextSource::new("text", DocumentFormat::PlainText)
            .with_document("MED:2", "We imaged mStayGold for an hour."),
    );
    let pipeline = pipeline_with(references, vec![text.clone(), xml.clone()]);

    let report = pipeline
        .collect_evidence("mStayGold", &["mStayGold".to_string(), "photostability".to_string()])
        .await
        .unwrap();

    assert_eq!(report.candidates, 3);
    assert_eq!(report.relevant, 2);
    assert_eq!(report.total_hits, Some(3));
    let ids: Vec<&str> = report.items.iter().map(|i| i.reference.reference().id()).collect();
    // equal title scores keep search order
    assert_eq!(ids, ["MED:1", "MED:2"]);

    match &report.items[0].outcome {
        EvidenceOutcome::Collected(evidence) => {
            assert_eq!(evidence.format, DocumentFormat::StructuredMarkup);
            assert_eq!(evidence.tables.tables.len(), 2);
            assert_eq!(evidence.tables.diagnostics.len(), 1);
            assert!(evidence.terms.matches.iter().any(|m| m.term == "photostability"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    // markup source failed, plain text rescued it
    match &report.items[1].outcome {
        EvidenceOutcome::Collected(evidence) => {
            assert_eq!(evidence.format, DocumentFormat::PlainText);
            assert_eq!(evidence.origin.as_deref(), Some("text"));
            assert_eq!(evidence.terms.matches.len(), 1);
            assert_eq!(evidence.terms.matches[0].offset, 10);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(xml.calls(), 2);
    assert_eq!(text.calls(), 1);
}

#[tokio::test]
async fn test_fetch_surfaces_error_when_no_source_recovers() {
    let references = MockReferenceSource::new();
    let xml = Arc::new(
        MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup).with_failure(
            "MED:1",
            RemoteServiceError::timeout("xml", "deadline elapsed").into(),
        ),
    );
    let pipeline = pipeline_with(references, vec![xml]);

    let err = pipeline
        .fetch(&open_access("MED:1", "GFP"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_tool_registry_round_trip() {
    let references = MockReferenceSource::new();
    references.add_known(open_access("MED:1", "mStayGold"));
    let xml = Arc::new(
        MockFullTextSource::new("xml", DocumentFormat::StructuredMarkup)
            .with_document("MED:1", THREE_TABLES),
    );
    let registry = ToolRegistry::new(Arc::new(pipeline_with(references, vec![xml])), None);

    let tables = registry
        .execute("extract_tables", json!({ "article_id": "PMC1", "markdown": true }))
        .await
        .unwrap();
    let rendered = tables["tables"].as_array().unwrap();
    assert_eq!(rendered.len(), 2);
    assert!(rendered[0].as_str().unwrap().starts_with("**Table 1: Spectral properties**"));
    assert_eq!(tables["diagnostics"][0]["kind"], "malformed_table");

    let text = registry
        .execute("article_text", json!({ "article_id": "pmc1" }))
        .await
        .unwrap();
    assert_eq!(text["reference_id"], "MED:1");
    assert!(text["text"].as_str().unwrap().starts_with("Results mStayGold photostability"));
}

#[test]
fn test_mcp_server_builds() {
    let pipeline = pipeline_with(MockReferenceSource::new(), Vec::new());
    assert!(McpServer::new(Arc::new(pipeline), None).is_ok());
}
