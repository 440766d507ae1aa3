use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fp_evidence::config::{get_config, LogFormat, Settings};
use fp_evidence::extract::{document_text, extract_tables, search_terms, ContextUnit, ContextWindow};
use fp_evidence::mcp::McpServer;
use fp_evidence::models::{ArticleId, ArticleReference, RankedReference, ResultType, SearchPage};
use fp_evidence::pipeline::{EvidenceOutcome, EvidencePipeline, EvidenceReport};
use fp_evidence::sources::{FpbaseClient, FullTextSource};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// fp-evidence - Find literature evidence for fluorescent proteins
#[derive(Parser, Debug)]
#[command(name = "fp-evidence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search, rank and mine full-text articles for protein evidence", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Table if stdout is a terminal, JSON otherwise
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    fn resolve(self) -> Self {
        match self {
            OutputFormat::Auto if std::io::stdout().is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

/// Metadata richness of search results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ResultMode {
    Lite,
    Core,
}

impl From<ResultMode> for ResultType {
    fn from(mode: ResultMode) -> Self {
        match mode {
            ResultMode::Lite => ResultType::Lite,
            ResultMode::Core => ResultType::Core,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search Europe PMC for references
    #[command(alias = "s")]
    Search {
        /// Free-text or boolean query
        query: String,

        /// Cursor returned by a previous search
        #[arg(long)]
        cursor: Option<String>,

        /// References per page (clamped to 1..=1000)
        #[arg(long)]
        page_size: Option<usize>,

        /// Metadata richness
        #[arg(long, value_enum)]
        result_type: Option<ResultMode>,

        /// Follow the cursor for up to this many pages
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Search for a protein and rank the hits by relevance
    Rank {
        /// Protein name
        protein: String,

        /// Search query (defaults to the protein name)
        #[arg(long)]
        query: Option<String>,

        /// Rank references from a JSON file instead of searching
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Fetch the full text of an article
    Fetch {
        /// PMID, PMCID or DOI
        article_id: String,

        /// Write the raw content to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Print the readable text of an article
    Text {
        /// PMID, PMCID or DOI
        article_id: String,
    },

    /// Extract the tables of an article
    Tables {
        /// PMID, PMCID or DOI
        article_id: String,

        /// Print tables as Markdown
        #[arg(long)]
        markdown: bool,
    },

    /// Find terms in an article's full text
    Terms {
        /// PMID, PMCID or DOI
        article_id: String,

        /// Terms to look for
        #[arg(required = true)]
        terms: Vec<String>,

        /// Context kept on each side of a match
        #[arg(long)]
        radius: Option<usize>,

        /// Measure the radius in words instead of characters
        #[arg(long)]
        words: bool,
    },

    /// Search, rank and extract evidence for a protein
    Evidence {
        /// Protein name
        protein: String,

        /// Terms to locate in each article (defaults to the protein name)
        #[arg(long, short)]
        term: Vec<String>,

        /// Number of ranked references to process
        #[arg(long)]
        top: Option<usize>,

        /// Maximum concurrent fetches
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// List the articles FPbase cites for a protein
    #[command(name = "protein-refs")]
    ProteinRefs {
        /// Protein name as known to FPbase
        protein: String,
    },

    /// Run the MCP server
    Serve {
        /// Serve streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,

        /// Port for HTTP mode
        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        /// Host to bind to for HTTP mode
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn init_tracing(cli: &Cli, settings: &Settings) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => settings.logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fp_evidence={}", level)));

    // stdout carries results and the stdio transport, so logs go to stderr
    let json = cli.log_json || settings.logging.format == LogFormat::Json;
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_pipeline(settings: &Settings) -> Result<EvidencePipeline> {
    let pipeline = EvidencePipeline::from_settings(settings)?;
    let order: Vec<&str> = pipeline.fetcher().sources().iter().map(|s| s.id()).collect();
    tracing::debug!("Full-text sources in order: {}", order.join(", "));
    Ok(pipeline)
}

fn parse_id(raw: &str) -> Result<ArticleId> {
    ArticleId::parse(raw).with_context(|| format!("'{}' is not a PMID, PMCID or DOI", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn year(reference: &ArticleReference) -> String {
    reference
        .published()
        .map(|d| d.format("%Y").to_string())
        .unwrap_or_default()
}

fn new_table(header: Vec<&str>) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(header);
    table
}

fn print_page(page: &SearchPage, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(page)?,
        OutputFormat::Plain => {
            for reference in &page.references {
                println!("{} - {} ({})", reference.id(), reference.title(), year(reference));
                if let Some(doi) = reference.doi() {
                    println!("  DOI: {}", doi);
                }
            }
            if let Some(cursor) = &page.next_cursor {
                println!("Next cursor: {}", cursor);
            }
        }
        _ => {
            use comfy_table::{Attribute, Cell};
            let mut table = new_table(vec!["ID", "Title", "Authors", "Year", "Full text"]);
            for reference in &page.references {
                let authors = reference.authors().join(", ");
                table.add_row(vec![
                    Cell::new(reference.id()),
                    Cell::new(truncate(reference.title(), 60)).add_attribute(Attribute::Bold),
                    Cell::new(truncate(&authors, 30)),
                    Cell::new(year(reference)),
                    Cell::new(if reference.may_have_full_text() { "yes" } else { "no" }),
                ]);
            }
            println!("{table}");
            if let Some(total) = page.total_hits {
                println!("{} of {} hits", page.references.len(), total);
            }
            if let Some(cursor) = &page.next_cursor {
                println!("Next cursor: {}", cursor);
            }
        }
    }
    Ok(())
}

fn print_ranked(ranked: &[RankedReference], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&ranked)?,
        OutputFormat::Plain => {
            for r in ranked {
                println!("{:.2} {} - {}", r.score(), r.reference().id(), r.reference().title());
            }
        }
        _ => {
            let mut table = new_table(vec!["Score", "ID", "Title", "Year", "Matched"]);
            for r in ranked {
                let evidence = r.evidence();
                table.add_row(vec![
                    format!("{:.2}", r.score()),
                    r.reference().id().to_string(),
                    truncate(r.reference().title(), 60),
                    year(r.reference()),
                    format!("{:?} {:?} '{}'", evidence.kind, evidence.field, evidence.variant),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn print_evidence(report: &EvidenceReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    let mut table = new_table(vec!["Score", "ID", "Format", "Tables", "Matches", "Notes"]);
    for item in &report.items {
        let (fmt, tables, matches, notes) = match &item.outcome {
            EvidenceOutcome::Collected(e) => (
                e.format.to_string(),
                e.tables.tables.len().to_string(),
                e.terms.matches.len().to_string(),
                (e.tables.diagnostics.len() + e.terms.diagnostics.len()).to_string() + " diagnostics",
            ),
            EvidenceOutcome::Failed { error } => (
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                truncate(&error.to_string(), 50),
            ),
        };
        table.add_row(vec![
            format!("{:.2}", item.reference.score()),
            item.reference.reference().id().to_string(),
            fmt,
            tables,
            matches,
            notes,
        ]);
    }
    println!("{table}");
    println!(
        "{}: {} candidates, {} relevant, {} processed",
        report.protein,
        report.candidates,
        report.relevant,
        report.items.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = get_config(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&cli, &settings);
    let format = cli.output.resolve();

    match cli.command {
        Commands::Search {
            query,
            cursor,
            page_size,
            result_type,
            pages,
        } => {
            let pipeline = build_pipeline(&settings)?;
            let mut search = pipeline.query(query);
            if let Some(size) = page_size {
                search = search.page_size(size);
            }
            if let Some(mode) = result_type {
                search = search.result_type(mode.into());
            }
            if let Some(cursor) = cursor {
                search = search.cursor(cursor);
            }
            let page = pipeline.search_all(&search, pages).await?;
            print_page(&page, format)?;
        }

        Commands::Rank {
            protein,
            query,
            from,
        } => {
            let pipeline = build_pipeline(&settings)?;
            let candidates: Vec<ArticleReference> = match from {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str(&json)?
                }
                None => {
                    let search = pipeline.query(query.unwrap_or_else(|| protein.clone()));
                    pipeline
                        .search_all(&search, settings.search.max_pages)
                        .await?
                        .references
                }
            };
            let ranked = pipeline.rank(&protein, candidates)?;
            print_ranked(&ranked, format)?;
        }

        Commands::Fetch { article_id, save } => {
            let pipeline = build_pipeline(&settings)?;
            let (reference, document) = pipeline.fetch_by_id(&parse_id(&article_id)?).await?;

            if let Some(path) = save {
                std::fs::write(&path, document.content())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!("Saved {} to {}", document.reference_id(), path.display());
            }

            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "reference": reference,
                    "document": document,
                }))?,
                _ => {
                    if let Some(reference) = &reference {
                        println!("{} - {}", reference.id(), reference.title());
                    }
                    println!(
                        "Format: {}  Origin: {}  Size: {} bytes",
                        document.format(),
                        document.origin().unwrap_or("-"),
                        document.content().len()
                    );
                }
            }
        }

        Commands::Text { article_id } => {
            let pipeline = build_pipeline(&settings)?;
            let (_, document) = pipeline.fetch_by_id(&parse_id(&article_id)?).await?;
            let (text, diagnostic) = document_text(&document);
            if let Some(diagnostic) = diagnostic {
                tracing::warn!("{}", diagnostic);
            }
            if document.is_available() {
                println!("{}", text);
            } else {
                eprintln!("No full text available for {}", article_id);
            }
        }

        Commands::Tables {
            article_id,
            markdown,
        } => {
            let pipeline = build_pipeline(&settings)?;
            let (_, document) = pipeline.fetch_by_id(&parse_id(&article_id)?).await?;
            let extraction = extract_tables(&document);

            if format == OutputFormat::Json && !markdown {
                print_json(&extraction)?;
            } else {
                for table in &extraction.tables {
                    if markdown {
                        println!("{}\n", table.to_markdown());
                        continue;
                    }
                    if let Some(title) = table.title() {
                        println!("{}", title);
                    }
                    let mut grid = comfy_table::Table::new();
                    grid.load_preset(comfy_table::presets::UTF8_FULL);
                    if table.header_rows() > 0 {
                        grid.set_header(table.column_headers());
                    }
                    for row in table.body_rows() {
                        grid.add_row(row.clone());
                    }
                    println!("{grid}");
                    if let Some(footnote) = table.footnote() {
                        println!("{}", footnote);
                    }
                    println!();
                }
                for diagnostic in &extraction.diagnostics {
                    eprintln!("warning: {}", diagnostic);
                }
            }
        }

        Commands::Terms {
            article_id,
            terms,
            radius,
            words,
        } => {
            let pipeline = build_pipeline(&settings)?;
            let defaults = pipeline.options().context;
            let window = ContextWindow {
                radius: radius.unwrap_or(defaults.radius),
                unit: if words { ContextUnit::Words } else { defaults.unit },
            };
            let (_, document) = pipeline.fetch_by_id(&parse_id(&article_id)?).await?;
            let search = search_terms(&document, &terms, window);

            match format {
                OutputFormat::Json => print_json(&search)?,
                _ => {
                    for m in &search.matches {
                        println!("[{}] {}: ...{}...", m.offset, m.term, m.context);
                    }
                    for diagnostic in &search.diagnostics {
                        eprintln!("warning: {}", diagnostic);
                    }
                }
            }
        }

        Commands::Evidence {
            protein,
            term,
            top,
            concurrency,
        } => {
            if let Some(top) = top {
                settings.pipeline.top_n = top;
            }
            if let Some(concurrency) = concurrency {
                settings.pipeline.max_concurrent = concurrency;
            }
            let pipeline = build_pipeline(&settings)?;
            let report = pipeline.collect_evidence(&protein, &term).await?;
            print_evidence(&report, format)?;
        }

        Commands::ProteinRefs { protein } => {
            let fpbase = FpbaseClient::from_settings(&settings)?;
            let references = fpbase.references_for(&protein).await?;
            match format {
                OutputFormat::Json => print_json(&references)?,
                _ => {
                    for reference in &references {
                        match reference.article_id() {
                            Some(id) => println!("{}", id),
                            None => println!("(no identifier) {}", reference.proteins.join(", ")),
                        }
                    }
                }
            }
        }

        Commands::Serve { http, port, host } => {
            let pipeline = Arc::new(build_pipeline(&settings)?);
            let fpbase = Arc::new(FpbaseClient::from_settings(&settings)?);
            let server = McpServer::new(pipeline, Some(fpbase))?;

            if http {
                let addr = format!("{}:{}", host, port);
                let (bound_addr, handle) = server.run_http(&addr).await?;
                tracing::info!("MCP server listening on {}", bound_addr);
                handle
                    .await
                    .map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
            } else {
                server.run().await?;
            }
        }
    }

    Ok(())
}
