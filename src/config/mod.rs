//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables named `FP_EVIDENCE_<SECTION>__<KEY>`.
//!
//! ```toml
//! [europe_pmc]
//! base_url = "https://www.ebi.ac.uk/europepmc/webservices/rest"
//! timeout_secs = 30
//!
//! [unpaywall]
//! email = "curator@example.org"
//!
//! [crossref]
//! mailto = "curator@example.org"
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 500
//!
//! [search]
//! page_size = 25
//! result_type = "core"
//!
//! [ranking]
//! relevance_floor = 0.2
//!
//! [terms]
//! context_radius = 100
//! unit = "characters"
//!
//! [pipeline]
//! max_concurrent = 4
//! call_timeout_secs = 120
//! top_n = 5
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extract::ContextUnit;
use crate::models::{ResultType, DEFAULT_PAGE_SIZE};
use crate::sources::{
    CROSSREF_BASE_URL, EUROPE_PMC_BASE_URL, FPBASE_GRAPHQL_URL, UNPAYWALL_BASE_URL,
};
use crate::utils::RetryConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "FP_EVIDENCE";

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "fp-evidence.toml";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub europe_pmc: EuropePmcSettings,
    pub unpaywall: UnpaywallSettings,
    pub crossref: CrossrefSettings,
    pub fpbase: FpbaseSettings,
    pub retry: RetrySettings,
    pub search: SearchSettings,
    pub ranking: RankingSettings,
    pub terms: TermSettings,
    pub pipeline: PipelineSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EuropePmcSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for EuropePmcSettings {
    fn default() -> Self {
        Self {
            base_url: EUROPE_PMC_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl EuropePmcSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpaywallSettings {
    pub base_url: String,
    /// Contact address required by the API; the source is skipped without one
    pub email: Option<String>,
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for UnpaywallSettings {
    fn default() -> Self {
        Self {
            base_url: UNPAYWALL_BASE_URL.to_string(),
            email: None,
            enabled: true,
            timeout_secs: 60,
        }
    }
}

impl UnpaywallSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Crossref publisher links, the last PDF fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossrefSettings {
    pub base_url: String,
    /// Sent as `mailto` to be routed to Crossref's polite pool
    pub mailto: Option<String>,
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for CrossrefSettings {
    fn default() -> Self {
        Self {
            base_url: CROSSREF_BASE_URL.to_string(),
            mailto: None,
            enabled: true,
            timeout_secs: 60,
        }
    }
}

impl CrossrefSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FpbaseSettings {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for FpbaseSettings {
    fn default() -> Self {
        Self {
            url: FPBASE_GRAPHQL_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl FpbaseSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Retry policy for every remote call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    /// Retry policy whose attempts are each bounded by `attempt_timeout`
    pub fn to_retry_config(&self, attempt_timeout: Duration) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
            backoff_multiplier: if self.backoff_multiplier >= 1.0 {
                self.backoff_multiplier
            } else {
                1.0
            },
            attempt_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Clamped to the accepted range at query time
    pub page_size: usize,
    pub result_type: ResultType,
    /// Pages followed by multi-page search
    pub max_pages: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            result_type: ResultType::Core,
            max_pages: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    /// Candidates scoring below this are dropped
    pub relevance_floor: f64,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            relevance_floor: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermSettings {
    pub context_radius: usize,
    pub unit: ContextUnit,
}

impl Default for TermSettings {
    fn default() -> Self {
        Self {
            context_radius: 100,
            unit: ContextUnit::Characters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Upper bound on concurrent fetch + extract tasks
    pub max_concurrent: usize,
    /// Deadline for one reference's fetch and extraction
    pub call_timeout_secs: u64,
    /// Ranked references processed by evidence collection
    pub top_n: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            call_timeout_secs: 120,
            top_n: 5,
        }
    }
}

impl PipelineSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn build(file: Option<&Path>, env: Environment) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(File::from(path));
    }
    builder.add_source(env).build()?.try_deserialize()
}

/// Load configuration from a file, overlaid by the environment
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    build(Some(path), environment())
}

/// Find a configuration file in the working directory or the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("fp-evidence").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Load configuration from `path`, a discovered file, or the environment alone
pub fn get_config(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => match find_config_file() {
            Some(found) => {
                tracing::info!("Using config file: {}", found.display());
                load_config(&found)
            }
            None => build(None, environment()),
        },
    }
}
