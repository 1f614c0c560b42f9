//! Application configuration for article-refresh.
//!
//! User config lives at `~/.article-refresh/article-refresh.toml`.
//! CLI flags override config file values, which override defaults.
//! Provider credentials are never stored in the file; it only names the
//! environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RefreshError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "article-refresh.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".article-refresh";

// ---------------------------------------------------------------------------
// Enumerations shared by config and the component crates
// ---------------------------------------------------------------------------

/// Which generation provider handles rewrite requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Groq => "groq",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemma-3-27b-it",
            Self::OpenAi => "gpt-4o-mini",
            Self::Groq => "llama-3.3-70b-versatile",
        }
    }

    pub fn default_temperature(&self) -> f32 {
        match self {
            Self::Gemini => 0.7,
            Self::OpenAi => 0.4,
            Self::Groq => 0.5,
        }
    }

    pub fn default_max_output_tokens(&self) -> Option<u32> {
        match self {
            Self::Gemini => Some(2000),
            Self::OpenAi | Self::Groq => None,
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAi => "LLM_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = RefreshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            other => Err(RefreshError::config(format!(
                "unknown generation backend '{other}' (expected gemini, openai, or groq)"
            ))),
        }
    }
}

/// Which search results count as usable reference articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPolicy {
    /// Reject document downloads and known non-article domains.
    #[default]
    ExcludeNonArticle,
    /// Only accept links whose URL mentions "blog" or "article".
    ArticlePathOnly,
}

// ---------------------------------------------------------------------------
// Config structs (matching article-refresh.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub search: SearchSection,

    #[serde(default)]
    pub generation: GenerationSection,

    #[serde(default)]
    pub scrape: ScrapeSection,

    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Path to the libSQL database file. A leading `~/` expands to the home dir.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.article-refresh/articles.db".into()
}

impl StorageSection {
    /// The database path with `~/` expanded.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.db_path)
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Search endpoint (SerpApi JSON API).
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Result page size requested from the provider.
    #[serde(default = "default_result_count")]
    pub result_count: u32,

    #[serde(default)]
    pub link_policy: LinkPolicy,

    /// Hosts whose results are never used as references.
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,

    /// Path suffixes that mark non-HTML documents.
    #[serde(default = "default_blocked_extensions")]
    pub blocked_extensions: Vec<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
            result_count: default_result_count(),
            link_policy: LinkPolicy::default(),
            blocked_domains: default_blocked_domains(),
            blocked_extensions: default_blocked_extensions(),
        }
    }
}

fn default_search_key_env() -> String {
    "SEARCH_API_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://serpapi.com/search.json".into()
}
fn default_result_count() -> u32 {
    10
}
fn default_blocked_domains() -> Vec<String> {
    [
        "facebook.com",
        "instagram.com",
        "twitter.com",
        "x.com",
        "linkedin.com",
        "tiktok.com",
        "pinterest.com",
        "youtube.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_blocked_extensions() -> Vec<String> {
    [".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[generation]` section. Unset fields fall back to the backend's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl GenerationSection {
    /// Env var holding the key for the selected backend.
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.backend.default_api_key_env())
    }
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSection {
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Sent on every page fetch; some sites block default client agents.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_scrape_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; ArticleRefreshBot/1.0)".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Outbound calls admitted per rolling 60-second window.
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,

    /// Pause after every article, independent of the rate governor.
    #[serde(default = "default_article_delay")]
    pub article_delay_secs: u64,

    /// Extra pause after the rewrite stage reports a rate limit.
    #[serde(default = "default_cooldown")]
    pub rate_limit_cooldown_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rpm(),
            article_delay_secs: default_article_delay(),
            rate_limit_cooldown_secs: default_cooldown(),
        }
    }
}

fn default_rpm() -> u32 {
    15
}
fn default_article_delay() -> u64 {
    10
}
fn default_cooldown() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Runtime configs (resolved from file + env, passed into constructors)
// ---------------------------------------------------------------------------

/// Resolved search provider settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub result_count: u32,
    pub link_policy: LinkPolicy,
    pub blocked_domains: Vec<String>,
    pub blocked_extensions: Vec<String>,
}

/// Resolved generation provider settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub backend: BackendKind,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub endpoint: String,
}

/// Page fetch settings.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self::from(&ScrapeSection::default())
    }
}

impl From<&ScrapeSection> for ScrapeConfig {
    fn from(section: &ScrapeSection) -> Self {
        Self {
            timeout: Duration::from_secs(section.timeout_secs),
            user_agent: section.user_agent.clone(),
        }
    }
}

/// Orchestrator settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub requests_per_minute: u32,
    pub article_delay: Duration,
    pub rate_limit_cooldown: Duration,
    /// Process at most this many pending articles.
    pub limit: Option<usize>,
    /// Run every stage except persisting.
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&PipelineSection::default())
    }
}

impl From<&PipelineSection> for PipelineConfig {
    fn from(section: &PipelineSection) -> Self {
        Self {
            requests_per_minute: section.requests_per_minute,
            article_delay: Duration::from_secs(section.article_delay_secs),
            rate_limit_cooldown: Duration::from_secs(section.rate_limit_cooldown_secs),
            limit: None,
            dry_run: false,
        }
    }
}

impl AppConfig {
    /// Check values that serde defaults cannot guard.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.requests_per_minute == 0 {
            return Err(RefreshError::config(
                "pipeline.requests_per_minute must be at least 1",
            ));
        }
        if self.search.result_count == 0 {
            return Err(RefreshError::config("search.result_count must be at least 1"));
        }
        Url::parse(&self.search.endpoint).map_err(|e| {
            RefreshError::config(format!(
                "invalid search.endpoint '{}': {e}",
                self.search.endpoint
            ))
        })?;
        if let Some(endpoint) = &self.generation.endpoint {
            Url::parse(endpoint).map_err(|e| {
                RefreshError::config(format!("invalid generation.endpoint '{endpoint}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Resolve search settings, reading the API key from the environment.
    pub fn search_config(&self) -> Result<SearchConfig> {
        let section = &self.search;
        Ok(SearchConfig {
            endpoint: section.endpoint.clone(),
            api_key: read_api_key(&section.api_key_env, "search")?,
            result_count: section.result_count,
            link_policy: section.link_policy,
            blocked_domains: section.blocked_domains.clone(),
            blocked_extensions: section.blocked_extensions.clone(),
        })
    }

    /// Resolve generation settings, reading the API key from the environment.
    pub fn generation_config(&self) -> Result<GenerationConfig> {
        let section = &self.generation;
        let backend = section.backend;
        Ok(GenerationConfig {
            backend,
            api_key: read_api_key(section.api_key_env(), backend.as_str())?,
            model: section
                .model
                .clone()
                .unwrap_or_else(|| backend.default_model().into()),
            temperature: section
                .temperature
                .unwrap_or_else(|| backend.default_temperature()),
            max_output_tokens: section
                .max_output_tokens
                .or_else(|| backend.default_max_output_tokens()),
            endpoint: section
                .endpoint
                .clone()
                .unwrap_or_else(|| backend.default_endpoint().into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.article-refresh/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RefreshError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.article-refresh/article-refresh.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RefreshError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        RefreshError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RefreshError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RefreshError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| RefreshError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

/// Check that both provider API key env vars are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    read_api_key(&config.search.api_key_env, "search")?;
    read_api_key(
        config.generation.api_key_env(),
        config.generation.backend.as_str(),
    )?;
    Ok(())
}

fn read_api_key(var_name: &str, provider: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(RefreshError::config(format!(
            "{provider} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| RefreshError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
