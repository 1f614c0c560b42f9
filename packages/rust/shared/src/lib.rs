//! Shared types, error model, and configuration for article-refresh.
//!
//! This crate is the foundation depended on by all other article-refresh crates.
//! It provides:
//! - [`RefreshError`] (the unified error type)
//! - Domain types ([`Article`], [`ArticleId`], [`NewArticle`], [`ArticleUpdate`])
//! - Configuration ([`AppConfig`], per-component runtime configs, config loading)
//! - Text helpers ([`truncate_chars`], [`slugify`])

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendKind, GenerationConfig, GenerationSection, LinkPolicy, PipelineConfig,
    PipelineSection, ScrapeConfig, ScrapeSection, SearchConfig, SearchSection, StorageSection,
    config_dir, config_file_path, init_config, init_config_at, load_config, load_config_from,
    validate_api_keys,
};
pub use error::{RefreshError, Result};
pub use text::{slugify, truncate_chars};
pub use types::{Article, ArticleId, ArticleUpdate, NewArticle};
