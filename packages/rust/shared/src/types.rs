//! Core domain types for stored articles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text::slugify;

// ---------------------------------------------------------------------------
// ArticleId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for article identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub Uuid);

impl ArticleId {
    /// Generate a new time-sortable article identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ArticleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ArticleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// A stored article, either an original or its rewritten counterpart.
///
/// `title` is the natural join key between an original and its rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// `false` for an original, `true` once rewritten.
    pub is_updated: bool,
    /// URLs of the reference pages used for the rewrite. Empty for originals.
    #[serde(default)]
    pub reference_links: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a new article record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub is_updated: bool,
    #[serde(default)]
    pub reference_links: Vec<String>,
}

impl NewArticle {
    /// An ingested original article.
    pub fn original(
        title: impl Into<String>,
        content: impl Into<String>,
        source_url: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source_url,
            is_updated: false,
            reference_links: Vec::new(),
        }
    }

    /// Slug derived from the title.
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }
}

/// Fields written back when an article is updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleUpdate {
    pub content: String,
    pub is_updated: bool,
    pub reference_links: Vec<String>,
}

impl ArticleUpdate {
    /// The update applied after a successful rewrite.
    pub fn rewritten(content: impl Into<String>, reference_links: Vec<String>) -> Self {
        Self {
            content: content.into(),
            is_updated: true,
            reference_links,
        }
    }
}
