//! Reference discovery via web search.
//!
//! [`ReferenceFinder`] issues one search for an article title and keeps the
//! first two result links that look like readable articles. Provider access
//! sits behind the [`WebSearcher`] trait; [`SerpApiSearcher`] is the real one.

mod filter;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use refresh_shared::{RefreshError, Result, SearchConfig};

pub use filter::LinkFilter;

/// How many reference links a finder returns at most.
pub const MAX_REFERENCES: usize = 2;

/// Timeout for a search request.
const SEARCH_TIMEOUT_SECS: u64 = 30;

/// One organic search result. Providers sometimes omit the link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A web search provider.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Results for `query` in the provider's ranking order.
    async fn search(&self, query: &str, result_count: u32) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// SerpApi
// ---------------------------------------------------------------------------

/// Google results through the SerpApi JSON endpoint.
pub struct SerpApiSearcher {
    endpoint: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SearchHit>,
}

impl SerpApiSearcher {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| RefreshError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl WebSearcher for SerpApiSearcher {
    async fn search(&self, query: &str, result_count: u32) -> Result<Vec<SearchHit>> {
        let num = result_count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            // The URL carries the API key, so it stays out of the message.
            .map_err(|e| {
                RefreshError::Network(format!("search request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Network(format!("search API: HTTP {status}")));
        }

        let body: SerpApiResponse = response
            .json()
            .await
            .map_err(|e| {
                RefreshError::parse(format!("invalid search response: {}", e.without_url()))
            })?;

        debug!(results = body.organic_results.len(), "search response parsed");
        Ok(body.organic_results)
    }
}

// ---------------------------------------------------------------------------
// ReferenceFinder
// ---------------------------------------------------------------------------

/// Finds up to [`MAX_REFERENCES`] candidate reference URLs for a query.
#[derive(Clone)]
pub struct ReferenceFinder {
    searcher: Arc<dyn WebSearcher>,
    filter: LinkFilter,
    result_count: u32,
}

impl ReferenceFinder {
    pub fn new(searcher: Arc<dyn WebSearcher>, filter: LinkFilter, result_count: u32) -> Self {
        Self {
            searcher,
            filter,
            result_count,
        }
    }

    pub fn from_config(searcher: Arc<dyn WebSearcher>, config: &SearchConfig) -> Self {
        Self::new(searcher, LinkFilter::from_config(config), config.result_count)
    }

    /// Accepted links in ranking order. Empty on an empty query or any failure.
    #[instrument(skip(self))]
    pub async fn find(&self, query: &str) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let hits = match self.searcher.search(query, self.result_count).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "search failed");
                return Vec::new();
            }
        };

        let links = select_links(&hits, &self.filter);
        info!(found = links.len(), scanned = hits.len(), "reference search complete");
        links
    }
}

/// Walk hits in order, keeping accepted links until [`MAX_REFERENCES`] are found.
fn select_links(hits: &[SearchHit], filter: &LinkFilter) -> Vec<String> {
    let mut links = Vec::with_capacity(MAX_REFERENCES);
    for hit in hits {
        let Some(link) = hit.link.as_deref() else {
            continue;
        };
        if filter.accepts(link) {
            links.push(link.to_string());
        } else {
            debug!(link, title = hit.title.as_deref().unwrap_or(""), "result rejected");
        }
        if links.len() == MAX_REFERENCES {
            break;
        }
    }
    links
}
