//! Outbound page fetching for reference scraping.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use refresh_shared::{RefreshError, Result, ScrapeConfig};

use crate::extract_main_text;

/// Maximum number of redirects to follow for a reference page.
const MAX_REDIRECTS: usize = 5;

/// Fetches raw HTML for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

/// reqwest-backed fetcher with a custom user agent and bounded timeout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| RefreshError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| RefreshError::validation(format!("invalid URL '{url}': {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(RefreshError::validation(format!(
                "only http/https pages can be scraped, got '{}'",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| RefreshError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| RefreshError::Network(format!("{url}: failed to read body: {e}")))
    }
}

/// Fetches a reference page and extracts its main text.
#[derive(Clone)]
pub struct ReferenceScraper {
    fetcher: Arc<dyn PageFetcher>,
}

impl ReferenceScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Main text of the page at `url`, or "" if it could not be fetched
    /// or held nothing readable. Never fails.
    #[instrument(skip(self))]
    pub async fn scrape(&self, url: &str) -> String {
        if url.trim().is_empty() {
            return String::new();
        }

        match self.fetcher.fetch_html(url).await {
            Ok(html) => {
                let text = extract_main_text(&html);
                debug!(chars = text.chars().count(), "reference extracted");
                text
            }
            Err(e) => {
                warn!(error = %e, "failed to scrape reference");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scraper() -> ReferenceScraper {
        let config = ScrapeConfig {
            timeout: Duration::from_secs(2),
            user_agent: "TestAgent/1.0".into(),
        };
        ReferenceScraper::new(Arc::new(HttpFetcher::new(&config).unwrap()))
    }

    #[tokio::test]
    async fn scrape_extracts_article_text_with_user_agent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/blog/post"))
            .and(header("user-agent", "TestAgent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><nav>Menu</nav><article>Reference body text.</article></body></html>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let text = scraper().scrape(&format!("{}/blog/post", server.uri())).await;
        assert_eq!(text, "Reference body text.");
    }

    #[tokio::test]
    async fn http_error_yields_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let text = scraper().scrape(&format!("{}/missing", server.uri())).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn slow_page_times_out_to_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<article>late</article>")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let text = scraper().scrape(&format!("{}/slow", server.uri())).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let config = ScrapeConfig::default();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let err = fetcher.fetch_html("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("http/https"));
    }

    #[tokio::test]
    async fn empty_url_short_circuits() {
        assert!(scraper().scrape("  ").await.is_empty());
    }
}
