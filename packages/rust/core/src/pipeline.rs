//! One refresh run: pending → search → scrape → rewrite → persist.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::{Instant, sleep};
use tracing::{error, info, instrument, warn};

use refresh_extract::{HttpFetcher, ReferenceScraper};
use refresh_llm::{RewriteOutcome, RewriteRequester};
use refresh_search::{ReferenceFinder, SerpApiSearcher};
use refresh_shared::{
    AppConfig, Article, ArticleId, ArticleUpdate, PipelineConfig, Result, ScrapeConfig,
};
use refresh_storage::ArticleStore;

use crate::governor::RateGovernor;

/// References a rewrite needs, both as links and as scraped texts.
const REQUIRED_REFERENCES: usize = refresh_llm::MIN_REFERENCES;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an article was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotEnoughReferences,
    ScrapeFailed,
    RewriteFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotEnoughReferences => "not enough references",
            Self::ScrapeFailed => "could not scrape references",
            Self::RewriteFailed => "rewrite failed",
        })
    }
}

/// Terminal state of one article in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleOutcome {
    Updated,
    Skipped(SkipReason),
    Errored(String),
}

impl ArticleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Skipped(_) => "skipped",
            Self::Errored(_) => "errored",
        }
    }
}

impl fmt::Display for ArticleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated => f.write_str("updated"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Errored(message) => write!(f, "errored ({message})"),
        }
    }
}

/// Per-article line of a [`RunReport`].
#[derive(Debug, Clone)]
pub struct ArticleReport {
    pub id: ArticleId,
    pub title: String,
    pub outcome: ArticleOutcome,
    /// Links that fed the rewrite, or the links found before a skip.
    pub reference_links: Vec<String>,
}

/// Result of [`RefreshPipeline::run`]. One entry per pending article, in order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<ArticleReport>,
    pub elapsed: Duration,
    /// Nothing was written; `Updated` means "would update".
    pub dry_run: bool,
}

impl RunReport {
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, ArticleOutcome::Updated))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ArticleOutcome::Skipped(_)))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, ArticleOutcome::Errored(_)))
    }

    fn count(&self, pred: impl Fn(&ArticleOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|r| pred(&r.outcome)).count()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Stage an article is in while being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Searching,
    Scraping,
    Rewriting,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Searching => "searching references",
            Self::Scraping => "scraping references",
            Self::Rewriting => "rewriting",
            Self::Persisting => "saving",
        })
    }
}

/// Progress callback for reporting run status.
pub trait RunProgress: Send + Sync {
    /// Called once with the number of articles that will be processed.
    fn run_started(&self, total: usize);
    /// Called before the first stage of an article. `index` is 1-based.
    fn article_started(&self, index: usize, total: usize, article: &Article);
    fn stage(&self, stage: Stage);
    fn article_finished(&self, report: &ArticleReport);
    /// Called while the run sleeps between articles or after a rate limit.
    fn waiting(&self, duration: Duration, reason: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl RunProgress for SilentProgress {
    fn run_started(&self, _total: usize) {}
    fn article_started(&self, _index: usize, _total: usize, _article: &Article) {}
    fn stage(&self, _stage: Stage) {}
    fn article_finished(&self, _report: &ArticleReport) {}
    fn waiting(&self, _duration: Duration, _reason: &str) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Drives refresh runs over the pending articles of a store.
pub struct RefreshPipeline {
    store: Arc<dyn ArticleStore>,
    finder: ReferenceFinder,
    scraper: ReferenceScraper,
    requester: RewriteRequester,
    config: PipelineConfig,
}

/// What processing one article produced, before reporting.
struct Processed {
    outcome: ArticleOutcome,
    links: Vec<String>,
    /// The provider refused the rewrite; cool down before the next article.
    provider_refused: bool,
}

impl Processed {
    fn skipped(reason: SkipReason, links: Vec<String>) -> Self {
        Self {
            outcome: ArticleOutcome::Skipped(reason),
            links,
            provider_refused: false,
        }
    }

    fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self {
            outcome: ArticleOutcome::Errored(format!("panicked: {message}")),
            links: Vec::new(),
            provider_refused: false,
        }
    }
}

impl RefreshPipeline {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        finder: ReferenceFinder,
        scraper: ReferenceScraper,
        requester: RewriteRequester,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            finder,
            scraper,
            requester,
            config,
        }
    }

    /// Wire the production components from the resolved configuration.
    ///
    /// Fails when an API key is missing or an HTTP client cannot be built.
    pub fn from_app_config(
        store: Arc<dyn ArticleStore>,
        app: &AppConfig,
        config: PipelineConfig,
    ) -> Result<Self> {
        let search = app.search_config()?;
        let generation = app.generation_config()?;

        let finder =
            ReferenceFinder::from_config(Arc::new(SerpApiSearcher::new(&search)?), &search);
        let scraper =
            ReferenceScraper::new(Arc::new(HttpFetcher::new(&ScrapeConfig::from(&app.scrape))?));
        let requester =
            RewriteRequester::from_config(refresh_llm::build_backend(&generation)?, &generation);

        info!(
            backend = %generation.backend,
            model = %generation.model,
            rpm = config.requests_per_minute,
            "pipeline configured"
        );
        Ok(Self::new(store, finder, scraper, requester, config))
    }

    /// Process every pending article once, sequentially.
    ///
    /// Fails only when the pending set cannot be read. Per-article failures
    /// are recorded in the report and the run moves on.
    #[instrument(skip_all, fields(dry_run = self.config.dry_run, rpm = self.config.requests_per_minute))]
    pub async fn run(&self, progress: &dyn RunProgress) -> Result<RunReport> {
        let start = Instant::now();

        let mut pending = self.store.list_pending().await?;
        if let Some(limit) = self.config.limit {
            pending.truncate(limit);
        }

        let mut report = RunReport {
            dry_run: self.config.dry_run,
            ..RunReport::default()
        };

        if pending.is_empty() {
            info!("no pending articles");
            return Ok(report);
        }

        let total = pending.len();
        info!(total, "starting refresh run");
        progress.run_started(total);

        let mut governor = RateGovernor::new(self.config.requests_per_minute);

        for (i, article) in pending.iter().enumerate() {
            progress.article_started(i + 1, total, article);

            let processed = AssertUnwindSafe(self.process(article, &mut governor, progress))
                .catch_unwind()
                .await
                .unwrap_or_else(Processed::panicked);
            let entry = ArticleReport {
                id: article.id.clone(),
                title: article.title.clone(),
                outcome: processed.outcome,
                reference_links: processed.links,
            };

            match &entry.outcome {
                ArticleOutcome::Errored(message) => error!(
                    article_id = %entry.id,
                    title = %entry.title,
                    outcome = entry.outcome.label(),
                    error = %message,
                    "article failed"
                ),
                outcome => info!(
                    article_id = %entry.id,
                    title = %entry.title,
                    outcome = outcome.label(),
                    detail = %outcome,
                    "article processed"
                ),
            }
            progress.article_finished(&entry);
            report.outcomes.push(entry);

            if i + 1 == total {
                break;
            }
            if processed.provider_refused {
                warn!(
                    cooldown_secs = self.config.rate_limit_cooldown.as_secs(),
                    "generation provider refused, cooling down"
                );
                self.pause(self.config.rate_limit_cooldown, "provider cooldown", progress)
                    .await;
            }
            self.pause(self.config.article_delay, "between articles", progress)
                .await;
        }

        report.elapsed = start.elapsed();
        info!(
            total,
            updated = report.updated(),
            skipped = report.skipped(),
            errored = report.errored(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "refresh run complete"
        );

        Ok(report)
    }

    #[instrument(skip_all, fields(article_id = %article.id, title = %article.title))]
    async fn process(
        &self,
        article: &Article,
        governor: &mut RateGovernor,
        progress: &dyn RunProgress,
    ) -> Processed {
        // --- Searching ---
        progress.stage(Stage::Searching);
        governor.admit().await;
        let links = self.finder.find(&article.title).await;
        if links.len() < REQUIRED_REFERENCES {
            return Processed::skipped(SkipReason::NotEnoughReferences, links);
        }

        // --- Scraping ---
        progress.stage(Stage::Scraping);
        let mut texts = Vec::with_capacity(links.len());
        for link in &links {
            governor.admit().await;
            let text = self.scraper.scrape(link).await;
            if !text.is_empty() {
                texts.push(text);
            }
        }
        if texts.len() < REQUIRED_REFERENCES {
            return Processed::skipped(SkipReason::ScrapeFailed, links);
        }

        // --- Rewriting ---
        progress.stage(Stage::Rewriting);
        governor.admit().await;
        let content = match self.requester.rewrite(&article.content, &texts).await {
            RewriteOutcome::Rewritten(content) => content,
            other => {
                if let RewriteOutcome::Failed(e) = &other {
                    if e.is_auth_failure() {
                        error!(error = %e, "generation provider rejected credentials");
                    }
                }
                return Processed {
                    provider_refused: other.is_provider_refusal(),
                    ..Processed::skipped(SkipReason::RewriteFailed, links)
                };
            }
        };

        // --- Persisting ---
        progress.stage(Stage::Persisting);
        let outcome = if self.config.dry_run {
            info!(chars = content.chars().count(), "dry run, not saving rewrite");
            ArticleOutcome::Updated
        } else {
            match self
                .store
                .update(&article.id, ArticleUpdate::rewritten(content, links.clone()))
                .await
            {
                Ok(()) => ArticleOutcome::Updated,
                Err(e) => ArticleOutcome::Errored(e.to_string()),
            }
        };

        Processed {
            outcome,
            links,
            provider_refused: false,
        }
    }

    async fn pause(&self, duration: Duration, reason: &str, progress: &dyn RunProgress) {
        if duration.is_zero() {
            return;
        }
        progress.waiting(duration, reason);
        sleep(duration).await;
    }
}
