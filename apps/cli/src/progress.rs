//! Terminal progress for refresh runs.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use refresh_core::{ArticleOutcome, ArticleReport, RunProgress, Stage};
use refresh_shared::Article;

/// indicatif bar with one tick per finished article.
pub(crate) struct CliProgress {
    bar: ProgressBar,
    current: Mutex<String>,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {elapsed_precise} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            current: Mutex::new(String::new()),
        }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn current_title(&self) -> String {
        self.current
            .lock()
            .map(|title| title.clone())
            .unwrap_or_default()
    }
}

impl RunProgress for CliProgress {
    fn run_started(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn article_started(&self, index: usize, total: usize, article: &Article) {
        if let Ok(mut current) = self.current.lock() {
            *current = article.title.clone();
        }
        self.bar
            .set_message(format!("[{index}/{total}] {}", article.title));
    }

    fn stage(&self, stage: Stage) {
        self.bar
            .set_message(format!("{}: {stage}", self.current_title()));
    }

    fn article_finished(&self, report: &ArticleReport) {
        let marker = match report.outcome {
            ArticleOutcome::Updated => "✓",
            ArticleOutcome::Skipped(_) => "-",
            ArticleOutcome::Errored(_) => "✗",
        };
        self.bar
            .println(format!("  {marker} {}  {}", report.title, report.outcome));
        self.bar.inc(1);
    }

    fn waiting(&self, duration: Duration, reason: &str) {
        self.bar
            .set_message(format!("waiting {}s ({reason})", duration.as_secs()));
    }
}
