//! Refresh run orchestration.
//!
//! [`RefreshPipeline`] walks the pending articles one at a time through
//! search, scrape, rewrite and persist, gating every outbound call on a
//! run-scoped [`RateGovernor`].

pub mod governor;
pub mod pipeline;

pub use governor::RateGovernor;
pub use pipeline::{
    ArticleOutcome, ArticleReport, RefreshPipeline, RunProgress, RunReport, SilentProgress,
    SkipReason, Stage,
};
