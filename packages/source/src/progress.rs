//! Progress reporting for multi-site runs.
//!
//! [`ProgressCallback`] keeps batch scraping independent of how progress is
//! drawn. The CLI renders it with an `indicatif` bar; tests and library
//! callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress from a batch run. One unit is one site.
pub trait ProgressCallback: Send + Sync {
    /// Number of sites in the batch.
    fn set_total(&self, total: u64);

    /// Advance by `delta` finished sites.
    fn inc(&self, delta: u64);

    /// Shows the site currently being scraped.
    fn set_message(&self, msg: String);

    /// Completes the bar with a summary line.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
