#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Progress reporting for long-running pipeline stages.
//!
//! Geocoding batches, edge sampling and route evaluation all report
//! through [`ProgressCallback`] so library code stays independent of the
//! terminal. The CLI renders it with `indicatif`; tests use
//! [`NullProgress`].

use std::sync::Arc;

/// Sink for a pipeline stage's progress.
pub trait ProgressCallback: Send + Sync {
    /// Sets how many units the stage will process.
    fn set_total(&self, total: u64);

    /// Records `delta` more units as done.
    fn inc(&self, delta: u64);

    /// Replaces the status text, e.g. the batch or pair being worked on.
    fn set_message(&self, msg: String);

    /// Ends the stage with a summary line.
    fn finish(&self, msg: String);
}

/// Discards all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
