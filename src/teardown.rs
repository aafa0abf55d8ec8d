//! Best-effort teardown.
//!
//! Release paths (`Partition::close`, snapshot release, staging cleanup) run
//! several independent steps. Every step runs even when an earlier one
//! failed; failures are logged and the first one is handed back to the
//! caller. Normal operations propagate errors with `?` and never use this.

use crate::error::{IndexError, IndexResult};
use tracing::warn;

/// Collects the outcome of independent release steps
#[must_use = "call finish() to surface the first teardown failure"]
pub struct Teardown<'a> {
    scope: &'a str,
    first_failure: Option<IndexError>,
    failures: usize,
}

impl<'a> Teardown<'a> {
    pub fn new(scope: &'a str) -> Self {
        Self {
            scope,
            first_failure: None,
            failures: 0,
        }
    }

    /// Run one release step; a failure is recorded, never short-circuits
    pub fn step<F>(mut self, name: &str, action: F) -> Self
    where
        F: FnOnce() -> IndexResult<()>,
    {
        if let Err(err) = action() {
            warn!(scope = self.scope, step = name, error = %err, "Teardown step failed");
            self.failures += 1;
            if self.first_failure.is_none() {
                self.first_failure = Some(err);
            }
        }
        self
    }

    /// Number of failed steps so far
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Surface the first recorded failure, if any
    pub fn finish(self) -> IndexResult<()> {
        match self.first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
