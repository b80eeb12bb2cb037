//! The delivery watchdog.
//!
//! A [`Deadline`] is fixed when the process starts and handed to every step
//! that can block. Each step runs under `timeout_at`, so a delivery can never
//! outlive its budget, whichever step it is stuck in.

use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::{Instant, timeout_at};

/// Default budget for a whole delivery.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(240);

/// A step did not finish in time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Expired {
    /// The delivery deadline passed.
    #[error("delivery deadline passed during {0}")]
    Deadline(&'static str),

    /// The step's own limit passed while the deadline still had time left.
    #[error("{step} did not complete within {after:?}")]
    Step { step: &'static str, after: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.expires_at
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Run `step` to completion or until the deadline.
    ///
    /// # Errors
    ///
    /// Returns `Expired::Deadline` if the deadline passes first.
    pub async fn run<F: Future>(&self, step: &'static str, future: F) -> Result<F::Output, Expired> {
        timeout_at(self.expires_at, future)
            .await
            .map_err(|_| Expired::Deadline(step))
    }

    /// Run `step` for at most `limit`, and never past the deadline.
    ///
    /// # Errors
    ///
    /// Returns `Expired::Step` if `limit` passes first, `Expired::Deadline`
    /// if the deadline does.
    pub async fn run_within<F: Future>(
        &self,
        limit: Duration,
        step: &'static str,
        future: F,
    ) -> Result<F::Output, Expired> {
        let step_deadline = Instant::now() + limit;
        if step_deadline >= self.expires_at {
            return self.run(step, future).await;
        }

        timeout_at(step_deadline, future)
            .await
            .map_err(|_| Expired::Step { step, after: limit })
    }
}
