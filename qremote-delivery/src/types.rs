//! Type definitions shared by the delivery stages

use std::time::Duration;

use serde::Deserialize;

use crate::deadline::DEFAULT_BUDGET;

/// SMTP operation timeout configuration
///
/// Individual protocol steps are bounded by the delivery deadline; these
/// limits only tighten the steps that should fail faster than that.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SmtpTimeouts {
    /// Budget for the whole delivery, from process start
    ///
    /// Default: 240 seconds
    #[serde(default = "default_watchdog_timeout")]
    pub watchdog_secs: u64,

    /// Timeout for one connection attempt: TCP connect, greeting and EHLO
    ///
    /// Default: 10 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for QUIT command
    ///
    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl SmtpTimeouts {
    #[must_use]
    pub const fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            watchdog_secs: default_watchdog_timeout(),
            connect_secs: default_connect_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

const fn default_watchdog_timeout() -> u64 {
    DEFAULT_BUDGET.as_secs()
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_quit_timeout() -> u64 {
    10
}
