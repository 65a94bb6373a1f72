//! Fixed-delay retry loop shared by both sub-probes.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::ProbeError;
use crate::config::ProbeSettings;

/// How many times to try, how long to wait between tries, and how long a
/// single try may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ProbeSettings> for RetryPolicy {
    fn from(settings: &ProbeSettings) -> Self {
        Self {
            max_attempts: settings.max_retry,
            delay: Duration::from_millis(settings.retry_delay_ms),
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// Run `attempt` until it succeeds or the attempts are used up.
    ///
    /// Attempts are strictly sequential; the closure gets the 1-based attempt
    /// number and builds a fresh future each time. The last error is returned
    /// once the budget is exhausted.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Result<T, ProbeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProbeError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut n = 1;
        loop {
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(e) if n >= attempts => {
                    warn!(target_url = %label, attempts, error = %e, "giving up");
                    return Err(e);
                }
                Err(e) => {
                    debug!(target_url = %label, attempt = n, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    n += 1;
                }
            }
        }
    }
}
