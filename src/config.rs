//! Adapter configuration
//!
//! [`ApiConfig`] is a builder in the style of the crate's other
//! configuration types: start from [`ApiConfig::new()`] and chain setters.
//!
//! ```
//! use lisrs::{ApiConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let config = ApiConfig::new()
//!     .retry(RetryPolicy::new(Duration::from_millis(500)).max_retries(30))
//!     .read_buffer_size(256 * 1024);
//! assert_eq!(config.retry_policy().max_retries, Some(30));
//! ```

use crate::logging::{LogSink, TracingSink};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable controlling libinsane's BMP-to-raw normalizer.
pub const NORMALIZER_BMP2RAW_ENV: &str = "LIBINSANE_NORMALIZER_BMP2RAW";

/// Size of the buffer handed to each `scan_read()` call.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// How long to wait for a warming-up scanner, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between two reads while the device reports warm-up.
    pub interval: Duration,
    /// `None` retries until the device is ready.
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn new(interval: Duration) -> Self {
        RetryPolicy {
            interval,
            max_retries: None,
        }
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    pub(crate) fn allows(&self, attempts: u32) -> bool {
        self.max_retries.map_or(true, |max| attempts < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(Duration::from_secs(1))
    }
}

/// Blocks the calling thread between warm-up retries.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Configuration shared by an [`Api`](crate::Api) and every handle it hands out.
#[derive(Clone)]
pub struct ApiConfig {
    disable_raw_normalization: bool,
    env: Vec<(String, String)>,
    retry: RetryPolicy,
    log_sink: Arc<dyn LogSink>,
    sleeper: Arc<dyn Sleeper>,
    read_buffer_size: usize,
}

impl ApiConfig {
    pub fn new() -> Self {
        ApiConfig {
            disable_raw_normalization: true,
            env: Vec::new(),
            retry: RetryPolicy::default(),
            log_sink: Arc::new(TracingSink),
            sleeper: Arc::new(ThreadSleeper),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Turn libinsane's BMP-to-raw normalizer off (the default) so that
    /// black & white and grayscale scans come back as BMP data.
    pub fn disable_raw_normalization(mut self, disable: bool) -> Self {
        self.disable_raw_normalization = disable;
        self
    }

    /// Extra environment toggle applied before the library is initialized.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub(crate) fn sink(&self) -> &dyn LogSink {
        self.log_sink.as_ref()
    }

    pub(crate) fn shared_sink(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.log_sink)
    }

    pub(crate) fn sleeper_ref(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Environment variables to set before the library starts, in order.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut vars = Vec::with_capacity(self.env.len() + 1);
        if self.disable_raw_normalization {
            vars.push((NORMALIZER_BMP2RAW_ENV.to_string(), "0".to_string()));
        }
        vars.extend(self.env.iter().cloned());
        vars
    }

    // The library reads these once at init; they cannot be changed later
    // in the same process.
    pub(crate) fn apply_environment(&self) {
        for (key, value) in self.environment() {
            std::env::set_var(key, value);
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("disable_raw_normalization", &self.disable_raw_normalization)
            .field("env", &self.env)
            .field("retry", &self.retry)
            .field("read_buffer_size", &self.read_buffer_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_libinsane_tools() {
        let config = ApiConfig::new();
        assert_eq!(config.retry_policy().interval, Duration::from_secs(1));
        assert_eq!(config.retry_policy().max_retries, None);
        assert_eq!(config.buffer_size(), DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(
            config.environment(),
            vec![(NORMALIZER_BMP2RAW_ENV.to_string(), "0".to_string())]
        );
    }

    #[test]
    fn test_environment_keeps_extra_toggles_in_order() {
        let config = ApiConfig::new()
            .disable_raw_normalization(false)
            .env("LIBINSANE_NORMALIZER_SAFE_DEFAULTS", "0")
            .env("LIBINSANE_WORKAROUND_CHECK_CAPABILITIES", "0");
        let keys: Vec<_> = config.environment().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            [
                "LIBINSANE_NORMALIZER_SAFE_DEFAULTS",
                "LIBINSANE_WORKAROUND_CHECK_CAPABILITIES"
            ]
        );
    }

    #[test]
    fn test_retry_policy_bounds() {
        let unbounded = RetryPolicy::default();
        assert!(unbounded.allows(u32::MAX - 1));

        let bounded = RetryPolicy::new(Duration::ZERO).max_retries(2);
        assert!(bounded.allows(0));
        assert!(bounded.allows(1));
        assert!(!bounded.allows(2));
    }

    #[test]
    fn test_read_buffer_size_is_never_zero() {
        assert_eq!(ApiConfig::new().read_buffer_size(0).buffer_size(), 1);
    }
}
