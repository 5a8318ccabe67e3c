//! Configuration for the synchronization engine.

use std::time::Duration;

/// Configuration for one synchronization run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the synchronization API.
    pub api_base_url: String,
    /// Integration instance the run belongs to.
    pub instance_id: String,
    /// Opaque credential sent as the authorization header.
    pub access_token: Option<String>,
    /// Retry behavior for the transport.
    pub retry: RetryConfig,
    /// Upload batching.
    pub upload: UploadConfig,
    /// Store partition page size before an implicit flush.
    pub store_page_size: usize,
}

impl SyncConfig {
    /// Creates a configuration for the given API and instance.
    pub fn new(api_base_url: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            instance_id: instance_id.into(),
            access_token: None,
            retry: RetryConfig::default(),
            upload: UploadConfig::default(),
            store_page_size: 500,
        }
    }

    /// Sets the API credential.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the upload configuration.
    pub fn with_upload(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    /// Sets the store partition page size.
    pub fn with_store_page_size(mut self, page_size: usize) -> Self {
        self.store_page_size = page_size;
        self
    }
}

/// Configuration for transport retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry when the server gives no guidance.
    pub initial_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the default delay before the given retry (1-indexed:
    /// `attempt` is the number of attempts already made).
    ///
    /// Monotonically non-decreasing in `attempt` so retries of one request
    /// never wait less than the retry before them.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let scaled = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Configuration for upload batching.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum graph objects per upload request.
    pub batch_size: usize,
}

impl UploadConfig {
    /// Creates an upload configuration with the given batch size.
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { batch_size: 250 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://api.example.com", "instance-1")
            .with_access_token("secret")
            .with_store_page_size(50)
            .with_upload(UploadConfig::new(10));

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.instance_id, "instance-1");
        assert_eq!(config.access_token.as_deref(), Some("secret"));
        assert_eq!(config.store_page_size, 50);
        assert_eq!(config.upload.batch_size, 10);
    }

    #[test]
    fn default_attempt_budget_is_five() {
        assert_eq!(RetryConfig::default().max_attempts, 5);
    }

    #[test]
    fn delay_is_monotonically_non_decreasing() {
        let retry = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        let mut previous = Duration::ZERO;
        for attempt in 0..8 {
            let delay = retry.delay_for_attempt(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_respects_max() {
        let retry = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        assert_eq!(retry.delay_for_attempt(6), Duration::from_secs(5));
    }
}
