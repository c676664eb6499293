use std::time::Duration;

/// Path substrings whose 404 responses are an expected "no record yet".
pub const DEFAULT_QUIET_NOT_FOUND: [&str; 2] = ["/forms/my-latest", "/merchants/my-merchant"];

/// Configures the request pipeline: transport timeouts, retry, cache and throttling.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineOptions {
    /// API root every request path is appended to.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Timeout for multipart uploads.
    pub upload_timeout: Duration,
    /// Transient-failure retries after the initial attempt.
    pub max_retries: usize,
    /// Linear backoff step for transient failures.
    pub retry_delay: Duration,
    /// Retries after an HTTP 429.
    pub rate_limit_max_retries: usize,
    /// Base of the `base * 3^attempt` backoff for HTTP 429.
    pub rate_limit_base_delay: Duration,
    /// Lifetime of a cached GET response.
    pub cache_ttl: Duration,
    /// Pause after each network dispatch from the queue.
    pub queue_delay: Duration,
    /// Pause after a queued request was answered from the cache.
    pub cache_hit_delay: Duration,
    /// Sent as `X-Client-Version`.
    pub client_version: String,
    /// Endpoints whose 404s are not logged.
    pub quiet_not_found: Vec<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_owned(),
            timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
            rate_limit_max_retries: 3,
            rate_limit_base_delay: Duration::from_millis(1_000),
            cache_ttl: Duration::from_secs(5 * 60),
            queue_delay: Duration::from_millis(500),
            cache_hit_delay: Duration::from_millis(50),
            client_version: env!("CARGO_PKG_VERSION").to_owned(),
            quiet_not_found: DEFAULT_QUIET_NOT_FOUND.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl PipelineOptions {
    /// Default options pointed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds options from environment variables.
    ///
    /// Reads:
    /// - `BACKOFFICE_API_URL`: API root (required)
    /// - `BACKOFFICE_TIMEOUT_MS`: request timeout in milliseconds
    /// - `BACKOFFICE_MAX_RETRIES`: transient-failure retry count
    /// - `BACKOFFICE_CLIENT_VERSION`: value of `X-Client-Version`
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("BACKOFFICE_API_URL")
            .ok_or_else(|| "missing BACKOFFICE_API_URL environment variable".to_owned())?;
        if base_url.trim().is_empty() {
            return Err("BACKOFFICE_API_URL is set but empty".to_owned());
        }
        let mut options = Self::new(base_url.trim());

        if let Some(raw) = lookup("BACKOFFICE_TIMEOUT_MS") {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("BACKOFFICE_TIMEOUT_MS is not a number: {raw}"))?;
            options.timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("BACKOFFICE_MAX_RETRIES") {
            options.max_retries = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("BACKOFFICE_MAX_RETRIES is not a number: {raw}"))?;
        }
        if let Some(version) = lookup("BACKOFFICE_CLIENT_VERSION") {
            if version.trim().is_empty() {
                return Err("BACKOFFICE_CLIENT_VERSION is set but empty".to_owned());
            }
            options.client_version = version.trim().to_owned();
        }

        options.validate()?;
        Ok(options)
    }

    /// Rejects options the pipeline cannot run with.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_owned());
        }
        if self.timeout.is_zero() || self.upload_timeout.is_zero() {
            return Err("timeouts must be greater than zero".to_owned());
        }
        Ok(())
    }

    /// Joins `base_url` and an API path.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
