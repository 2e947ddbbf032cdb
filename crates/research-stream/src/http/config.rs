use std::time::Duration;

use crate::errors::ResearchError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for the HTTP research backend.
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    /// Base URL of the research service.
    pub base_url: String,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Timeout for non-streaming requests.
    ///
    /// The event stream itself is not bounded by it; research runs can
    /// outlast any sensible request timeout.
    pub timeout: Duration,
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
            use_system_proxy: true,
        }
    }

    /// Builds a config from `RESEARCH_API_BASE_URL` and `RESEARCH_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ResearchError> {
        let mut config = match std::env::var("RESEARCH_API_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        };
        if let Ok(raw) = std::env::var("RESEARCH_API_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                ResearchError::Config(format!("RESEARCH_API_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn use_system_proxy(mut self, enabled: bool) -> Self {
        self.use_system_proxy = enabled;
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let config = HttpBackendConfig::new("http://example.test:8000/");
        assert_eq!(config.endpoint("/run"), "http://example.test:8000/run");
        assert_eq!(config.endpoint("health"), "http://example.test:8000/health");
    }

    #[test]
    fn defaults_point_at_local_service() {
        let config = HttpBackendConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(config.use_system_proxy);
    }
}
