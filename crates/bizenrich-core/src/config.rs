//! Client configuration: backend location, transport policy and timings.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid backend URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unknown transport policy '{0}' (expected auto, live or polling)")]
    UnknownTransport(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How the stream client chooses between the live channel and polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportPolicy {
    /// Live channel when the backend is on a loopback address, polling
    /// otherwise (intermediary proxies tend to break long-lived streams).
    #[default]
    Auto,
    Live,
    Polling,
}

impl FromStr for TransportPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "live" | "sse" => Ok(Self::Live),
            "polling" | "poll" => Ok(Self::Polling),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

impl TransportPolicy {
    /// Whether the live channel should be skipped for a backend at `url`.
    pub fn prefers_polling(self, url: &Url) -> bool {
        match self {
            Self::Live => false,
            Self::Polling => true,
            Self::Auto => !is_loopback(url),
        }
    }
}

fn is_loopback(url: &Url) -> bool {
    matches!(
        url.host_str(),
        Some("localhost" | "127.0.0.1" | "::1" | "[::1]")
    )
}

/// Configuration for the batch client.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend root, e.g. `http://localhost:3000`. Health checks live here.
    pub backend_url: Url,
    /// Path of the versioned API below the root.
    pub api_path: String,
    pub transport: TransportPolicy,
    pub poll_interval: Duration,
    pub stuck_timeout: Duration,
    pub completion_debounce: Duration,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: Url::parse("http://localhost:3000").expect("static URL is valid"),
            api_path: "/api/v1".to_string(),
            transport: TransportPolicy::Auto,
            poll_interval: Duration::from_secs(2),
            stuck_timeout: Duration::from_secs(5),
            completion_debounce: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
            upload_timeout: Duration::from_secs(120),
        }
    }
}

/// On-disk config file; every field is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub backend_url: Option<String>,
    pub api_path: Option<String>,
    pub transport: Option<TransportPolicy>,
    pub poll_interval_ms: Option<u64>,
    pub stuck_timeout_secs: Option<u64>,
    pub completion_debounce_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Apply the values present in the file on top of `config`.
    pub fn apply(self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(url) = self.backend_url {
            config.set_backend_url(&url)?;
        }
        if let Some(path) = self.api_path {
            config.api_path = path;
        }
        if let Some(t) = self.transport {
            config.transport = t;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms.max(100));
        }
        if let Some(s) = self.stuck_timeout_secs {
            config.stuck_timeout = Duration::from_secs(s);
        }
        if let Some(ms) = self.completion_debounce_ms {
            config.completion_debounce = Duration::from_millis(ms);
        }
        if let Some(s) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(s);
        }
        if let Some(s) = self.upload_timeout_secs {
            config.upload_timeout = Duration::from_secs(s);
        }
        Ok(())
    }
}

impl Config {
    pub fn set_backend_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let parsed = Url::parse(url.trim()).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: url.to_string(),
                reason: "scheme must be http or https".into(),
            });
        }
        self.backend_url = parsed;
        Ok(())
    }

    /// Apply `BIZENRICH_BACKEND_URL` and `BIZENRICH_TRANSPORT` when set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("BIZENRICH_BACKEND_URL") {
            self.set_backend_url(&url)?;
        }
        if let Ok(t) = std::env::var("BIZENRICH_TRANSPORT") {
            self.transport = t.parse()?;
        }
        Ok(())
    }

    /// Absolute URL of an API route, e.g. `api_url("scraping-batch/b1")`.
    pub fn api_url(&self, route: &str) -> String {
        format!(
            "{}/{}/{}",
            self.backend_url.as_str().trim_end_matches('/'),
            self.api_path.trim_matches('/'),
            route.trim_start_matches('/')
        )
    }

    /// Absolute URL of a route below the backend root.
    pub fn root_url(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.backend_url.as_str().trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }

    /// Whether the stream client should go straight to polling.
    pub fn prefers_polling(&self) -> bool {
        self.transport.prefers_polling(&self.backend_url)
    }
}
