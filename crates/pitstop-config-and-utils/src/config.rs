//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base URL (can be overridden at compile time via PITSTOP_API_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("PITSTOP_API_URL") {
    Some(url) => url,
    None => "https://api.pitstop.app",
};

/// Default realtime endpoint (can be overridden at compile time via PITSTOP_REALTIME_URL).
pub const DEFAULT_REALTIME_URL: &str = match option_env!("PITSTOP_REALTIME_URL") {
    Some(url) => url,
    None => "wss://realtime.pitstop.app/ws",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Client configuration for the session and realtime layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL for every HTTP endpoint.
    pub api_base_url: String,
    /// WebSocket endpoint for the realtime channel.
    pub realtime_url: String,
    /// Per-request HTTP timeout.
    pub http_timeout_secs: u64,
    /// Timeout for opening the realtime channel.
    pub connect_timeout_secs: u64,
    /// How long before expiry an access token is proactively refreshed.
    pub refresh_lead_time_secs: u64,
    /// Report `authenticated` at startup when only the refresh token is usable.
    pub optimistic_hydration: bool,
    /// First reconnect delay; doubled per attempt.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Consecutive failures before the realtime channel gives up.
    pub max_reconnect_attempts: u32,
    /// Realtime heartbeat interval.
    pub heartbeat_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            http_timeout_secs: 15,
            connect_timeout_secs: 20,
            refresh_lead_time_secs: 300,
            optimistic_hydration: true,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 10_000,
            max_reconnect_attempts: 5,
            heartbeat_interval_secs: 25,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `PITSTOP_*` overrides from the given lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty("PITSTOP_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty("PITSTOP_API_URL") {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = non_empty("PITSTOP_REALTIME_URL") {
            self.realtime_url = url;
        }
    }

    /// Reject values that would break the retry and timeout bounds.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        self.realtime_url()?;
        if self.http_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(CoreError::Config("timeouts must be non-zero".to_string()));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(CoreError::Config(
                "max_reconnect_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(CoreError::Config(
                "reconnect_base_delay_ms exceeds reconnect_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed API base URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Parsed realtime URL.
    pub fn realtime_url(&self) -> CoreResult<Url> {
        Url::parse(&self.realtime_url).map_err(CoreError::from)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn refresh_lead_time(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_time_secs)
    }
}
