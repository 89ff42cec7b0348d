//! Session settings derived from the shared [`Config`].

use pitstop_config_and_utils::Config;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Per-request timeout for auth endpoints and the gateway.
    pub http_timeout: Duration,
    /// Refresh this long before the access token expires.
    pub refresh_lead_time: Duration,
    /// See [`SessionController::hydrate`](crate::SessionController::hydrate).
    pub optimistic_hydration: bool,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http_timeout: config.http_timeout(),
            refresh_lead_time: config.refresh_lead_time(),
            optimistic_hydration: config.optimistic_hydration,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = Config {
            refresh_lead_time_secs: 60,
            optimistic_hydration: false,
            ..Config::default()
        };
        let session = SessionConfig::from_config(&config);
        assert_eq!(session.refresh_lead_time, Duration::from_secs(60));
        assert_eq!(session.http_timeout, Duration::from_secs(15));
        assert!(!session.optimistic_hydration);
    }
}
