//! # Observability
//!
//! Logging bootstrap shared by every Pitstop binary.
//!
//! Components are **log producers** only. They call `observability::init()`
//! once at startup and use the standard `tracing` macros everywhere else.
//!
//! ## Dev Mode
//!
//! With the `dev` feature (on by default) every process appends structured
//! JSONL to one central file, `~/.pitstop/logs/dev.jsonl`:
//!
//! - `tail -f ~/.pitstop/logs/dev.jsonl | jq` for pretty JSON
//! - `lnav ~/.pitstop/logs/dev.jsonl` for interactive exploration
//!
//! Credential-shaped values (bearer headers, signed tokens, fields named like
//! `token` or `secret`) are redacted before a line is written.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "pitstop-cli".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

#[cfg(feature = "dev")]
mod dev;

#[cfg(feature = "dev")]
mod json_layer;
#[cfg(feature = "dev")]
mod redact;

use std::path::PathBuf;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "pitstop-cli").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.pitstop/logs/dev.jsonl` in dev mode.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Calling this twice in one process is harmless; the second subscriber is
/// rejected and the first stays installed.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        dev::init_dev_subscriber(&config);
    }

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .compact()
            .finish()
            .try_init();
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;
