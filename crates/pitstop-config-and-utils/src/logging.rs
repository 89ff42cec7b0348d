//! Logging initialization.
//!
//! Thin wrapper over the observability crate: structured JSONL to
//! `~/.pitstop/logs/dev.jsonl`, optionally mirrored to stderr.

use observability::LogConfig;

/// Initialize logging for a Pitstop process.
///
/// `RUST_LOG` overrides `level`. The stderr mirror is on unless
/// `PITSTOP_LOG_STDERR` is set to `0` or `false`.
pub fn init_logging(service_name: &str, level: &str) {
    let also_stderr = std::env::var("PITSTOP_LOG_STDERR")
        .map(|raw| stderr_enabled(&raw))
        .unwrap_or(true);

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        also_stderr,
        ..Default::default()
    });
}

fn stderr_enabled(raw: &str) -> bool {
    !matches!(raw.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off")
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("ERROR"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn stderr_toggle() {
        assert!(stderr_enabled("1"));
        assert!(stderr_enabled("yes"));
        assert!(!stderr_enabled("0"));
        assert!(!stderr_enabled(" FALSE "));
    }
}
