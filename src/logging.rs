//! Logging setup for the `stencil2dataflow` driver using `tracing` +
//! `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `STENCIL_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `warn`

use tracing_subscriber::fmt;

/// Initialise the global logging subscriber.
///
/// Logs go to stderr so that `--json` output stays machine readable.
pub fn init_logging(cli_level: Option<&str>) -> Result<(), String> {
    let level = match cli_level {
        Some(lvl) => {
            parse_level_str(lvl).ok_or_else(|| format!("Unknown log level: {}", lvl))?
        }
        None => std::env::var("STENCIL_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::WARN),
    };

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("Failed to install logger: {}", e))
}

pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level_str(" Debug "), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level_str("warning"), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("loud"), None);
    }
}
