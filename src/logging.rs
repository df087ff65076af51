//! Diagnostic tracing for build and run commands.
//!
//! Diagnostics go to stderr so that command results printed on stdout stay
//! machine-readable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_LEVEL: &str = "warn";

/// Build the filter: explicit level first, then `RUST_LOG`, then `warn`.
pub fn filter_for(level: Option<&str>) -> EnvFilter {
    match level {
        Some(directive) => {
            EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL)),
    }
}

/// Install the global subscriber. Compact format, stderr.
///
/// ```bash
/// AUTOMATE_LOG_LEVEL=automate=debug automate build
/// ```
pub fn init(level: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_explicit_level_wins() {
        let filter = filter_for(Some("debug"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_logging_bad_directive_falls_back() {
        let filter = filter_for(Some("automate=loud"));
        assert_eq!(filter.to_string(), DEFAULT_LEVEL);
    }

    #[test]
    fn test_logging_init_twice_is_harmless() {
        init(Some("warn"));
        init(Some("warn"));
    }
}
