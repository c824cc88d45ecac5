//! Logging initialization.
//!
//! All log output goes to stderr; stdout carries only extracted records and
//! fetched bodies so it can be piped.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Levels accepted in the `[logging]` config table.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Pick the effective level: `--verbose` raises to at least debug, and an
/// unknown configured level falls back to info.
fn effective_level(configured: &str, verbose: bool) -> &'static str {
    let configured = LEVELS
        .iter()
        .copied()
        .find(|l| l.eq_ignore_ascii_case(configured))
        .unwrap_or("info");
    match (verbose, configured) {
        (true, "trace") => "trace",
        (true, _) => "debug",
        (false, level) => level,
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(console::Term::stderr().features().colors_supported()),
            )
            .init();
    }
}

/// Initialize logging from the config file, with CLI overrides.
pub fn init_from_config(
    config: &metavision_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let level = effective_level(&config.logging.level, verbose_override);
    let json_format = json_logs_override || config.logging.format == "json";
    init(level, json_format);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level("warn", false), "warn");
        assert_eq!(effective_level("WARN", false), "warn");
        assert_eq!(effective_level("warn", true), "debug");
        assert_eq!(effective_level("trace", true), "trace");
        assert_eq!(effective_level("loud", false), "info");
    }
}
