// ABOUTME: Shared logging setup for launcher binaries
// ABOUTME: init() for plain stderr logging, init_with_level() honouring LOG_OUTPUT_LEVEL

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Level used when nothing (or nothing valid) was configured.
pub const DEFAULT_LEVEL: Level = Level::INFO;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(DEFAULT_LEVEL.into()))
        .init();
}

/// Logging to stderr at an operator-chosen level (the `LOG_OUTPUT_LEVEL` value).
///
/// An unknown or missing level falls back to INFO; the fallback is reported
/// once the subscriber is installed so it actually reaches the log.
/// Directives in RUST_LOG still take precedence.
pub fn init_with_level(level: Option<&str>) {
    let parsed = level.and_then(parse_level);
    let effective = parsed.unwrap_or(DEFAULT_LEVEL);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(effective.into()))
        .init();

    match (level, parsed) {
        (Some(raw), None) => tracing::warn!(
            configured = %raw,
            fallback = %DEFAULT_LEVEL,
            "Invalid log level, reverting to default"
        ),
        (_, Some(level)) => tracing::debug!(level = %level, "Log level set"),
        (None, None) => {}
    }
}

/// Parse a level name case-insensitively ("debug", "WARN", " info ").
pub fn parse_level(raw: &str) -> Option<Level> {
    raw.trim().parse::<Level>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_with_level() {
        let _ = super::init_with_level as fn(Option<&str>);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("  Info "), Some(Level::INFO));
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("ERROR"), Some(Level::ERROR));
    }

    #[test]
    fn test_parse_level_rejects_unknown() {
        assert_eq!(parse_level("verbose"), None);
        assert_eq!(parse_level(""), None);
    }

    #[test]
    fn test_default_level_is_info() {
        assert_eq!(DEFAULT_LEVEL, Level::INFO);
    }
}
