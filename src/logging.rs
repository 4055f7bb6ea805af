//! Tracing subscriber setup.
//!
//! anvilq itself only emits `tracing` events. Applications that don't install
//! their own subscriber can call [`init`] once at startup.

use crate::config::LoggingConfig;
use crate::error::{AnvilError, AnvilResult};

/// Install a global `tracing-subscriber` fmt subscriber.
///
/// Fails with [`AnvilError::ConfigError`] if a global subscriber is already
/// set.
///
/// # Examples
///
/// ```rust
/// use anvilq::config::AnvilConfig;
///
/// let config = AnvilConfig::development();
/// anvilq::logging::init(&config.logging).expect("first subscriber");
/// assert!(anvilq::logging::init(&config.logging).is_err());
/// ```
pub fn init(config: &LoggingConfig) -> AnvilResult<()> {
    let level: tracing::Level = config.level.into();
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(config.include_targets);

    let result = match (config.json_format, config.include_timestamps) {
        (true, true) => builder.json().try_init(),
        (true, false) => builder.json().without_time().try_init(),
        (false, true) => builder.with_ansi(config.colored).try_init(),
        (false, false) => builder.with_ansi(config.colored).without_time().try_init(),
    };

    result.map_err(|e| AnvilError::config(format!("failed to install tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnvilConfig;

    #[test]
    fn test_second_init_fails() {
        let config = AnvilConfig::testing().logging;
        let _ = init(&config);

        let err = init(&config).unwrap_err();
        assert!(matches!(err, AnvilError::ConfigError { .. }));
    }
}
