//! # engage-logging
//!
//! Installs the global `tracing` subscriber from [`LoggingSettings`].
//!
//! `RUST_LOG` wins over the configured level. Without it the filter is the
//! configured default level plus any per-module overrides. Output goes to
//! stderr, either compact text or JSON lines.

#![deny(unsafe_code)]

use engage_settings::LoggingSettings;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed in this process.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialised,
}

/// Build the `EnvFilter` directive string for the configured levels.
///
/// `{level: info, moduleLevels: {engage_store: warn}}` becomes
/// `"info,engage_store=warn"`.
pub fn filter_directive(settings: &LoggingSettings) -> String {
    let mut directive = settings.level.as_str().to_string();
    for (module, level) in &settings.module_levels {
        directive.push(',');
        directive.push_str(module);
        directive.push('=');
        directive.push_str(level.as_str());
    }
    directive
}

fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(settings)))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(settings);

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if settings.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialised)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use engage_settings::LogLevel;

    #[test]
    fn directive_defaults_to_level() {
        assert_eq!(filter_directive(&LoggingSettings::default()), "info");
    }

    #[test]
    fn directive_appends_module_levels_in_order() {
        let mut settings = LoggingSettings {
            level: LogLevel::Warn,
            ..LoggingSettings::default()
        };
        let _ = settings
            .module_levels
            .insert("engage_store".into(), LogLevel::Debug);
        let _ = settings
            .module_levels
            .insert("engage_engine".into(), LogLevel::Trace);
        assert_eq!(
            filter_directive(&settings),
            "warn,engage_engine=trace,engage_store=debug"
        );
    }

    #[test]
    fn directive_parses_as_env_filter() {
        let mut settings = LoggingSettings::default();
        let _ = settings
            .module_levels
            .insert("engage_engine::ratings".into(), LogLevel::Debug);
        let directive = filter_directive(&settings);
        assert!(EnvFilter::try_new(directive).is_ok());
    }

    #[test]
    fn second_init_reports_already_initialised() {
        let settings = LoggingSettings::default();
        let _ = init_logging(&settings);
        assert!(matches!(
            init_logging(&settings),
            Err(LoggingError::AlreadyInitialised)
        ));
    }
}
