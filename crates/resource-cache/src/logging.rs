use std::env;

use sentry::integrations::tracing::EventFilter;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};

/// The `RUST_LOG` filter used when the environment does not set one.
fn default_filter(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "",
        LevelFilter::ERROR => "ERROR",
        LevelFilter::WARN => "WARN",
        LevelFilter::INFO => "INFO",
        LevelFilter::DEBUG => {
            "INFO,\
             resource_cache=DEBUG,\
             resource_cache_stress=DEBUG"
        }
        LevelFilter::TRACE => {
            "INFO,\
             resource_cache=TRACE,\
             resource_cache_stress=TRACE"
        }
    }
}

/// Resolves [`LogFormat::Auto`] depending on whether a user watches the output.
fn effective_format(format: LogFormat, attended: bool) -> LogFormat {
    match (format, attended) {
        (LogFormat::Auto, true) => LogFormat::Pretty,
        (LogFormat::Auto, false) => LogFormat::Simplified,
        (format, _) => format,
    }
}

/// Only errors become sentry events, warnings and infos are kept as breadcrumbs.
fn sentry_event_filter(level: &Level) -> EventFilter {
    match *level {
        Level::ERROR => EventFilter::Event,
        Level::WARN | Level::INFO => EventFilter::Breadcrumb,
        Level::DEBUG | Level::TRACE => EventFilter::Ignore,
    }
}

/// Initializes logging.
///
/// This considers the `RUST_LOG` environment variable and defaults it to the level specified in the
/// configuration. Additionally, this toggles `RUST_BACKTRACE` based on the
/// [`enable_backtraces`](crate::config::Logging::enable_backtraces)
/// config value.
///
/// Every output format reports to sentry through the same layer.
///
/// # Safety
/// This function uses [`std::env::set_var`] to modify the environment. That function is only safe
/// to call in single-threaded contexts to prevent unsynchronized concurrent access to the environment.
pub unsafe fn init_logging(config: &Config) {
    if config.logging.enable_backtraces {
        // SAFETY: As documented, this function may only be called in a single-threaded context.
        unsafe { env::set_var("RUST_BACKTRACE", "1") };
    }

    let rust_log =
        env::var("RUST_LOG").unwrap_or_else(|_| default_filter(config.logging.level).to_string());

    let fmt_layer = {
        let layer = tracing_subscriber::fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_target(true);

        match effective_format(config.logging.format, console::user_attended()) {
            LogFormat::Json => layer
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            LogFormat::Simplified => layer.compact().with_ansi(false).boxed(),
            LogFormat::Auto | LogFormat::Pretty => layer.pretty().boxed(),
        }
    }
    .with_filter(EnvFilter::new(&rust_log));

    let sentry_layer = sentry::integrations::tracing::layer()
        .event_filter(|metadata| sentry_event_filter(metadata.level()));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sentry_layer)
        .init();
}

/// Logs an error to the configured logger or `stderr` if not yet configured.
pub fn ensure_log_error(error: &anyhow::Error) {
    if Level::ERROR <= tracing::level_filters::STATIC_MAX_LEVEL
        && Level::ERROR <= LevelFilter::current()
    {
        tracing::error!("{:?}", error);
    } else {
        eprintln!("{error:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(LevelFilter::OFF), "");
        assert_eq!(default_filter(LevelFilter::INFO), "INFO");
        assert!(default_filter(LevelFilter::TRACE).contains("resource_cache=TRACE"));
        assert!(default_filter(LevelFilter::DEBUG).starts_with("INFO,"));
    }

    #[test]
    fn test_effective_format() {
        assert_eq!(effective_format(LogFormat::Auto, true), LogFormat::Pretty);
        assert_eq!(effective_format(LogFormat::Auto, false), LogFormat::Simplified);
        assert_eq!(effective_format(LogFormat::Json, true), LogFormat::Json);
        assert_eq!(effective_format(LogFormat::Pretty, false), LogFormat::Pretty);
    }

    #[test]
    fn test_sentry_event_filter() {
        assert!(sentry_event_filter(&Level::ERROR).contains(EventFilter::Event));
        assert!(!sentry_event_filter(&Level::WARN).contains(EventFilter::Event));
        assert!(sentry_event_filter(&Level::INFO).contains(EventFilter::Breadcrumb));
        let ignored = sentry_event_filter(&Level::TRACE);
        assert!(!ignored.contains(EventFilter::Event));
        assert!(!ignored.contains(EventFilter::Breadcrumb));
    }
}
