use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::telemetry::{TelemetrySink, TraceForwardLayer};

const QUIET_DEPENDENCIES: &str = "hyper=warn,tower=warn,redis=warn";

/// Installs the global subscriber: a console layer plus a layer that
/// forwards INFO and above to `sink` as traces.
///
/// A non-empty `RUST_LOG` replaces `--log-level` for the console output.
/// Trace forwarding always uses INFO.
pub fn init(config: &Config, sink: Arc<dyn TelemetrySink>) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = console_filter(config.log_level()?, rust_log.as_deref())?;

    let console = if config.log_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(console.with_filter(filter))
        .with(TraceForwardLayer::new(sink).with_filter(LevelFilter::INFO))
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialised: {e}")))
}

fn console_filter(level: Level, rust_log: Option<&str>) -> Result<EnvFilter> {
    let directives = match rust_log.map(str::trim) {
        Some(env) if !env.is_empty() => env.to_string(),
        _ => format!("{},{QUIET_DEPENDENCIES}", level.as_str().to_ascii_lowercase()),
    };
    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("invalid log filter '{directives}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_applies_without_rust_log() {
        let filter = console_filter(Level::WARN, None).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));

        let filter = console_filter(Level::DEBUG, Some("  ")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn rust_log_replaces_configured_level() {
        let filter = console_filter(Level::WARN, Some("apm_demo=trace")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn malformed_rust_log_is_rejected() {
        assert!(matches!(
            console_filter(Level::INFO, Some("apm_demo=loud")),
            Err(Error::Config(_))
        ));
    }
}
