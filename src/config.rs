use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

use crate::error::{Error, Result};
use crate::health::PublisherOptions;
use crate::sampler::FailurePolicy;
use crate::StateOptions;

/// Demo cart service that emits request, dependency and availability telemetry
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// Store carts in Redis instead of process memory
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Seed the sampler and perf generators for reproducible runs
    #[arg(long, env = "SAMPLER_SEED")]
    pub sampler_seed: Option<u64>,

    /// Return max - 1 instead of an error when the sampler fails
    #[arg(long, env = "MASK_SAMPLER_FAILURES")]
    pub mask_sampler_failures: bool,

    /// Seconds before the first health report is published
    #[arg(long, env = "HEALTH_DELAY_SECS", default_value = "10")]
    pub health_delay_secs: u64,

    /// Seconds between published health reports
    #[arg(long, env = "HEALTH_PERIOD_SECS", default_value = "30")]
    pub health_period_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address '{}': {e}", self.listen_addr)))
    }

    pub fn log_level(&self) -> Result<Level> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => Err(Error::Config(format!(
                "invalid log level '{other}' (expected trace, debug, info, warn or error)"
            ))),
        }
    }

    pub fn state_options(&self) -> StateOptions {
        StateOptions {
            seed: self.sampler_seed,
            failure_policy: if self.mask_sampler_failures {
                FailurePolicy::FallbackToMaxMinusOne
            } else {
                FailurePolicy::Propagate
            },
        }
    }

    pub fn publisher_options(&self) -> Result<PublisherOptions> {
        if self.health_period_secs == 0 {
            return Err(Error::Config("health period must be at least 1 second".into()));
        }
        Ok(PublisherOptions {
            delay: Duration::from_secs(self.health_delay_secs),
            period: Duration::from_secs(self.health_period_secs),
            ..PublisherOptions::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["apm-demo"]).unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 3000);
        assert!(config.redis_url.is_none());

        let state = config.state_options();
        assert_eq!(state.failure_policy, FailurePolicy::Propagate);
        assert!(state.seed.is_none());

        let publisher = config.publisher_options().unwrap();
        assert_eq!(publisher.delay, Duration::from_secs(10));
        assert_eq!(publisher.period, Duration::from_secs(30));
        assert_eq!(publisher.tag.as_deref(), Some("liveness"));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "apm-demo",
            "--listen-addr",
            "127.0.0.1:8088",
            "--sampler-seed",
            "42",
            "--mask-sampler-failures",
            "--health-period-secs",
            "5",
        ])
        .unwrap();

        assert_eq!(config.listen_addr().unwrap().port(), 8088);
        let state = config.state_options();
        assert_eq!(state.seed, Some(42));
        assert_eq!(state.failure_policy, FailurePolicy::FallbackToMaxMinusOne);
        assert_eq!(
            config.publisher_options().unwrap().period,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn rejects_bad_values() {
        let config = Config::try_parse_from([
            "apm-demo",
            "--listen-addr",
            "nowhere",
            "--health-period-secs",
            "0",
        ])
        .unwrap();
        assert!(matches!(config.listen_addr(), Err(Error::Config(_))));
        assert!(matches!(config.publisher_options(), Err(Error::Config(_))));
    }

    #[test]
    fn log_level_is_validated() {
        let config = Config::try_parse_from(["apm-demo", "--log-level", "WARN"]).unwrap();
        assert_eq!(config.log_level().unwrap(), Level::WARN);

        let config = Config::try_parse_from(["apm-demo", "--log-level", "verbose"]).unwrap();
        assert!(matches!(config.log_level(), Err(Error::Config(_))));
    }
}
