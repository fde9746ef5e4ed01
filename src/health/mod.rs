//! Health checks, aggregated reports and the periodic publisher.

pub mod checks;
pub mod publisher;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tracing::warn;

pub use checks::{CartStoreCheck, DependencyAvailableCheck};
pub use publisher::{run_publisher, HealthPublisher, PublisherOptions, TelemetryHealthPublisher};

/// Tag carried by checks that should be published periodically.
pub const LIVENESS_TAG: &str = "liveness";

const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered worst-first, so the aggregate of a report is the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HealthStatus {
    Unhealthy,
    Degraded,
    Healthy,
}

impl HealthStatus {
    /// Healthy and Degraded both count as available.
    pub fn is_available(self) -> bool {
        self != HealthStatus::Unhealthy
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unhealthy => "Unhealthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Healthy => "Healthy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub description: Option<String>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            description: None,
            error: None,
        }
    }

    pub fn unhealthy(description: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            description: Some(description.into()),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check_health(&self) -> HealthCheckResult;
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReportEntry {
    pub status: HealthStatus,
    pub description: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub tags: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(rename = "total_duration_ms", serialize_with = "as_millis")]
    pub total_duration: Duration,
    pub entries: BTreeMap<String, HealthReportEntry>,
}

impl HealthReport {
    fn from_entries(entries: BTreeMap<String, HealthReportEntry>, total_duration: Duration) -> Self {
        let status = entries
            .values()
            .map(|e| e.status)
            .min()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            status,
            total_duration,
            entries,
        }
    }
}

/// A named check plus how to report it.
pub struct Registration {
    pub name: String,
    pub check: Arc<dyn HealthCheck>,
    /// Reported in place of `Unhealthy` when the check fails.
    pub failure_status: HealthStatus,
    pub tags: Vec<String>,
    pub timeout: Duration,
}

impl Registration {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Checks registered at startup; immutable once the server runs.
#[derive(Default)]
pub struct HealthCheckRegistry {
    registrations: Vec<Registration>,
}

impl HealthCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        check: Arc<dyn HealthCheck>,
        failure_status: HealthStatus,
        tags: &[&str],
    ) -> &mut Self {
        self.registrations.push(Registration {
            name: name.into(),
            check,
            failure_status,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            timeout: DEFAULT_CHECK_TIMEOUT,
        });
        self
    }

    pub async fn run_all(&self) -> HealthReport {
        self.run(|_| true).await
    }

    /// Runs every check accepted by `predicate`, one after another.
    pub async fn run<F>(&self, predicate: F) -> HealthReport
    where
        F: Fn(&Registration) -> bool,
    {
        let started = Instant::now();
        let mut entries = BTreeMap::new();

        for reg in self.registrations.iter().filter(|r| predicate(r)) {
            let check_started = Instant::now();
            let result = match tokio::time::timeout(reg.timeout, reg.check.check_health()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(check = %reg.name, timeout = ?reg.timeout, "health check timed out");
                    HealthCheckResult::unhealthy(format!(
                        "check timed out after {:?}",
                        reg.timeout
                    ))
                }
            };

            let status = if result.status == HealthStatus::Unhealthy {
                reg.failure_status
            } else {
                result.status
            };

            entries.insert(
                reg.name.clone(),
                HealthReportEntry {
                    status,
                    description: result.description,
                    duration: check_started.elapsed(),
                    tags: reg.tags.clone(),
                    error: result.error,
                },
            );
        }

        HealthReport::from_entries(entries, started.elapsed())
    }
}
