pub mod hub;
pub mod percentiles;
pub mod stream;
pub mod trace_layer;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

pub use hub::{TelemetryHub, TelemetrySnapshot};
pub use trace_layer::TraceForwardLayer;

/// Timing and outcome of one call to an external (or in-process) dependency.
#[derive(Debug, Clone)]
pub struct DependencyRecord {
    pub id: Uuid,
    /// e.g. "RandomNumberProvider", "InProc"
    pub dependency_type: String,
    /// e.g. "GetRandomNumberUpTo"
    pub name: String,
    /// Call parameter, rendered as text
    pub data: String,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub success: bool,
}

impl DependencyRecord {
    pub fn new(
        dependency_type: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<String>,
        start_time: DateTime<Utc>,
        duration: Duration,
        success: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dependency_type: dependency_type.into(),
            name: name.into(),
            data: data.into(),
            start_time,
            duration,
            success,
        }
    }
}

/// A single numeric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One inbound HTTP request, stamped with the thread that served it.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub thread_id: String,
    pub thread_name: Option<String>,
}

impl RequestRecord {
    pub fn success(&self) -> bool {
        self.status < 400
    }
}

/// A failure observed by the service and reported before being rethrown.
#[derive(Debug, Clone)]
pub struct ExceptionRecord {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub properties: BTreeMap<String, String>,
}

impl ExceptionRecord {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            message: message.into(),
            timestamp: Utc::now(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Result of one availability probe (a published health report).
#[derive(Debug, Clone)]
pub struct AvailabilityRecord {
    pub id: Uuid,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub run_location: String,
    pub success: bool,
    pub properties: BTreeMap<String, String>,
}

/// A log event forwarded as a trace message.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// "ERROR", "WARN" or "INFO"
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Destination for telemetry records.
///
/// Delivery is fire-and-forget: callers never let an `Err` from a sink fail
/// the operation being observed, see [`best_effort`].
pub trait TelemetrySink: Send + Sync {
    fn track_dependency(&self, record: DependencyRecord) -> Result<()>;

    fn track_metric(&self, _sample: MetricSample) -> Result<()> {
        Ok(())
    }

    fn track_request(&self, _record: RequestRecord) -> Result<()> {
        Ok(())
    }

    fn track_exception(&self, _record: ExceptionRecord) -> Result<()> {
        Ok(())
    }

    fn track_availability(&self, _record: AvailabilityRecord) -> Result<()> {
        Ok(())
    }

    fn track_trace(&self, _record: TraceRecord) -> Result<()> {
        Ok(())
    }
}

/// Swallows a sink failure, leaving a warning in the log.
pub fn best_effort(outcome: Result<()>, record_kind: &'static str) {
    if let Err(e) = outcome {
        tracing::warn!(record_kind, error = %e, "dropping telemetry record");
    }
}
