use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use super::{HealthCheckRegistry, HealthReport, LIVENESS_TAG};
use crate::error::Result;
use crate::telemetry::{best_effort, AvailabilityRecord, TelemetrySink};

const UNKNOWN_HOST: &str = "<UnknownHostName>";

/// Receives every report produced by [`run_publisher`].
#[async_trait]
pub trait HealthPublisher: Send + Sync {
    async fn publish(&self, report: &HealthReport) -> Result<()>;
}

/// Publishes reports as availability records.
pub struct TelemetryHealthPublisher {
    sink: Arc<dyn TelemetrySink>,
    application_name: String,
    host_name: String,
}

impl TelemetryHealthPublisher {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            application_name: env!("CARGO_PKG_NAME").to_string(),
            host_name: host_name(),
        }
    }

    pub fn to_availability(&self, report: &HealthReport) -> AvailabilityRecord {
        let mut properties = BTreeMap::new();
        for (key, entry) in &report.entries {
            if let Some(description) = &entry.description {
                properties.insert(format!("{key}:Description"), description.clone());
            }
            properties.insert(
                format!("{key}:Duration"),
                format!("{:.3}ms", entry.duration.as_secs_f64() * 1000.0),
            );
            properties.insert(format!("{key}:Status"), entry.status.to_string());
            properties.insert(format!("{key}:Tags"), entry.tags.join(","));
            if let Some(error) = &entry.error {
                properties.insert(format!("{key}:Error"), error.clone());
            }
        }

        AvailabilityRecord {
            id: Uuid::new_v4(),
            name: self.application_name.clone(),
            timestamp: Utc::now(),
            duration: report.total_duration,
            run_location: self.host_name.clone(),
            success: report.status.is_available(),
            properties,
        }
    }
}

#[async_trait]
impl HealthPublisher for TelemetryHealthPublisher {
    async fn publish(&self, report: &HealthReport) -> Result<()> {
        self.sink.track_availability(self.to_availability(report))
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Wait before the first run.
    pub delay: Duration,
    /// Interval between runs.
    pub period: Duration,
    /// Only checks carrying this tag are run; `None` runs all of them.
    pub tag: Option<String>,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            period: Duration::from_secs(30),
            tag: Some(LIVENESS_TAG.to_string()),
        }
    }
}

/// Runs the selected checks every `period` after an initial `delay` and
/// hands each report to `publisher`, until `shutdown` flips to `true` or
/// its sender is dropped.
pub async fn run_publisher(
    registry: Arc<HealthCheckRegistry>,
    publisher: Arc<dyn HealthPublisher>,
    options: PublisherOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        delay = ?options.delay,
        period = ?options.period,
        tag = ?options.tag,
        "health publisher started"
    );

    tokio::select! {
        _ = tokio::time::sleep(options.delay) => {}
        _ = wait_for_shutdown(&mut shutdown) => {
            info!("health publisher stopped");
            return;
        }
    }

    let mut ticker = tokio::time::interval(options.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = match &options.tag {
                    Some(tag) => registry.run(|r| r.has_tag(tag)).await,
                    None => registry.run_all().await,
                };
                debug!(status = %report.status, entries = report.entries.len(), "publishing health report");
                best_effort(publisher.publish(&report).await, "availability");
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    info!("health publisher stopped");
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthCheck, HealthCheckResult, HealthStatus};
    use crate::telemetry::TelemetryHub;
    use parking_lot::Mutex;

    struct Fixed(HealthCheckResult);

    #[async_trait]
    impl HealthCheck for Fixed {
        async fn check_health(&self) -> HealthCheckResult {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<HealthReport>>);

    #[async_trait]
    impl HealthPublisher for Collect {
        async fn publish(&self, report: &HealthReport) -> Result<()> {
            self.0.lock().push(report.clone());
            Ok(())
        }
    }

    fn registry() -> Arc<HealthCheckRegistry> {
        let mut registry = HealthCheckRegistry::new();
        registry
            .register(
                "DependencyHealthCheck",
                Arc::new(Fixed(
                    HealthCheckResult::unhealthy("no sampler").with_error("boom"),
                )),
                HealthStatus::Unhealthy,
                &[LIVENESS_TAG],
            )
            .register(
                "Untagged",
                Arc::new(Fixed(HealthCheckResult::healthy())),
                HealthStatus::Unhealthy,
                &[],
            );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn availability_carries_per_entry_properties() {
        let hub = Arc::new(TelemetryHub::new());
        let publisher = TelemetryHealthPublisher::new(hub.clone());
        let report = registry().run_all().await;

        let record = publisher.to_availability(&report);
        assert!(!record.success);
        assert_eq!(record.name, "apm-demo");
        assert!(!record.run_location.is_empty());
        assert_eq!(
            record.properties["DependencyHealthCheck:Description"],
            "no sampler"
        );
        assert_eq!(record.properties["DependencyHealthCheck:Status"], "Unhealthy");
        assert_eq!(record.properties["DependencyHealthCheck:Tags"], "liveness");
        assert_eq!(record.properties["DependencyHealthCheck:Error"], "boom");
        assert_eq!(record.properties["Untagged:Tags"], "");
        assert!(!record.properties.contains_key("Untagged:Description"));

        publisher.publish(&report).await.unwrap();
        assert_eq!(hub.snapshot().total_availability, 1);
    }

    #[test]
    fn host_name_comes_from_the_os_not_the_environment() {
        std::env::set_var("HOSTNAME", "not-this-machine");
        let expected = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| UNKNOWN_HOST.to_string());

        assert_eq!(host_name(), expected);
        assert_ne!(host_name(), "not-this-machine");
    }

    #[tokio::test]
    async fn degraded_counts_as_available() {
        let mut registry = HealthCheckRegistry::new();
        registry.register(
            "soft",
            Arc::new(Fixed(HealthCheckResult::unhealthy("slow"))),
            HealthStatus::Degraded,
            &[],
        );
        let report = registry.run_all().await;
        let publisher = TelemetryHealthPublisher::new(Arc::new(TelemetryHub::new()));
        assert!(publisher.to_availability(&report).success);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_tagged_checks_on_schedule() {
        let collect = Arc::new(Collect::default());
        let (tx, rx) = watch::channel(false);
        let options = PublisherOptions {
            delay: Duration::from_secs(10),
            period: Duration::from_secs(30),
            tag: Some(LIVENESS_TAG.to_string()),
        };

        let task = tokio::spawn(run_publisher(registry(), collect.clone(), options, rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(collect.0.lock().is_empty());

        // First run right after the delay, then one per period
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(collect.0.lock().len(), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(collect.0.lock().len(), 3);

        let reports = collect.0.lock().clone();
        assert!(reports.iter().all(|r| r.entries.len() == 1));

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_during_initial_delay() {
        let collect = Arc::new(Collect::default());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_publisher(
            registry(),
            collect.clone(),
            PublisherOptions::default(),
            rx,
        ));

        drop(tx);
        task.await.unwrap();
        assert!(collect.0.lock().is_empty());
    }
}
