use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::percentiles::PercentileSet;
use super::{
    AvailabilityRecord, DependencyRecord, ExceptionRecord, MetricSample, RequestRecord,
    TelemetrySink, TraceRecord,
};
use crate::error::Result;

// ─── Configuration ───────────────────────────────────────────────

/// Length of each live feed in the snapshot
const MAX_RECENT: usize = 100;

/// Aggregate timeline resolution (one point per window)
const TIMELINE_WINDOW_MS: u64 = 500;

/// Oldest timeline points are dropped past this many windows (~10 min)
const MAX_TIMELINE_POINTS: usize = 1_200;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures.
/// Longer durations are recorded as `HIST_HIGH`.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// In-process telemetry sink.
///
/// Every `track_*` call folds the record into aggregates under a single lock
/// and mirrors it to the log at `debug`. The HTTP layer serves
/// [`TelemetryHub::snapshot`] as JSON and over SSE.
pub struct TelemetryHub {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_us: u64,
    pub thread_id: String,
    pub thread_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub dependency_type: String,
    pub name: String,
    pub data: String,
    pub duration_us: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptionEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub message: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub run_location: String,
    pub duration_us: u64,
    pub success: bool,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Call counts and latency for one `(dependency_type, name)` pair.
#[derive(Debug, Clone, Serialize)]
pub struct DependencySummary {
    pub dependency_type: String,
    pub name: String,
    pub calls: u64,
    pub failures: u64,
    pub duration: PercentileSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// One aggregated point on the timeline chart (per 500 ms window).
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub timestamp_ms: u64,
    pub requests: u64,
    pub avg_request_us: f64,
    pub dependencies: u64,
    pub avg_dependency_us: f64,
}

/// A bucket in the request latency distribution.
#[derive(Debug, Clone, Serialize)]
pub struct DistBucket {
    pub range_start_us: u64,
    pub range_end_us: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub requests: PercentileSet,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub requests_per_sec: f64,
    pub elapsed_secs: f64,

    pub dependencies: Vec<DependencySummary>,
    pub total_dependencies: u64,
    pub failed_dependencies: u64,

    pub metrics: Vec<MetricSummary>,
    pub total_exceptions: u64,
    pub total_availability: u64,
    pub total_traces: u64,

    pub recent_requests: Vec<RequestEntry>,
    pub recent_dependencies: Vec<DependencyEntry>,
    pub recent_exceptions: Vec<ExceptionEntry>,
    pub recent_availability: Vec<AvailabilityEntry>,
    pub recent_traces: Vec<TraceEntry>,

    pub timeline: Vec<TimelinePoint>,
    pub distribution: Vec<DistBucket>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    request_hist: Histogram<u64>,
    dependencies: BTreeMap<(String, String), DependencyStats>,
    metrics: BTreeMap<String, MetricAggregate>,

    total_requests: u64,
    failed_requests: u64,
    total_dependencies: u64,
    failed_dependencies: u64,
    total_exceptions: u64,
    total_availability: u64,
    total_traces: u64,

    recent_requests: VecDeque<RequestEntry>,
    recent_dependencies: VecDeque<DependencyEntry>,
    recent_exceptions: VecDeque<ExceptionEntry>,
    recent_availability: VecDeque<AvailabilityEntry>,
    recent_traces: VecDeque<TraceEntry>,

    timeline: VecDeque<TimelinePoint>,
    current_window: Option<WindowAccumulator>,

    start_time: Option<Instant>,
}

struct DependencyStats {
    calls: u64,
    failures: u64,
    hist: Histogram<u64>,
}

struct MetricAggregate {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

#[derive(Default)]
struct WindowAccumulator {
    window_start_ms: u64,
    request_sum: u64,
    request_count: u64,
    dependency_sum: u64,
    dependency_count: u64,
}

impl WindowAccumulator {
    fn to_point(&self) -> TimelinePoint {
        TimelinePoint {
            timestamp_ms: self.window_start_ms,
            requests: self.request_count,
            avg_request_us: average(self.request_sum, self.request_count),
            dependencies: self.dependency_count,
            avg_dependency_us: average(self.dependency_sum, self.dependency_count),
        }
    }
}

enum Observation {
    Request(u64),
    Dependency(u64),
}

// ─── TelemetryHub impl ───────────────────────────────────────────

impl TelemetryHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Wipe all aggregates and feeds.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for TelemetryHub {
    fn track_dependency(&self, record: DependencyRecord) -> Result<()> {
        debug!(
            dependency_type = %record.dependency_type,
            name = %record.name,
            data = %record.data,
            duration_us = record.duration.as_micros() as u64,
            success = record.success,
            "dependency"
        );
        self.inner.lock().record_dependency(record);
        Ok(())
    }

    fn track_metric(&self, sample: MetricSample) -> Result<()> {
        debug!(name = %sample.name, value = sample.value, "metric");
        self.inner.lock().record_metric(sample);
        Ok(())
    }

    fn track_request(&self, record: RequestRecord) -> Result<()> {
        debug!(
            method = %record.method,
            path = %record.path,
            status = record.status,
            duration_us = record.duration.as_micros() as u64,
            thread_id = %record.thread_id,
            "request"
        );
        self.inner.lock().record_request(record);
        Ok(())
    }

    fn track_exception(&self, record: ExceptionRecord) -> Result<()> {
        debug!(kind = %record.kind, message = %record.message, "exception");
        self.inner.lock().record_exception(record);
        Ok(())
    }

    fn track_availability(&self, record: AvailabilityRecord) -> Result<()> {
        debug!(
            name = %record.name,
            run_location = %record.run_location,
            success = record.success,
            "availability"
        );
        self.inner.lock().record_availability(record);
        Ok(())
    }

    // Not mirrored to the log: traces come from the log in the first place.
    fn track_trace(&self, record: TraceRecord) -> Result<()> {
        self.inner.lock().record_trace(record);
        Ok(())
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram creation")
}

fn micros(d: Duration) -> u64 {
    d.as_micros().min(u64::MAX as u128) as u64
}

fn average(sum: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn push_bounded<T>(feed: &mut VecDeque<T>, item: T) {
    feed.push_back(item);
    if feed.len() > MAX_RECENT {
        feed.pop_front();
    }
}

impl Inner {
    fn new() -> Self {
        Self {
            request_hist: new_histogram(),
            dependencies: BTreeMap::new(),
            metrics: BTreeMap::new(),
            total_requests: 0,
            failed_requests: 0,
            total_dependencies: 0,
            failed_dependencies: 0,
            total_exceptions: 0,
            total_availability: 0,
            total_traces: 0,
            recent_requests: VecDeque::with_capacity(MAX_RECENT + 1),
            recent_dependencies: VecDeque::with_capacity(MAX_RECENT + 1),
            recent_exceptions: VecDeque::with_capacity(MAX_RECENT + 1),
            recent_availability: VecDeque::with_capacity(MAX_RECENT + 1),
            recent_traces: VecDeque::with_capacity(MAX_RECENT + 1),
            timeline: VecDeque::with_capacity(64),
            current_window: None,
            start_time: None,
        }
    }

    /// Milliseconds since the first record, anchoring the clock lazily.
    fn elapsed_ms(&mut self) -> u64 {
        let start = *self.start_time.get_or_insert_with(Instant::now);
        start.elapsed().as_millis() as u64
    }

    fn record_request(&mut self, record: RequestRecord) {
        let elapsed_ms = self.elapsed_ms();
        let duration_us = micros(record.duration);

        self.total_requests += 1;
        if !record.success() {
            self.failed_requests += 1;
        }
        self.request_hist.saturating_record(duration_us.max(HIST_LOW));
        self.push_to_timeline(elapsed_ms, Observation::Request(duration_us));

        push_bounded(
            &mut self.recent_requests,
            RequestEntry {
                id: record.id,
                timestamp: record.start_time,
                method: record.method,
                path: record.path,
                status: record.status,
                duration_us,
                thread_id: record.thread_id,
                thread_name: record.thread_name,
            },
        );
    }

    fn record_dependency(&mut self, record: DependencyRecord) {
        let elapsed_ms = self.elapsed_ms();
        let duration_us = micros(record.duration);

        self.total_dependencies += 1;
        if !record.success {
            self.failed_dependencies += 1;
        }

        let stats = self
            .dependencies
            .entry((record.dependency_type.clone(), record.name.clone()))
            .or_insert_with(|| DependencyStats {
                calls: 0,
                failures: 0,
                hist: new_histogram(),
            });
        stats.calls += 1;
        if !record.success {
            stats.failures += 1;
        }
        stats.hist.saturating_record(duration_us.max(HIST_LOW));

        self.push_to_timeline(elapsed_ms, Observation::Dependency(duration_us));

        push_bounded(
            &mut self.recent_dependencies,
            DependencyEntry {
                id: record.id,
                timestamp: record.start_time,
                dependency_type: record.dependency_type,
                name: record.name,
                data: record.data,
                duration_us,
                success: record.success,
            },
        );
    }

    fn record_metric(&mut self, sample: MetricSample) {
        let agg = self
            .metrics
            .entry(sample.name)
            .or_insert_with(|| MetricAggregate {
                count: 0,
                sum: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            });
        agg.count += 1;
        agg.sum += sample.value;
        agg.min = agg.min.min(sample.value);
        agg.max = agg.max.max(sample.value);
    }

    fn record_exception(&mut self, record: ExceptionRecord) {
        self.total_exceptions += 1;
        push_bounded(
            &mut self.recent_exceptions,
            ExceptionEntry {
                id: record.id,
                timestamp: record.timestamp,
                kind: record.kind,
                message: record.message,
                properties: record.properties,
            },
        );
    }

    fn record_availability(&mut self, record: AvailabilityRecord) {
        self.total_availability += 1;
        push_bounded(
            &mut self.recent_availability,
            AvailabilityEntry {
                id: record.id,
                timestamp: record.timestamp,
                name: record.name,
                run_location: record.run_location,
                duration_us: micros(record.duration),
                success: record.success,
                properties: record.properties,
            },
        );
    }

    fn record_trace(&mut self, record: TraceRecord) {
        self.total_traces += 1;
        push_bounded(
            &mut self.recent_traces,
            TraceEntry {
                id: record.id,
                timestamp: record.timestamp,
                level: record.level,
                target: record.target,
                message: record.message,
                fields: record.fields,
            },
        );
    }

    /// Bucket the observation into the current 500 ms window, or roll over.
    fn push_to_timeline(&mut self, elapsed_ms: u64, obs: Observation) {
        let window_start = (elapsed_ms / TIMELINE_WINDOW_MS) * TIMELINE_WINDOW_MS;

        let rolled = self
            .current_window
            .as_ref()
            .is_some_and(|w| w.window_start_ms != window_start);
        if let Some(old) = rolled.then(|| self.current_window.take()).flatten() {
            self.timeline.push_back(old.to_point());
            if self.timeline.len() > MAX_TIMELINE_POINTS {
                self.timeline.pop_front();
            }
        }

        let w = self.current_window.get_or_insert_with(|| WindowAccumulator {
            window_start_ms: window_start,
            ..Default::default()
        });
        match obs {
            Observation::Request(us) => {
                w.request_sum += us;
                w.request_count += 1;
            }
            Observation::Dependency(us) => {
                w.dependency_sum += us;
                w.dependency_count += 1;
            }
        }
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let rps = if elapsed_secs > 0.0 {
            self.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        // Include the current (partial) window
        let mut timeline: Vec<TimelinePoint> = self.timeline.iter().cloned().collect();
        if let Some(w) = &self.current_window {
            timeline.push(w.to_point());
        }

        let dependencies = self
            .dependencies
            .iter()
            .map(|((dependency_type, name), stats)| DependencySummary {
                dependency_type: dependency_type.clone(),
                name: name.clone(),
                calls: stats.calls,
                failures: stats.failures,
                duration: PercentileSet::from_histogram(&stats.hist),
            })
            .collect();

        let metrics = self
            .metrics
            .iter()
            .map(|(name, agg)| MetricSummary {
                name: name.clone(),
                count: agg.count,
                sum: agg.sum,
                min: agg.min,
                max: agg.max,
                mean: agg.sum / agg.count as f64,
            })
            .collect();

        TelemetrySnapshot {
            requests: PercentileSet::from_histogram(&self.request_hist),
            total_requests: self.total_requests,
            failed_requests: self.failed_requests,
            requests_per_sec: rps,
            elapsed_secs,

            dependencies,
            total_dependencies: self.total_dependencies,
            failed_dependencies: self.failed_dependencies,

            metrics,
            total_exceptions: self.total_exceptions,
            total_availability: self.total_availability,
            total_traces: self.total_traces,

            recent_requests: self.recent_requests.iter().cloned().collect(),
            recent_dependencies: self.recent_dependencies.iter().cloned().collect(),
            recent_exceptions: self.recent_exceptions.iter().cloned().collect(),
            recent_availability: self.recent_availability.iter().cloned().collect(),
            recent_traces: self.recent_traces.iter().cloned().collect(),

            timeline,
            distribution: Self::compute_distribution(&self.request_hist),
        }
    }

    // ── Request latency distribution ────────────────────────────

    /// Bucket boundaries (μs), sized for the cart and perf delays.
    const DIST_BOUNDARIES: &'static [u64] = &[
        1_000, 5_000, 10_000, 25_000, 50_000, 75_000, 100_000, 150_000, 250_000,
        350_000, 500_000, 750_000, 1_000_000,
    ];

    fn compute_distribution(hist: &Histogram<u64>) -> Vec<DistBucket> {
        if hist.len() == 0 {
            return Vec::new();
        }

        let bounds = Self::DIST_BOUNDARIES;
        let mut counts = vec![0u64; bounds.len() + 1];

        for iv in hist.iter_recorded() {
            let val = iv.value_iterated_to();
            // First boundary >= val; past the end lands in the overflow slot
            let idx = bounds.partition_point(|&b| b < val);
            counts[idx] += iv.count_at_value();
        }

        let mut result = Vec::new();
        let mut prev = 0u64;
        for (i, &boundary) in bounds.iter().enumerate() {
            if counts[i] > 0 {
                result.push(DistBucket {
                    range_start_us: prev,
                    range_end_us: boundary,
                    count: counts[i],
                });
            }
            prev = boundary;
        }
        if counts[bounds.len()] > 0 {
            result.push(DistBucket {
                range_start_us: prev,
                range_end_us: hist.max(),
                count: counts[bounds.len()],
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: u16, ms: u64) -> RequestRecord {
        RequestRecord {
            id: Uuid::new_v4(),
            method: "GET".into(),
            path: "/cart".into(),
            status,
            start_time: Utc::now(),
            duration: Duration::from_millis(ms),
            thread_id: "ThreadId(1)".into(),
            thread_name: Some("tokio-runtime-worker".into()),
        }
    }

    #[test]
    fn dependencies_are_grouped_by_type_and_name() {
        let hub = TelemetryHub::new();
        for success in [true, true, false] {
            hub.track_dependency(DependencyRecord::new(
                "RandomNumberProvider",
                "GetRandomNumberUpTo",
                "100",
                Utc::now(),
                Duration::from_micros(40),
                success,
            ))
            .unwrap();
        }
        hub.track_dependency(DependencyRecord::new(
            "InProc",
            "RandomDelayDependency",
            "",
            Utc::now(),
            Duration::from_millis(3),
            true,
        ))
        .unwrap();

        let snap = hub.snapshot();
        assert_eq!(snap.total_dependencies, 4);
        assert_eq!(snap.failed_dependencies, 1);
        assert_eq!(snap.dependencies.len(), 2);

        let sampler = snap
            .dependencies
            .iter()
            .find(|d| d.name == "GetRandomNumberUpTo")
            .unwrap();
        assert_eq!(sampler.calls, 3);
        assert_eq!(sampler.failures, 1);
        assert_eq!(sampler.duration.count, 3);
    }

    #[test]
    fn request_failures_follow_status_code() {
        let hub = TelemetryHub::new();
        hub.track_request(request(200, 5)).unwrap();
        hub.track_request(request(400, 5)).unwrap();
        hub.track_request(request(503, 5)).unwrap();

        let snap = hub.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.failed_requests, 2);
        assert_eq!(snap.recent_requests.len(), 3);
        assert_eq!(snap.timeline.iter().map(|p| p.requests).sum::<u64>(), 3);
    }

    #[test]
    fn metric_aggregates_track_extremes() {
        let hub = TelemetryHub::new();
        for v in [4.0, 1.0, 7.0] {
            hub.track_metric(MetricSample::new("sampler.step.p50", v))
                .unwrap();
        }

        let snap = hub.snapshot();
        let m = &snap.metrics[0];
        assert_eq!(m.count, 3);
        assert_eq!(m.min, 1.0);
        assert_eq!(m.max, 7.0);
        assert!((m.mean - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recent_feeds_are_bounded() {
        let hub = TelemetryHub::new();
        for _ in 0..(MAX_RECENT + 25) {
            hub.track_exception(ExceptionRecord::new("InvalidArgument", "boom"))
                .unwrap();
        }
        let snap = hub.snapshot();
        assert_eq!(snap.total_exceptions, (MAX_RECENT + 25) as u64);
        assert_eq!(snap.recent_exceptions.len(), MAX_RECENT);
    }

    #[test]
    fn distribution_buckets_cover_every_request() {
        let hub = TelemetryHub::new();
        for ms in [2, 2, 60, 320, 2_000] {
            hub.track_request(request(200, ms)).unwrap();
        }
        let snap = hub.snapshot();
        let total: u64 = snap.distribution.iter().map(|b| b.count).sum();
        assert_eq!(total, 5);
        let overflow = snap.distribution.last().unwrap();
        assert_eq!(overflow.range_start_us, 1_000_000);
    }

    #[test]
    fn reset_clears_everything() {
        let hub = TelemetryHub::new();
        hub.track_request(request(200, 1)).unwrap();
        hub.reset();
        let snap = hub.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert!(snap.timeline.is_empty());
        assert_eq!(snap.requests.count, 0);
    }

    #[test]
    fn durations_past_histogram_range_still_count() {
        let hub = TelemetryHub::new();
        hub.track_request(request(200, 90_000)).unwrap();
        hub.track_dependency(DependencyRecord::new(
            "InProc",
            "RandomDelayDependency",
            "",
            Utc::now(),
            Duration::from_secs(75),
            true,
        ))
        .unwrap();

        let snap = hub.snapshot();
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.requests.count, 1);
        assert!(snap.requests.max >= HIST_HIGH / 2);
        assert_eq!(snap.distribution.iter().map(|b| b.count).sum::<u64>(), 1);
        assert_eq!(snap.dependencies[0].calls, 1);
        assert_eq!(snap.dependencies[0].duration.count, 1);
        // The raw duration survives in the feed
        assert_eq!(snap.recent_requests[0].duration_us, 90_000_000);
    }

    #[test]
    fn traces_land_in_their_own_feed() {
        let hub = TelemetryHub::new();
        hub.track_trace(TraceRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: "INFO".into(),
            target: "apm_demo".into(),
            message: "server listening".into(),
            fields: BTreeMap::from([("addr".to_string(), "0.0.0.0:3000".to_string())]),
        })
        .unwrap();

        let snap = hub.snapshot();
        assert_eq!(snap.total_traces, 1);
        assert_eq!(snap.recent_traces[0].message, "server listening");
        assert_eq!(snap.recent_traces[0].fields["addr"], "0.0.0.0:3000");
    }
}
