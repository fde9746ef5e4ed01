use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{trace, warn};

use super::{Sampler, CAPABILITY_NAME};
use crate::error::Result;
use crate::telemetry::{best_effort, DependencyRecord, TelemetrySink};

/// Operation name recorded for every decorated call.
pub const OPERATION_NAME: &str = "GetRandomNumberUpTo";

/// What the decorator hands back when the wrapped sampler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return the wrapped error to the caller.
    #[default]
    Propagate,
    /// Hide the error and return `max - 1`. Kept for compatibility with
    /// callers that expect the sampler never to fail.
    FallbackToMaxMinusOne,
}

/// Wraps any [`Sampler`] and reports one [`DependencyRecord`] per call.
///
/// Only the delegated call is timed; emitting the record happens afterwards
/// and holds no lock, so a slow sink never serialises concurrent callers.
pub struct DependencyTrackingSampler<S> {
    inner: S,
    sink: Arc<dyn TelemetrySink>,
    policy: FailurePolicy,
}

impl<S: Sampler> DependencyTrackingSampler<S> {
    pub fn new(inner: S, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            inner,
            sink,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<S: Sampler> Sampler for DependencyTrackingSampler<S> {
    fn sample(&self, max: i64) -> Result<i64> {
        trace!(operation = OPERATION_NAME, "operation started");
        let start_time = Utc::now();
        let timer = Instant::now();
        let outcome = self.inner.sample(max);
        let duration = timer.elapsed();
        trace!(operation = OPERATION_NAME, "operation ended");

        best_effort(
            self.sink.track_dependency(DependencyRecord::new(
                CAPABILITY_NAME,
                OPERATION_NAME,
                max.to_string(),
                start_time,
                duration,
                outcome.is_ok(),
            )),
            "dependency",
        );

        match (outcome, self.policy) {
            (Ok(value), _) => Ok(value),
            (Err(e), FailurePolicy::Propagate) => Err(e),
            (Err(e), FailurePolicy::FallbackToMaxMinusOne) => {
                warn!(max, error = %e, "sampler failed, substituting max - 1");
                Ok(max.saturating_sub(1))
            }
        }
    }
}
