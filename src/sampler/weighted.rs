use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use super::Sampler;
use crate::error::{Error, Result};
use crate::telemetry::{best_effort, MetricSample, TelemetrySink};

/// Percentile weights, applied in this order on every call.
pub const PERCENTILE_STEPS: [u32; 6] = [100, 50, 35, 20, 10, 5];

/// Divisor applied to the summed steps.
pub const NORMALIZER: f64 = 220.0;

/// A uniform integer generator: `uniform(bound)` is in `[0, bound)`,
/// and `0` when `bound == 0`.
pub trait UniformSource: Send {
    fn uniform(&mut self, bound: u64) -> u64;
}

impl<R: RngCore + Send> UniformSource for R {
    fn uniform(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            0
        } else {
            self.gen_range(0..bound)
        }
    }
}

/// Averages six percentile-scaled uniform draws, which piles results up
/// near zero. Used to synthesise latency-like delays.
///
/// The generator sits behind one mutex that is held for all six draws of a
/// call, so a seeded generator yields the same sequence of results no
/// matter how calls are spread across threads.
pub struct WeightedSampler<R = StdRng> {
    source: Mutex<R>,
    metrics: Option<Arc<dyn TelemetrySink>>,
}

impl WeightedSampler<StdRng> {
    /// Reproducible sampler for tests and `--sampler-seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: UniformSource> WeightedSampler<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Mutex::new(source),
            metrics: None,
        }
    }

    /// Emit each intermediate draw as a `sampler.step.p{percent}` metric.
    pub fn with_metrics(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn generate(&self, max: i64) -> Result<i64> {
        if max < 1 {
            return Err(Error::invalid_argument(format!(
                "max must be at least 1, got {max}"
            )));
        }
        let bound = max as u64;

        let mut steps = [0u64; PERCENTILE_STEPS.len()];
        {
            let mut source = self.source.lock();
            for (slot, &percent) in steps.iter_mut().zip(PERCENTILE_STEPS.iter()) {
                *slot = step_for_percentile(&mut *source, percent, bound)?;
            }
        }

        if let Some(sink) = &self.metrics {
            for (&percent, &value) in PERCENTILE_STEPS.iter().zip(steps.iter()) {
                best_effort(
                    sink.track_metric(MetricSample::new(
                        format!("sampler.step.p{percent}"),
                        value as f64,
                    )),
                    "metric",
                );
            }
        }

        // Each step is < bound, so the sum fits comfortably in u128.
        let total: u128 = steps.iter().map(|&s| s as u128).sum();
        Ok((total as f64 / NORMALIZER) as i64)
    }
}

impl<R: UniformSource> Sampler for WeightedSampler<R> {
    fn sample(&self, max: i64) -> Result<i64> {
        self.generate(max)
    }
}

/// One weighted draw: the full range at 100, otherwise `[0, percent% of max)`.
fn step_for_percentile<R: UniformSource + ?Sized>(
    source: &mut R,
    percent: u32,
    max: u64,
) -> Result<u64> {
    match percent {
        100 => Ok(source.uniform(max)),
        0..=99 => {
            let bound = (percent as u128 * max as u128 / 100) as u64;
            Ok(source.uniform(bound))
        }
        _ => Err(Error::invalid_argument(format!(
            "percent must be between 0 and 100, got {percent}"
        ))),
    }
}
