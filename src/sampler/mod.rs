//! Bounded, low-skewed random numbers plus the telemetry decorator around them.
//!
//! ```text
//!   caller ──▶ DependencyTrackingSampler ──▶ WeightedSampler ──▶ UniformSource
//!                     │                          │
//!                     ▼                          ▼ (optional)
//!              DependencyRecord             MetricSample × 6
//!                     └──────────▶ TelemetrySink ◀──┘
//! ```

pub mod instrumented;
pub mod registry;
pub mod weighted;

use std::sync::Arc;

use crate::error::Result;

pub use instrumented::{DependencyTrackingSampler, FailurePolicy};
pub use registry::{SamplerRegistry, SamplerResolver};
pub use weighted::{UniformSource, WeightedSampler};

/// Capability name used in dependency records and health diagnostics.
pub const CAPABILITY_NAME: &str = "RandomNumberProvider";

/// Produces a pseudo-random integer in `[0, max)`.
///
/// Implementations must reject `max < 1` with
/// [`Error::InvalidArgument`](crate::error::Error::InvalidArgument).
pub trait Sampler: Send + Sync {
    fn sample(&self, max: i64) -> Result<i64>;
}

impl<S: Sampler + ?Sized> Sampler for Arc<S> {
    fn sample(&self, max: i64) -> Result<i64> {
        (**self).sample(max)
    }
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    fn sample(&self, max: i64) -> Result<i64> {
        (**self).sample(max)
    }
}
