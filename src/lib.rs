//! Demo web service for application-performance monitoring.
//!
//! The cart and perf endpoints exist to generate telemetry: every request,
//! every sampled delay and every health probe is reported to a
//! [`TelemetrySink`](telemetry::TelemetrySink). The in-process
//! [`TelemetryHub`](telemetry::TelemetryHub) aggregates it for
//! `/api/telemetry`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod cart;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod load_generator;
pub mod logging;
pub mod middleware;
pub mod perf;
pub mod sampler;
pub mod server;
pub mod telemetry;

use crate::cart::{CartService, CartStore};
use crate::health::{
    CartStoreCheck, DependencyAvailableCheck, HealthCheckRegistry, HealthStatus, LIVENESS_TAG,
};
use crate::perf::PerfWorkload;
use crate::sampler::{
    DependencyTrackingSampler, FailurePolicy, Sampler, SamplerRegistry, WeightedSampler,
};
use crate::telemetry::TelemetryHub;

/// Knobs for [`AppState::new`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StateOptions {
    /// Seeds the sampler (and perf generator with `seed + 1`) when set.
    pub seed: Option<u64>,
    pub failure_policy: FailurePolicy,
}

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// In-process sink every component reports to.
    pub telemetry: Arc<TelemetryHub>,

    /// Where the health check looks for the sampler.
    pub samplers: Arc<SamplerRegistry>,

    pub carts: Arc<CartService>,

    pub perf: Arc<PerfWorkload>,

    pub health: Arc<HealthCheckRegistry>,

    /// Flag checked by every load-generator worker on each iteration.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned load run so `stop` can await it.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AppState {
    /// Wires the sampler stack, services and health checks around `store`.
    pub fn new(options: StateOptions, store: Arc<dyn CartStore>) -> Arc<Self> {
        Self::with_telemetry(options, store, Arc::new(TelemetryHub::new()))
    }

    /// Like [`AppState::new`], reporting to an existing hub.
    pub fn with_telemetry(
        options: StateOptions,
        store: Arc<dyn CartStore>,
        telemetry: Arc<TelemetryHub>,
    ) -> Arc<Self> {
        let weighted = match options.seed {
            Some(seed) => WeightedSampler::seeded(seed),
            None => WeightedSampler::from_entropy(),
        }
        .with_metrics(telemetry.clone());
        let sampler: Arc<dyn Sampler> = Arc::new(
            DependencyTrackingSampler::new(weighted, telemetry.clone())
                .with_policy(options.failure_policy),
        );
        let samplers = Arc::new(SamplerRegistry::with(sampler.clone()));

        let perf = match options.seed {
            Some(seed) => PerfWorkload::seeded(seed.wrapping_add(1)),
            None => PerfWorkload::from_entropy(),
        };

        let mut health = HealthCheckRegistry::new();
        health
            .register(
                "DependencyHealthCheck",
                Arc::new(DependencyAvailableCheck::new(samplers.clone())),
                HealthStatus::Unhealthy,
                &[LIVENESS_TAG],
            )
            .register(
                "CartStoreHealthCheck",
                Arc::new(CartStoreCheck::new(store.clone())),
                HealthStatus::Degraded,
                &["readiness"],
            );

        Arc::new(Self {
            carts: Arc::new(CartService::new(store, sampler, telemetry.clone())),
            telemetry,
            samplers,
            perf: Arc::new(perf),
            health: Arc::new(health),
            load_running: Arc::new(AtomicBool::new(false)),
            load_handle: tokio::sync::Mutex::new(None),
        })
    }
}
