use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{HealthCheck, HealthCheckResult};
use crate::cart::CartStore;
use crate::sampler::{SamplerResolver, CAPABILITY_NAME};

/// Healthy while the sampler can be resolved from the registry.
pub struct DependencyAvailableCheck {
    resolver: Arc<dyn SamplerResolver>,
}

impl DependencyAvailableCheck {
    pub fn new(resolver: Arc<dyn SamplerResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl HealthCheck for DependencyAvailableCheck {
    async fn check_health(&self) -> HealthCheckResult {
        match self.resolver.resolve() {
            Ok(Some(_)) => HealthCheckResult::healthy(),
            Ok(None) => HealthCheckResult::unhealthy(format!(
                "Unable to resolve {CAPABILITY_NAME} from registry."
            )),
            Err(e) => {
                warn!(error = %e, "sampler resolution failed");
                HealthCheckResult::unhealthy(format!(
                    "Error while attempting to resolve {CAPABILITY_NAME}"
                ))
                .with_error(e)
            }
        }
    }
}

/// Healthy while the cart store answers a ping.
pub struct CartStoreCheck {
    store: Arc<dyn CartStore>,
}

impl CartStoreCheck {
    pub fn new(store: Arc<dyn CartStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheck for CartStoreCheck {
    async fn check_health(&self) -> HealthCheckResult {
        match self.store.ping().await {
            Ok(()) => HealthCheckResult::healthy(),
            Err(e) => HealthCheckResult::unhealthy("Cart store did not answer ping").with_error(e),
        }
    }
}
