use std::sync::Arc;

use parking_lot::RwLock;

use super::Sampler;
use crate::error::Result;

/// Something the health check can ask for the sampling capability.
///
/// `Ok(None)` means nothing is registered; `Err` means resolution itself
/// failed.
pub trait SamplerResolver: Send + Sync {
    fn resolve(&self) -> Result<Option<Arc<dyn Sampler>>>;
}

/// Explicit home for the process-wide sampler.
#[derive(Default)]
pub struct SamplerRegistry {
    slot: RwLock<Option<Arc<dyn Sampler>>>,
}

impl SamplerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(sampler: Arc<dyn Sampler>) -> Self {
        Self {
            slot: RwLock::new(Some(sampler)),
        }
    }

    pub fn clear(&self) -> Option<Arc<dyn Sampler>> {
        self.slot.write().take()
    }
}

impl SamplerResolver for SamplerRegistry {
    fn resolve(&self) -> Result<Option<Arc<dyn Sampler>>> {
        Ok(self.slot.read().clone())
    }
}
