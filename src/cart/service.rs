use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use super::{CartItem, CartStore};
use crate::error::{Error, Result};
use crate::sampler::Sampler;
use crate::telemetry::{best_effort, DependencyRecord, ExceptionRecord, TelemetrySink};

/// Upper bound (ms) of the random delay applied to every cart read.
pub const READ_DELAY_MAX_MS: i64 = 100;

/// Largest cart id accepted by [`required_item_delay`].
pub const MAX_CART_ID: i64 = 2_000;

/// Cart reads and writes padded with artificial latency, so the telemetry
/// has something to show.
pub struct CartService {
    store: Arc<dyn CartStore>,
    sampler: Arc<dyn Sampler>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl CartService {
    pub fn new(
        store: Arc<dyn CartStore>,
        sampler: Arc<dyn Sampler>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            sampler,
            telemetry,
        }
    }

    pub async fn get_items(&self, cart_id: i64) -> Result<Vec<CartItem>> {
        info!(cart_id, "get request for cart");
        self.random_delay_up_to_ms(READ_DELAY_MAX_MS).await?;
        self.store.items(cart_id).await
    }

    /// Stores `item`, then waits out the delay required for `cart_id`.
    ///
    /// The item stays stored even when the delay is rejected.
    pub async fn add_item(&self, cart_id: i64, item: CartItem) -> Result<()> {
        info!(cart_id, item = ?item, "post request for cart item");
        self.store.add_item(cart_id, item).await?;

        let outcome = match required_item_delay(cart_id) {
            Ok(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!(cart_id, error = %e, "required item delay failed");
            best_effort(
                self.telemetry.track_exception(
                    ExceptionRecord::new(e.kind(), e.to_string())
                        .with_property("cartId", cart_id.to_string()),
                ),
                "exception",
            );
        }
        outcome
    }

    /// Sleeps for a sampled number of milliseconds, recorded as an
    /// in-process dependency so it shows up beneath the request.
    async fn random_delay_up_to_ms(&self, max_ms: i64) -> Result<()> {
        let start_time = Utc::now();
        let timer = Instant::now();

        let outcome = match self.sampler.sample(max_ms) {
            Ok(ms) => {
                tokio::time::sleep(Duration::from_millis(ms.max(0) as u64)).await;
                Ok(ms)
            }
            Err(e) => Err(e),
        };

        let data = match &outcome {
            Ok(ms) => format!("{ms}ms"),
            Err(_) => format!("up to {max_ms}ms"),
        };
        best_effort(
            self.telemetry.track_dependency(DependencyRecord::new(
                "InProc",
                "RandomDelayDependency",
                data,
                start_time,
                timer.elapsed(),
                outcome.is_ok(),
            )),
            "dependency",
        );

        outcome.map(|_| ())
    }
}

/// Fixed delay per cart id band; ids past [`MAX_CART_ID`] are rejected.
pub fn required_item_delay(cart_id: i64) -> Result<Duration> {
    let ms = match cart_id {
        i64::MIN..=500 => 50,
        501..=1_000 => 100,
        1_001..=MAX_CART_ID => 300,
        _ => {
            return Err(Error::invalid_argument(format!(
                "cartId must not be greater than {MAX_CART_ID}"
            )))
        }
    };
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::MemoryCartStore;
    use crate::sampler::WeightedSampler;
    use crate::telemetry::TelemetryHub;

    struct AlwaysFails;

    impl Sampler for AlwaysFails {
        fn sample(&self, max: i64) -> Result<i64> {
            Err(Error::invalid_argument(format!("refusing {max}")))
        }
    }

    fn service(sampler: Arc<dyn Sampler>) -> (CartService, Arc<TelemetryHub>) {
        let hub = Arc::new(TelemetryHub::new());
        let svc = CartService::new(Arc::new(MemoryCartStore::new()), sampler, hub.clone());
        (svc, hub)
    }

    fn item() -> CartItem {
        CartItem {
            name: "kettle".into(),
            quantity: 2,
            price_cents: 2_499,
        }
    }

    #[test]
    fn delay_bands() {
        assert_eq!(required_item_delay(-3).unwrap(), Duration::from_millis(50));
        assert_eq!(required_item_delay(500).unwrap(), Duration::from_millis(50));
        assert_eq!(required_item_delay(501).unwrap(), Duration::from_millis(100));
        assert_eq!(required_item_delay(1_000).unwrap(), Duration::from_millis(100));
        assert_eq!(required_item_delay(2_000).unwrap(), Duration::from_millis(300));
        assert!(matches!(
            required_item_delay(2_001),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn read_records_random_delay_dependency() {
        let (svc, hub) = service(Arc::new(WeightedSampler::seeded(8)));
        svc.add_item(7, item()).await.unwrap();

        assert_eq!(svc.get_items(7).await.unwrap(), vec![item()]);

        let snap = hub.snapshot();
        let delay = snap
            .dependencies
            .iter()
            .find(|d| d.name == "RandomDelayDependency")
            .unwrap();
        assert_eq!(delay.dependency_type, "InProc");
        assert_eq!(delay.calls, 1);
        assert_eq!(delay.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn read_fails_when_sampler_fails() {
        let (svc, hub) = service(Arc::new(AlwaysFails));
        assert!(matches!(
            svc.get_items(1).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(hub.snapshot().failed_dependencies, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_cart_id_keeps_item_and_tracks_exception() {
        let (svc, hub) = service(Arc::new(WeightedSampler::seeded(8)));

        let err = svc.add_item(2_500, item()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let snap = hub.snapshot();
        assert_eq!(snap.total_exceptions, 1);
        let ex = &snap.recent_exceptions[0];
        assert_eq!(ex.kind, "InvalidArgument");
        assert_eq!(ex.properties["cartId"], "2500");

        assert_eq!(svc.get_items(2_500).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn add_waits_for_band_delay() {
        let (svc, _hub) = service(Arc::new(WeightedSampler::seeded(8)));
        let started = tokio::time::Instant::now();
        svc.add_item(1_500, item()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
