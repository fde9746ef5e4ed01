use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cart::{CartItem, CartService};

/// Cart ids are drawn from `1..=MAX_DRAWN_CART_ID`; ids above 2000 are
/// rejected by the cart service, which keeps exception telemetry flowing.
const MAX_DRAWN_CART_ID: i64 = 2_200;

static PRODUCTS: &[(&str, u64)] = &[
    ("Espresso Beans 1kg", 2_499),
    ("Ceramic Pour-Over", 3_150),
    ("Gooseneck Kettle", 6_900),
    ("Burr Grinder", 12_999),
    ("Paper Filters x100", 599),
    ("Milk Frother", 4_450),
    ("Travel Mug", 1_899),
    ("Cold Brew Jar", 2_275),
];

/// Run parameters, already validated by the HTTP layer.
#[derive(Debug, Clone, Copy)]
pub struct LoadPlan {
    pub concurrency: u32,
    pub duration: Duration,
    /// Percentage of operations that add an item (0–100)
    pub write_pct: u8,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `plan.concurrency` tasks that exercise the cart service until
/// the deadline passes or `running` is cleared.
pub async fn run(running: Arc<AtomicBool>, carts: Arc<CartService>, plan: LoadPlan) {
    let deadline = Instant::now() + plan.duration;
    info!(
        concurrency = plan.concurrency,
        duration = ?plan.duration,
        write_pct = plan.write_pct,
        "load run started"
    );

    let mut handles = Vec::with_capacity(plan.concurrency as usize);
    for worker_id in 0..plan.concurrency {
        let running = running.clone();
        let carts = carts.clone();
        handles.push(tokio::spawn(async move {
            worker(worker_id, running, carts, deadline, plan.write_pct).await
        }));
    }

    let mut operations = 0u64;
    for h in handles {
        operations += h.await.unwrap_or(0);
    }

    running.store(false, Ordering::SeqCst);
    info!(operations, "load run finished");
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    carts: Arc<CartService>,
    deadline: Instant,
    write_pct: u8,
) -> u64 {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut operations = 0u64;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let cart_id = rng.gen_range(1..=MAX_DRAWN_CART_ID);
        let is_write = rng.gen_range(0u8..100) < write_pct;

        let outcome = if is_write {
            carts.add_item(cart_id, random_item(&mut rng)).await
        } else {
            carts.get_items(cart_id).await.map(|_| ())
        };
        if let Err(e) = outcome {
            debug!(worker = id, cart_id, error = %e, "load operation failed");
        }
        operations += 1;
    }

    operations
}

fn random_item(rng: &mut StdRng) -> CartItem {
    let &(name, price_cents) = PRODUCTS.choose(rng).unwrap_or(&PRODUCTS[0]);
    CartItem {
        name: name.to_string(),
        quantity: rng.gen_range(1..=4),
        price_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::MemoryCartStore;
    use crate::sampler::{DependencyTrackingSampler, WeightedSampler};
    use crate::telemetry::TelemetryHub;

    #[tokio::test(start_paused = true)]
    async fn run_drives_telemetry_and_clears_flag() {
        let hub = Arc::new(TelemetryHub::new());
        let sampler = Arc::new(DependencyTrackingSampler::new(
            WeightedSampler::seeded(1),
            hub.clone(),
        ));
        let carts = Arc::new(CartService::new(
            Arc::new(MemoryCartStore::new()),
            sampler,
            hub.clone(),
        ));
        let running = Arc::new(AtomicBool::new(true));

        run(
            running.clone(),
            carts,
            LoadPlan {
                concurrency: 4,
                duration: Duration::from_secs(5),
                write_pct: 50,
            },
        )
        .await;

        assert!(!running.load(Ordering::SeqCst));
        let snap = hub.snapshot();
        assert!(snap.total_dependencies > 0);
        assert!(snap
            .dependencies
            .iter()
            .any(|d| d.name == "GetRandomNumberUpTo"));
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_flag_stops_workers_immediately() {
        let hub = Arc::new(TelemetryHub::new());
        let carts = Arc::new(CartService::new(
            Arc::new(MemoryCartStore::new()),
            Arc::new(WeightedSampler::seeded(1)),
            hub.clone(),
        ));
        let running = Arc::new(AtomicBool::new(false));

        run(
            running,
            carts,
            LoadPlan {
                concurrency: 2,
                duration: Duration::from_secs(60),
                write_pct: 0,
            },
        )
        .await;

        assert_eq!(hub.snapshot().total_dependencies, 0);
    }
}
