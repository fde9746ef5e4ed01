//! Synthetic workload behind `GET /perf`: a short async pause, a blocking
//! wait of random length, then a tight CPU loop.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{Error, Result};

const FORCED_ASYNC_DELAY: Duration = Duration::from_millis(11);
const DEFAULT_WAIT_MS: Range<i64> = 300..600;
const VESTIGE_MODULUS: i64 = 1_987;
const VESTIGE_ROUNDS: i64 = 100_000;

pub struct PerfWorkload {
    state: Mutex<PerfState>,
    wait_ms: Range<i64>,
}

struct PerfState {
    rng: StdRng,
    generated: u64,
}

impl PerfWorkload {
    pub fn new(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(PerfState { rng, generated: 0 }),
            wait_ms: DEFAULT_WAIT_MS,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Overrides the blocking wait range (ms, half-open).
    pub fn with_wait_range(mut self, wait_ms: Range<i64>) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    /// Number of blocking waits drawn so far.
    pub fn generated(&self) -> u64 {
        self.state.lock().generated
    }

    pub async fn run(self: &Arc<Self>) -> Result<i64> {
        tokio::time::sleep(FORCED_ASYNC_DELAY).await;

        // The wait blocks its thread on purpose; keep it off the async workers.
        let this = Arc::clone(self);
        let delay = tokio::task::spawn_blocking(move || this.forced_synchronous_wait())
            .await
            .map_err(|e| Error::Internal(format!("blocking wait panicked: {e}")))??;

        Ok(vestige(delay))
    }

    fn forced_synchronous_wait(&self) -> Result<i64> {
        let delay = self.random_between(self.wait_ms.clone())?;
        debug!(delay_ms = delay, "forced synchronous wait");
        std::thread::sleep(Duration::from_millis(delay as u64));
        Ok(delay)
    }

    fn random_between(&self, range: Range<i64>) -> Result<i64> {
        if range.start < 0 || range.is_empty() {
            return Err(Error::invalid_argument(format!(
                "wait range {range:?} must be non-empty and non-negative"
            )));
        }
        let mut state = self.state.lock();
        state.generated += 1;
        Ok(state.rng.gen_range(range))
    }
}

/// Burns a fixed amount of CPU, folding `starter` back into the result.
pub fn vestige(starter: i64) -> i64 {
    let mut v = starter;
    for i in 0..VESTIGE_ROUNDS {
        v = (v + i) % VESTIGE_MODULUS;
    }
    v * 10_000 + starter
}
