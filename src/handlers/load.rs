use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::load_generator::{self, LoadPlan};
use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    /// Number of concurrent Tokio tasks generating load
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How long the run lasts (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Percentage of operations that add a cart item (0–100)
    #[serde(default = "default_write_pct")]
    pub write_pct: u8,
}

fn default_concurrency() -> u32 {
    8
}
fn default_duration() -> u64 {
    30
}
fn default_write_pct() -> u8 {
    30
}

impl LoadConfig {
    fn validate(&self) -> Result<LoadPlan, AppError> {
        if self.concurrency == 0 || self.concurrency > 200 {
            return Err(AppError::BadRequest(
                "concurrency must be between 1 and 200".into(),
            ));
        }
        if self.duration_secs == 0 || self.duration_secs > 300 {
            return Err(AppError::BadRequest(
                "duration_secs must be between 1 and 300".into(),
            ));
        }
        if self.write_pct > 100 {
            return Err(AppError::BadRequest(
                "write_pct must be between 0 and 100".into(),
            ));
        }
        Ok(LoadPlan {
            concurrency: self.concurrency,
            duration: Duration::from_secs(self.duration_secs),
            write_pct: self.write_pct,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LoadStatus {
    pub running: bool,
    pub message: String,
}

// ─── POST /api/load/start ────────────────────────────────────────

pub async fn start_load(
    State(state): State<Arc<AppState>>,
    Json(config): Json<LoadConfig>,
) -> Result<Json<LoadStatus>, AppError> {
    let plan = config.validate()?;

    // Only one run at a time; claim the flag atomically
    if state
        .load_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(AppError::AlreadyRunning);
    }

    let msg = format!(
        "Started: {} workers × {}s, {}% writes / {}% reads",
        plan.concurrency,
        config.duration_secs,
        plan.write_pct,
        100u8.saturating_sub(plan.write_pct),
    );

    let running = state.load_running.clone();
    let carts = state.carts.clone();
    let handle = tokio::spawn(load_generator::run(running, carts, plan));

    // Stash the handle so `stop` can await clean shutdown
    *state.load_handle.lock().await = Some(handle);

    Ok(Json(LoadStatus {
        running: true,
        message: msg,
    }))
}

// ─── POST /api/load/stop ─────────────────────────────────────────

pub async fn stop_load(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    if !state.load_running.load(Ordering::SeqCst) {
        return Json(LoadStatus {
            running: false,
            message: "No load run in progress".into(),
        });
    }

    state.load_running.store(false, Ordering::SeqCst);

    if let Some(handle) = state.load_handle.lock().await.take() {
        // The task may have already finished
        let _ = handle.await;
    }

    Json(LoadStatus {
        running: false,
        message: "Load run stopped".into(),
    })
}

// ─── GET /api/load/status ────────────────────────────────────────

pub async fn load_status(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    let running = state.load_running.load(Ordering::SeqCst);
    Json(LoadStatus {
        running,
        message: if running {
            "Load run in progress".into()
        } else {
            "Idle".into()
        },
    })
}
