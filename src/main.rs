use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use apm_demo::cart::{CartStore, MemoryCartStore, RedisCartStore};
use apm_demo::config::Config;
use apm_demo::error::Result;
use apm_demo::health::{run_publisher, TelemetryHealthPublisher};
use apm_demo::telemetry::TelemetryHub;
use apm_demo::{logging, server, AppState};

#[tokio::main]
async fn main() {
    let config = Config::parse();
    let telemetry = Arc::new(TelemetryHub::new());
    if let Err(e) = logging::init(&config, telemetry.clone()) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(2);
    }

    info!("creating and running web host");
    if let Err(e) = run(config, telemetry).await {
        error!(error = %e, "web host failed unexpectedly");
        std::process::exit(1);
    }
}

async fn run(config: Config, telemetry: Arc<TelemetryHub>) -> Result<()> {
    let addr = config.listen_addr()?;
    let publisher_options = config.publisher_options()?;

    // ── 1. Cart store ────────────────────────────────────────────
    let store: Arc<dyn CartStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisCartStore::connect(url).await?),
        None => {
            info!("using in-memory cart store");
            Arc::new(MemoryCartStore::new())
        }
    };

    // ── 2. Shared state ──────────────────────────────────────────
    let state = AppState::with_telemetry(config.state_options(), store, telemetry);

    // ── 3. Health publisher ──────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let publisher = Arc::new(TelemetryHealthPublisher::new(state.telemetry.clone()));
    let publisher_task = tokio::spawn(run_publisher(
        state.health.clone(),
        publisher,
        publisher_options,
        shutdown_rx,
    ));

    // ── 4. Serve ─────────────────────────────────────────────────
    let app = server::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");
    info!("cart       → http://{addr}/cart?cartId=1");
    info!("telemetry  → http://{addr}/api/telemetry/stream");
    info!("health     → http://{addr}/healthz");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = publisher_task.await;
    info!("web host stopped");
    Ok(())
}
