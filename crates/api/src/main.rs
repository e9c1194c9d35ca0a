mod error;
mod middleware;
mod observability;
mod realtime;
mod routes;
mod state;
mod validation;

use std::net::SocketAddr;
use std::time::Duration;

use duet_domain::jobs::now_ms;
use duet_infra::{config::AppConfig, logging::init_tracing};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    observability::init_metrics()?;

    let state = state::AppState::new(config.clone()).await?;
    spawn_auto_complete_sweep(state.clone());
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|err| {
        tracing::error!(error = %err, "server exited");
        err
    })?;

    Ok(())
}

/// Periodic sweep that resolves support requests stuck in a one-sided
/// close. It runs in-process so completions fan out over the same realtime
/// hub the user-driven transitions use.
fn spawn_auto_complete_sweep(state: state::AppState) {
    let interval_ms = state.config.support_sweep_interval_ms.max(1_000);
    tokio::spawn(async move {
        let service = state.support_service();
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.auto_complete_sweep(now_ms()).await {
                Ok(completed) => {
                    observability::register_sweep_run(completed);
                    if completed > 0 {
                        info!(completed, "auto-complete sweep resolved requests");
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "auto-complete sweep failed");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
