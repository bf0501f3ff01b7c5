use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::tasks::reconcile;

/// Worker entry point: keeps stored exam lifecycle state in step with the
/// clock on a fixed cadence until a shutdown signal arrives.
pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(reconcile_loop(state.clone(), shutdown_rx));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    if let Err(err) = handle.await {
        tracing::error!(error = %err, "Background task join failed");
    }

    Ok(())
}

async fn reconcile_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick =
        interval(Duration::from_secs(state.settings().scheduler().reconcile_interval_seconds));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = reconcile::run(&state).await {
                    tracing::error!(error = %err, "reconcile run failed");
                }
            }
        }
    }
}
