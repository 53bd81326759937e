use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::tasks::{maintenance, marking};

const STALE_JOB_CHECK_SECONDS: u64 = 300;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let concurrency = state.settings().worker().marking_worker_concurrency.max(1);

    let mut handles = Vec::with_capacity(concurrency + 2);

    for _ in 0..concurrency {
        handles.push(tokio::spawn(marking_worker(state.clone(), shutdown_rx.clone())));
    }

    handles.push(tokio::spawn(sweep_loop(state.clone(), shutdown_rx.clone())));
    handles.push(tokio::spawn(stale_jobs_loop(state.clone(), shutdown_rx.clone())));

    tracing::info!(marking_workers = concurrency, "Background worker started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn marking_worker(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let poll = Duration::from_secs(state.settings().worker().marking_poll_interval_seconds.max(1));

    loop {
        if *shutdown.borrow() {
            break;
        }

        match marking::process_next(&state).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => tracing::error!(error = %err, "Marking worker iteration failed"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll) => {}
        }
    }
}

async fn sweep_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period =
        Duration::from_secs(state.settings().worker().expiry_sweep_interval_seconds.max(1));
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::sweep_attempts(&state).await {
                    tracing::error!(error = %err, "sweep_attempts failed");
                }
            }
        }
    }
}

async fn stale_jobs_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(STALE_JOB_CHECK_SECONDS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::release_stale_marking_jobs(&state).await {
                    tracing::error!(error = %err, "release_stale_marking_jobs failed");
                }
            }
        }
    }
}
