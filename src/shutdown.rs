//! Process-level shutdown signal wiring.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Install SIGINT/SIGTERM handlers and return the token they cancel.
///
/// Every suspension point in the pipeline (fetch, store attempt, retry
/// sleep, DLQ publish) watches this token, so a single cancel unwinds the
/// whole process cleanly.
pub fn install_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        token.cancel();
    });

    cancel
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            // SIGINT still works through ctrl_c below.
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("SIGINT received, shutting down");
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
        _ = term.recv() => info!("SIGTERM received, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
