pub mod preview;
pub mod run;

use tokio_util::sync::CancellationToken;

/// Ждать Ctrl+C или SIGTERM и отменить `token`. Завершается сама,
/// если `token` отменён кем-то другим.
pub async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, Ctrl+C only");
            None
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match sigterm.as_mut() {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = token.cancelled() => return,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!(error = %e, "Ctrl+C handler failed");
                return;
            }
            tracing::info!("Ctrl+C received, shutting down...");
        }
        _ = terminate => tracing::info!("SIGTERM received, shutting down..."),
    }
    token.cancel();
}
