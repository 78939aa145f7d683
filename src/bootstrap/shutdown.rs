use tokio_util::sync::CancellationToken;
use tracing::info;

/// Create the root cancellation token and cancel it on SIGINT/SIGTERM.
///
/// Every background component holds a clone; the ordered drain on shutdown
/// is the caller's responsibility.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();

    let signaller = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        signaller.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
