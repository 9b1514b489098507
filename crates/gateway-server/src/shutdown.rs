//! Graceful shutdown handling for the gateway.
//!
//! A signal cancels the root [`CancellationToken`]. Every connection holds a
//! child of that token, so open sessions cancel their in-flight query and
//! close while axum stops accepting new connections.

use gateway_core::CancellationToken;
use std::future::Future;
use tokio::signal;
use tracing::{error, info};

/// Wait for a shutdown signal, returning its name.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> String {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "ctrl+c",
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<&str>().await
            }
        }
    };

    #[cfg(unix)]
    let sigterm = unix_signal(signal::unix::SignalKind::terminate(), "sigterm");
    #[cfg(unix)]
    let sigint = unix_signal(signal::unix::SignalKind::interrupt(), "sigint");

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&str>();
    #[cfg(not(unix))]
    let sigint = std::future::pending::<&str>();

    let signal_name = tokio::select! {
        name = ctrl_c => name,
        name = sigterm => name,
        name = sigint => name,
    };

    info!(signal = signal_name, "Received shutdown signal");
    signal_name.to_string()
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind, name: &'static str) -> &'static str {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            name
        }
        Err(e) => {
            error!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending().await
        }
    }
}

/// Resolve once `signal` fires, cancelling `token` first
pub fn cancel_on<F>(token: CancellationToken, signal: F) -> impl Future<Output = ()> + Send
where
    F: Future + Send,
{
    async move {
        tokio::select! {
            _ = signal => {
                info!("Shutting down, cancelling open sessions");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_on_signal() {
        let token = CancellationToken::new();
        let child = token.child_token();

        cancel_on(token.clone(), tokio::time::sleep(Duration::from_millis(10))).await;

        assert!(token.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_resolves_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(
            Duration::from_secs(1),
            cancel_on(token, std::future::pending::<()>()),
        )
        .await
        .unwrap();
    }
}
