//! Process signals that stop the controller.

use std::io;
use tracing::info;

/// Resolves on the first SIGINT or SIGTERM, returning its name.
#[cfg(unix)]
pub async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    info!(signal = name, "Signal received");
    Ok(name)
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "Signal received");
    Ok("ctrl-c")
}
