//! Graceful shutdown.
//!
//! The first SIGINT / SIGTERM / SIGHUP cancels the returned token: the
//! scheduler stops waiting, and a running cycle stops before the next user.
//! A second signal exits immediately; every write is idempotent, so the next
//! start simply re-syncs.

use tokio_util::sync::CancellationToken;

/// Register signal listeners and return the token they cancel.
///
/// Must be called inside a tokio runtime.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate())?,
            signal(SignalKind::hangup())?,
        )
    };

    let handler_token = token.clone();
    tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            #[cfg(unix)]
            let ok = tokio::select! {
                r = tokio::signal::ctrl_c() => r.is_ok(),
                s = sigterm.recv() => s.is_some(),
                s = sighup.recv() => s.is_some(),
            };
            #[cfg(not(unix))]
            let ok = tokio::signal::ctrl_c().await.is_ok();

            if !ok {
                tracing::warn!("Signal listener closed; shutdown must come from the process manager");
                return;
            }

            received += 1;
            if received == 1 {
                tracing::info!("Shutdown requested, finishing the current user (signal again to force)");
                handler_token.cancel();
            } else {
                tracing::warn!("Force exit requested");
                std::process::exit(130);
            }
        }
    });

    Ok(token)
}
