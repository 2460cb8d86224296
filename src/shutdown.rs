use tokio_util::sync::CancellationToken;

/// Cancel `token` on Ctrl-C, or SIGTERM on unix.
pub fn install_signal_handlers(token: CancellationToken) {
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight hosts");
            on_interrupt.cancel();
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                if term.recv().await.is_some() {
                    tracing::warn!("terminate received, finishing in-flight hosts");
                    token.cancel();
                }
            }
            Err(e) => tracing::debug!("SIGTERM handler unavailable: {e}"),
        }
    });
    #[cfg(not(unix))]
    drop(token);
}
