use std::future::Future;
use std::io;
use std::sync::Once;

static HANDLER_WARNING: Once = Once::new();

/// Resolves when the user presses Ctrl-C.
///
/// When the handler cannot be installed this never resolves, so a failed
/// registration is not mistaken for an interrupt.
pub async fn interrupted() {
    until_signal(tokio::signal::ctrl_c()).await;
}

pub(crate) async fn until_signal<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(error) = signal.await {
        HANDLER_WARNING.call_once(|| {
            tracing::warn!(error = %error, "Ctrl-C handler unavailable; interrupts are disabled");
        });
        std::future::pending::<()>().await;
    }
}
