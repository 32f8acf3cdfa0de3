//! Signal handling for graceful shutdown.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels a [`CancellationToken`];
//! category pipelines finish the page they are on and stop, and the token
//! refresher exits. A second signal exits immediately.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut signals = {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(term), Ok(hup)) => Some((term, hup)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "Only Ctrl+C will trigger graceful shutdown");
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            {
                match signals.as_mut() {
                    Some((term, hup)) => {
                        tokio::select! {
                            _ = tokio::signal::ctrl_c() => {}
                            _ = term.recv() => {}
                            _ = hup.recv() => {}
                        }
                    }
                    None => {
                        if tokio::signal::ctrl_c().await.is_err() {
                            return;
                        }
                    }
                }
            }

            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }

            let prev = count.fetch_add(1, Ordering::SeqCst);
            if prev == 0 {
                tracing::info!("Received shutdown signal, finishing current pages...");
                tracing::info!("Press Ctrl+C again to force exit");
                handler_token.cancel();
            } else {
                tracing::warn!("Force exit requested");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_tokens_observe_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    /// Signal delivery can't be safely exercised in a shared test binary, so
    /// only check that the handler hands back a live token.
    #[tokio::test]
    async fn install_returns_live_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
    }
}
