//! Cooperative shutdown.
//!
//! A [`ShutdownHandle`] is a cloneable flag shared by a session, its
//! reconnect sleeps and whoever wants to stop it. The session loop checks it
//! between frames and after every suspension point; in-flight handlers are
//! allowed to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

/// Shared stop flag.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once shutdown is requested, immediately if it already was.
    ///
    /// The future does not borrow the handle, so it can sit in a `select!`
    /// next to calls that need `&mut` access to the handle's owner.
    pub fn triggered(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.flag.subscribe();
        async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Every handle is gone; nothing can trigger any more.
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    /// Sleeps for `delay`. Returns false if shutdown was requested first.
    pub async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_shutdown(),
            _ = self.triggered() => false,
        }
    }

    /// Requests shutdown on Ctrl-C, and on SIGTERM on Unix.
    pub fn listen_for_signals(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Some(signal) = next_signal().await {
                info!(signal, "shutting down");
                handle.trigger();
            }
        });
    }
}

/// Waits for a termination signal and returns its name.
///
/// Returns `None` if no signal listener could be installed.
#[cfg(unix)]
async fn next_signal() -> Option<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = sigterm.recv() => Some("SIGTERM"),
            ctrl_c = tokio::signal::ctrl_c() => ctrl_c_result(ctrl_c),
        },
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            ctrl_c_result(tokio::signal::ctrl_c().await)
        }
    }
}

#[cfg(not(unix))]
async fn next_signal() -> Option<&'static str> {
    ctrl_c_result(tokio::signal::ctrl_c().await)
}

fn ctrl_c_result(result: std::io::Result<()>) -> Option<&'static str> {
    match result {
        Ok(()) => Some("Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let session_side = ShutdownHandle::new();
        let caller_side = session_side.clone();
        assert!(!session_side.is_shutdown());

        caller_side.trigger();
        caller_side.trigger();
        assert!(session_side.is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn triggered_resolves_on_trigger() {
        let handle = ShutdownHandle::new();
        let pending = handle.triggered();
        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.trigger();
        });

        assert!(tokio::time::timeout(Duration::from_secs(10), pending).await.is_ok());
        // Already triggered: resolves at once.
        assert!(tokio::time::timeout(Duration::ZERO, handle.triggered()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short() {
        let handle = ShutdownHandle::new();
        assert!(handle.sleep(Duration::from_secs(1)).await);

        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.trigger();
        });
        let started = tokio::time::Instant::now();
        assert!(!handle.sleep(Duration::from_secs(60)).await);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }
}
