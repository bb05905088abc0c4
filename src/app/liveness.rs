use crate::forwarder::Liveness;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Liveness flags backed by plain atomics. The production path sets them
/// from signal handlers; tests set them directly.
#[derive(Debug, Default)]
pub struct FlagLiveness {
    terminate: AtomicBool,
    reconnect: AtomicBool,
}

impl FlagLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn request_reconnect(&self) {
        self.reconnect.store(true, Ordering::SeqCst);
    }
}

impl Liveness for FlagLiveness {
    fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    fn should_reconnect(&self, consume: bool) -> bool {
        if consume {
            self.reconnect.swap(false, Ordering::SeqCst)
        } else {
            self.reconnect.load(Ordering::SeqCst)
        }
    }
}

/// Installs signal-driven liveness: SIGTERM/SIGINT request termination,
/// SIGHUP requests a forced reconnect (re-resolve and re-probe the primary
/// pool). The returned flags are polled by the forwarding loop; nothing here
/// preempts it.
pub fn install_signal_liveness() -> std::io::Result<Arc<FlagLiveness>> {
    let flags = Arc::new(FlagLiveness::new());

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let terminate_flags = Arc::clone(&flags);
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, requesting shutdown"),
                _ = sigint.recv() => info!("received SIGINT, requesting shutdown"),
            }
            terminate_flags.request_terminate();
        });

        let reconnect_flags = Arc::clone(&flags);
        tokio::spawn(async move {
            while sighup.recv().await.is_some() {
                info!("received SIGHUP, requesting reconnect");
                reconnect_flags.request_reconnect();
            }
        });
    }

    #[cfg(not(unix))]
    {
        let terminate_flags = Arc::clone(&flags);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, requesting shutdown");
                terminate_flags.request_terminate();
            }
        });
    }

    Ok(flags)
}
