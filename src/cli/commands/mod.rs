pub(super) mod config;
pub(super) mod coordinator;
pub(super) mod put;
pub(super) mod run;
pub(super) mod status;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Blocks until SIGINT or SIGTERM arrives.
pub(super) fn wait_for_shutdown_signal() {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            tracing::warn!("failed to register signal {signal}: {err}");
        }
    }
    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }
    tracing::info!("shutdown signal received");
}
