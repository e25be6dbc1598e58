//! Signal handling: SIGTERM/SIGINT graceful shutdown and SIGUSR1 immediate
//! sync trigger.
//!
//! Uses the `signal-hook` crate for safe signal registration. The daemon loop
//! polls `SignalHandler` flags between sleep slices rather than blocking on
//! signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Thread-safe signal state shared between the signal handler and the loop.
///
/// Flags use `Ordering::Relaxed`: the loop polls them every iteration and no
/// ordering with other atomics is required.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    sync_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// SIGTERM/SIGINT -> shutdown, SIGUSR1 -> immediate sync (Unix only).
    /// Registration is best-effort; failures go to stderr but are not fatal.
    #[must_use]
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// Bare flags without OS hooks, for programmatic use and tests.
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            sync_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether a shutdown has been requested.
    #[must_use]
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check (and clear) whether an immediate sync has been requested.
    #[must_use]
    pub fn should_sync(&self) -> bool {
        self.sync_flag.swap(false, Ordering::Relaxed)
    }

    /// Programmatically request shutdown (e.g. after a fatal tick error).
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Programmatically request an immediate sync.
    pub fn request_sync(&self) {
        self.sync_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[DMR-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[DMR-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::SIGUSR1;
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.sync_flag)) {
                eprintln!("[DMR-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
