//! The daemon loop: one `Mirror::check()` per interval until shutdown.
//!
//! Single-threaded cooperative scheduling: the loop sleeps the interval in
//! short slices so signals stay responsive, then runs one tick. Ticks that
//! would overlap a still-running tick are dropped by the Mirror lock, not
//! queued. A fatal tick error (security gate) performs the one clean
//! shutdown — no `exit()` calls from inside workers.

#![allow(missing_docs)]

use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::signals::SignalHandler;
use crate::logger::jsonl::JsonlConfig;
use crate::logger::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::mirror::service::OsFileService;
use crate::mirror::sync::{Mirror, TickOutcome};

/// Granularity of the sleep loop; bounds signal-reaction latency.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// The mirroring daemon: owns the mirror, the signal flags, and the logger.
pub struct SyncDaemon {
    mirror: Mirror,
    interval: Duration,
    initial_check: bool,
    signals: SignalHandler,
    logger: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    start_time: Instant,
}

impl SyncDaemon {
    /// Build and initialize the daemon from a validated configuration.
    pub fn init(config: &Config) -> Result<Self> {
        let (logger, logger_join) = spawn_logger(JsonlConfig {
            path: config.log_file(),
            ..JsonlConfig::default()
        })?;

        let signals = SignalHandler::new();
        let mirror = Mirror::new(config, Box::new(OsFileService), Some(logger.clone()))?;

        Ok(Self {
            mirror,
            interval: Duration::from_millis(config.mirror.interval_ms),
            initial_check: config.daemon.initial_check,
            signals,
            logger,
            logger_join: Some(logger_join),
            start_time: Instant::now(),
        })
    }

    /// Signal flags, exposed so embedders can request shutdown or sync.
    #[must_use]
    pub fn signals(&self) -> &SignalHandler {
        &self.signals
    }

    /// Run until shutdown is requested or a fatal error occurs.
    pub fn run(&mut self) -> Result<()> {
        self.logger.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mirror_name: self.mirror.mirror_name().to_string(),
        });

        if self.initial_check
            && let Err(e) = self.tick()
        {
            self.finish(&format!("fatal: {e}"));
            return Err(e);
        }

        loop {
            let deadline = Instant::now() + self.interval;

            // Sleep in slices, reacting to signals between them.
            loop {
                if self.signals.should_shutdown() {
                    self.finish("clean shutdown");
                    return Ok(());
                }
                if self.signals.should_sync() {
                    break; // early tick
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep(SLEEP_SLICE.min(deadline - now));
            }

            if let Err(e) = self.tick() {
                self.logger.send(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
                self.finish(&format!("fatal: {e}"));
                return Err(e);
            }
        }
    }

    /// Run one tick; per-tick (non-fatal) failures are logged and swallowed
    /// so the loop retries on the next interval.
    fn tick(&mut self) -> Result<()> {
        match self.mirror.check() {
            Ok(TickOutcome::Completed(report)) => {
                self.logger.send(ActivityEvent::TickCompleted {
                    added: report.added,
                    updated: report.updated,
                    deleted: report.deleted,
                    missing: report.missing,
                    extra: report.extra,
                    failures: report.failures,
                    duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
                });
                Ok(())
            }
            Ok(TickOutcome::Skipped) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.logger.send(ActivityEvent::TickFailed {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
                Ok(())
            }
        }
    }

    fn finish(&mut self, reason: &str) {
        self.logger.send(ActivityEvent::DaemonStopped {
            reason: reason.to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        });
        self.logger.shutdown();
        if let Some(join) = self.logger_join.take() {
            let _ = join.join();
        }
    }
}
