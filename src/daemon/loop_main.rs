//! Scheduled sweep loop: cron-driven cleanup passes until shutdown.
//!
//! Single-task architecture: the loop computes the next cron fire, sleeps
//! until then, runs one cleanup pass, and goes back to sleep. SIGINT and
//! SIGTERM end the loop between passes; a pass that is already underway
//! finishes before the daemon stops.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::cleaner::Cleaner;
use crate::client::{HostClient, RuntimeClient};
use crate::core::config::Config;
use crate::core::errors::{DswError, Result};
use crate::core::resource::RunMode;
use crate::daemon::notifications::{NotificationEvent, NotificationManager};
use crate::schedule::Schedule;

// ──────────────────── sweep daemon ────────────────────

/// Longest single sleep. Waits beyond this are chunked so the wall clock is
/// re-read at least daily and the fire time recomputed from it.
const MAX_SLEEP_CHUNK: Duration = Duration::from_secs(24 * 60 * 60);

/// Long-running scheduler around [`Cleaner`].
///
/// The daemon never escalates a pass on its own: whether scheduled passes are
/// destructive comes from the config, and a failed pass simply waits for the
/// next fire.
pub struct SweepDaemon {
    config: Config,
    schedule: Schedule,
    cleaner: Cleaner,
    notifier: NotificationManager,
    started_at: Instant,
    passes_completed: u64,
    passes_failed: u64,
}

impl SweepDaemon {
    pub fn new(
        config: Config,
        runtime: Arc<dyn RuntimeClient>,
        host: Arc<dyn HostClient>,
    ) -> Result<Self> {
        let schedule = Schedule::parse(&config.schedule.cron)?;
        let notifier = NotificationManager::from_config(&config.notifications);
        let cleaner = Cleaner::new(config.clone(), runtime, host)?;

        Ok(Self {
            config,
            schedule,
            cleaner,
            notifier,
            started_at: Instant::now(),
            passes_completed: 0,
            passes_failed: 0,
        })
    }

    /// Run the sweep loop until a shutdown signal arrives.
    ///
    /// This is the main entry point for `docksweep daemon`.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            cron = %self.config.schedule.cron,
            mode = %scheduled_mode(self.config.schedule.destructive),
            "sweep daemon starting"
        );
        self.notifier.notify(&NotificationEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            cron: self.config.schedule.cron.clone(),
        });

        let mut shutdown = ShutdownListener::new();

        let reason = loop {
            let now = Utc::now();
            let Some(next) = self.schedule.next_after(now) else {
                // Valid expression that never fires again, e.g. Feb 30.
                self.finish("schedule exhausted");
                return Err(DswError::InvalidSchedule {
                    expression: self.config.schedule.cron.clone(),
                    details: "no future fire time within the search horizon".to_string(),
                });
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_fire = %next, wait_secs = wait.as_secs(), "waiting for next pass");

            if wait > MAX_SLEEP_CHUNK {
                tokio::select! {
                    () = sleep(MAX_SLEEP_CHUNK) => {}
                    reason = shutdown.recv() => break reason,
                }
                continue;
            }

            tokio::select! {
                () = sleep(wait) => self.run_scheduled_pass().await,
                reason = shutdown.recv() => break reason,
            }
        };

        self.finish(reason);
        Ok(())
    }

    async fn run_scheduled_pass(&mut self) {
        let mode = scheduled_mode(self.config.schedule.destructive);
        match self.cleaner.run(mode).await {
            Ok(report) => {
                self.passes_completed += 1;
                info!(
                    passes = self.passes_completed,
                    removed = report.summary.removed_count,
                    freed_bytes = report.summary.space_freed_bytes,
                    "scheduled pass finished"
                );
            }
            Err(error) => {
                self.passes_failed += 1;
                warn!(
                    code = error.code(),
                    %error,
                    failed = self.passes_failed,
                    "scheduled pass failed, waiting for next fire"
                );
            }
        }
    }

    fn finish(&self, reason: &str) {
        let uptime_secs = self.started_at.elapsed().as_secs();
        self.notifier.notify(&NotificationEvent::DaemonStopped {
            reason: reason.to_string(),
            uptime_secs,
        });
        info!(
            reason,
            uptime_secs,
            passes = self.passes_completed,
            failed = self.passes_failed,
            "sweep daemon stopped"
        );
    }
}

const fn scheduled_mode(destructive: bool) -> RunMode {
    if destructive {
        RunMode::Destructive
    } else {
        RunMode::Preview
    }
}

// ──────────────────── shutdown signals ────────────────────

/// Signal streams registered once at daemon start, so a signal arriving while
/// a pass is running is still delivered at the next wait.
#[cfg(unix)]
struct ShutdownListener {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl ShutdownListener {
    fn new() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        let interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => Some(stream),
            Err(error) => {
                warn!(%error, "SIGINT handler unavailable");
                None
            }
        };
        let terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(error) => {
                warn!(%error, "SIGTERM handler unavailable");
                None
            }
        };
        Self {
            interrupt,
            terminate,
        }
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            () = wait_signal(self.interrupt.as_mut()) => "interrupt",
            () = wait_signal(self.terminate.as_mut()) => "terminate",
        }
    }
}

#[cfg(unix)]
async fn wait_signal(stream: Option<&mut tokio::signal::unix::Signal>) {
    match stream {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
struct ShutdownListener;

#[cfg(not(unix))]
impl ShutdownListener {
    fn new() -> Self {
        Self
    }

    async fn recv(&mut self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "interrupt"
    }
}

// ──────────────────── tests ────────────────────
