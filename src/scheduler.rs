//! Tick loop and signal handling around the blocking reconciliation driver.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, warn};
use tokio::time::{Instant, MissedTickBehavior};

use crate::reconcile::{Driver, FatalError};

/// Why the scheduler stopped.
#[derive(Debug)]
pub enum Shutdown {
    /// A termination signal arrived; any in-flight tick is abandoned.
    Signal(&'static str),
    Fatal(FatalError),
    /// The single requested tick completed.
    Completed,
}

impl Shutdown {
    pub fn exit_code(&self) -> i32 {
        match self {
            Shutdown::Completed => 0,
            Shutdown::Signal(_) => 1,
            Shutdown::Fatal(_) => 2,
        }
    }
}

pub struct ShutdownSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    pub fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("cannot listen for SIGTERM")?,
        })
    }

    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            "ctrl-c"
        }
    }
}

enum Event {
    Signal(&'static str),
    Tick,
}

/// Runs one reconciliation pass on the blocking pool, raced against `signals`.
pub async fn run_tick(driver: &Arc<Driver>, signals: &mut ShutdownSignals) -> Option<Shutdown> {
    tick_until(driver, signals.recv()).await
}

async fn tick_until<S>(driver: &Arc<Driver>, signal: S) -> Option<Shutdown>
where
    S: Future<Output = &'static str>,
{
    let job = tokio::task::spawn_blocking({
        let driver = Arc::clone(driver);
        move || driver.run_once()
    });

    let joined = tokio::select! {
        biased;
        name = signal => return Some(Shutdown::Signal(name)),
        joined = job => joined,
    };

    match joined {
        Ok(Ok(summary)) => {
            debug!("[scheduler] tick finished: {summary:?}");
            None
        }
        Ok(Err(fatal)) => Some(Shutdown::Fatal(fatal)),
        Err(err) => {
            error!("[scheduler] reconciliation task failed: {err}");
            None
        }
    }
}

/// Fires a tick every `period`, the first one a full period after start, until a signal or a
/// fatal reconciliation error.
pub async fn run(driver: Arc<Driver>, period: Duration, mut signals: ShutdownSignals) -> Shutdown {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            biased;
            name = signals.recv() => Event::Signal(name),
            _ = ticker.tick() => Event::Tick,
        };

        match event {
            Event::Signal(name) => {
                warn!("[scheduler] received signal {name}, exiting");
                return Shutdown::Signal(name);
            }
            Event::Tick => {
                debug!("[scheduler] received ticker signal at {}", chrono::Utc::now());
                if let Some(shutdown) = run_tick(&driver, &mut signals).await {
                    if let Shutdown::Signal(name) = &shutdown {
                        warn!("[scheduler] received signal {name} during a tick, exiting");
                    }
                    return shutdown;
                }
            }
        }
    }
}
