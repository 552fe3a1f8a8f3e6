//! Background loop that ticks a stage on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::StageError;
use crate::stage::Stage;
use crate::types::TickReport;

/// Cloneable handle used to stop a running [`StageRunner`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    /// Signal the runner to stop after its current tick.
    pub fn shutdown(&self) {
        self.notify.notify_one();
    }
}

/// Runs one stage: tick, sleep the interval, repeat until shut down.
pub struct StageRunner {
    stage: Box<dyn Stage>,
    interval: Duration,
    shutdown: ShutdownHandle,
}

impl StageRunner {
    pub fn new(stage: Box<dyn Stage>, interval: Duration) -> Self {
        Self {
            stage,
            interval,
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run a single tick without sleeping.
    pub async fn run_once(&mut self) -> Result<TickReport, StageError> {
        self.stage.tick().await
    }

    /// Start the loop.
    ///
    /// A tick that errors is logged and the loop carries on. The shutdown
    /// signal is only observed between ticks, so a handler is never cut off
    /// mid-call. The stage's own shutdown runs before returning.
    pub async fn run(mut self) {
        tracing::info!(
            stage = %self.stage.name(),
            interval_secs = self.interval.as_secs(),
            "Stage loop started"
        );
        loop {
            if let Err(e) = self.stage.tick().await {
                tracing::error!(stage = %self.stage.name(), error = %e, "Tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.notify.notified() => break,
            }
        }

        if let Err(e) = self.stage.shutdown().await {
            tracing::error!(stage = %self.stage.name(), error = %e, "Stage shutdown failed");
        }
        tracing::info!(stage = %self.stage.name(), "Stage loop stopped");
    }
}
