use std::{sync::Arc, time::Duration};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::deactivation::{DeactivationOutcome, DeactivationProcedure};

/// Result of one sweeper tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No activation marker, nothing to do
    Idle,
    /// A marker was present and the deactivation procedure ran
    Attempted(DeactivationOutcome),
    /// Reading the store or running the procedure failed; logged
    Failed,
}

/// Background loop enforcing the discoverability timeout.
///
/// Keeps no state of its own beyond the procedure: the marker on disk is the
/// only record, so restarting the sweeper at any point is harmless.
pub struct Sweeper {
    procedure: Arc<DeactivationProcedure>,
    poll_interval: Duration,
}

impl Sweeper {
    pub fn new(procedure: Arc<DeactivationProcedure>, poll_interval: Duration) -> Self {
        Self {
            procedure,
            poll_interval,
        }
    }

    /// Tick forever at the poll interval. Returns only if the runtime shuts down.
    pub async fn run(self) {
        info!(
            "Sweeper started: polling every {:?}, timeout {:?}, marker {}",
            self.poll_interval,
            self.procedure.timeout(),
            self.procedure.store().marker_path().display()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// One poll: if a marker exists, run the deactivation procedure as its own
    /// task and wait for it before returning.
    pub async fn sweep_once(&self) -> SweepOutcome {
        match self.procedure.marker_age() {
            Ok(None) => return SweepOutcome::Idle,
            Ok(Some(age)) => debug!("Activation marker present, age {:?}", age),
            Err(e) => {
                error!("Sweeper could not read the activation marker: {}", e);
                return SweepOutcome::Failed;
            }
        }

        let procedure = self.procedure.clone();
        let handle = tokio::spawn(async move { procedure.run().await });

        match handle.await {
            Ok(Ok(outcome)) => {
                debug!("Deactivation attempt finished: {:?}", outcome);
                SweepOutcome::Attempted(outcome)
            }
            Ok(Err(e)) => {
                error!("Deactivation procedure failed: {}", e);
                SweepOutcome::Failed
            }
            Err(e) => {
                error!("Deactivation task did not complete: {}", e);
                SweepOutcome::Failed
            }
        }
    }
}
