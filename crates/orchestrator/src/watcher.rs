#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::error::Error;
use crate::identity::EphemeralHelperSet;
use cluster::{ControlPlane, Pod, Workload};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A helper created by this run that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub helper: String,
    pub exit_code: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Waiting,
    Done(Completion),
}

impl WatchState {
    /// Inspect one snapshot: the first helper absent from `before` that
    /// reports a terminal state completes the watch.
    pub fn observe(pod: &Pod, before: &EphemeralHelperSet) -> Self {
        pod.status
            .ephemeral_container_statuses
            .iter()
            .filter(|status| !before.contains(&status.name))
            .find_map(|status| {
                status.state.terminated.as_ref().map(|terminated| Completion {
                    helper: status.name.clone(),
                    exit_code: terminated.exit_code,
                    reason: terminated.reason.clone(),
                })
            })
            .map_or(Self::Waiting, Self::Done)
    }
}

/// Polls the target until the helper this run created terminates.
pub struct CompletionWatcher {
    plane: ControlPlane,
    clock: Arc<dyn Clock>,
    interval: Duration,
    timeout: Option<Duration>,
}

impl CompletionWatcher {
    pub fn new(plane: ControlPlane, clock: Arc<dyn Clock>, watch: &config::Watch) -> Self {
        Self {
            plane,
            clock,
            interval: watch.interval,
            timeout: watch.timeout,
        }
    }

    /// Block until a new helper terminates, `cancel` fires, or the optional
    /// timeout elapses.
    pub async fn wait(
        &self,
        workload: &Workload,
        before: &EphemeralHelperSet,
        cancel: &CancellationToken,
    ) -> Result<Completion, Error> {
        let started = self.clock.now();
        let mut polls: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let pod = self.plane.describe(workload).await?;
            polls += 1;
            match WatchState::observe(&pod, before) {
                WatchState::Done(completion) => {
                    info!(
                        helper = %completion.helper,
                        exit_code = completion.exit_code,
                        polls,
                        "helper terminated"
                    );
                    return Ok(completion);
                }
                WatchState::Waiting => debug!(polls, "helper still running"),
            }

            if let Some(timeout) = self.timeout
                && self.clock.now().duration_since(started) >= timeout
            {
                return Err(Error::WatchTimeout(timeout));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = self.clock.sleep(self.interval) => {}
            }
        }
    }
}
