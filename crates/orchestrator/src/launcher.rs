#![forbid(unsafe_code)]

use crate::error::Error;
use crate::identity::{EphemeralHelperSet, Identity};
use crate::payload::{CaptureRequest, ExecutionPayload};
use crate::target::Target;
use crate::watcher::CompletionWatcher;
use async_trait::async_trait;
use cluster::{ControlPlane, DebugRequest};
use config::Strategy;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One way of getting the payload to run next to the target process.
#[async_trait]
pub trait CaptureStrategy: Send + Sync {
    fn kind(&self) -> Strategy;

    /// Start the payload and return the launch channel's exit code.
    async fn launch(&self, payload: &ExecutionPayload) -> Result<i32, Error>;

    /// Wait for the capture to finish after a successful launch.
    async fn await_completion(&self, cancel: &CancellationToken) -> Result<(), Error>;
}

/// Streams the payload into the target container's own shell.
pub struct InPlace {
    plane: ControlPlane,
    target: Target,
    shell: String,
}

impl InPlace {
    pub fn new(plane: ControlPlane, target: Target, shell: impl Into<String>) -> Self {
        Self {
            plane,
            target,
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl CaptureStrategy for InPlace {
    fn kind(&self) -> Strategy {
        Strategy::InPlace
    }

    async fn launch(&self, payload: &ExecutionPayload) -> Result<i32, Error> {
        info!(target = %self.target, "executing capture script in place");
        let code = self
            .plane
            .exec_feed(
                &self.target.workload,
                &self.target.container,
                &[self.shell.as_str()],
                payload.as_bytes(),
            )
            .await?;
        Ok(code)
    }

    /// The exec channel only returns once the script has exited.
    async fn await_completion(&self, _cancel: &CancellationToken) -> Result<(), Error> {
        Ok(())
    }
}

/// Attaches an ephemeral helper sharing the target's process namespace.
pub struct SideCar {
    plane: ControlPlane,
    target: Target,
    identity: Identity,
    request: CaptureRequest,
    shell: String,
    before: EphemeralHelperSet,
    watcher: CompletionWatcher,
}

impl SideCar {
    pub fn new(
        plane: ControlPlane,
        target: Target,
        identity: Identity,
        request: CaptureRequest,
        shell: impl Into<String>,
        before: EphemeralHelperSet,
        watcher: CompletionWatcher,
    ) -> Self {
        Self {
            plane,
            target,
            identity,
            request,
            shell: shell.into(),
            before,
            watcher,
        }
    }

    /// Write the identity override to a temp file that is removed when the
    /// returned handle drops.
    fn identity_descriptor(&self) -> Result<Option<NamedTempFile>, Error> {
        let Some(descriptor) = self.identity.override_descriptor() else {
            return Ok(None);
        };
        let mut file = tempfile::Builder::new()
            .prefix("pod-dump-identity-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(descriptor.to_string().as_bytes())?;
        file.flush()?;
        debug!(path = ?file.path(), %descriptor, "identity override written");
        Ok(Some(file))
    }
}

#[async_trait]
impl CaptureStrategy for SideCar {
    fn kind(&self) -> Strategy {
        Strategy::SideCar
    }

    async fn launch(&self, payload: &ExecutionPayload) -> Result<i32, Error> {
        let descriptor = self.identity_descriptor()?;
        if descriptor.is_none() {
            info!("no identity resolved; helper inherits the platform default");
        }
        let request = DebugRequest {
            image: &self.request.helper_image,
            target_container: &self.target.container,
            profile: &self.request.helper_profile,
            custom: descriptor.as_ref().map(NamedTempFile::path),
        };
        info!(
            target = %self.target,
            image = %self.request.helper_image,
            identity = %self.identity,
            "attaching helper"
        );

        let result = self
            .plane
            .debug_feed(
                &self.target.workload,
                &request,
                &[self.shell.as_str()],
                payload.as_bytes(),
            )
            .await;

        if let Some(file) = descriptor
            && let Err(err) = file.close()
        {
            warn!(%err, "failed to remove identity override");
        }
        Ok(result?)
    }

    async fn await_completion(&self, cancel: &CancellationToken) -> Result<(), Error> {
        info!(existing = self.before.len(), "waiting for helper to terminate");
        let completion = self
            .watcher
            .wait(&self.target.workload, &self.before, cancel)
            .await?;
        if completion.exit_code != 0 {
            return Err(Error::HelperFailed {
                helper: completion.helper,
                exit_code: completion.exit_code,
            });
        }
        Ok(())
    }
}
