#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::error::Error;
use crate::identity::{EphemeralHelperSet, Identity};
use crate::launcher::{CaptureStrategy, InPlace, SideCar};
use crate::lock::RunLock;
use crate::payload::{ARTIFACT_NAME, CaptureRequest, ExecutionPayload, OutputLayout, ScriptParams};
use crate::target::{Target, TargetQuery, TargetResolver};
use crate::transfer::{self, RemoteFile, Retriever, TransferSession};
use crate::watcher::CompletionWatcher;
use cluster::ControlPlane;
use config::{Config, Strategy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What the operator asked for on this run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Explicit namespace; the active context's namespace otherwise.
    pub namespace: Option<String>,
    pub query: TargetQuery,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: Target,
    pub identity: Identity,
    pub strategy: Strategy,
    pub artifact: RemoteFile,
    pub local: PathBuf,
    pub expected_bytes: u64,
    pub written_bytes: u64,
    /// Percentages reported while transferring.
    pub progress: Vec<u8>,
}

impl RunReport {
    pub fn size_matches(&self) -> bool {
        self.expected_bytes == self.written_bytes
    }
}

/// Resolve, inspect, launch, wait, retrieve. Every stage finishes before the
/// next begins.
pub struct Pipeline {
    config: Config,
    plane: ControlPlane,
    clock: Arc<dyn Clock>,
    lock_dir: PathBuf,
    output_dir: PathBuf,
}

impl Pipeline {
    pub fn new(config: Config, plane: ControlPlane, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            plane,
            clock,
            lock_dir: std::env::temp_dir(),
            output_dir: PathBuf::from("."),
        }
    }

    /// Directory holding per-workload run locks.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// Directory relative local outputs are written to.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport, Error> {
        let body = self.read_script().await?;

        let workload = TargetResolver::new(&self.plane)
            .resolve(request.namespace.as_deref(), &request.query)
            .await?;
        let _lock = RunLock::acquire(&self.lock_dir, &workload)?;

        let description = self.plane.describe(&workload).await?;
        let target = Target::from_description(workload, &description)?;
        let identity = Identity::from_description(&description, &target.container);
        let helpers = EphemeralHelperSet::from_description(&description);
        info!(%target, %identity, "target inspected");
        checkpoint(cancel)?;

        let capture = CaptureRequest::from_config(&self.config.capture);
        let layout = OutputLayout::new(&capture, &self.config.capture);
        let payload = ExecutionPayload::compose(ScriptParams::new(&capture, &layout), &body)?;
        let strategy = self.strategy(&capture, &target, identity, helpers);

        let exit_code = strategy.launch(&payload).await?;
        if exit_code != 0 {
            return Err(Error::Launch {
                strategy: strategy.kind(),
                exit_code,
            });
        }
        strategy.await_completion(cancel).await?;
        checkpoint(cancel)?;

        let artifact = transfer::locate_artifact(&self.plane, &target, &layout.artifact()).await?;
        let local = self.local_path(&artifact);
        let retriever = transfer::retriever(
            self.config.transfer.method,
            self.plane.clone(),
            self.config.transfer.chunk_size,
        );
        let session = self.retrieve(retriever.as_ref(), artifact.clone(), &local).await?;

        Ok(RunReport {
            target,
            identity,
            strategy: capture.strategy,
            artifact,
            local,
            expected_bytes: session.total,
            written_bytes: session.transferred,
            progress: session.progress,
        })
    }

    async fn read_script(&self) -> Result<String, Error> {
        let path = &self.config.capture.script;
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::ScriptMissing {
                path: path.clone(),
                source,
            })
    }

    fn strategy(
        &self,
        capture: &CaptureRequest,
        target: &Target,
        identity: Identity,
        helpers: EphemeralHelperSet,
    ) -> Box<dyn CaptureStrategy> {
        let shell = self.config.capture.shell.clone();
        match capture.strategy {
            Strategy::InPlace => Box::new(InPlace::new(self.plane.clone(), target.clone(), shell)),
            Strategy::SideCar => Box::new(SideCar::new(
                self.plane.clone(),
                target.clone(),
                identity,
                capture.clone(),
                shell,
                helpers,
                CompletionWatcher::new(
                    self.plane.clone(),
                    Arc::clone(&self.clock),
                    &self.config.watch,
                ),
            )),
        }
    }

    fn local_path(&self, artifact: &RemoteFile) -> PathBuf {
        let transfer = &self.config.transfer;
        let path = match (&transfer.output, transfer.use_remote_name) {
            (Some(output), _) => output.clone(),
            (None, true) => PathBuf::from(artifact.file_name().unwrap_or(ARTIFACT_NAME)),
            (None, false) => PathBuf::from(ARTIFACT_NAME),
        };
        if path.is_absolute() {
            path
        } else {
            self.output_dir.join(path)
        }
    }

    async fn retrieve(
        &self,
        retriever: &dyn Retriever,
        artifact: RemoteFile,
        local: &Path,
    ) -> Result<TransferSession, Error> {
        transfer::remove_stale(local).await?;
        let total = retriever.probe_size(&artifact).await?;
        info!(method = %retriever.method(), size = total, "retrieving artifact");

        let mut session = TransferSession::new(artifact, local, total);
        retriever.transfer(&mut session).await?;
        match session.verify() {
            Ok(()) => info!(path = ?session.local, bytes = session.transferred, "artifact retrieved"),
            Err((expected, actual)) => warn!(
                expected,
                actual,
                path = ?session.local,
                "retrieved size differs from remote size; the dump may still be usable"
            ),
        }
        Ok(session)
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), Error> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
