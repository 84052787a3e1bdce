#![forbid(unsafe_code)]

use super::{RemoteFile, Retriever, TransferSession, local_size, probe_remote_size};
use crate::error::Error;
use async_trait::async_trait;
use cluster::{CommandSpec, ControlPlane};
use config::TransferMethod;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Remote `tar` streamed over stdout into a local `tar`, sidestepping the
/// native copy's framing limits.
#[derive(Debug, Clone)]
pub struct ArchiveTransfer {
    plane: ControlPlane,
    tar: PathBuf,
}

impl ArchiveTransfer {
    pub fn new(plane: ControlPlane) -> Self {
        Self {
            plane,
            tar: PathBuf::from("tar"),
        }
    }

    /// Use a different local `tar` binary.
    pub fn with_tar(mut self, tar: impl Into<PathBuf>) -> Self {
        self.tar = tar.into();
        self
    }

    fn failed(&self, stage: &'static str, exit_code: i32) -> Error {
        Error::Transfer {
            method: self.method(),
            stage,
            exit_code,
            detail: String::new(),
        }
    }
}

fn parent_or_cwd(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[async_trait]
impl Retriever for ArchiveTransfer {
    fn method(&self) -> TransferMethod {
        TransferMethod::Archive
    }

    async fn probe_size(&self, remote: &RemoteFile) -> Result<u64, Error> {
        probe_remote_size(&self.plane, self.method(), remote).await
    }

    async fn transfer(&self, session: &mut TransferSession) -> Result<(), Error> {
        let remote = &session.remote;
        let Some(name) = remote.file_name() else {
            return Err(Error::Resolution {
                query: remote.path.display().to_string(),
                reason: "artifact path has no file name".into(),
            });
        };
        let remote_dir = parent_or_cwd(&remote.path).to_string_lossy().into_owned();
        // Extract next to the destination, never over neighbouring files.
        let staging = tempfile::Builder::new()
            .prefix(".pod-dump-")
            .tempdir_in(parent_or_cwd(&session.local))?;
        let extracted = staging.path().join(name);

        let extract = CommandSpec::new(&self.tar).args([
            "xf".to_owned(),
            "-".to_owned(),
            "-C".to_owned(),
            staging.path().display().to_string(),
        ]);
        info!(from = ?remote.path, to = ?session.local, "streaming archive");
        let status = self
            .plane
            .exec_pipe(
                &remote.target.workload,
                &remote.target.container,
                &["tar", "cf", "-", "-C", remote_dir.as_str(), name],
                &extract,
            )
            .await?;
        if status.producer != 0 {
            return Err(self.failed("archiving remotely", status.producer));
        }
        if status.consumer != 0 {
            return Err(self.failed("extracting locally", status.consumer));
        }

        debug!(from = ?extracted, to = ?session.local, "moving extracted file");
        tokio::fs::rename(&extracted, &session.local).await?;
        staging.close()?;
        let written = local_size(&session.local).await?;
        session.advance(written);
        Ok(())
    }
}
