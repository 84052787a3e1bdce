#![forbid(unsafe_code)]

mod archive;
mod chunked;
mod direct;

pub use archive::ArchiveTransfer;
pub use chunked::{ChunkRead, ChunkedTransfer, READ_FAILED, UNREADABLE_EXIT, chunk_plan};
pub use direct::DirectTransfer;

use crate::error::Error;
use crate::target::Target;
use async_trait::async_trait;
use cluster::ControlPlane;
use config::TransferMethod;
use humansize::{BINARY, format_size};
use shell_escape::unix::escape;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A file inside the target container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub target: Target,
    pub path: PathBuf,
}

impl RemoteFile {
    pub fn new(target: Target, path: impl Into<PathBuf>) -> Self {
        Self {
            target,
            path: path.into(),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// The path quoted for interpolation into a remote `sh -c` script.
    fn quoted(&self) -> String {
        escape(Cow::Owned(self.path.to_string_lossy().into_owned())).into_owned()
    }
}

/// Bookkeeping for one retrieval.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub remote: RemoteFile,
    pub local: PathBuf,
    /// Size probed before the transfer started.
    pub total: u64,
    pub transferred: u64,
    /// Cumulative percentages reported along the way.
    pub progress: Vec<u8>,
}

impl TransferSession {
    pub fn new(remote: RemoteFile, local: impl Into<PathBuf>, total: u64) -> Self {
        Self {
            remote,
            local: local.into(),
            total,
            transferred: 0,
            progress: Vec::new(),
        }
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let percent = self.transferred.saturating_mul(100) / self.total;
        percent.min(100) as u8
    }

    pub(crate) fn advance(&mut self, bytes: u64) {
        self.transferred = self.transferred.saturating_add(bytes);
        let percent = self.percent();
        self.progress.push(percent);
        info!(
            percent,
            transferred = %format_size(self.transferred, BINARY),
            total = %format_size(self.total, BINARY),
            "transfer progress"
        );
    }

    /// `Err((expected, actual))` when the byte count differs from the probe.
    pub fn verify(&self) -> Result<(), (u64, u64)> {
        if self.transferred == self.total {
            Ok(())
        } else {
            Err((self.total, self.transferred))
        }
    }
}

/// Copies a remote artifact to local disk.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn method(&self) -> TransferMethod;

    /// Remote size in bytes.
    async fn probe_size(&self, remote: &RemoteFile) -> Result<u64, Error>;

    /// Fill `session.local`, updating `session.transferred`. The local file
    /// must not exist when this is called.
    async fn transfer(&self, session: &mut TransferSession) -> Result<(), Error>;
}

pub fn retriever(method: TransferMethod, plane: ControlPlane, chunk_size: u64) -> Box<dyn Retriever> {
    match method {
        TransferMethod::Direct => Box::new(DirectTransfer::new(plane)),
        TransferMethod::Archive => Box::new(ArchiveTransfer::new(plane)),
        TransferMethod::Chunked => Box::new(ChunkedTransfer::new(plane, chunk_size)),
    }
}

/// Decimal byte count of a remote file. GNU and BSD `stat` spell the format
/// differently, so both are tried.
pub async fn probe_remote_size(
    plane: &ControlPlane,
    method: TransferMethod,
    remote: &RemoteFile,
) -> Result<u64, Error> {
    let path = remote.quoted();
    let script = format!("stat -c %s {path} 2>/dev/null || stat -f %z {path}");
    let out = plane
        .exec_output(
            &remote.target.workload,
            &remote.target.container,
            &["sh", "-c", script.as_str()],
        )
        .await?;
    if !out.success() {
        return Err(Error::Transfer {
            method,
            stage: "probing size",
            exit_code: out.code,
            detail: out.stderr.trim().to_owned(),
        });
    }
    let text = out.stdout_str();
    let size = text.trim().parse().map_err(|_| Error::SizeProbe {
        path: remote.path.clone(),
        output: text.clone(),
    })?;
    debug!(path = ?remote.path, size, "remote size probed");
    Ok(size)
}

/// Resolve the artifact symlink the capture script leaves behind.
pub async fn locate_artifact(
    plane: &ControlPlane,
    target: &Target,
    link: &Path,
) -> Result<RemoteFile, Error> {
    let link = link.to_string_lossy();
    let out = plane
        .exec_output(
            &target.workload,
            &target.container,
            &["readlink", "-f", &*link],
        )
        .await?;
    let real = out.stdout_str().trim().to_owned();
    if !out.success() || real.is_empty() {
        return Err(Error::Resolution {
            query: format!("{link} in {target}"),
            reason: if out.stderr.trim().is_empty() {
                "artifact not found".into()
            } else {
                out.stderr.trim().to_owned()
            },
        });
    }
    info!(artifact = %real, "artifact located");
    Ok(RemoteFile::new(target.clone(), real))
}

/// Delete a leftover local file so a stale artifact is never mistaken for
/// the current one.
pub async fn remove_stale(local: &Path) -> Result<(), Error> {
    match tokio::fs::remove_file(local).await {
        Ok(()) => {
            info!(path = ?local, "removed stale local file");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Size of the local file, zero when absent.
pub(crate) async fn local_size(local: &Path) -> Result<u64, Error> {
    match tokio::fs::metadata(local).await {
        Ok(meta) => Ok(meta.len()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(err.into()),
    }
}
