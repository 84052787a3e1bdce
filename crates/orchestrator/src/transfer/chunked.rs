#![forbid(unsafe_code)]

use super::{RemoteFile, Retriever, TransferSession, probe_remote_size};
use crate::error::Error;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cluster::ControlPlane;
use config::TransferMethod;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Marker the remote read script writes to stderr when `dd` fails.
pub const READ_FAILED: &str = "pod-dump: chunk read failed";

/// Exit status of the remote read script when the file is not readable.
pub const UNREADABLE_EXIT: i32 = 66;

/// One byte range of the remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRead {
    pub index: u64,
    pub offset: u64,
    pub len: u64,
}

/// Partition `total` bytes into consecutive reads of at most `chunk_size`.
/// Only the last read may be short.
pub fn chunk_plan(total: u64, chunk_size: u64) -> impl Iterator<Item = ChunkRead> {
    let chunk_size = chunk_size.max(1);
    (0..total.div_ceil(chunk_size)).map(move |index| {
        let offset = index * chunk_size;
        ChunkRead {
            index,
            offset,
            len: chunk_size.min(total - offset),
        }
    })
}

/// Reads fixed-size blocks with `dd`, base64-encodes them remotely so they
/// survive the exec channel's text framing, and appends them locally.
#[derive(Debug, Clone)]
pub struct ChunkedTransfer {
    plane: ControlPlane,
    chunk_size: u64,
}

impl ChunkedTransfer {
    pub fn new(plane: ControlPlane, chunk_size: u64) -> Self {
        Self {
            plane,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Remote script reading exactly `read.len` bytes at `read.offset`.
    /// Offsets are multiples of the chunk size, so `skip` counts whole blocks.
    /// A pipeline's status is that of `base64`, so an unreadable file exits
    /// early and a failing `dd` reports [`READ_FAILED`] on stderr.
    pub fn read_script(&self, remote: &RemoteFile, read: &ChunkRead) -> String {
        format!(
            "test -r {path} || exit {UNREADABLE_EXIT}; \
             {{ dd if={path} bs={bs} skip={skip} count=1 2>/dev/null || echo '{READ_FAILED}' >&2; }} \
             | head -c {len} | base64",
            path = remote.quoted(),
            bs = self.chunk_size,
            skip = read.offset / self.chunk_size,
            len = read.len,
        )
    }

    async fn read_chunk(&self, remote: &RemoteFile, read: &ChunkRead) -> Result<Vec<u8>, Error> {
        let script = self.read_script(remote, read);
        let out = self
            .plane
            .exec_output(
                &remote.target.workload,
                &remote.target.container,
                &["sh", "-c", script.as_str()],
            )
            .await?;
        if !out.success() || out.stderr.contains(READ_FAILED) {
            return Err(self.read_failed(read, out.code, out.stderr.trim()));
        }
        let bytes = decode(&out.stdout).map_err(|source| Error::Decode {
            offset: read.offset,
            source,
        })?;
        if bytes.is_empty() && read.len > 0 {
            return Err(self.read_failed(read, out.code, "no data returned"));
        }
        Ok(bytes)
    }

    fn read_failed(&self, read: &ChunkRead, exit_code: i32, detail: &str) -> Error {
        Error::Transfer {
            method: self.method(),
            stage: "reading chunk",
            exit_code,
            detail: format!("offset {}: {detail}", read.offset),
        }
    }

    async fn copy_chunks(&self, session: &mut TransferSession) -> Result<(), Error> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&session.local)
            .await?;

        let total = session.total;
        let chunks = total.div_ceil(self.chunk_size);
        for read in chunk_plan(total, self.chunk_size) {
            let bytes = self.read_chunk(&session.remote, &read).await?;
            if bytes.len() as u64 != read.len {
                warn!(
                    index = read.index,
                    offset = read.offset,
                    expected = read.len,
                    actual = bytes.len(),
                    "short chunk"
                );
            }
            file.write_all(&bytes).await?;
            session.advance(bytes.len() as u64);
            info!(chunk = read.index + 1, chunks, "chunk written");
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Decode base64 text, ignoring the line breaks `base64` inserts.
pub(crate) fn decode(text: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

#[async_trait]
impl Retriever for ChunkedTransfer {
    fn method(&self) -> TransferMethod {
        TransferMethod::Chunked
    }

    async fn probe_size(&self, remote: &RemoteFile) -> Result<u64, Error> {
        probe_remote_size(&self.plane, self.method(), remote).await
    }

    async fn transfer(&self, session: &mut TransferSession) -> Result<(), Error> {
        info!(
            from = ?session.remote.path,
            to = ?session.local,
            chunk_size = self.chunk_size,
            "starting chunked transfer"
        );
        let result = self.copy_chunks(session).await;
        if result.is_err()
            && let Err(err) = tokio::fs::remove_file(&session.local).await
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(%err, path = ?session.local, "failed to remove partial file");
        }
        result
    }
}
