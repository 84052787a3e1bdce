#![forbid(unsafe_code)]

use super::{RemoteFile, Retriever, TransferSession, local_size, probe_remote_size};
use crate::error::Error;
use async_trait::async_trait;
use cluster::ControlPlane;
use config::TransferMethod;
use tracing::info;

/// Delegates to the client's native copy. Known to fail on large files
/// (roughly 350 MB and up, depending on transport).
#[derive(Debug, Clone)]
pub struct DirectTransfer {
    plane: ControlPlane,
}

impl DirectTransfer {
    pub fn new(plane: ControlPlane) -> Self {
        Self { plane }
    }
}

#[async_trait]
impl Retriever for DirectTransfer {
    fn method(&self) -> TransferMethod {
        TransferMethod::Direct
    }

    async fn probe_size(&self, remote: &RemoteFile) -> Result<u64, Error> {
        probe_remote_size(&self.plane, self.method(), remote).await
    }

    async fn transfer(&self, session: &mut TransferSession) -> Result<(), Error> {
        let remote = &session.remote;
        info!(from = ?remote.path, to = ?session.local, "copying with native copy");
        let out = self
            .plane
            .copy(
                &remote.target.workload,
                &remote.target.container,
                &remote.path,
                &session.local,
            )
            .await?;
        if !out.success() {
            return Err(Error::Transfer {
                method: self.method(),
                stage: "copying",
                exit_code: out.code,
                detail: out.stderr.trim().to_owned(),
            });
        }
        let written = local_size(&session.local).await?;
        session.advance(written);
        Ok(())
    }
}
