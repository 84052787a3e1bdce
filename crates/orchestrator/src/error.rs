#![forbid(unsafe_code)]

use config::{Strategy, TransferMethod};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::Error),

    #[error("control plane error: {0}")]
    Cluster(#[from] cluster::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve target `{query}`: {reason}")]
    Resolution { query: String, reason: String },

    #[error("capture script {path:?} not readable: {source}")]
    ScriptMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("value for `{name}` cannot be embedded safely: {value:?}")]
    UnsafeValue { name: &'static str, value: String },

    #[error("{strategy} launch failed with exit code {exit_code}")]
    Launch { strategy: Strategy, exit_code: i32 },

    #[error("helper `{helper}` terminated with exit code {exit_code}")]
    HelperFailed { helper: String, exit_code: i32 },

    #[error("{method} transfer failed while {stage} (exit code {exit_code}): {detail}")]
    Transfer {
        method: TransferMethod,
        stage: &'static str,
        exit_code: i32,
        detail: String,
    },

    #[error("size probe for {path:?} returned {output:?}")]
    SizeProbe { path: PathBuf, output: String },

    #[error("chunk at offset {offset} is not valid base64: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: base64::DecodeError,
    },

    #[error("another run holds {lock:?} for {workload}")]
    Busy { workload: String, lock: PathBuf },

    #[error("run cancelled")]
    Cancelled,

    #[error("helper did not terminate within {0:?}")]
    WatchTimeout(Duration),
}

impl Error {
    /// Process exit code for this failure. Remote failures keep the remote
    /// code so operators can correlate it with the capture script's own codes.
    pub fn exit_code(&self) -> i32 {
        let code = match self {
            Self::Launch { exit_code, .. }
            | Self::HelperFailed { exit_code, .. }
            | Self::Transfer { exit_code, .. } => *exit_code,
            _ => 1,
        };
        if code == 0 { 1 } else { code }
    }

    pub fn is_malformed_response(&self) -> bool {
        matches!(self, Self::Cluster(cluster::Error::MalformedResponse { .. }))
    }
}
