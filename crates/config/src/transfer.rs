#![forbid(unsafe_code)]

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

pub const MIB: u64 = 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * MIB;
pub const MAX_CHUNK_SIZE: u64 = 64 * MIB;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    /// Native `kubectl cp`. Unreliable above a few hundred MiB.
    Direct,
    /// Remote `tar` piped into a local `tar`.
    Archive,
    /// Fixed-size base64 blocks over the exec channel.
    #[default]
    Chunked,
}

impl TransferMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Archive => "archive",
            Self::Chunked => "chunked",
        }
    }
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "cp" => Ok(Self::Direct),
            "archive" | "tar" => Ok(Self::Archive),
            "chunked" => Ok(Self::Chunked),
            _ => Err(Error::UnknownVariant {
                kind: "transfer method",
                value: s.to_owned(),
                expected: "direct, archive, chunked",
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Transfer {
    pub method: TransferMethod,

    /// Block size in bytes for the chunked method (clamped to 1..=64 MiB).
    pub chunk_size: u64,

    /// Local destination. Defaults to `./latest_dump`.
    pub output: Option<PathBuf>,

    /// Name the local file after the resolved remote artifact instead of
    /// `latest_dump`. Ignored when `output` is set.
    pub use_remote_name: bool,
}

impl Default for Transfer {
    fn default() -> Self {
        Self {
            method: TransferMethod::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            output: None,
            use_remote_name: false,
        }
    }
}

impl Transfer {
    pub fn clamp(self) -> Self {
        Self {
            chunk_size: self.chunk_size.clamp(1, MAX_CHUNK_SIZE),
            ..self
        }
    }
}
