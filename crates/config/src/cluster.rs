#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Cluster {
    /// Control-plane client binary.
    pub kubectl: PathBuf,

    /// Kubeconfig context passed to every invocation.
    pub context: Option<String>,
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            kubectl: PathBuf::from("kubectl"),
            context: None,
        }
    }
}
