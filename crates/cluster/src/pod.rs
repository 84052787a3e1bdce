//! The subset of the workload description the orchestrator reads.
//!
//! Every field the platform may omit is defaulted so that a sparse but
//! well-formed document always parses; only syntactically broken or
//! wrongly-typed payloads are rejected.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Annotation naming the container `kubectl` targets by default.
pub const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

#[derive(Debug, Clone, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub ephemeral_containers: Vec<Container>,
    #[serde(default)]
    pub security_context: Option<SecurityContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub security_context: Option<SecurityContext>,
}

/// Declared identity, shared by container- and pod-level settings.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    #[serde(default)]
    pub run_as_user: Option<i64>,
    #[serde(default)]
    pub run_as_group: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
    #[serde(default)]
    pub ephemeral_container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub state: ContainerState,
    /// Runtime-reported identity; only surfaced by recent platform versions.
    #[serde(default)]
    pub user: Option<ContainerUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerState {
    #[serde(default)]
    pub waiting: Option<serde_json::Value>,
    #[serde(default)]
    pub running: Option<serde_json::Value>,
    #[serde(default)]
    pub terminated: Option<Terminated>,
}

impl ContainerState {
    pub fn is_terminal(&self) -> bool {
        self.terminated.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminated {
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerUser {
    #[serde(default)]
    pub linux: Option<LinuxUser>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LinuxUser {
    #[serde(default)]
    pub uid: Option<i64>,
    #[serde(default)]
    pub gid: Option<i64>,
}

impl Pod {
    /// The annotation-declared default container if present, else the first
    /// declared container.
    pub fn default_container(&self) -> Option<&Container> {
        self.metadata
            .annotations
            .get(DEFAULT_CONTAINER_ANNOTATION)
            .and_then(|name| self.container(name))
            .or_else(|| self.spec.containers.first())
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.spec.containers.iter().find(|c| c.name == name)
    }

    pub fn container_status(&self, name: &str) -> Option<&ContainerStatus> {
        self.status.container_statuses.iter().find(|s| s.name == name)
    }

    /// Names of every ephemeral container the pod knows about, declared or
    /// reporting status.
    pub fn ephemeral_names(&self) -> BTreeSet<String> {
        self.spec
            .ephemeral_containers
            .iter()
            .map(|c| c.name.clone())
            .chain(
                self.status
                    .ephemeral_container_statuses
                    .iter()
                    .map(|s| s.name.clone()),
            )
            .collect()
    }
}
