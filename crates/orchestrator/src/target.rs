#![forbid(unsafe_code)]

use crate::error::Error;
use cluster::{ControlPlane, Pod, Workload};
use std::fmt;
use tracing::{debug, info};

/// Namespace used when neither the operator nor the active context names one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// How the operator identified the workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetQuery {
    Name(String),
    Selector(String),
}

impl TargetQuery {
    /// A selector takes priority over an explicit name. `None` when neither
    /// was supplied.
    pub fn from_parts(name: Option<String>, selector: Option<String>) -> Option<Self> {
        match (selector, name) {
            (Some(selector), _) => Some(Self::Selector(selector)),
            (None, Some(name)) => Some(Self::Name(name)),
            (None, None) => None,
        }
    }
}

impl fmt::Display for TargetQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "pod/{name}"),
            Self::Selector(selector) => write!(f, "-l {selector}"),
        }
    }
}

/// The container a run operates on. Resolved once, immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub workload: Workload,
    pub container: String,
}

impl Target {
    /// Pick the container from a description: the default-container
    /// annotation when it names a declared container, else the first one.
    pub fn from_description(workload: Workload, pod: &Pod) -> Result<Self, Error> {
        let container = pod
            .default_container()
            .ok_or_else(|| Error::Resolution {
                query: workload.to_string(),
                reason: "pod declares no containers".into(),
            })?
            .name
            .clone();
        Ok(Self {
            workload,
            container,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (container {})", self.workload, self.container)
    }
}

pub struct TargetResolver<'a> {
    plane: &'a ControlPlane,
}

impl<'a> TargetResolver<'a> {
    pub fn new(plane: &'a ControlPlane) -> Self {
        Self { plane }
    }

    /// Resolve the namespace, then the workload, then confirm it exists.
    pub async fn resolve(
        &self,
        namespace: Option<&str>,
        query: &TargetQuery,
    ) -> Result<Workload, Error> {
        let namespace = match namespace {
            Some(namespace) => namespace.to_owned(),
            None => self
                .plane
                .current_namespace()
                .await?
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned()),
        };

        let name = match query {
            TargetQuery::Name(name) => name.clone(),
            TargetQuery::Selector(selector) => {
                let pods = self.plane.pods_matching(&namespace, selector).await?;
                debug!(%selector, matched = pods.len(), "selector listed");
                pods.into_iter().next().ok_or_else(|| Error::Resolution {
                    query: format!("{query} in namespace {namespace}"),
                    reason: "no pods matched".into(),
                })?
            }
        };

        let workload = Workload::new(namespace, name);
        self.plane
            .ensure_pod(&workload)
            .await
            .map_err(|err| match err {
                cluster::Error::CommandFailed { stderr, .. } => Error::Resolution {
                    query: workload.to_string(),
                    reason: if stderr.is_empty() {
                        "pod does not exist".into()
                    } else {
                        stderr
                    },
                },
                other => other.into(),
            })?;

        info!(%workload, "target resolved");
        Ok(workload)
    }
}
