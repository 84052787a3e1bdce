#![forbid(unsafe_code)]

use cluster::pod::{LinuxUser, SecurityContext};
use cluster::Pod;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

/// Numeric user and group the target container runs as. Either half may be
/// unresolved, meaning "inherit the platform default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Identity {
    pub fn new(uid: Option<u32>, gid: Option<u32>) -> Self {
        Self { uid, gid }
    }

    /// Resolve from one description, consulting in order: the runtime-reported
    /// identity, the container's security context, the pod's security
    /// context. Each field stops at the first source that supplies it.
    pub fn from_description(pod: &Pod, container: &str) -> Self {
        let runtime = pod
            .container_status(container)
            .and_then(|status| status.user.as_ref())
            .and_then(|user| user.linux)
            .map(Self::from_runtime)
            .unwrap_or_default();
        let declared = pod
            .container(container)
            .and_then(|c| c.security_context)
            .map(Self::from_declared)
            .unwrap_or_default();
        let pod_level = pod
            .spec
            .security_context
            .map(Self::from_declared)
            .unwrap_or_default();

        let identity = runtime.or(declared).or(pod_level);
        debug!(?runtime, ?declared, ?pod_level, ?identity, "identity resolved");
        identity
    }

    fn from_runtime(user: LinuxUser) -> Self {
        Self::new(id("uid", user.uid), id("gid", user.gid))
    }

    fn from_declared(context: SecurityContext) -> Self {
        Self::new(
            id("runAsUser", context.run_as_user),
            id("runAsGroup", context.run_as_group),
        )
    }

    /// Fill each unresolved field from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            uid: self.uid.or(fallback.uid),
            gid: self.gid.or(fallback.gid),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }

    /// Partial container spec making a helper run as this identity, or `None`
    /// when nothing was resolved and no override should be requested.
    pub fn override_descriptor(&self) -> Option<serde_json::Value> {
        if self.is_unresolved() {
            return None;
        }
        let mut context = serde_json::Map::new();
        if let Some(uid) = self.uid {
            context.insert("runAsUser".into(), json!(uid));
        }
        if let Some(gid) = self.gid {
            context.insert("runAsGroup".into(), json!(gid));
        }
        Some(json!({ "securityContext": context }))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<u32>| v.map_or_else(|| "default".to_owned(), |v| v.to_string());
        write!(f, "uid={} gid={}", show(self.uid), show(self.gid))
    }
}

fn id(field: &'static str, value: Option<i64>) -> Option<u32> {
    let value = value?;
    match u32::try_from(value) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(field, value, "ignoring out-of-range id");
            None
        }
    }
}

/// Ephemeral helper names present on the target before launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EphemeralHelperSet(BTreeSet<String>);

impl EphemeralHelperSet {
    pub fn from_description(pod: &Pod) -> Self {
        Self(pod.ephemeral_names())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for EphemeralHelperSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
