use crate::kubectl::{DebugRequest, Kubectl};
use crate::pod::{Pod, PodList};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec, PipeStatus};
use crate::Error;
use serde::de::DeserializeOwned;
use std::{fmt, path::Path, sync::Arc};
use tracing::debug;

/// An addressable workload: namespace plus pod name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Workload {
    pub namespace: String,
    pub name: String,
}

impl Workload {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Typed access to the control plane over a [`CommandRunner`].
#[derive(Clone)]
pub struct ControlPlane {
    kubectl: Kubectl,
    runner: Arc<dyn CommandRunner>,
}

impl ControlPlane {
    pub fn new(kubectl: Kubectl, runner: Arc<dyn CommandRunner>) -> Self {
        Self { kubectl, runner }
    }

    pub fn kubectl(&self) -> &Kubectl {
        &self.kubectl
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Namespace of the active context, `None` if the context sets none.
    pub async fn current_namespace(&self) -> Result<Option<String>, Error> {
        let spec = self.kubectl.current_namespace();
        let out = self.runner.output(&spec).await?.check(&spec)?;
        let namespace = out.stdout_str().trim().to_owned();
        Ok((!namespace.is_empty()).then_some(namespace))
    }

    /// Pod names matching `selector`, in listing order.
    pub async fn pods_matching(&self, namespace: &str, selector: &str) -> Result<Vec<String>, Error> {
        let spec = self.kubectl.list_pods(namespace, selector);
        let list: PodList = self.json(&spec).await?;
        Ok(list.items.into_iter().map(|pod| pod.metadata.name).collect())
    }

    /// Fails with the client's own exit code if the pod cannot be fetched.
    pub async fn ensure_pod(&self, workload: &Workload) -> Result<(), Error> {
        let spec = self.kubectl.get_pod(&workload.namespace, &workload.name);
        self.runner.output(&spec).await?.check(&spec)?;
        Ok(())
    }

    pub async fn describe(&self, workload: &Workload) -> Result<Pod, Error> {
        let spec = self.kubectl.describe_pod(&workload.namespace, &workload.name);
        self.json(&spec).await
    }

    /// Run `command` in `container` and capture its output. Non-zero exits
    /// are returned, not raised.
    pub async fn exec_output<S: AsRef<str>>(
        &self,
        workload: &Workload,
        container: &str,
        command: &[S],
    ) -> Result<CommandOutput, Error> {
        let spec = self.kubectl.exec(
            &workload.namespace,
            &workload.name,
            container,
            false,
            command,
        );
        self.runner.output(&spec).await
    }

    /// Stream `input` into an interactive exec and return its exit code.
    pub async fn exec_feed<S: AsRef<str>>(
        &self,
        workload: &Workload,
        container: &str,
        command: &[S],
        input: &[u8],
    ) -> Result<i32, Error> {
        let spec = self.kubectl.exec(
            &workload.namespace,
            &workload.name,
            container,
            true,
            command,
        );
        self.runner.feed(&spec, input).await
    }

    /// Create an ephemeral helper, stream `input` into it, and return the
    /// creation channel's exit code.
    pub async fn debug_feed<S: AsRef<str>>(
        &self,
        workload: &Workload,
        request: &DebugRequest<'_>,
        command: &[S],
        input: &[u8],
    ) -> Result<i32, Error> {
        let spec = self
            .kubectl
            .debug(&workload.namespace, &workload.name, request, command);
        self.runner.feed(&spec, input).await
    }

    pub async fn copy(
        &self,
        workload: &Workload,
        container: &str,
        remote: &Path,
        local: &Path,
    ) -> Result<CommandOutput, Error> {
        let spec = self.kubectl.copy(
            &workload.namespace,
            &workload.name,
            container,
            remote,
            local,
        );
        self.runner.output(&spec).await
    }

    /// Pipe a remote command's stdout into a local process.
    pub async fn exec_pipe<S: AsRef<str>>(
        &self,
        workload: &Workload,
        container: &str,
        command: &[S],
        local: &CommandSpec,
    ) -> Result<PipeStatus, Error> {
        let spec = self.kubectl.exec(
            &workload.namespace,
            &workload.name,
            container,
            false,
            command,
        );
        self.runner.pipe(&spec, local).await
    }

    async fn json<T: DeserializeOwned>(&self, spec: &CommandSpec) -> Result<T, Error> {
        let out = self.runner.output(spec).await?.check(spec)?;
        debug!(command = %spec, bytes = out.stdout.len(), "parsing structured response");
        serde_json::from_slice(&out.stdout).map_err(|source| Error::MalformedResponse {
            command: spec.to_string(),
            source,
        })
    }
}

impl fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlane")
            .field("kubectl", &self.kubectl)
            .finish_non_exhaustive()
    }
}
