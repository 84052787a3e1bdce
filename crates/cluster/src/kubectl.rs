use crate::runner::CommandSpec;
use std::path::{Path, PathBuf};

/// Builds control-plane client invocations. Holds no connection state; every
/// method returns a fresh [`CommandSpec`].
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: PathBuf,
    context: Option<String>,
}

/// Parameters for attaching an ephemeral helper container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRequest<'a> {
    pub image: &'a str,
    /// Container whose process namespace the helper joins.
    pub target_container: &'a str,
    pub profile: &'a str,
    /// Partial container spec merged into the helper (`--custom`).
    pub custom: Option<&'a Path>,
}

impl Kubectl {
    pub fn new(binary: impl Into<PathBuf>, context: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            context,
        }
    }

    pub fn from_config(config: &config::Cluster) -> Self {
        Self::new(&config.kubectl, config.context.clone())
    }

    fn base(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.binary);
        match &self.context {
            Some(context) => spec.arg(format!("--context={context}")),
            None => spec,
        }
    }

    fn namespaced(&self, namespace: &str) -> CommandSpec {
        self.base().args(["-n", namespace])
    }

    /// Namespace of the active kubeconfig context; prints nothing when unset.
    pub fn current_namespace(&self) -> CommandSpec {
        self.base()
            .args(["config", "view", "--minify", "-o", "jsonpath={..namespace}"])
    }

    pub fn list_pods(&self, namespace: &str, selector: &str) -> CommandSpec {
        self.namespaced(namespace)
            .args(["get", "pods", "-l", selector, "-o", "json"])
    }

    /// Existence check; output is discarded by callers.
    pub fn get_pod(&self, namespace: &str, name: &str) -> CommandSpec {
        self.namespaced(namespace).args(["get", "pod", name])
    }

    pub fn describe_pod(&self, namespace: &str, name: &str) -> CommandSpec {
        self.namespaced(namespace)
            .args(["get", "pod", name, "-o", "json"])
    }

    /// `exec` into `container`; `interactive` keeps stdin attached.
    pub fn exec<S: AsRef<str>>(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        interactive: bool,
        command: &[S],
    ) -> CommandSpec {
        let mut spec = self.namespaced(namespace).arg("exec");
        if interactive {
            spec = spec.arg("-i");
        }
        spec.args([pod, "-c", container, "--"])
            .args(command.iter().map(|s| s.as_ref().to_owned()))
    }

    /// Attach an interactive ephemeral helper sharing the target's process
    /// namespace and run `command` in it.
    pub fn debug<S: AsRef<str>>(
        &self,
        namespace: &str,
        pod: &str,
        request: &DebugRequest<'_>,
        command: &[S],
    ) -> CommandSpec {
        let mut spec = self.namespaced(namespace).args([
            "debug".to_owned(),
            pod.to_owned(),
            "-i".to_owned(),
            format!("--image={}", request.image),
            format!("--target={}", request.target_container),
            format!("--profile={}", request.profile),
        ]);
        if let Some(custom) = request.custom {
            spec = spec.arg(format!("--custom={}", custom.display()));
        }
        spec.arg("--")
            .args(command.iter().map(|s| s.as_ref().to_owned()))
    }

    /// Native file copy out of `container`.
    pub fn copy(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        remote: &Path,
        local: &Path,
    ) -> CommandSpec {
        self.namespaced(namespace).args([
            "cp".to_owned(),
            format!("{pod}:{}", remote.display()),
            local.display().to_string(),
            "-c".to_owned(),
            container.to_owned(),
        ])
    }
}
