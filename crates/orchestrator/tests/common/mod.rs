#![allow(dead_code)]

use cluster::fake::FakeRunner;
use cluster::{ControlPlane, Kubectl, ProcessRunner};
use serde_json::{Value, json};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

pub fn plane(runner: &Arc<FakeRunner>) -> ControlPlane {
    ControlPlane::new(Kubectl::new("kubectl", None), runner.clone())
}

/// Real processes behind a client stand-in that runs the in-container
/// command (everything after `--`) on the local machine.
pub fn local_plane(dir: &Path) -> ControlPlane {
    let binary = dir.join("kubectl");
    std::fs::write(
        &binary,
        "#!/bin/sh\nwhile [ \"$#\" -gt 0 ] && [ \"$1\" != \"--\" ]; do shift; done\nshift\nexec \"$@\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
    ControlPlane::new(Kubectl::new(binary, None), Arc::new(ProcessRunner))
}

/// Pod description with one `app` container and the given ephemeral statuses.
pub fn pod(name: &str, ephemeral: Value) -> Vec<u8> {
    json!({
        "metadata": {"name": name, "namespace": "ns"},
        "spec": {"containers": [{"name": "app"}]},
        "status": {
            "containerStatuses": [{"name": "app", "state": {"running": {}}}],
            "ephemeralContainerStatuses": ephemeral
        }
    })
    .to_string()
    .into_bytes()
}

pub fn running(name: &str) -> Value {
    json!({"name": name, "state": {"running": {"startedAt": "2026-01-01T00:00:00Z"}}})
}

pub fn terminated(name: &str, exit_code: i32) -> Value {
    json!({"name": name, "state": {"terminated": {"exitCode": exit_code, "reason": "Completed"}}})
}

pub fn pod_list(names: &[&str]) -> Vec<u8> {
    let items: Vec<Value> = names
        .iter()
        .map(|name| json!({"metadata": {"name": name}}))
        .collect();
    json!({ "items": items }).to_string().into_bytes()
}
