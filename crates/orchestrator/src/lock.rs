#![forbid(unsafe_code)]

use crate::error::Error;
use cluster::Workload;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock preventing overlapping runs against one workload
/// from this machine. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Lock file for `workload` under `dir`.
    pub fn path_for(dir: &Path, workload: &Workload) -> PathBuf {
        let sanitize = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
                .collect()
        };
        dir.join(format!(
            "pod-dump-{}-{}.lock",
            sanitize(&workload.namespace),
            sanitize(&workload.name)
        ))
    }

    /// Fails with [`Error::Busy`] if another run already holds the lock.
    pub fn acquire(dir: &Path, workload: &Workload) -> Result<Self, Error> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, workload);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(?path, "run lock acquired");
                Ok(Self { path, file })
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Err(Error::Busy {
                workload: workload.to_string(),
                lock: path,
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(%err, path = ?self.path, "run lock release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_run_on_same_workload_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let workload = Workload::new("energy", "api-7798c4bdf7-68sw9");

        let held = RunLock::acquire(dir.path(), &workload).unwrap();
        let err = RunLock::acquire(dir.path(), &workload).unwrap_err();
        assert!(matches!(err, Error::Busy { .. }), "{err}");

        let other = Workload::new("energy", "worker-0");
        assert!(RunLock::acquire(dir.path(), &other).is_ok());

        drop(held);
        assert!(RunLock::acquire(dir.path(), &workload).is_ok());
    }

    #[test]
    fn lock_names_are_filesystem_safe() {
        let path = RunLock::path_for(Path::new("/tmp"), &Workload::new("a/b", "c d"));
        assert_eq!(path, PathBuf::from("/tmp/pod-dump-a_b-c_d.lock"));
    }
}
