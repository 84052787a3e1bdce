#![forbid(unsafe_code)]

//! Script composition.
//!
//! The capture script is an opaque collaborator that reads a handful of
//! shell variables. [`ScriptParams`] is that contract as a closed record;
//! [`ExecutionPayload::compose`] renders it as `key=value` lines ahead of the
//! unmodified script body.

use crate::error::Error;
use config::{Capture, DumpType, Strategy};
use shell_escape::unix::escape;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// File the capture script leaves behind (possibly as a symlink).
pub const ARTIFACT_NAME: &str = "latest_dump";

/// What the operator asked to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub dump_type: DumpType,
    pub pid: u32,
    pub strategy: Strategy,
    pub helper_image: String,
    pub helper_profile: String,
}

impl CaptureRequest {
    pub fn from_config(capture: &Capture) -> Self {
        Self {
            dump_type: capture.dump_type,
            pid: capture.dump_pid,
            strategy: capture.strategy,
            helper_image: capture.helper_image.clone(),
            helper_profile: capture.helper_profile.clone(),
        }
    }
}

/// Variables handed to the capture script, in preamble order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptParams {
    pub dump_type: DumpType,
    pub dump_pid: u32,
    /// Output directory as seen by the process running the script.
    pub dump_dir: PathBuf,
    /// Only passed for the side-car strategy.
    pub strategy: Option<Strategy>,
}

impl ScriptParams {
    pub fn new(request: &CaptureRequest, layout: &OutputLayout) -> Self {
        Self {
            dump_type: request.dump_type,
            dump_pid: request.pid,
            dump_dir: layout.script_dir.clone(),
            strategy: match request.strategy {
                Strategy::InPlace => None,
                Strategy::SideCar => Some(Strategy::SideCar),
            },
        }
    }

    /// Preamble lines, each terminated by a newline.
    pub fn render(&self) -> Result<String, Error> {
        let dump_dir = self.dump_dir.to_str().ok_or_else(|| Error::UnsafeValue {
            name: "dump_dir",
            value: self.dump_dir.display().to_string(),
        })?;
        if dump_dir.contains(['\n', '\0']) {
            return Err(Error::UnsafeValue {
                name: "dump_dir",
                value: dump_dir.to_owned(),
            });
        }

        let mut out = String::new();
        assign(&mut out, "dump_type", self.dump_type.as_str());
        assign(&mut out, "dump_pid", &self.dump_pid.to_string());
        assign(&mut out, "dump_dir", dump_dir);
        if let Some(strategy) = self.strategy {
            assign(&mut out, "strategy", strategy.script_value());
        }
        Ok(out)
    }
}

fn assign(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(&escape(Cow::Borrowed(value)));
    out.push('\n');
}

/// Where the artifact lands, from the script's and from the container's
/// point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Directory passed to the script as `dump_dir`.
    pub script_dir: PathBuf,
    /// The same directory as seen from inside the target container.
    pub container_dir: PathBuf,
}

impl OutputLayout {
    /// In-place runs see the target filesystem directly. A side-car shares
    /// only the process namespace, so it reaches the target's filesystem
    /// through `/proc/<pid>/root`.
    pub fn new(request: &CaptureRequest, capture: &Capture) -> Self {
        match request.strategy {
            Strategy::InPlace => Self {
                script_dir: capture.in_place_dir.clone(),
                container_dir: capture.in_place_dir.clone(),
            },
            Strategy::SideCar => Self {
                script_dir: proc_root(request.pid, &capture.side_car_dir),
                container_dir: capture.side_car_dir.clone(),
            },
        }
    }

    /// Artifact path inside the target container.
    pub fn artifact(&self) -> PathBuf {
        self.container_dir.join(ARTIFACT_NAME)
    }
}

fn proc_root(pid: u32, dir: &Path) -> PathBuf {
    let relative = dir.strip_prefix("/").unwrap_or(dir);
    PathBuf::from("/proc")
        .join(pid.to_string())
        .join("root")
        .join(relative)
}

/// Preamble plus script body, ready to stream to a remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPayload {
    pub params: ScriptParams,
    text: String,
}

impl ExecutionPayload {
    pub fn compose(params: ScriptParams, body: &str) -> Result<Self, Error> {
        let mut text = params.render()?;
        text.push_str(body);
        Ok(Self { params, text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn request(strategy: Strategy, pid: u32) -> CaptureRequest {
        CaptureRequest {
            dump_type: DumpType::Heap,
            pid,
            strategy,
            helper_image: "sdk".into(),
            helper_profile: "general".into(),
        }
    }

    #[test]
    fn side_car_reaches_target_through_proc_root() {
        let capture = Capture::default();
        let request = request(Strategy::SideCar, 7);
        let layout = OutputLayout::new(&request, &capture);
        assert_eq!(layout.script_dir, PathBuf::from("/proc/7/root/tmp"));
        assert_eq!(layout.artifact(), PathBuf::from("/tmp/latest_dump"));

        let payload =
            ExecutionPayload::compose(ScriptParams::new(&request, &layout), "echo body\n").unwrap();
        assert_eq!(
            payload.as_str(),
            "dump_type=heap\ndump_pid=7\ndump_dir=/proc/7/root/tmp\nstrategy=debug-container\necho body\n"
        );
    }

    #[test]
    fn in_place_omits_strategy() {
        let capture = Capture::default();
        let request = request(Strategy::InPlace, 1);
        let layout = OutputLayout::new(&request, &capture);
        let payload =
            ExecutionPayload::compose(ScriptParams::new(&request, &layout), "body").unwrap();
        assert_eq!(
            payload.as_str(),
            "dump_type=heap\ndump_pid=1\ndump_dir=/dotnetdumps\nbody"
        );
    }

    #[test]
    fn odd_directories_are_quoted() {
        let capture = Capture {
            in_place_dir: PathBuf::from("/tmp/it's $HOME"),
            ..Capture::default()
        };
        let request = request(Strategy::InPlace, 1);
        let layout = OutputLayout::new(&request, &capture);
        let preamble = ScriptParams::new(&request, &layout).render().unwrap();
        assert!(preamble.contains("dump_dir='/tmp/it'\\''s $HOME'\n"), "{preamble}");

        let capture = Capture {
            in_place_dir: PathBuf::from("/tmp/a\nb"),
            ..Capture::default()
        };
        let layout = OutputLayout::new(&request, &capture);
        assert!(ScriptParams::new(&request, &layout).render().is_err());
    }

    proptest! {
        #[test]
        fn body_follows_preamble_verbatim(
            body in any::<String>(),
            pid in any::<u32>(),
            side_car in any::<bool>(),
            kind in 0usize..4,
        ) {
            let strategy = if side_car { Strategy::SideCar } else { Strategy::InPlace };
            let request = CaptureRequest {
                dump_type: DumpType::ALL[kind],
                ..request(strategy, pid)
            };
            let layout = OutputLayout::new(&request, &Capture::default());
            let payload = ExecutionPayload::compose(ScriptParams::new(&request, &layout), &body).unwrap();

            let expected_keys: &[&str] = if side_car {
                &["dump_type", "dump_pid", "dump_dir", "strategy"]
            } else {
                &["dump_type", "dump_pid", "dump_dir"]
            };
            let mut rest = payload.as_str();
            for key in expected_keys {
                let (line, tail) = rest.split_once('\n').unwrap();
                let prefix = format!("{key}=");
                prop_assert!(line.starts_with(&prefix));
                rest = tail;
            }
            prop_assert_eq!(rest, body.as_str());
        }
    }
}
