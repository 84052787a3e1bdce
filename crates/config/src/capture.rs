#![forbid(unsafe_code)]

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

/// Kind of process snapshot the capture script is asked to produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DumpType {
    #[default]
    Mini,
    Heap,
    Triage,
    Full,
}

impl DumpType {
    pub const ALL: [DumpType; 4] = [Self::Mini, Self::Heap, Self::Triage, Self::Full];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mini => "mini",
            Self::Heap => "heap",
            Self::Triage => "triage",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for DumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DumpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownVariant {
                kind: "dump type",
                value: s.to_owned(),
                expected: "mini, heap, triage, full",
            })
    }
}

/// How the capture script reaches the target process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Run inside the target container's own execution context.
    #[serde(alias = "exec")]
    InPlace,
    /// Attach an ephemeral helper sharing the target's process namespace.
    #[default]
    #[serde(alias = "debug-container")]
    SideCar,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InPlace => "in-place",
            Self::SideCar => "side-car",
        }
    }

    /// Value the capture script receives in its `strategy` variable.
    pub fn script_value(self) -> &'static str {
        match self {
            Self::InPlace => "exec",
            Self::SideCar => "debug-container",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in-place" | "exec" => Ok(Self::InPlace),
            "side-car" | "debug-container" => Ok(Self::SideCar),
            _ => Err(Error::UnknownVariant {
                kind: "strategy",
                value: s.to_owned(),
                expected: "in-place, side-car",
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Capture {
    pub dump_type: DumpType,

    /// Process id of the target inside its container.
    pub dump_pid: u32,

    pub strategy: Strategy,

    /// Image for the ephemeral helper (side-car only).
    pub helper_image: String,

    /// Debug profile requested for the helper (side-car only).
    pub helper_profile: String,

    /// Output directory inside the target container for the in-place strategy.
    /// Must already exist.
    pub in_place_dir: PathBuf,

    /// Directory inside the target's filesystem that the side-car writes to
    /// through `/proc/<pid>/root`.
    pub side_car_dir: PathBuf,

    /// Local path of the capture script body.
    pub script: PathBuf,

    /// Interpreter the payload is streamed into on the remote side.
    pub shell: String,
}

impl Default for Capture {
    fn default() -> Self {
        Self {
            dump_type: DumpType::default(),
            dump_pid: 1,
            strategy: Strategy::default(),
            helper_image: "mcr.microsoft.com/dotnet/sdk:8.0".into(),
            helper_profile: "general".into(),
            in_place_dir: PathBuf::from("/dotnetdumps"),
            side_car_dir: PathBuf::from("/tmp"),
            script: PathBuf::from("remote.sh"),
            shell: "bash".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_type_parses_known_kinds_only() {
        for kind in DumpType::ALL {
            assert_eq!(kind.as_str().parse::<DumpType>().unwrap(), kind);
        }
        assert_eq!("HEAP".parse::<DumpType>().unwrap(), DumpType::Heap);
        assert!("core".parse::<DumpType>().is_err());
        assert!("".parse::<DumpType>().is_err());
    }

    #[test]
    fn strategy_accepts_script_aliases() {
        assert_eq!("exec".parse::<Strategy>().unwrap(), Strategy::InPlace);
        assert_eq!(
            "debug-container".parse::<Strategy>().unwrap(),
            Strategy::SideCar
        );
        assert!("sidecar-ish".parse::<Strategy>().is_err());
    }
}
