#![forbid(unsafe_code)]

mod capture;
mod cluster;
mod error;
mod transfer;
mod watch;

pub use capture::{Capture, DumpType, Strategy};
pub use cluster::Cluster;
pub use error::Error;
pub use transfer::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIB, Transfer, TransferMethod};
pub use watch::Watch;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variables with this prefix override file values. Nested keys
/// are separated by `__`, e.g. `PODDUMP_TRANSFER__CHUNK_SIZE`.
pub const ENV_PREFIX: &str = "PODDUMP_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub cluster: Cluster,
    pub capture: Capture,
    pub transfer: Transfer,
    pub watch: Watch,
}

impl Config {
    /// Defaults overlaid with environment overrides.
    pub fn new() -> Result<Self, Error> {
        Self::extract(Self::defaults().merge(Self::env()))
    }

    /// Defaults, then the TOML file at `path`, then environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_owned()));
        }
        Self::extract(
            Self::defaults()
                .merge(Toml::file(path))
                .merge(Self::env()),
        )
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    fn extract(figment: Figment) -> Result<Self, Error> {
        let config: Config = figment.extract().map_err(Box::new)?;
        Ok(Self {
            transfer: config.transfer.clamp(),
            ..config
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn load_merges_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "pod-dump.toml",
                r#"
                [capture]
                dump_type = "heap"
                strategy = "in-place"

                [transfer]
                chunk_size = 0

                [watch]
                interval = 3
                "#,
            )?;
            jail.set_env("PODDUMP_CAPTURE__DUMP_PID", "42");

            let config = Config::load("pod-dump.toml").expect("config loads");
            assert_eq!(config.capture.dump_type, DumpType::Heap);
            assert_eq!(config.capture.strategy, Strategy::InPlace);
            assert_eq!(config.capture.dump_pid, 42);
            assert_eq!(config.transfer.chunk_size, 1);
            assert_eq!(config.watch.interval, Duration::from_secs(3));
            assert_eq!(config.watch.timeout, None);
            Ok(())
        });
    }

    #[test]
    fn load_rejects_unknown_dump_type() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[capture]\ndump_type = \"core\"\n")?;
            assert!(Config::load("bad.toml").is_err());
            Ok(())
        });
    }

    #[test]
    fn load_missing_file_is_invalid_path() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn rendered_toml_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rendered.toml");
        let config = Config::default();
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
