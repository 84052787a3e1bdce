use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use config::{Config, DumpType, Strategy, TransferMethod};
use orchestrator::{RunRequest, TargetQuery};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// pod-dump: capture a process dump from a running pod and bring it home
///
/// Runs a capture script against a process inside a Kubernetes pod, either
/// directly in the target container or from an ephemeral helper container
/// that shares its process namespace, then copies the resulting dump to the
/// local machine.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Name of the pod to capture from.
    ///
    /// Ignored when `--selector` is given.
    pub pod: Option<String>,

    /// Namespace of the pod. Defaults to the active context's namespace.
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Label selector; the first matching pod is used.
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    /// kubeconfig context to use.
    #[arg(long)]
    pub context: Option<String>,

    /// Capture strategy: `in-place` (exec) or `side-car` (debug-container).
    #[arg(short, long, value_parser = parse_variant::<Strategy>)]
    pub strategy: Option<Strategy>,

    /// Dump type: mini, heap, triage or full.
    #[arg(short = 't', long, value_parser = parse_variant::<DumpType>)]
    pub dump_type: Option<DumpType>,

    /// Process id of the target process inside the container.
    #[arg(short = 'p', long, value_parser = validate_pid)]
    pub dump_pid: Option<u32>,

    /// Image for the side-car helper container.
    #[arg(long)]
    pub helper_image: Option<String>,

    /// How the dump is copied back: direct, archive or chunked.
    #[arg(short = 'm', long, value_parser = parse_variant::<TransferMethod>)]
    pub transfer_method: Option<TransferMethod>,

    /// Bytes read per chunk when the chunked method is used.
    #[arg(long, value_parser = validate_chunk_size)]
    pub chunk_size: Option<u64>,

    /// Local capture script sent to the pod.
    #[arg(long, value_parser = validate_file)]
    pub script: Option<PathBuf>,

    /// Local path the dump is written to.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

impl Cli {
    /// What to capture from, if the operator named anything.
    pub fn request(&self) -> Option<RunRequest> {
        let query = TargetQuery::from_parts(self.pod.clone(), self.selector.clone())?;
        Some(RunRequest {
            namespace: self.namespace.clone(),
            query,
        })
    }

    /// Flags win over the configuration file and the environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(context) = &self.context {
            config.cluster.context = Some(context.clone());
        }
        if let Some(strategy) = self.strategy {
            config.capture.strategy = strategy;
        }
        if let Some(dump_type) = self.dump_type {
            config.capture.dump_type = dump_type;
        }
        if let Some(pid) = self.dump_pid {
            config.capture.dump_pid = pid;
        }
        if let Some(image) = &self.helper_image {
            config.capture.helper_image = image.clone();
        }
        if let Some(script) = &self.script {
            config.capture.script = script.clone();
        }
        if let Some(method) = self.transfer_method {
            config.transfer.method = method;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.transfer.chunk_size = chunk_size;
        }
        if let Some(output) = &self.output {
            config.transfer.output = Some(output.clone());
        }
        config.transfer = config.transfer.clone().clamp();
    }
}

/// Exit status after a failed parse: help and version requests succeed,
/// usage errors exit with 1.
pub fn usage_exit_code(err: &clap::Error) -> u8 {
    u8::from(err.use_stderr())
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

#[inline(always)]
fn parse_variant<T>(value: &str) -> Result<T, String>
where
    T: FromStr<Err = config::Error>,
{
    value.parse().map_err(|err: config::Error| err.to_string())
}

/// Process ids start at 1.
#[inline(always)]
fn validate_pid(pid: &str) -> Result<u32, String> {
    let pid: u32 = pid
        .parse()
        .map_err(|_| format!("`{pid}` is not a valid process id"))?;
    if pid == 0 {
        Err("Process id must be at least 1".to_string())
    } else {
        Ok(pid)
    }
}

#[inline(always)]
fn validate_chunk_size(size: &str) -> Result<u64, String> {
    let size: u64 = size
        .parse()
        .map_err(|_| format!("`{size}` is not a valid byte count"))?;
    if size == 0 {
        Err("Chunk size must be at least 1 byte".to_string())
    } else {
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use config::MAX_CHUNK_SIZE;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn positive_numbers_are_accepted_verbatim(pid in 1u32.., size in 1u64..) {
            prop_assert_eq!(validate_pid(&pid.to_string()), Ok(pid));
            prop_assert_eq!(validate_chunk_size(&size.to_string()), Ok(size));
        }

        #[test]
        fn non_numeric_input_is_rejected(value in "[a-z -]{1,12}") {
            prop_assert!(validate_pid(&value).is_err());
            prop_assert!(validate_chunk_size(&value).is_err());
        }
    }

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pod-dump").chain(args.iter().copied()))
    }

    #[test]
    fn help_succeeds_and_usage_errors_fail() {
        assert_eq!(usage_exit_code(&parse(&["--help"]).unwrap_err()), 0);
        assert_eq!(usage_exit_code(&parse(&["--version"]).unwrap_err()), 0);
        assert_eq!(usage_exit_code(&parse(&["--no-such-flag"]).unwrap_err()), 1);
    }

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn selector_takes_priority_over_name() {
        let cli = parse(&["api", "-l", "app=sample", "-n", "shop"]).unwrap();
        let request = cli.request().unwrap();
        assert_eq!(request.namespace.as_deref(), Some("shop"));
        assert!(matches!(request.query, TargetQuery::Selector(ref s) if s == "app=sample"));
    }

    #[test]
    fn no_target_yields_no_request() {
        let cli = parse(&[]).unwrap();
        assert!(cli.request().is_none());
    }

    #[test]
    fn aliases_are_accepted() {
        let cli = parse(&["api", "--strategy", "exec", "-m", "tar", "-t", "HEAP"]).unwrap();
        assert_eq!(cli.strategy, Some(Strategy::InPlace));
        assert_eq!(cli.transfer_method, Some(TransferMethod::Archive));
        assert_eq!(cli.dump_type, Some(DumpType::Heap));

        let cli = parse(&["api", "--strategy", "debug-container"]).unwrap();
        assert_eq!(cli.strategy, Some(Strategy::SideCar));
    }

    #[test]
    fn invalid_values_are_usage_errors() {
        assert!(parse(&["api", "--dump-type", "core"]).is_err());
        assert!(parse(&["api", "--dump-pid", "0"]).is_err());
        assert!(parse(&["api", "--chunk-size", "0"]).is_err());
        assert!(parse(&["api", "--script", "/definitely/not/here.sh"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "api",
            "--context",
            "staging",
            "-s",
            "in-place",
            "-p",
            "7",
            "--chunk-size",
            &(MAX_CHUNK_SIZE * 2).to_string(),
            "-o",
            "out.dmp",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.cluster.context.as_deref(), Some("staging"));
        assert_eq!(config.capture.strategy, Strategy::InPlace);
        assert_eq!(config.capture.dump_pid, 7);
        assert_eq!(config.transfer.chunk_size, MAX_CHUNK_SIZE);
        assert_eq!(config.transfer.output, Some(PathBuf::from("out.dmp")));
        assert_eq!(config.capture.dump_type, DumpType::Mini);
    }
}
