use anyhow::Context;
use clap::{CommandFactory, Parser};
use cluster::{ControlPlane, Kubectl, ProcessRunner};
use config::Config;
use flume::bounded;
use orchestrator::{Pipeline, RunRequest, SystemClock};
use pod_dump::cli::{Cli, usage_exit_code};
use pod_dump::signals::wait_for_signal;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_log::AsTrace;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if let Err(io) = err.print() {
                tracing_subscriber::fmt().with_writer(std::io::stderr).init();
                warn!(error = %io, "failed to print usage");
            }
            return ExitCode::from(usage_exit_code(&err));
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(cli.verbosity.log_level_filter().as_trace())
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    debug!(config = ?cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<orchestrator::Error>()
                .map_or(1, orchestrator::Error::exit_code);
            error!(code, "{err:#}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        None => Config::new()?,
    };
    cli.apply(&mut config);

    if cli.print_config {
        let rendered = config.to_toml()?;
        #[allow(clippy::print_stdout)]
        {
            print!("{rendered}");
        }
        return Ok(());
    }

    let Some(request) = cli.request() else {
        error!("a pod name or --selector is required");
        Cli::command()
            .print_help()
            .context("failed to print usage")?;
        anyhow::bail!("no target given");
    };

    let plane = ControlPlane::new(Kubectl::from_config(&config.cluster), Arc::new(ProcessRunner));
    let pipeline = Pipeline::new(config, plane, Arc::new(SystemClock));
    capture(&pipeline, &request).await
}

async fn capture(pipeline: &Pipeline, request: &RunRequest) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = bounded(8);
    tokio::spawn(async move {
        if let Err(err) = wait_for_signal(&events_tx).await {
            error!(error = ?err, "Error while waiting for signal");
        }
    });

    let run = pipeline.run(request, &cancel);
    tokio::pin!(run);
    loop {
        tokio::select! {
            result = &mut run => {
                let report = result?;
                info!(
                    pod = %report.target,
                    strategy = %report.strategy,
                    remote = ?report.artifact.path,
                    local = ?report.local,
                    "dump retrieved"
                );
                return Ok(());
            }
            Ok(event) = events_rx.recv_async() => {
                if cancel.is_cancelled() {
                    warn!(?event, "second signal, abandoning the run; a helper container or partial file may remain");
                    return Err(orchestrator::Error::Cancelled.into());
                }
                warn!(?event, "stopping after the current step");
                cancel.cancel();
            }
        }
    }
}
