use crate::Error;
use async_trait::async_trait;
use std::{
    fmt,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{ExitStatus, Stdio},
};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

/// A fully specified local process invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> Error {
        Error::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandSpec")
            .field(&self.to_string())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turn a non-zero exit into [`Error::CommandFailed`].
    pub fn check(self, command: &CommandSpec) -> Result<Self, Error> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_owned(),
            })
        }
    }
}

/// Exit codes of both ends of a process pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeStatus {
    pub producer: i32,
    pub consumer: i32,
}

impl PipeStatus {
    pub fn success(&self) -> bool {
        self.producer == 0 && self.consumer == 0
    }
}

/// Executes local processes on behalf of the control-plane facade.
///
/// All calls block the caller until the child processes have exited.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run with stdin closed and capture stdout and stderr.
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput, Error>;

    /// Write `input` to the child's stdin, close it, and wait. Stdout and
    /// stderr are inherited so remote output reaches the operator.
    async fn feed(&self, command: &CommandSpec, input: &[u8]) -> Result<i32, Error>;

    /// Connect `producer`'s stdout to `consumer`'s stdin and wait for both.
    async fn pipe(&self, producer: &CommandSpec, consumer: &CommandSpec)
    -> Result<PipeStatus, Error>;
}

/// Signal-terminated children report `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[derive(Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput, Error> {
        debug!(%command, "running");
        let output = command
            .to_command()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| command.spawn_error(err))?;

        Ok(CommandOutput {
            code: exit_code(output.status),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn feed(&self, command: &CommandSpec, input: &[u8]) -> Result<i32, Error> {
        debug!(%command, bytes = input.len(), "running with input");
        let mut child = command
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| command.spawn_error(err))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits before reading everything closes the pipe;
            // its exit code is the meaningful signal, not the write error.
            match stdin.write_all(input).await {
                Ok(()) => stdin.shutdown().await.unwrap_or_else(|err| {
                    warn!(%err, "failed to close child stdin");
                }),
                Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                    warn!("child closed its input early");
                }
                Err(err) => return Err(err.into()),
            }
            drop(stdin);
        }

        let status = child.wait().await?;
        Ok(exit_code(status))
    }

    async fn pipe(
        &self,
        producer: &CommandSpec,
        consumer: &CommandSpec,
    ) -> Result<PipeStatus, Error> {
        debug!(%producer, %consumer, "running pipe");
        let mut upstream = producer
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| producer.spawn_error(err))?;

        let Some(stdout) = upstream.stdout.take() else {
            return Err(std::io::Error::other("producer stdout was not captured").into());
        };
        let stdout: Stdio = stdout.try_into()?;

        let mut downstream = consumer
            .to_command()
            .stdin(stdout)
            .spawn()
            .map_err(|err| consumer.spawn_error(err))?;

        let (producer_status, consumer_status) = tokio::join!(upstream.wait(), downstream.wait());
        Ok(PipeStatus {
            producer: exit_code(producer_status?),
            consumer: exit_code(consumer_status?),
        })
    }
}
