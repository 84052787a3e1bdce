//! Scripted [`CommandRunner`] for tests.
//!
//! Replies are matched by substring against the rendered command line. Each
//! rule replays its replies in order and keeps repeating the last one.

use crate::runner::{CommandOutput, CommandRunner, CommandSpec, PipeStatus};
use crate::Error;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::VecDeque, path::PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
    /// Written to disk when the reply is consumed, to mimic local effects.
    pub writes: Option<(PathBuf, Vec<u8>)>,
}

impl Reply {
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn code(code: i32) -> Self {
        Self {
            code,
            stderr: format!("exit status {code}"),
            ..Self::default()
        }
    }

    pub fn writing(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.writes = Some((path.into(), contents.into()));
        self
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub command: CommandSpec,
    pub input: Option<Vec<u8>>,
    /// Consumer side of a pipe.
    pub piped_to: Option<CommandSpec>,
}

impl Call {
    pub fn line(&self) -> String {
        self.command.to_string()
    }
}

#[derive(Debug, Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<(String, VecDeque<Reply>)>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for commands containing `pattern`. Earlier rules win.
    pub fn on(&self, pattern: impl Into<String>, reply: Reply) -> &Self {
        let pattern = pattern.into();
        let mut rules = self.rules.lock();
        match rules.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, replies)) => replies.push_back(reply),
            None => rules.push((pattern, VecDeque::from([reply]))),
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Recorded command lines containing `pattern`.
    pub fn lines_matching(&self, pattern: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(Call::line)
            .filter(|line| line.contains(pattern))
            .collect()
    }

    fn reply(&self, call: Call) -> Result<Reply, Error> {
        let line = call.line();
        self.calls.lock().push(call);

        let mut rules = self.rules.lock();
        let Some((_, replies)) = rules.iter_mut().find(|(p, _)| line.contains(p.as_str())) else {
            return Err(Error::Spawn {
                program: PathBuf::from(line),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no scripted reply"),
            });
        };
        let reply = if replies.len() > 1 {
            replies.pop_front().unwrap_or_default()
        } else {
            replies.front().cloned().unwrap_or_default()
        };
        if let Some((path, contents)) = &reply.writes {
            std::fs::write(path, contents)?;
        }
        Ok(reply)
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput, Error> {
        let reply = self.reply(Call {
            command: command.clone(),
            input: None,
            piped_to: None,
        })?;
        Ok(CommandOutput {
            code: reply.code,
            stdout: reply.stdout,
            stderr: reply.stderr,
        })
    }

    async fn feed(&self, command: &CommandSpec, input: &[u8]) -> Result<i32, Error> {
        let reply = self.reply(Call {
            command: command.clone(),
            input: Some(input.to_vec()),
            piped_to: None,
        })?;
        Ok(reply.code)
    }

    async fn pipe(
        &self,
        producer: &CommandSpec,
        consumer: &CommandSpec,
    ) -> Result<PipeStatus, Error> {
        let reply = self.reply(Call {
            command: producer.clone(),
            input: None,
            piped_to: Some(consumer.clone()),
        })?;
        Ok(PipeStatus {
            producer: reply.code,
            consumer: 0,
        })
    }
}
