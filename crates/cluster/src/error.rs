use std::path::PathBuf;

/// Represents all possible errors that can occur while talking to the
/// control plane.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The client binary could not be started at all.
    #[error("Failed to run `{program}`: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited non-zero.
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The command succeeded but its structured output could not be parsed.
    #[error("Malformed response from `{command}`: {source}")]
    MalformedResponse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// Error occurred while streaming to or from a child process.
    #[error("Process I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
