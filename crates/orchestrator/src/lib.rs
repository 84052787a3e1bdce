#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod identity;
pub mod launcher;
pub mod lock;
pub mod payload;
pub mod pipeline;
pub mod target;
pub mod transfer;
pub mod watcher;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Error;
pub use identity::{EphemeralHelperSet, Identity};
pub use launcher::{CaptureStrategy, InPlace, SideCar};
pub use lock::RunLock;
pub use payload::{CaptureRequest, ExecutionPayload, OutputLayout, ScriptParams};
pub use pipeline::{Pipeline, RunReport, RunRequest};
pub use target::{Target, TargetQuery, TargetResolver};
pub use transfer::{Retriever, TransferSession};
pub use watcher::{Completion, CompletionWatcher, WatchState};
