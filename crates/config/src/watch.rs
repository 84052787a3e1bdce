#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Watch {
    /// Polling interval in seconds.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub interval: Duration,

    /// Give up waiting for the helper after this many seconds. Unset waits
    /// indefinitely.
    #[serde_as(as = "Option<serde_with::DurationSeconds>")]
    pub timeout: Option<Duration>,
}

impl Default for Watch {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}
