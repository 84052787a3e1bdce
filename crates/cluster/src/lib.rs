mod control_plane;
mod error;
#[cfg(feature = "testing")]
pub mod fake;
pub mod kubectl;
pub mod pod;
pub mod runner;

pub use control_plane::{ControlPlane, Workload};
pub use error::Error;
pub use kubectl::{DebugRequest, Kubectl};
pub use pod::Pod;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, PipeStatus, ProcessRunner};
