pub mod control;
#[allow(clippy::module_inception)]
pub mod scheduler;

pub use control::{ControlState, RunState};
pub use scheduler::{CycleReport, PollingScheduler, SchedulerConfig, effective_interval};
