pub mod executor;
pub mod listener;
pub mod scheduler;

pub use executor::{DcaExecutor, DcaOutcome, SwapPipelineExecutor};
pub use listener::{SchedulerEvent, SchedulerListener};
pub use scheduler::{DcaScheduler, TickSummary};
