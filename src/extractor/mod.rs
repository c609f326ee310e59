pub mod cancel;
pub mod command;
pub mod job;
pub mod pool;
pub mod process_runner;
pub mod process_tree;

pub use cancel::CancellationToken;
pub use command::ExtractorCommand;
pub use job::{ExtractionJob, JobOutcome, JobState};
pub use pool::{PoolProgress, WorkerPool};
pub use process_runner::{ProcessOutput, ProcessRunner, RunStatus};
pub use process_tree::{ProcessTreeKiller, SystemTreeKiller};
