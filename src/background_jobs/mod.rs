//! Background job scheduling and execution.
//!
//! Jobs run on their own schedule until the runner's shutdown token is
//! cancelled. The only job today is the track duration backfill.

mod context;
mod job;
pub mod jobs;
mod runner;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError, JobSchedule};
pub use runner::JobRunner;
