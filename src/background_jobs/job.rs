use super::context::JobContext;
use async_trait::async_trait;
use std::time::Duration;

/// When the runner starts a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSchedule {
    /// Run a single time, right away.
    Once,
    /// Run right away, then again `Duration` after each run completes.
    Interval(Duration),
}

#[derive(Debug)]
pub enum JobError {
    NotFound,
    ExecutionFailed(String),
    Cancelled,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
        }
    }
}

impl std::error::Error for JobError {}

/// Periodic maintenance over the catalog.
///
/// Long sweeps check `ctx.is_cancelled()` between pages and stop with
/// `JobError::Cancelled`.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Stable id, used to trigger the job by hand.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn schedule(&self) -> JobSchedule;

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
