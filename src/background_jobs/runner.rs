use super::context::JobContext;
use super::job::{BackgroundJob, JobError, JobSchedule};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Runs registered jobs on their schedules until the context's token is
/// cancelled.
pub struct JobRunner {
    context: JobContext,
    jobs: Vec<Arc<dyn BackgroundJob>>,
}

impl JobRunner {
    pub fn new(context: JobContext) -> Self {
        Self {
            context,
            jobs: Vec::new(),
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job: {} - {}", job.id(), job.description());
        self.jobs.push(job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Execute one registered job now, ignoring its schedule.
    pub async fn run_job(&self, job_id: &str) -> Result<(), JobError> {
        let job = self
            .jobs
            .iter()
            .find(|job| job.id() == job_id)
            .ok_or(JobError::NotFound)?;
        execute_logged(job.as_ref(), &self.context.child()).await
    }

    /// Run every job on its schedule. Returns once all jobs are done, which
    /// for interval jobs means after shutdown was requested.
    pub async fn run(self) {
        info!("Starting job runner with {} registered jobs", self.jobs.len());
        let mut tasks = JoinSet::new();
        for job in self.jobs {
            let ctx = self.context.child();
            tasks.spawn(run_on_schedule(job, ctx));
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Job task panicked: {}", e);
            }
        }
        info!("Job runner stopped");
    }
}

async fn run_on_schedule(job: Arc<dyn BackgroundJob>, ctx: JobContext) {
    match job.schedule() {
        JobSchedule::Once => {
            let _ = execute_logged(job.as_ref(), &ctx).await;
        }
        JobSchedule::Interval(interval) => loop {
            let _ = execute_logged(job.as_ref(), &ctx).await;
            tokio::select! {
                _ = ctx.cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        },
    }
}

async fn execute_logged(job: &dyn BackgroundJob, ctx: &JobContext) -> Result<(), JobError> {
    if ctx.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    info!("Running job {}", job.name());
    let start_time = Instant::now();
    let result = job.execute(ctx).await;
    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!("Job {} completed successfully in {:?}", job.id(), elapsed),
        Err(JobError::Cancelled) => info!("Job {} was cancelled after {:?}", job.id(), elapsed),
        Err(e) => error!("Job {} failed after {:?}: {}", job.id(), elapsed, e),
    }
    result
}
