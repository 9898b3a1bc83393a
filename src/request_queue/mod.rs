//! Bounded-concurrency, rate-limited executor for outbound HTTP calls.
//!
//! A fixed pool of tokio workers pulls jobs from one unbounded FIFO backlog.
//! Before running a job every worker waits for a slot from a shared
//! `governor` limiter, so the effective throughput is
//! `min(workers, max_requests_per_interval)` per interval.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request queue closed")]
    QueueClosed,
}

/// Response body or the reason there is none.
pub type RequestResult = Result<Vec<u8>, RequestError>;

/// One request/response exchange. Receives the queue's shared client.
pub type RequestJob = Box<dyn FnOnce(reqwest::Client) -> BoxFuture<'static, RequestResult> + Send>;

/// Box an async closure into a [`RequestJob`].
pub fn request_job<F, Fut>(f: F) -> RequestJob
where
    F: FnOnce(reqwest::Client) -> Fut + Send + 'static,
    Fut: Future<Output = RequestResult> + Send + 'static,
{
    Box::new(move |client: reqwest::Client| -> BoxFuture<'static, RequestResult> {
        Box::pin(f(client))
    })
}

#[derive(Debug, Clone)]
pub struct RequestQueueConfig {
    pub max_concurrent_workers: usize,
    pub max_requests_per_interval: u32,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for RequestQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: 1,
            max_requests_per_interval: 1,
            interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("listen-catalog/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

struct QueuedRequest {
    job: RequestJob,
    cancel: CancellationToken,
    result_tx: oneshot::Sender<RequestResult>,
}

/// Receives the single result of an enqueued job.
pub struct RequestHandle {
    result_rx: oneshot::Receiver<RequestResult>,
}

impl RequestHandle {
    pub async fn wait(self) -> RequestResult {
        // A dropped sender means the job was discarded with the backlog.
        self.result_rx.await.unwrap_or(Err(RequestError::QueueClosed))
    }
}

pub struct RequestQueue {
    name: String,
    backlog_tx: mpsc::UnboundedSender<QueuedRequest>,
    shutdown: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl RequestQueue {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(name: impl Into<String>, config: RequestQueueConfig) -> Result<Self> {
        let name = name.into();
        let worker_count = config.max_concurrent_workers.max(1);
        let burst = NonZeroU32::new(config.max_requests_per_interval).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(config.interval / burst.get())
            .with_context(|| format!("Invalid rate limiter interval {:?}", config.interval))?
            .allow_burst(burst);
        let limiter = Arc::new(DirectRateLimiter::direct(quota));

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let (backlog_tx, backlog_rx) = mpsc::unbounded_channel();
        let backlog_rx = Arc::new(Mutex::new(backlog_rx));
        let shutdown = CancellationToken::new();

        let workers = (0..worker_count)
            .map(|index| {
                tokio::spawn(worker_loop(
                    format!("{}-{}", name, index),
                    backlog_rx.clone(),
                    limiter.clone(),
                    client.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            "Started request queue '{}': {} workers, {} requests per {:?}",
            name, worker_count, burst, config.interval
        );

        Ok(Self {
            name,
            backlog_tx,
            shutdown,
            workers: std::sync::Mutex::new(workers),
        })
    }

    pub fn enqueue(&self, job: RequestJob) -> RequestHandle {
        self.enqueue_with_cancel(job, CancellationToken::new())
    }

    /// Enqueue a job that resolves as [`RequestError::Cancelled`] if `cancel`
    /// fires before a worker starts it. A call already in flight is not
    /// interrupted.
    pub fn enqueue_with_cancel(&self, job: RequestJob, cancel: CancellationToken) -> RequestHandle {
        let (result_tx, result_rx) = oneshot::channel();
        let request = QueuedRequest {
            job,
            cancel,
            result_tx,
        };
        if let Err(mpsc::error::SendError(rejected)) = self.backlog_tx.send(request) {
            let _ = rejected.result_tx.send(Err(RequestError::QueueClosed));
        }
        RequestHandle { result_rx }
    }

    /// Stop the workers and wait for them to exit. Jobs still in the backlog
    /// resolve as [`RequestError::QueueClosed`].
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Request queue '{}' worker ended abnormally: {}", self.name, e);
            }
        }
        info!("Stopped request queue '{}'", self.name);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    worker_name: String,
    backlog_rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedRequest>>>,
    limiter: Arc<DirectRateLimiter>,
    client: reqwest::Client,
    shutdown: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = backlog_rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                request = rx.recv() => request,
            }
        };
        let Some(request) = next else {
            break;
        };

        if request.cancel.is_cancelled() {
            let _ = request.result_tx.send(Err(RequestError::Cancelled));
            continue;
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                let _ = request.result_tx.send(Err(RequestError::QueueClosed));
                break;
            }
            _ = request.cancel.cancelled() => {
                let _ = request.result_tx.send(Err(RequestError::Cancelled));
                continue;
            }
            _ = limiter.until_ready() => {}
        }

        if request.cancel.is_cancelled() {
            let _ = request.result_tx.send(Err(RequestError::Cancelled));
            continue;
        }

        let result = (request.job)(client.clone()).await;
        if let Err(e) = &result {
            debug!("{}: request failed: {}", worker_name, e);
        }
        // The caller may have stopped waiting; the result is simply dropped then.
        let _ = request.result_tx.send(result);
    }
    debug!("{} exiting", worker_name);
}

/// Enqueue a GET built by `build` and wait for its body.
///
/// Non-success statuses become [`RequestError::Status`].
pub async fn send_request<F>(queue: &RequestQueue, build: F) -> RequestResult
where
    F: FnOnce(&reqwest::Client) -> reqwest::RequestBuilder + Send + 'static,
{
    let handle = queue.enqueue(request_job(move |client| async move {
        let response = build(&client).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }));
    handle.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn test_queue(workers: usize, per_interval: u32, interval: Duration) -> RequestQueue {
        RequestQueue::start(
            "test",
            RequestQueueConfig {
                max_concurrent_workers: workers,
                max_requests_per_interval: per_interval,
                interval,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn ok_job(body: &'static str) -> RequestJob {
        request_job(move |_client| async move { Ok(body.as_bytes().to_vec()) })
    }

    #[tokio::test]
    async fn test_jobs_are_spread_over_intervals_and_failures_isolated() {
        let queue = test_queue(5, 5, Duration::from_secs(1));
        let started = Instant::now();

        let mut handles = Vec::new();
        for index in 0..12 {
            let job = if index == 3 {
                request_job(|_client| async {
                    Err(RequestError::Status {
                        status: 500,
                        url: "http://provider.invalid/boom".to_string(),
                    })
                })
            } else {
                ok_job("ok")
            };
            handles.push(queue.enqueue(job));
        }

        let mut failures = 0;
        let mut finish_times = Vec::new();
        for handle in handles {
            match handle.wait().await {
                Ok(body) => assert_eq!(body, b"ok"),
                Err(RequestError::Status { status, .. }) => {
                    assert_eq!(status, 500);
                    failures += 1;
                }
                Err(e) => panic!("unexpected error {}", e),
            }
            finish_times.push(started.elapsed());
        }

        assert_eq!(failures, 1);
        // At most 5 requests fit in the first interval
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(finish_times[0] < Duration::from_secs(1));
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_worker_count() {
        let queue = test_queue(2, 100, Duration::from_millis(10));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                queue.enqueue(request_job(move |_client| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(Vec::new())
                }))
            })
            .collect();

        for handle in handles {
            handle.wait().await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_cancelled_job_is_not_executed() {
        let queue = test_queue(1, 10, Duration::from_secs(1));
        let executed = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let counter = executed.clone();
        let handle = queue.enqueue_with_cancel(
            request_job(move |_client| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Vec::new()) }
            }),
            cancel,
        );
        assert!(matches!(handle.wait().await, Err(RequestError::Cancelled)));
        assert_eq!(executed.load(Ordering::SeqCst), 0);

        // The worker keeps serving other jobs
        assert_eq!(queue.enqueue(ok_job("next")).wait().await.unwrap(), b"next");
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_backlog() {
        let queue = test_queue(1, 1, Duration::from_secs(60));
        // Uses the only token of the interval
        queue.enqueue(ok_job("first")).wait().await.unwrap();

        let pending = queue.enqueue(ok_job("second"));
        queue.stop().await;
        assert!(matches!(pending.wait().await, Err(RequestError::QueueClosed)));
        assert!(queue.is_stopped());

        let after_stop = queue.enqueue(ok_job("third"));
        assert!(matches!(after_stop.wait().await, Err(RequestError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_ready_jobs_do_not_run_after_stop() {
        let queue = test_queue(4, 100, Duration::from_millis(100));
        let executed = Arc::new(AtomicUsize::new(0));

        // Workers have not been polled yet, so every job is still queued
        let handles: Vec<RequestHandle> = (0..20)
            .map(|_| {
                let executed = executed.clone();
                queue.enqueue(request_job(move |_client| async move {
                    executed.fetch_add(1, Ordering::SeqCst);
                    Ok(Vec::new())
                }))
            })
            .collect();
        queue.stop().await;

        for handle in handles {
            assert!(matches!(handle.wait().await, Err(RequestError::QueueClosed)));
        }
        assert_eq!(executed.load(Ordering::SeqCst), 0);
    }
}
