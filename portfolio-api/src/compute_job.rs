use std::future::Future;
use std::panic::UnwindSafe;
use std::sync::OnceLock;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use strum_macros::Display;
use tokio::sync::oneshot;
use tracing::field;
use tracing_futures::Instrument;

/// Callers should apply back-pressure once the number of queued jobs reaches
/// `QUEUE_SOFT_CAPACITY_PER_THREAD * thread_pool_size()`.
const QUEUE_SOFT_CAPACITY_PER_THREAD: usize = 20;

const WORKER_POOL_SPAN_NAME: &str = "compute_job";

static CONFIGURED_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Set the number of worker threads. Only effective before the first job is queued.
pub fn set_thread_pool_size(size: usize) {
    CONFIGURED_POOL_SIZE.store(size, Ordering::Release);
}

fn thread_pool_size() -> usize {
    let configured_size = CONFIGURED_POOL_SIZE.load(Ordering::Acquire);
    if configured_size != 0 {
        return configured_size;
    }
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(1)
}

/// The kind of work a job performs. Query admission is always picked ahead of batch fetches.
#[derive(Display, Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ComputeJobType {
    QueryParsing,
    BatchFetch,
}

impl ComputeJobType {
    const fn lane(self) -> usize {
        match self {
            ComputeJobType::QueryParsing => 0,
            ComputeJobType::BatchFetch => 1,
        }
    }
}

const LANES_COUNT: usize = 2;

struct ComputeJob {
    ty: ComputeJobType,
    job: Box<dyn FnOnce() + Send + 'static>,
    parent_span: tracing::Span,
    queue_start: std::time::Instant,
}

struct JobQueue {
    /// Lower indices are handled sooner.
    lanes: [(
        crossbeam_channel::Sender<ComputeJob>,
        crossbeam_channel::Receiver<ComputeJob>,
    ); LANES_COUNT],
    queued_count: AtomicUsize,
    soft_capacity: usize,
}

impl JobQueue {
    fn soft_bounded(soft_capacity: usize) -> Self {
        Self {
            // Unbounded channels: callers use `is_full` to implement back-pressure
            lanes: std::array::from_fn(|_| crossbeam_channel::unbounded()),
            queued_count: AtomicUsize::new(0),
            soft_capacity,
        }
    }

    fn queued_count(&self) -> usize {
        self.queued_count.load(Ordering::Relaxed)
    }

    fn send(&self, job: ComputeJob) {
        self.queued_count.fetch_add(1, Ordering::Relaxed);
        let (sender, _) = &self.lanes[job.ty.lane()];
        // Both ends of every lane live in the static queue, the channel cannot disconnect
        let _ = sender.send(job);
    }

    fn blocking_recv(&self) -> ComputeJob {
        let mut select = crossbeam_channel::Select::new();
        for (_, receiver) in &self.lanes {
            select.recv(receiver);
        }
        loop {
            // The ready index is arbitrary when several lanes are ready, poll them in order instead
            select.ready();
            for (_, receiver) in &self.lanes {
                if let Ok(job) = receiver.try_recv() {
                    self.queued_count.fetch_sub(1, Ordering::Relaxed);
                    return job;
                }
            }
            // Another worker raced us to it
        }
    }
}

fn queue() -> &'static JobQueue {
    static QUEUE: OnceLock<JobQueue> = OnceLock::new();
    QUEUE.get_or_init(|| {
        let pool_size = thread_pool_size();
        tracing::info!(pool_size, "starting worker pool");
        for index in 0..pool_size {
            let spawned = std::thread::Builder::new()
                .name(format!("portfolio-worker-{index}"))
                .spawn(|| {
                    // Blocks until `get_or_init` in the parent thread is finished
                    let queue = queue();
                    loop {
                        let job = queue.blocking_recv();
                        let _guard = job.parent_span.enter();
                        tracing::trace!(
                            "job.type" = %job.ty,
                            queued_for = ?job.queue_start.elapsed(),
                            "starting compute job"
                        );
                        let job_start = std::time::Instant::now();
                        (job.job)();
                        tracing::trace!(
                            "job.type" = %job.ty,
                            took = ?job_start.elapsed(),
                            "compute job finished"
                        );
                    }
                });
            if let Err(err) = spawned {
                tracing::error!("could not spawn worker thread: {err}");
            }
        }
        JobQueue::soft_bounded(QUEUE_SOFT_CAPACITY_PER_THREAD * pool_size.max(1))
    })
}

/// Returns a future that resolves to `Ok` if `job` returned or `Err` if it panicked.
///
/// Once queued, the job runs even if the returned future is dropped; its result is then discarded.
pub(crate) fn execute<T, F>(
    compute_job_type: ComputeJobType,
    job: F,
) -> impl Future<Output = std::thread::Result<T>>
where
    F: FnOnce() -> T + Send + UnwindSafe + 'static,
    T: Send + 'static,
{
    let mut job_watcher = JobWatcher {
        outcome: Outcome::Abandoned,
        compute_job_type,
    };
    let worker_pool_span = tracing::info_span!(
        WORKER_POOL_SPAN_NAME,
        "job.type" = %compute_job_type,
        "job.outcome" = field::Empty
    );
    let (tx, rx) = oneshot::channel();
    let job = Box::new(move || {
        // The receiver is gone when the caller stopped waiting
        let _ = tx.send(std::panic::catch_unwind(job));
    });
    queue().send(ComputeJob {
        ty: compute_job_type,
        job,
        parent_span: worker_pool_span.clone(),
        queue_start: std::time::Instant::now(),
    });
    async move {
        let result = match rx.instrument(worker_pool_span).await {
            Ok(result) => result,
            Err(_) => Err(Box::new("compute job dropped before completion") as _),
        };
        job_watcher.settle(&result);
        result
    }
}

#[derive(Display)]
enum Outcome {
    Executed,
    Panicked,
    Abandoned,
}

struct JobWatcher {
    outcome: Outcome,
    compute_job_type: ComputeJobType,
}

impl JobWatcher {
    /// Reported on drop; a watcher dropped unsettled reports `Abandoned`.
    fn settle<T>(&mut self, result: &std::thread::Result<T>) {
        self.outcome = match result {
            Ok(_) => Outcome::Executed,
            Err(_) => Outcome::Panicked,
        };
    }
}

impl Drop for JobWatcher {
    fn drop(&mut self) {
        tracing::Span::current().record("job.outcome", &self.outcome.to_string());
        tracing::debug!(
            "job.type" = %self.compute_job_type,
            "job.outcome" = %self.outcome,
            "compute job settled"
        );
    }
}

/// Whether the queue reached its soft capacity.
pub(crate) fn is_full() -> bool {
    let queue = queue();
    queue.queued_count() >= queue.soft_capacity
}
