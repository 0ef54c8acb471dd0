//! Upload coordinator: fans chunk deliveries out to a fixed pool of workers
//!
//! Jobs flow through one bounded channel. A single `CancellationToken` is the
//! stop signal for the producer and every worker; raising it never blocks and
//! raising it twice is harmless. Once a worker or the producer observes it, no
//! further remote command is started. Commands already running finish, but
//! their results are not recorded.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::chunk::{ChunkPlan, UploadJob};
use crate::command::ScriptTemplate;
use crate::config::CopyConfig;
use crate::error::{CopyError, Result};
use crate::executor::{CommandOutput, RemoteExecutor};
use crate::logger::CopyLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Dispatching,
    Succeeded,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered,
    Failed(String),
}

/// Shared bookkeeping for one upload run
pub struct RunState {
    total_jobs: usize,
    jobs_submitted: AtomicUsize,
    jobs_completed: AtomicUsize,
    phase: Mutex<Phase>,
    outcomes: Mutex<Vec<Option<UploadOutcome>>>,
    first_error: Mutex<Option<CopyError>>,
    cancel: CancellationToken,
}

impl RunState {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            total_jobs,
            jobs_submitted: AtomicUsize::new(0),
            jobs_completed: AtomicUsize::new(0),
            phase: Mutex::new(Phase::Idle),
            outcomes: Mutex::new(vec![None; total_jobs]),
            first_error: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }

    pub fn jobs_submitted(&self) -> usize {
        self.jobs_submitted.load(Ordering::SeqCst)
    }

    pub fn jobs_completed(&self) -> usize {
        self.jobs_completed.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Raise the stop signal. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn outcomes(&self) -> Vec<Option<UploadOutcome>> {
        self.outcomes.lock().clone()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes
            .lock()
            .iter()
            .filter(|o| matches!(o, Some(UploadOutcome::Delivered)))
            .count()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn record(&self, index: usize, outcome: UploadOutcome) {
        if let Some(slot) = self.outcomes.lock().get_mut(index) {
            *slot = Some(outcome);
        }
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Store `err` if it is the first terminal failure, then cancel the run.
    /// Returns whether this call was the first.
    fn fail(&self, err: CopyError) -> bool {
        let first = {
            let mut slot = self.first_error.lock();
            if slot.is_none() {
                *slot = Some(err);
                true
            } else {
                false
            }
        };
        self.cancel.cancel();
        first
    }

    fn take_error(&self) -> Option<CopyError> {
        self.first_error.lock().take()
    }
}

/// Knobs the coordinator needs from the copy configuration
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub concurrency: usize,
    pub retries_per_chunk: u32,
    pub queue_depth: usize,
    pub retry_backoff: Duration,
}

impl From<&CopyConfig> for UploadSettings {
    fn from(cfg: &CopyConfig) -> Self {
        Self {
            concurrency: cfg.concurrency,
            retries_per_chunk: cfg.retries_per_chunk,
            queue_depth: cfg.queue_depth,
            retry_backoff: cfg.retry_backoff(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        (&CopyConfig::default()).into()
    }
}

#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub total_jobs: usize,
    pub delivered: usize,
    pub outcomes: Vec<UploadOutcome>,
}

pub struct UploadCoordinator {
    executor: Arc<dyn RemoteExecutor>,
    settings: UploadSettings,
    logger: Arc<dyn CopyLogger>,
}

/// Everything a worker task needs; cheap to clone
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<UploadJob>>>,
    state: Arc<RunState>,
    executor: Arc<dyn RemoteExecutor>,
    template: Arc<ScriptTemplate>,
    logger: Arc<dyn CopyLogger>,
    max_attempts: u32,
    backoff: Duration,
}

impl UploadCoordinator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        settings: UploadSettings,
        logger: Arc<dyn CopyLogger>,
    ) -> Self {
        Self {
            executor,
            settings,
            logger,
        }
    }

    /// Deliver every chunk of `plan`, or fail with the first terminal error.
    pub async fn run(&self, plan: ChunkPlan, template: &ScriptTemplate) -> Result<UploadSummary> {
        let state = Arc::new(RunState::new(plan.len()));
        self.run_tracked(plan, template, state).await
    }

    /// Like [`run`](Self::run) but reports progress into a caller-owned
    /// `RunState`, which must have been created for `plan.len()` jobs.
    pub async fn run_tracked(
        &self,
        plan: ChunkPlan,
        template: &ScriptTemplate,
        state: Arc<RunState>,
    ) -> Result<UploadSummary> {
        if self.settings.concurrency == 0 || self.settings.queue_depth == 0 {
            return Err(CopyError::Config(
                "concurrency and queue depth must be at least 1".into(),
            ));
        }
        if state.total_jobs() != plan.len() {
            return Err(CopyError::Config(format!(
                "run state sized for {} jobs, plan has {}",
                state.total_jobs(),
                plan.len()
            )));
        }

        state.set_phase(Phase::Dispatching);
        let total = plan.len();

        let (tx, rx) = mpsc::channel::<UploadJob>(self.settings.queue_depth);
        let ctx = WorkerContext {
            queue: Arc::new(tokio::sync::Mutex::new(rx)),
            state: Arc::clone(&state),
            executor: Arc::clone(&self.executor),
            template: Arc::new(template.clone()),
            logger: Arc::clone(&self.logger),
            max_attempts: self.settings.retries_per_chunk.saturating_add(1),
            backoff: self.settings.retry_backoff,
        };

        let mut workers = JoinSet::new();
        for _ in 0..self.settings.concurrency.min(total) {
            workers.spawn(worker_loop(ctx.clone()));
        }
        drop(ctx);

        // Producer: stops feeding as soon as any worker cancels the run
        for job in plan.into_jobs() {
            tokio::select! {
                biased;
                _ = state.cancel.cancelled() => break,
                sent = tx.send(job) => {
                    if sent.is_err() {
                        break;
                    }
                    state.jobs_submitted.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if state.fail(CopyError::Transport(format!("upload worker died: {e}"))) {
                    self.logger.cancelled("upload worker died");
                }
            }
        }

        if let Some(err) = state.take_error() {
            state.set_phase(Phase::Cancelled);
            return Err(err);
        }

        let outcomes: Vec<UploadOutcome> = state.outcomes().into_iter().flatten().collect();
        let delivered = outcomes
            .iter()
            .filter(|o| **o == UploadOutcome::Delivered)
            .count();
        if delivered != total {
            state.set_phase(Phase::Cancelled);
            return Err(CopyError::Cancelled);
        }

        state.set_phase(Phase::Succeeded);
        Ok(UploadSummary {
            total_jobs: total,
            delivered,
            outcomes,
        })
    }
}

async fn worker_loop(ctx: WorkerContext) {
    loop {
        if ctx.state.is_cancelled() {
            break;
        }
        let next = tokio::select! {
            biased;
            _ = ctx.state.cancel.cancelled() => None,
            job = async { ctx.queue.lock().await.recv().await } => job,
        };
        let Some(job) = next else { break };

        match deliver(&ctx, &job).await {
            Ok(()) => {
                // results landing after cancellation are ignored
                if !ctx.state.is_cancelled() {
                    ctx.state.record(job.sequence_index, UploadOutcome::Delivered);
                    ctx.logger.chunk_delivered(job.sequence_index);
                }
            }
            Err(CopyError::Cancelled) => break,
            Err(e) => {
                let msg = e.to_string();
                ctx.state
                    .record(job.sequence_index, UploadOutcome::Failed(msg.clone()));
                if ctx.state.fail(e) {
                    ctx.logger.cancelled(&msg);
                }
                break;
            }
        }
    }
}

/// Run the write command for `job` until it succeeds or attempts run out.
/// Each attempt overwrites the same fragment, so repeating it is safe.
async fn deliver(ctx: &WorkerContext, job: &UploadJob) -> Result<()> {
    let index = job.sequence_index;
    let command = ctx
        .template
        .write_chunk(&job.destination_path, job.payload_str()?);

    let mut last_err = String::new();
    for attempt in 1..=ctx.max_attempts {
        if ctx.state.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        ctx.logger.chunk_attempt(index, attempt, command.len());

        match ctx.executor.run(&command).await.and_then(CommandOutput::check) {
            Ok(_) => return Ok(()),
            Err(e) if e.is_transient() => {
                last_err = e.to_string();
                ctx.logger.chunk_retry(index, attempt, &last_err);
            }
            Err(e) => return Err(e),
        }

        if attempt < ctx.max_attempts && !ctx.backoff.is_zero() {
            tokio::select! {
                _ = ctx.state.cancel.cancelled() => return Err(CopyError::Cancelled),
                _ = tokio::time::sleep(ctx.backoff) => {}
            }
        }
    }

    ctx.logger.chunk_failed(index, ctx.max_attempts, &last_err);
    Err(CopyError::ChunkDelivery {
        index,
        attempts: ctx.max_attempts,
        reason: last_err,
    })
}
