//! Bounded-concurrency task runner with per-task retry.
//!
//! Inputs become tasks on a ready queue. At most `concurrency` tasks run at
//! once; a finished task immediately makes room for the next queued one. A
//! failed attempt with retries left goes to the back of the queue. One task
//! failing never stops its siblings. Shutdown, or a task ending in a
//! cancellation error, stops admission and aborts the rest of the batch.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use vshort_models::TaskState;

use crate::error::{PipelineError, PipelineResult};
use crate::logging::TaskLogger;
use crate::metrics;

/// Failure reason recorded for tasks stopped by shutdown.
pub const CANCELLED_REASON: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum tasks in flight.
    pub concurrency: usize,
    /// Extra attempts after the first failure.
    pub retries_per_task: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retries_per_task: 2,
        }
    }
}

/// One unit of work and its progress.
#[derive(Debug)]
pub struct PipelineTask<I, T> {
    pub index: usize,
    pub input: I,
    pub state: TaskState,
    pub attempts: u32,
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<I, T> PipelineTask<I, T> {
    fn new(index: usize, input: I) -> Self {
        Self {
            index,
            input,
            state: TaskState::Pending,
            attempts: 0,
            result: None,
            error: None,
        }
    }

    fn transition(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid task transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub index: usize,
    pub attempts: u32,
    pub reason: String,
}

/// Outcome of a batch.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Successful results in submission order
    pub succeeded: Vec<(usize, T)>,
    /// Tasks that ended in `Failed`, in submission order
    pub failures: Vec<TaskFailure>,
}

impl<T> BatchReport<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failures.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.failures.iter().any(|f| f.reason == CANCELLED_REASON)
    }

    /// Successful values in submission order.
    pub fn into_values(self) -> Vec<T> {
        self.succeeded.into_iter().map(|(_, value)| value).collect()
    }
}

/// Worker pool for the stages of a topic.
#[derive(Debug, Clone, Default)]
pub struct ConcurrentPipelineRunner {
    config: RunnerConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

type Attempt<T> = (usize, PipelineResult<T>, f64);

impl ConcurrentPipelineRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            shutdown: None,
        }
    }

    /// Stop admitting and abort in-flight tasks when the signal flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> RunnerConfig {
        self.config
    }

    /// Run `step` over every input.
    ///
    /// Completes when each task has succeeded or exhausted its attempts.
    pub async fn run<I, T, F, Fut>(&self, stage: &str, inputs: Vec<I>, step: F) -> BatchReport<T>
    where
        I: Clone,
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = PipelineResult<T>> + Send + 'static,
    {
        let concurrency = self.config.concurrency.max(1);
        let max_attempts = self.config.retries_per_task + 1;

        let mut tasks: Vec<PipelineTask<I, T>> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| PipelineTask::new(index, input))
            .collect();
        let mut ready: VecDeque<usize> = (0..tasks.len()).collect();
        let mut in_flight: JoinSet<Attempt<T>> = JoinSet::new();
        let mut shutdown = self.shutdown.clone();
        let mut cancelled = is_shutdown(&shutdown);

        info!(stage, tasks = tasks.len(), concurrency, max_attempts, "Running stage");

        loop {
            if !cancelled && is_shutdown(&shutdown) {
                warn!(stage, in_flight = in_flight.len(), "Shutdown requested, aborting stage");
                cancelled = true;
                in_flight.abort_all();
            }

            while !cancelled && in_flight.len() < concurrency {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                let task = &mut tasks[index];
                task.transition(TaskState::Running);
                task.attempts += 1;
                TaskLogger::new(stage, index).log_start(task.attempts);

                // A panicking step fails its task, not the batch
                let attempt: BoxFuture<'static, PipelineResult<T>> =
                    match std::panic::catch_unwind(AssertUnwindSafe(|| step(task.input.clone()))) {
                        Ok(attempt) => attempt.boxed(),
                        Err(_) => future::ready(Err(panicked())).boxed(),
                    };
                in_flight.spawn(async move {
                    let started = Instant::now();
                    let result = AssertUnwindSafe(attempt)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(panicked()));
                    (index, result, started.elapsed().as_secs_f64())
                });
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next() => {
                    if let Some(Ok((index, result, elapsed))) = joined {
                        match settle(&mut tasks[index], stage, result, elapsed, max_attempts) {
                            Settled::Requeue => ready.push_back(index),
                            Settled::Done => {}
                            Settled::Cancelled if !cancelled => {
                                warn!(stage, task = index, "Task cancelled, aborting stage");
                                cancelled = true;
                                in_flight.abort_all();
                            }
                            Settled::Cancelled => {}
                        }
                    }
                }
                _ = wait_for_shutdown(&mut shutdown), if !cancelled => {
                    warn!(stage, in_flight = in_flight.len(), "Shutdown requested, aborting stage");
                    cancelled = true;
                    in_flight.abort_all();
                }
            }
        }

        if cancelled {
            for task in tasks.iter_mut().filter(|t| !t.state.is_terminal()) {
                task.transition(TaskState::Failed);
                task.error = Some(CANCELLED_REASON.to_string());
            }
        }

        let report = collect_report(tasks);
        info!(
            stage,
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "Stage finished"
        );
        report
    }
}

/// What the runner does with a task after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Done,
    Requeue,
    /// The attempt was cancelled; the whole batch stops
    Cancelled,
}

/// Record an attempt's outcome.
fn settle<I, T>(
    task: &mut PipelineTask<I, T>,
    stage: &str,
    result: PipelineResult<T>,
    elapsed: f64,
    max_attempts: u32,
) -> Settled {
    let logger = TaskLogger::new(stage, task.index);
    metrics::record_task_attempt(stage, result.is_ok(), elapsed);

    match result {
        Ok(value) => {
            task.transition(TaskState::Succeeded);
            task.result = Some(value);
            task.error = None;
            logger.log_success(task.attempts, elapsed);
            Settled::Done
        }
        Err(e) if e.is_cancelled() => {
            logger.log_failure(task.attempts, &e.to_string());
            task.transition(TaskState::Failed);
            task.error = Some(CANCELLED_REASON.to_string());
            Settled::Cancelled
        }
        Err(e) if task.attempts < max_attempts => {
            let reason = e.to_string();
            logger.log_retry(task.attempts, &reason);
            task.transition(TaskState::Pending);
            task.error = Some(reason);
            Settled::Requeue
        }
        Err(e) => {
            let reason = e.to_string();
            logger.log_failure(task.attempts, &reason);
            task.transition(TaskState::Failed);
            task.error = Some(reason);
            Settled::Done
        }
    }
}

fn panicked() -> PipelineError {
    PipelineError::task_failed("task panicked")
}

fn collect_report<I, T>(tasks: Vec<PipelineTask<I, T>>) -> BatchReport<T> {
    let mut report = BatchReport {
        succeeded: Vec::new(),
        failures: Vec::new(),
    };

    for task in tasks {
        match (task.state, task.result) {
            (TaskState::Succeeded, Some(value)) => report.succeeded.push((task.index, value)),
            _ => report.failures.push(TaskFailure {
                index: task.index,
                attempts: task.attempts,
                reason: task.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }

    report
}

fn is_shutdown(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().is_some_and(|rx| *rx.borrow())
}

async fn wait_for_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown.as_mut() {
        Some(rx) => {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    // Sender gone, nobody can shut us down any more
                    std::future::pending::<()>().await;
                }
            }
        }
        None => std::future::pending::<()>().await,
    }
}
