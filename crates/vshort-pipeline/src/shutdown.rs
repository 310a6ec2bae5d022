//! Cancellation and cleanup on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::PipelineResult;
use crate::workspace::TempWorkspace;

/// Time in-flight work gets to wind down after a shutdown signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Operator cancellation or a shutdown signal
    Cancelled,
    Faulted(String),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed | RunOutcome::Cancelled => 0,
            RunOutcome::Faulted(_) => 1,
        }
    }
}

/// Owns the cancellation channel and the temp workspace.
///
/// Subscribers (runners, transcoders) observe `true` once shutdown starts.
/// The workspace is cleaned after the run regardless of how it ended.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    workspace: Arc<TempWorkspace>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(workspace: Arc<TempWorkspace>) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            workspace,
            grace: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn workspace(&self) -> &Arc<TempWorkspace> {
        &self.workspace
    }

    /// Signal every subscriber to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Run `work` until it finishes or the process receives Ctrl-C/SIGTERM.
    pub async fn run<F>(&self, work: F) -> RunOutcome
    where
        F: Future<Output = PipelineResult<()>>,
    {
        self.run_until(work, shutdown_signal()).await
    }

    /// Run `work` until it finishes or `signal` resolves, then clean up.
    pub async fn run_until<F, S>(&self, work: F, signal: S) -> RunOutcome
    where
        F: Future<Output = PipelineResult<()>>,
        S: Future<Output = ()>,
    {
        tokio::pin!(work);

        let finished = tokio::select! {
            result = &mut work => Some(result),
            _ = signal => None,
        };

        let outcome = match finished {
            Some(result) => classify(result),
            None => {
                info!("Shutdown signal received, stopping");
                self.trigger();
                match tokio::time::timeout(self.grace, &mut work).await {
                    Ok(_) => info!("In-flight work stopped"),
                    Err(_) => warn!(
                        grace_secs = self.grace.as_secs(),
                        "In-flight work did not stop in time, abandoning it"
                    ),
                }
                RunOutcome::Cancelled
            }
        };

        self.workspace.cleanup().await;
        outcome
    }
}

fn classify(result: PipelineResult<()>) -> RunOutcome {
    match result {
        Ok(()) => RunOutcome::Completed,
        Err(e) if e.is_cancelled() => {
            info!("Run cancelled by operator");
            RunOutcome::Cancelled
        }
        Err(e) => {
            error!("Run failed: {}", e);
            RunOutcome::Faulted(e.to_string())
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
