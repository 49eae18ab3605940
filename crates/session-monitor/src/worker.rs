//! Supervision of the long-running tasks.
//!
//! Every worker receives a child of the syncer's cancellation token. The
//! token is cancelled on `SIGINT`, `SIGTERM`, `SIGQUIT` or the first worker
//! error; [`WorkerSyncer::sync`] then waits for every worker to return.

use core::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use error_stack::Context;
use error_stack::Report;
use error_stack::ResultExt;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

#[derive(Debug, derive_more::Display)]
pub enum WorkerError {
    #[display("Worker {worker} failed")]
    Failed { worker: String },
    #[display("Worker {worker} panicked")]
    Panicked { worker: String },
    #[display("Failed to install signal handler")]
    Signal,
}

impl Error for WorkerError {}

type WorkerResult = Result<(), Report<WorkerError>>;
type Worker = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, WorkerResult> + Send>;

pub struct WorkerSyncer {
    cancellation_token: CancellationToken,
    workers: Vec<(String, Worker)>,
    handle_signals: bool,
}

impl Default for WorkerSyncer {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSyncer {
    /// A syncer that also shuts down on process signals.
    pub fn new() -> Self {
        Self {
            cancellation_token: CancellationToken::new(),
            workers: Vec::new(),
            handle_signals: true,
        }
    }

    /// A syncer that only stops on worker errors or explicit cancellation.
    pub fn without_signals() -> Self {
        Self {
            handle_signals: false,
            ..Self::new()
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Registers a worker. It must return once its token is cancelled.
    pub fn add<F, Fut, C>(&mut self, name: impl Into<String>, worker: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Report<C>>> + Send + 'static,
        C: Context,
    {
        let name = name.into();
        let worker_name = name.clone();
        let worker: Worker = Box::new(move |token| {
            async move {
                worker(token)
                    .await
                    .change_context(WorkerError::Failed { worker: worker_name })
            }
            .boxed()
        });
        self.workers.push((name, worker));
    }

    /// Runs every worker to completion and returns the first error.
    pub async fn sync(self) -> Result<(), Report<WorkerError>> {
        let token = self.cancellation_token;
        let signals = if self.handle_signals {
            Some(tokio::spawn(wait_for_signal(token.clone())))
        } else {
            None
        };

        let mut set = JoinSet::new();
        for (name, worker) in self.workers {
            let child = token.child_token();
            info!(worker = %name, "Starting worker");
            set.spawn(async move {
                let result = AssertUnwindSafe(worker(child))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(Report::new(WorkerError::Panicked {
                            worker: name.clone(),
                        }))
                    });
                (name, result)
            });
        }

        let mut first_error: Option<Report<WorkerError>> = None;
        while let Some(joined) = set.join_next().await {
            let result = match joined {
                Ok((name, Ok(()))) => {
                    info!(worker = %name, "Worker completed");
                    continue;
                }
                Ok((_, Err(report))) => report,
                Err(join_error) => Report::new(WorkerError::Panicked {
                    worker: "unknown".to_string(),
                })
                .attach_printable(join_error.to_string()),
            };

            error!("Worker stopped with error: {result:?}");
            token.cancel();
            if first_error.is_none() {
                first_error = Some(result);
            }
        }

        token.cancel();
        if let Some(signals) = signals {
            match signals.await {
                Ok(Err(report)) if first_error.is_none() => first_error = Some(report),
                Ok(_) => {}
                Err(e) => error!("Signal task failed: {e}"),
            }
        }

        match first_error {
            Some(report) => Err(report),
            None => Ok(()),
        }
    }
}

/// Cancels `token` on the first shutdown signal. Returns once `token` is
/// cancelled for any reason.
async fn wait_for_signal(token: CancellationToken) -> WorkerResult {
    #[cfg(unix)]
    {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        let install = |kind: SignalKind| {
            signal(kind).change_context(WorkerError::Signal).map_err(|e| {
                token.cancel();
                e
            })
        };
        let mut sigint = install(SignalKind::interrupt())?;
        let mut sigterm = install(SignalKind::terminate())?;
        let mut sigquit = install(SignalKind::quit())?;

        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigquit.recv() => info!("Received SIGQUIT, initiating graceful shutdown"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            result = tokio::signal::ctrl_c() => {
                result.change_context(WorkerError::Signal)?;
                info!("Received Ctrl+C, initiating graceful shutdown");
            }
        }
    }

    token.cancel();
    Ok(())
}
