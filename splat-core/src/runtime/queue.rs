use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::runtime::pipeline::PipelineRun;
use crate::runtime::registry::TaskRegistry;
use crate::runtime::stage::StageRunner;
use crate::runtime::types::{RuntimeError, TaskOutcome};

/// Diagnostic recorded on runs still queued when the queue stops.
pub const STOPPED_BEFORE_START: &str = "execution queue stopped before the task started";

/// Backlog policy of the [`ExecutionQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueCapacity {
    /// Accept every submission.
    #[default]
    Unbounded,
    /// Reject submissions with [`RuntimeError::QueueFull`] once `n` runs wait.
    Bounded(usize),
}

impl QueueCapacity {
    /// `0` means unbounded.
    pub fn from_limit(limit: usize) -> Self {
        if limit == 0 {
            QueueCapacity::Unbounded
        } else {
            QueueCapacity::Bounded(limit)
        }
    }
}

/// FIFO of pipeline runs drained by exactly one worker task.
///
/// Runs execute strictly one at a time in submission order; every stage of
/// a run returns before the next run is dequeued.  A failing or panicking
/// run only fails its own task.
#[derive(Debug)]
pub struct ExecutionQueue {
    tx: flume::Sender<PipelineRun>,
    capacity: QueueCapacity,
    /// `false` once stopping has begun; guards submissions against the drain.
    accepting: Arc<Mutex<bool>>,
    busy: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionQueue {
    /// Spawn the worker and return the queue handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        registry: TaskRegistry,
        runner: Arc<dyn StageRunner>,
        capacity: QueueCapacity,
    ) -> Self {
        let (tx, rx) = match capacity {
            QueueCapacity::Unbounded => flume::unbounded(),
            QueueCapacity::Bounded(n) => flume::bounded(n),
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accepting = Arc::new(Mutex::new(true));
        let busy = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(Self::run_loop(
            rx,
            shutdown_rx,
            Arc::clone(&accepting),
            Arc::clone(&busy),
            registry,
            runner,
        ));
        info!(?capacity, "execution queue started");

        Self {
            tx,
            capacity,
            accepting,
            busy,
            shutdown_tx,
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Append a run to the queue without waiting.
    pub fn submit(&self, run: PipelineRun) -> Result<(), RuntimeError> {
        let accepting = self.accepting.lock().unwrap_or_else(PoisonError::into_inner);
        if !*accepting {
            return Err(RuntimeError::QueueStopped);
        }
        self.tx.try_send(run).map_err(|e| match e {
            flume::TrySendError::Full(_) => RuntimeError::QueueFull {
                capacity: match self.capacity {
                    QueueCapacity::Bounded(n) => n,
                    QueueCapacity::Unbounded => usize::MAX,
                },
            },
            flume::TrySendError::Disconnected(_) => RuntimeError::QueueStopped,
        })
    }

    /// Runs waiting to start (excludes the one executing).
    pub fn depth(&self) -> usize {
        self.tx.len()
    }

    /// `true` while a run is executing.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> QueueCapacity {
        self.capacity
    }

    /// Stop accepting work, let the in-flight run finish, fail whatever is
    /// still queued and wait for the worker to exit.  Idempotent.
    pub async fn stop(&self) {
        *self.accepting.lock().unwrap_or_else(PoisonError::into_inner) = false;
        // Err only means the worker is already gone.
        let _ = self.shutdown_tx.send(true);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "execution worker terminated abnormally");
            }
            info!("execution queue stopped");
        }
    }

    async fn run_loop(
        rx: flume::Receiver<PipelineRun>,
        mut shutdown_rx: watch::Receiver<bool>,
        accepting: Arc<Mutex<bool>>,
        busy: Arc<AtomicBool>,
        registry: TaskRegistry,
        runner: Arc<dyn StageRunner>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,

                next = rx.recv_async() => match next {
                    Ok(run) => {
                        busy.store(true, Ordering::SeqCst);
                        Self::execute(run, &registry, &runner).await;
                        busy.store(false, Ordering::SeqCst);
                    }
                    Err(_) => break,
                },
            }
        }

        *accepting.lock().unwrap_or_else(PoisonError::into_inner) = false;
        let pending: Vec<PipelineRun> = rx.drain().collect();
        if !pending.is_empty() {
            warn!(count = pending.len(), "failing runs left in the queue");
        }
        for run in pending {
            let task_id = run.task_id();
            if let Err(e) = registry
                .set_terminal(task_id, TaskOutcome::Failed(STOPPED_BEFORE_START.into()))
                .await
            {
                warn!(%task_id, error = %e, "could not fail queued task");
            }
        }
    }

    /// Execute one run in its own task so a panic cannot take the worker down.
    async fn execute(run: PipelineRun, registry: &TaskRegistry, runner: &Arc<dyn StageRunner>) {
        let task_id = run.task_id();
        let variant = run.variant();
        info!(%task_id, %variant, "task started");

        let runner = Arc::clone(runner);
        let handle = tokio::spawn(async move { run.execute(runner.as_ref()).await });

        let outcome = match handle.await {
            Ok(Ok(result)) => {
                info!(%task_id, point_cloud = %result.point_cloud, "task complete");
                TaskOutcome::Complete(result)
            }
            Ok(Err(err)) => {
                warn!(%task_id, error = %err, "task failed");
                TaskOutcome::Failed(err.diagnostic())
            }
            Err(join_err) => {
                let err = RuntimeError::PipelinePanicked(join_err.to_string());
                error!(%task_id, error = %err, "task aborted");
                TaskOutcome::Failed(err.diagnostic())
            }
        };

        if let Err(e) = registry.set_terminal(task_id, outcome).await {
            warn!(%task_id, error = %e, "could not record task outcome");
        }
    }
}

impl Drop for ExecutionQueue {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
