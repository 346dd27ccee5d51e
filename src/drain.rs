use crate::producer::ProducerError;
use std::sync::Arc;
use std::thread;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Destination for errors reported by a producer after `fire` has returned.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, err: &ProducerError);
}

/// Writes each producer error to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrDiagnostics;

impl DiagnosticSink for StderrDiagnostics {
    fn report(&self, err: &ProducerError) {
        eprintln!("[tracing-kafka-hook:ERROR] {err}");
    }
}

/// Error returned when waiting for a drain to finish.
#[derive(thiserror::Error, Debug)]
pub enum DrainError {
    #[error("drain panicked")]
    Panicked,

    #[error("drain task was cancelled")]
    Cancelled,

    #[error("cannot block on a drain task from inside a Tokio runtime")]
    InsideRuntime,

    #[error("failed to start drain: {0}")]
    Io(#[from] std::io::Error),
}

/// The running drain: a Tokio task when one was available, a thread otherwise.
#[derive(Debug)]
pub enum DrainHandle {
    Task(JoinHandle<()>),
    Thread(thread::JoinHandle<()>),
}

impl DrainHandle {
    /// Wait for the drain to end. It ends once the producer is closed.
    pub async fn wait(self) -> Result<(), DrainError> {
        match self {
            DrainHandle::Task(task) => task.await.map_err(|e| {
                if e.is_panic() {
                    DrainError::Panicked
                } else {
                    DrainError::Cancelled
                }
            }),
            DrainHandle::Thread(handle) => tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|_| DrainError::Cancelled)?
                .map_err(|_| DrainError::Panicked),
        }
    }

    /// Block until the drain ends.
    ///
    /// A task drain can only be joined this way from outside a runtime; use
    /// [`wait`](DrainHandle::wait) from async code.
    pub fn join(self) -> Result<(), DrainError> {
        match self {
            DrainHandle::Thread(handle) => handle.join().map_err(|_| DrainError::Panicked),
            DrainHandle::Task(task) => {
                if Handle::try_current().is_ok() {
                    return Err(DrainError::InsideRuntime);
                }
                let rt = tokio::runtime::Builder::new_current_thread().build()?;
                rt.block_on(DrainHandle::Task(task).wait())
            }
        }
    }
}

/// Start draining a producer's error channel into `sink`.
///
/// Inside a Tokio runtime the drain is a task on that runtime; elsewhere it
/// gets its own thread. Either way it ends once the channel closes, which
/// happens when the producer is closed. There is no other way to stop it.
pub fn drain_errors(
    mut errors: UnboundedReceiver<ProducerError>,
    sink: Arc<dyn DiagnosticSink>,
) -> Result<DrainHandle, DrainError> {
    if let Ok(runtime) = Handle::try_current() {
        let task = runtime.spawn(async move {
            while let Some(err) = errors.recv().await {
                sink.report(&err);
            }
        });
        return Ok(DrainHandle::Task(task));
    }

    let handle = thread::Builder::new()
        .name("kafka-hook-drain".to_string())
        .spawn(move || {
            while let Some(err) = errors.blocking_recv() {
                sink.report(&err);
            }
        })?;
    Ok(DrainHandle::Thread(handle))
}
