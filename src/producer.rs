use crossbeam_channel::{bounded, select, Sender};
use rdkafka::error::KafkaError;
use std::error::Error;
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedReceiver;

/// Message envelope handed to an [`AsyncProducer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Errors reported by a producer, either synchronously from construction
/// and shutdown or asynchronously on its error channel.
#[derive(thiserror::Error, Debug)]
pub enum ProducerError {
    #[error("failed to create kafka producer: {0}")]
    Client(#[source] KafkaError),

    #[error("failed to produce message to topic {}: {source}", .message.topic)]
    Delivery {
        message: ProducerMessage,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("failed to enqueue message for topic {}: {source}", .message.topic)]
    Enqueue {
        message: ProducerMessage,
        #[source]
        source: KafkaError,
    },

    #[error("failed to start producer thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to flush kafka producer: {0}")]
    Flush(#[source] KafkaError),

    #[error("no more expectations set on mock producer for topic {}", .message.topic)]
    OutOfExpectations { message: ProducerMessage },

    #[error("producer worker thread panicked")]
    WorkerPanicked,
}

/// Asynchronous producer the hook publishes through.
///
/// Messages go in through a bounded [`input`](AsyncProducer::input) queue;
/// a full queue blocks the sender. Delivery failures come back out of band
/// on the error channel, which is closed once the producer has shut down.
pub trait AsyncProducer: Send + Sync {
    /// Queue accepting outbound messages.
    ///
    /// Sending fails once the producer has been closed.
    fn input(&self) -> &Sender<ProducerMessage>;

    /// Hand out the error channel. Only the first call returns it.
    fn take_errors(&self) -> Option<UnboundedReceiver<ProducerError>>;

    /// Stop accepting messages, deliver what is queued and release the
    /// client. Calling it again is a no-op.
    fn close(&self) -> Result<(), ProducerError>;
}

/// Consumer side of an [`InputQueue`], run on its own thread.
pub(crate) trait InputWorker: Send + 'static {
    fn publish(&mut self, msg: ProducerMessage);

    /// Called once after the queue has been drained on shutdown.
    fn finish(self);
}

/// Bounded input queue plus the thread that consumes it.
pub(crate) struct InputQueue {
    input: Sender<ProducerMessage>,
    shutdown: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InputQueue {
    pub(crate) fn spawn<W: InputWorker>(
        name: &str,
        capacity: usize,
        mut worker: W,
    ) -> Result<Self, ProducerError> {
        let (input_tx, input_rx) = bounded::<ProducerMessage>(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(input_rx) -> msg => match msg {
                            Ok(msg) => worker.publish(msg),
                            Err(_) => break,
                        },
                        recv(shutdown_rx) -> _ => {
                            while let Ok(msg) = input_rx.try_recv() {
                                worker.publish(msg);
                            }
                            break;
                        }
                    }
                }
                worker.finish();
            })
            .map_err(ProducerError::Spawn)?;

        Ok(InputQueue {
            input: input_tx,
            shutdown: shutdown_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn sender(&self) -> &Sender<ProducerMessage> {
        &self.input
    }

    /// Stop the worker after it has drained the queue. Idempotent.
    pub(crate) fn close(&self) -> Result<(), ProducerError> {
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(handle) = handle else {
            return Ok(());
        };
        let _ = self.shutdown.send(());
        handle.join().map_err(|_| ProducerError::WorkerPanicked)
    }
}
