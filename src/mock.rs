//! In-process producer for tests.
//!
//! [`MockProducer`] consumes its input queue on a background thread and
//! matches every message against an ordered list of expectations. Mismatches
//! are sent to an [`ErrorReporter`]; expectations set up to fail push their
//! error onto the regular error channel, just like a broker would.

use crate::producer::{AsyncProducer, InputQueue, InputWorker, ProducerError, ProducerMessage};
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const INPUT_BUFFER: usize = 256;

/// Receives problems found by a [`MockProducer`].
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: String);
}

/// Inspects the value of an incoming message.
pub type ValueChecker = Box<dyn Fn(&[u8]) -> Result<(), Box<dyn Error + Send + Sync>> + Send>;

struct Expectation {
    checker: Option<ValueChecker>,
    failure: Option<Box<dyn Error + Send + Sync>>,
}

struct MockState {
    expectations: Mutex<VecDeque<Expectation>>,
    messages: Mutex<Vec<ProducerMessage>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl MockState {
    fn push(&self, expectation: Expectation) {
        self.expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(expectation);
    }
}

pub struct MockProducer {
    queue: InputQueue,
    errors: Mutex<Option<UnboundedReceiver<ProducerError>>>,
    state: Arc<MockState>,
}

impl MockProducer {
    /// Start the mock; fails only if its input thread cannot be started.
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Result<Self, ProducerError> {
        let (errors_tx, errors_rx) = unbounded_channel();
        let state = Arc::new(MockState {
            expectations: Mutex::new(VecDeque::new()),
            messages: Mutex::new(Vec::new()),
            reporter,
        });
        let queue = InputQueue::spawn(
            "mock-producer-input",
            INPUT_BUFFER,
            MockWorker {
                state: Arc::clone(&state),
                errors: errors_tx,
            },
        )?;

        Ok(MockProducer {
            queue,
            errors: Mutex::new(Some(errors_rx)),
            state,
        })
    }

    pub fn expect_input_and_succeed(&self) {
        self.state.push(Expectation {
            checker: None,
            failure: None,
        });
    }

    pub fn expect_input_with_checker_and_succeed(&self, checker: ValueChecker) {
        self.state.push(Expectation {
            checker: Some(checker),
            failure: None,
        });
    }

    pub fn expect_input_with_checker_and_fail(
        &self,
        checker: ValueChecker,
        err: impl Into<Box<dyn Error + Send + Sync>>,
    ) {
        self.state.push(Expectation {
            checker: Some(checker),
            failure: Some(err.into()),
        });
    }

    /// Messages taken off the input queue so far.
    pub fn messages(&self) -> Vec<ProducerMessage> {
        self.state
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn received(&self) -> usize {
        self.state
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl AsyncProducer for MockProducer {
    fn input(&self) -> &Sender<ProducerMessage> {
        self.queue.sender()
    }

    fn take_errors(&self) -> Option<UnboundedReceiver<ProducerError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Drains the queue, then reports expectations that were never met.
    fn close(&self) -> Result<(), ProducerError> {
        self.queue.close()
    }
}

impl Drop for MockProducer {
    fn drop(&mut self) {
        let _ = self.queue.close();
    }
}

struct MockWorker {
    state: Arc<MockState>,
    errors: UnboundedSender<ProducerError>,
}

impl InputWorker for MockWorker {
    fn publish(&mut self, msg: ProducerMessage) {
        self.state
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg.clone());

        let expectation = self
            .state
            .expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let Some(expectation) = expectation else {
            self.state.reporter.report(
                "No more expectation set on this mock producer to handle the input message."
                    .to_string(),
            );
            let _ = self
                .errors
                .send(ProducerError::OutOfExpectations { message: msg });
            return;
        };

        if let Some(checker) = &expectation.checker {
            if let Err(err) = checker(&msg.value) {
                self.state
                    .reporter
                    .report(format!("Input message was not as expected: {err}"));
            }
        }

        if let Some(source) = expectation.failure {
            let _ = self.errors.send(ProducerError::Delivery {
                message: msg,
                source,
            });
        }
    }

    fn finish(self) {
        let left = self
            .state
            .expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if left > 0 {
            self.state.reporter.report(format!(
                "Expected to exhaust all expectations, but {left} are left."
            ));
        }
    }
}
