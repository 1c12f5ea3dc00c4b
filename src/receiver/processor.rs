use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::functions::MessageHandler;
use super::retry::{RetryDecision, RetryPolicy};
use crate::message::{APPROXIMATE_RECEIVE_COUNT, Message};
use crate::monitor::ConsumeMetrics;
use crate::transport::QueueTransport;

/// How one processing attempt ended. Only observable through transport calls,
/// logs and metrics; the consumer itself never fails because of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Handler succeeded, message deleted.
    Acknowledged,
    /// Handler failed, message hidden for the given duration before redelivery.
    DeferredForRetry(Duration),
    /// Handler failed and the message carried no receive count, so it was deleted.
    DroppedUnretriable,
    /// Handler failed on an attempt past the end of the retry schedule; deleted.
    DroppedExhausted,
}

impl ProcessOutcome {
    /// Metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessOutcome::Acknowledged => "success",
            ProcessOutcome::DeferredForRetry(_) => "retry",
            ProcessOutcome::DroppedUnretriable => "dropped_unretriable",
            ProcessOutcome::DroppedExhausted => "dropped_exhausted",
        }
    }
}

/// Runs the handler for one message and settles the message with the queue.
pub struct MessageProcessor<T: ?Sized, H: ?Sized> {
    transport: Arc<T>,
    handler: Arc<H>,
    retry_policy: RetryPolicy,
    metrics: Arc<dyn ConsumeMetrics>,
}

impl<T: ?Sized, H: ?Sized> Clone for MessageProcessor<T, H> {
    fn clone(&self) -> Self {
        MessageProcessor {
            transport: self.transport.clone(),
            handler: self.handler.clone(),
            retry_policy: self.retry_policy.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T, H> MessageProcessor<T, H>
where
    T: QueueTransport + ?Sized,
    H: MessageHandler + ?Sized,
{
    pub fn new(
        transport: Arc<T>,
        handler: Arc<H>,
        retry_policy: RetryPolicy,
        metrics: Arc<dyn ConsumeMetrics>,
    ) -> Self {
        MessageProcessor {
            transport,
            handler,
            retry_policy,
            metrics,
        }
    }

    pub async fn process(&self, cancel: &CancellationToken, message: Message) -> ProcessOutcome {
        let started = Instant::now();
        let succeeded = self.invoke_handler(cancel, &message).await;
        let elapsed = started.elapsed();

        let outcome = if succeeded {
            self.acknowledge(&message).await;
            ProcessOutcome::Acknowledged
        } else {
            self.settle_failure(&message).await
        };

        self.metrics
            .record(self.transport.queue_name(), &outcome, elapsed);
        outcome
    }

    /// Calls the handler behind a panic barrier. A panic counts as a failure.
    async fn invoke_handler(&self, cancel: &CancellationToken, message: &Message) -> bool {
        // The call itself goes inside the barrier too; a handler may panic
        // before it hands back a future.
        match AssertUnwindSafe(async { self.handler.handle(cancel, message).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::error!(
                    "failed to handle message {} from {}: {}",
                    message.message_id,
                    self.transport.queue_name(),
                    e
                );
                false
            }
            Err(panic) => {
                log::error!(
                    "handler panicked on message {} from {} (receive count {:?}, {} byte body): {}",
                    message.message_id,
                    self.transport.queue_name(),
                    message.receive_count(),
                    message.body.len(),
                    panic_message(panic.as_ref())
                );
                false
            }
        }
    }

    async fn settle_failure(&self, message: &Message) -> ProcessOutcome {
        let Some(attempt) = message.receive_count() else {
            log::error!(
                "message {} has no usable {} attribute, deleting it without retry",
                message.message_id,
                APPROXIMATE_RECEIVE_COUNT
            );
            self.acknowledge(message).await;
            return ProcessOutcome::DroppedUnretriable;
        };

        match self.retry_policy.decide(attempt) {
            RetryDecision::RetryAfter(delay) => {
                if let Err(e) = self.transport.extend_visibility(message, delay).await {
                    log::error!(
                        "failed to defer message {} by {:?}: {}",
                        message.message_id,
                        delay,
                        e
                    );
                }
                ProcessOutcome::DeferredForRetry(delay)
            }
            RetryDecision::Exhausted => {
                log::warn!(
                    "message {} failed on attempt {}, retries exhausted ({} scheduled), deleting it",
                    message.message_id,
                    attempt,
                    self.retry_policy.len()
                );
                self.acknowledge(message).await;
                ProcessOutcome::DroppedExhausted
            }
        }
    }

    // A failed delete only means the message comes back after its visibility timeout.
    async fn acknowledge(&self, message: &Message) {
        if let Err(e) = self.transport.delete(message).await {
            log::error!("failed to delete message {}: {}", message.message_id, e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
