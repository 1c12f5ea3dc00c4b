use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::ReceiveOptions;
use super::functions::MessageHandler;
use super::limiter::DispatchLimiter;
use super::processor::MessageProcessor;
use crate::errors::ConsumerError;
use crate::monitor::{ConsumeMetrics, NoopMetrics};
use crate::transport::QueueTransport;

/// Lifecycle of a consumer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Fetching and dispatching.
    Running = 0,
    /// No new fetches or dispatches; waiting for in-flight handlers.
    Draining = 1,
    /// Every dispatch slot is back. Also the state of a consumer that was never started.
    Stopped = 2,
}

/// Shared, lock-free view of a consumer's [`RunState`].
#[derive(Debug, Clone)]
pub struct RunStateCell(Arc<AtomicU8>);

impl RunStateCell {
    fn new() -> Self {
        RunStateCell(Arc::new(AtomicU8::new(RunState::Stopped as u8)))
    }

    pub fn get(&self) -> RunState {
        match self.0.load(Ordering::Acquire) {
            0 => RunState::Running,
            1 => RunState::Draining,
            _ => RunState::Stopped,
        }
    }

    fn set(&self, state: RunState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Polls one queue and dispatches each message to a handler, with at most
/// `concurrency` handlers running at a time.
///
/// Delivery is at least once: a message is deleted only after its handler
/// succeeded or its retries ran out, and a failed delete simply lets the
/// queue redeliver it.
pub struct Consumer<T: ?Sized> {
    transport: Arc<T>,
    options: ReceiveOptions,
    metrics: Arc<dyn ConsumeMetrics>,
    state: RunStateCell,
}

impl<T> Consumer<T>
where
    T: QueueTransport + ?Sized + 'static,
{
    pub fn new(transport: Arc<T>, options: ReceiveOptions) -> Self {
        Consumer {
            transport,
            options: options.normalized(),
            metrics: Arc::new(NoopMetrics),
            state: RunStateCell::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn ConsumeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn options(&self) -> &ReceiveOptions {
        &self.options
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Handle for watching the state from elsewhere.
    pub fn state_cell(&self) -> RunStateCell {
        self.state.clone()
    }

    /// Runs the poll loop until `cancel` fires or the transport reports a fatal error.
    ///
    /// Returns only once every dispatched handler has finished. A
    /// cancellation-driven stop yields `Ok(())`; a fatal transport error is
    /// returned as [`ConsumerError::Fatal`].
    pub async fn run<H>(&self, handler: Arc<H>, cancel: CancellationToken) -> Result<(), ConsumerError>
    where
        H: MessageHandler + ?Sized + 'static,
    {
        let queue = self.transport.queue_name().to_string();
        let limiter = DispatchLimiter::new(self.options.concurrency);
        let processor = MessageProcessor::new(
            self.transport.clone(),
            handler,
            self.options.retry_schedule.clone(),
            self.metrics.clone(),
        );

        self.state.set(RunState::Running);
        log::info!(
            "start receiving messages from {} (batch {}, concurrency {}, {} retries)",
            queue,
            self.options.max_batch_size,
            limiter.capacity(),
            self.options.retry_schedule.len()
        );

        let result = self.poll(&limiter, &processor, &cancel).await;

        self.state.set(RunState::Draining);
        log::info!(
            "stopped receiving from {}, waiting for {} in-flight messages",
            queue,
            limiter.in_flight()
        );
        limiter.drain().await;
        self.state.set(RunState::Stopped);

        match &result {
            Ok(()) => log::info!("consumer for {} stopped", queue),
            Err(e) => log::error!("consumer for {} stopped: {}", queue, e),
        }
        result
    }

    /// Runs the consumer on its own task.
    pub fn spawn<H>(self, handler: Arc<H>, cancel: CancellationToken) -> ConsumerHandle
    where
        H: MessageHandler + ?Sized + 'static,
    {
        // Visible as running before the task gets scheduled.
        self.state.set(RunState::Running);
        let state = self.state.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move { self.run(handler, task_cancel).await });
        ConsumerHandle {
            state,
            cancel,
            join,
        }
    }

    async fn poll<H>(
        &self,
        limiter: &DispatchLimiter,
        processor: &MessageProcessor<T, H>,
        cancel: &CancellationToken,
    ) -> Result<(), ConsumerError>
    where
        H: MessageHandler + ?Sized + 'static,
    {
        let opts = &self.options;
        let queue = self.transport.queue_name();

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.transport.fetch(
                    opts.max_batch_size,
                    opts.poll_wait,
                    opts.visibility_timeout,
                ) => result,
            };

            let messages = match fetched {
                Ok(messages) => messages,
                Err(e) if e.is_fatal() => {
                    log::error!("unrecoverable error receiving from {}: {}", queue, e);
                    return Err(ConsumerError::Fatal(e));
                }
                Err(e) => {
                    log::error!(
                        "error receiving messages from {}, retrying in {:?}: {}",
                        queue,
                        opts.fetch_error_backoff,
                        e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(opts.fetch_error_backoff) => {}
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                log::debug!("no messages received from {}", queue);
                continue;
            }

            let total = messages.len();
            for (dispatched, message) in messages.into_iter().enumerate() {
                let slot = match limiter.acquire(cancel).await {
                    Ok(slot) => slot,
                    Err(_) => {
                        log::info!(
                            "cancelled while waiting for a dispatch slot, {} fetched messages left for redelivery",
                            total - dispatched
                        );
                        return Ok(());
                    }
                };

                log::debug!("dispatching message {} from {}", message.message_id, queue);
                let processor = processor.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _slot = slot;
                    processor.process(&cancel, message).await;
                });
            }
        }
    }
}

/// A consumer running on its own task.
pub struct ConsumerHandle {
    state: RunStateCell,
    cancel: CancellationToken,
    join: JoinHandle<Result<(), ConsumerError>>,
}

impl ConsumerHandle {
    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Asks the consumer to stop. In-flight handlers still run to completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the consumer to reach [`RunState::Stopped`].
    pub async fn join(self) -> Result<(), ConsumerError> {
        self.join
            .await
            .map_err(|e| ConsumerError::Join(e.to_string()))?
    }
}
