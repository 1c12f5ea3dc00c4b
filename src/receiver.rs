use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio_util::sync::CancellationToken;

use crate::errors::{ConsumerError, HandlerError};
use crate::message::Message;
use crate::monitor::{ConsumeMetrics, NoopMetrics};
use crate::transport::{QueueTransport, SqsTransport};

mod config;
mod engine;
mod functions;
mod limiter;
mod processor;
mod retry;

pub use config::*;
pub use engine::{Consumer, ConsumerHandle, RunState, RunStateCell};
pub use functions::{HandlerFn, MessageHandler, SharedHandlerFn, handler_fn};
pub use limiter::{Cancelled, DispatchLimiter, DispatchSlot};
pub use processor::{MessageProcessor, ProcessOutcome};
pub use retry::{RetryDecision, RetryPolicy};

type ConsumerRun = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), ConsumerError>> + Send>;

/// Runs one consumer per registered queue under a single cancellation token.
///
/// If any consumer stops on a fatal error the others are cancelled too, and
/// [`run`](AwsSqsReceiver::run) returns the first error once all have drained.
pub struct AwsSqsReceiver {
    /// The AWS SQS client used to interact with the SQS service.
    sqs_client: Option<aws_sdk_sqs::Client>,
    metrics: Arc<dyn ConsumeMetrics>,
    consumers: Vec<(String, ConsumerRun)>,
}

impl AwsSqsReceiver {
    pub fn new(sqs_client: aws_sdk_sqs::Client) -> Self {
        AwsSqsReceiver {
            sqs_client: Some(sqs_client),
            metrics: Arc::new(NoopMetrics),
            consumers: Vec::new(),
        }
    }

    /// A receiver without an SQS client; only [`add_consumer`](Self::add_consumer) works.
    pub fn without_client() -> Self {
        AwsSqsReceiver {
            sqs_client: None,
            metrics: Arc::new(NoopMetrics),
            consumers: Vec::new(),
        }
    }

    /// Metrics sink for consumers registered after this call.
    pub fn with_metrics(mut self, metrics: Arc<dyn ConsumeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Consumes `queue_url` with `handler`. `None` options means the defaults.
    pub fn add_handler<H>(
        &mut self,
        queue_url: &str,
        handler: H,
        options: Option<ReceiveOptions>,
    ) -> Result<&mut Self, ConsumerError>
    where
        H: MessageHandler + 'static,
    {
        let client = self.sqs_client.clone().ok_or_else(|| {
            ConsumerError::InitializationError("receiver has no SQS client".to_string())
        })?;
        if queue_url.trim().is_empty() {
            return Err(ConsumerError::InitializationError(
                "queue url can't be empty".to_string(),
            ));
        }
        let transport = Arc::new(SqsTransport::new(client, queue_url));
        Ok(self.add_consumer(transport, handler, options))
    }

    /// Like [`add_handler`](Self::add_handler) for a closure that receives a
    /// clone of `shared_resources` with every message.
    pub fn add_handler_fn<RFn, Fut, TShared>(
        &mut self,
        queue_url: &str,
        rv_fn: RFn,
        shared_resources: TShared,
        options: Option<ReceiveOptions>,
    ) -> Result<&mut Self, ConsumerError>
    where
        RFn: Fn(Message, TShared) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
        TShared: Clone + Send + Sync + 'static,
    {
        self.add_handler(
            queue_url,
            SharedHandlerFn::new(rv_fn, shared_resources),
            options,
        )
    }

    /// Registers a consumer over any transport.
    pub fn add_consumer<T, H>(
        &mut self,
        transport: Arc<T>,
        handler: H,
        options: Option<ReceiveOptions>,
    ) -> &mut Self
    where
        T: QueueTransport + ?Sized + 'static,
        H: MessageHandler + 'static,
    {
        let name = transport.queue_name().to_string();
        let consumer =
            Consumer::new(transport, options.unwrap_or_default()).with_metrics(self.metrics.clone());
        let handler = Arc::new(handler);
        let run: ConsumerRun =
            Box::new(move |cancel| async move { consumer.run(handler, cancel).await }.boxed());
        self.consumers.push((name, run));
        self
    }

    /// Runs every registered consumer until `cancel` fires or one of them
    /// hits a fatal error.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ConsumerError> {
        if self.consumers.is_empty() {
            log::warn!("no consumers registered, nothing to run");
            return Ok(());
        }

        let group = cancel.child_token();
        let runs = self.consumers.into_iter().map(|(name, run)| {
            let group = group.clone();
            async move {
                let result = run(group.clone()).await;
                if result.is_err() {
                    log::error!("consumer for {} failed, stopping the others", name);
                    group.cancel();
                }
                result
            }
        });

        join_all(runs).await.into_iter().find(Result::is_err).unwrap_or(Ok(()))
    }
}
