use crate::errors::HandlerError;
use crate::message::Message;
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Trait for implementing message handlers.
///
/// Returning `Ok(())` acknowledges (deletes) the message. Returning an error,
/// or panicking, hands the message to the retry schedule.
///
/// The cancellation token fires when the consumer is shutting down. Handlers
/// are never aborted; long-running ones may watch the token and bail out early.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> Result<(), HandlerError>;
}

/// [`MessageHandler`] built from an async closure taking the cancellation
/// token and an owned copy of the message. See [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wraps a closure as a [`MessageHandler`].
///
/// ```rust
/// use rs_sqs_consumer::receiver::handler_fn;
///
/// let handler = handler_fn(|_cancel, message| async move {
///     println!("got {}", message.body);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CancellationToken, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(CancellationToken, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> Result<(), HandlerError> {
        (self.f)(cancel.clone(), message.clone()).await
    }
}

/// [`MessageHandler`] that passes a clone of a shared resource (a database
/// pool, an HTTP client, a counter) to the closure on every message.
///
/// # Type Parameters
///
/// * `RFn` - The message handler function type
/// * `TShared` - The type of shared resources passed to the handler
pub struct SharedHandlerFn<RFn, TShared> {
    rv_fn: RFn,
    shared_resources: TShared,
}

impl<RFn, Fut, TShared> SharedHandlerFn<RFn, TShared>
where
    RFn: Fn(Message, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    TShared: Clone + Send + Sync + 'static,
{
    /// # Arguments
    ///
    /// * `rv_fn` - The message handler function
    /// * `shared_resources` - Resources shared between message processing calls
    pub fn new(rv_fn: RFn, shared_resources: TShared) -> Self {
        SharedHandlerFn {
            rv_fn,
            shared_resources,
        }
    }
}

#[async_trait]
impl<RFn, Fut, TShared> MessageHandler for SharedHandlerFn<RFn, TShared>
where
    RFn: Fn(Message, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    TShared: Clone + Send + Sync + 'static,
{
    async fn handle(
        &self,
        _cancel: &CancellationToken,
        message: &Message,
    ) -> Result<(), HandlerError> {
        (self.rv_fn)(message.clone(), self.shared_resources.clone()).await
    }
}
