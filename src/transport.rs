use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::operation::send_message::builders::SendMessageFluentBuilder;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};

use crate::errors::TransportError;
use crate::message::Message;

/// SQS refuses visibility timeouts above twelve hours.
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

/// Error codes that no amount of retrying will fix.
const FATAL_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
    "IncompleteSignature",
    "InvalidClientTokenId",
    "InvalidSecurity",
    "MissingAuthenticationToken",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
    "ExpiredToken",
    "InvalidAddress",
    "QueueDoesNotExist",
    "AWS.SimpleQueueService.NonExistentQueue",
];

/// The four queue operations the consumer relies on.
///
/// `fetch` may legitimately return an empty batch when the long poll times
/// out. Errors say whether they are worth retrying through
/// [`TransportError::kind`].
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Label used for logs and metrics.
    fn queue_name(&self) -> &str;

    async fn fetch(
        &self,
        max_batch: i32,
        wait_time: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<Message>, TransportError>;

    async fn delete(&self, message: &Message) -> Result<(), TransportError>;

    async fn extend_visibility(
        &self,
        message: &Message,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    async fn send(&self, body: &str) -> Result<(), TransportError>;
}

/// Approximate message counts reported by `GetQueueAttributes`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueDepth {
    pub visible: f64,
    pub delayed: f64,
    pub not_visible: f64,
}

/// [`QueueTransport`] over a single AWS SQS queue.
#[derive(Debug, Clone)]
pub struct SqsTransport {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    queue_name: String,
}

impl SqsTransport {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: &str) -> Self {
        SqsTransport {
            client,
            queue_url: queue_url.to_string(),
            queue_name: queue_name_from_url(queue_url).to_string(),
        }
    }

    pub fn client(&self) -> &aws_sdk_sqs::Client {
        &self.client
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// A `SendMessage` request already pointed at this queue, for callers that
    /// need delays, attributes or FIFO group ids.
    pub fn send_message(&self) -> SendMessageFluentBuilder {
        self.client.send_message().queue_url(&self.queue_url)
    }

    pub async fn send_bytes(&self, body: &[u8]) -> Result<(), TransportError> {
        self.send(&String::from_utf8_lossy(body)).await
    }

    pub async fn queue_depth(&self) -> Result<QueueDepth, TransportError> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesDelayed)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .map_err(|e| classify("get_queue_attributes", e))?;

        let mut depth = QueueDepth::default();
        for (name, value) in output.attributes.unwrap_or_default() {
            let count = value.parse::<f64>().unwrap_or_default();
            match name {
                QueueAttributeName::ApproximateNumberOfMessages => depth.visible = count,
                QueueAttributeName::ApproximateNumberOfMessagesDelayed => depth.delayed = count,
                QueueAttributeName::ApproximateNumberOfMessagesNotVisible => {
                    depth.not_visible = count
                }
                other => log::warn!("unexpected queue attribute {}", other.as_str()),
            }
        }
        Ok(depth)
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn fetch(
        &self,
        max_batch: i32,
        wait_time: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_batch)
            .wait_time_seconds(as_seconds(wait_time))
            .visibility_timeout(as_seconds(visibility_timeout))
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| classify("receive_message", e))?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(Message::from)
            .collect())
    }

    async fn delete(&self, message: &Message) -> Result<(), TransportError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(|e| classify("delete_message", e))?;
        log::debug!("message {} deleted", message.message_id);
        Ok(())
    }

    async fn extend_visibility(
        &self,
        message: &Message,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let seconds = as_seconds(timeout);
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .visibility_timeout(seconds)
            .send()
            .await
            .map_err(|e| classify("change_message_visibility", e))?;
        log::debug!(
            "message {} visibility timeout changed to {}s",
            message.message_id,
            seconds
        );
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<(), TransportError> {
        self.send_message()
            .message_body(body)
            .send()
            .await
            .map_err(|e| classify("send_message", e))?;
        Ok(())
    }
}

/// Last path segment of a queue URL, e.g. `orders` for
/// `https://sqs.us-east-1.amazonaws.com/123456789012/orders`.
pub fn queue_name_from_url(queue_url: &str) -> &str {
    queue_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(queue_url)
}

/// Whole seconds, rounded up so a sub-second delay never becomes zero.
fn as_seconds(duration: Duration) -> i32 {
    let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    seconds.min(MAX_VISIBILITY_TIMEOUT_SECS) as i32
}

fn is_fatal_code(code: &str) -> bool {
    FATAL_ERROR_CODES.contains(&code)
}

fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();

    let error = match code.as_deref() {
        Some(c) if is_fatal_code(c) => TransportError::fatal(operation, message),
        _ => TransportError::transient(operation, message),
    };
    match code {
        Some(c) => error.with_code(c),
        None => error,
    }
}
