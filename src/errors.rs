use thiserror::Error;

/// Error returned by a [`MessageHandler`](crate::receiver::MessageHandler).
///
/// Any error type works; the consumer only cares whether the handler failed.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Whether a transport failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Network hiccups, throttling, server errors. The poll loop backs off and tries again.
    Transient,
    /// Bad credentials, missing permissions, a queue that does not exist.
    /// Retrying cannot help, so the consumer stops and surfaces the error.
    Fatal,
}

/// Error raised by a [`QueueTransport`](crate::transport::QueueTransport) operation.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed ({kind:?}{suffix}): {message}", suffix = code_suffix(.code))]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// Name of the transport operation, e.g. `receive_message`.
    pub operation: &'static str,
    /// Error code reported by the queue service, when there is one.
    pub code: Option<String>,
    pub message: String,
}

impl TransportError {
    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        TransportError {
            kind: TransportErrorKind::Transient,
            operation,
            code: None,
            message: message.into(),
        }
    }

    pub fn fatal(operation: &'static str, message: impl Into<String>) -> Self {
        TransportError {
            kind: TransportErrorKind::Fatal,
            operation,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == TransportErrorKind::Fatal
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(", {c}")).unwrap_or_default()
}

/// Error types for consumer operations.
///
/// Only conditions that stop a consumer end up here. Handler failures and
/// transient transport errors are logged and absorbed by the poll loop.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Error that occurs during AWS SQS client initialization.
    ///
    /// This error typically happens when there are issues with AWS credentials,
    /// region configuration, or an empty queue URL.
    #[error("failed to initialize AWS SQS client: {0}")]
    InitializationError(String),

    /// The transport reported an unrecoverable failure and the poll loop stopped.
    #[error("consumer stopped on fatal transport error: {0}")]
    Fatal(#[from] TransportError),

    /// The task running the poll loop could not be joined.
    #[error("consumer task failed: {0}")]
    Join(String),
}
