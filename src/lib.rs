//! # SQS Consumer
//!
//! A bounded-concurrency, at-least-once AWS SQS consumer.
//!
//! ## Features
//!
//! - Long-polling loop that dispatches every message to its own tokio task
//! - Fixed concurrency cap; the loop stalls dispatch, not memory, under bursts
//! - Retries by extending the message visibility timeout along a schedule
//! - Handler panics are caught and treated like returned errors
//! - Cooperative shutdown through a `CancellationToken`, draining in-flight work
//! - Fatal transport errors (bad credentials, missing queue) stop the consumer
//! - Prometheus counters, latency histograms and queue-depth gauges
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rs_sqs_consumer::client::create_sqs_client_from_env;
//! use rs_sqs_consumer::receiver::{Consumer, ReceiveOptions, handler_fn};
//! use rs_sqs_consumer::transport::SqsTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = create_sqs_client_from_env().await;
//!     let queue_url = "https://sqs.region.amazonaws.com/account/queue-name";
//!
//!     let options = ReceiveOptions::default()
//!         .with_concurrency(8)
//!         .with_retry_schedule(vec![
//!             Duration::from_secs(1),
//!             Duration::from_secs(5),
//!             Duration::from_secs(30),
//!         ]);
//!     let consumer = Consumer::new(Arc::new(SqsTransport::new(client, queue_url)), options);
//!
//!     let cancel = CancellationToken::new();
//!     let handle = consumer.spawn(
//!         Arc::new(handler_fn(|_cancel, message| async move {
//!             println!("Processing message: {}", message.body);
//!             Ok(())
//!         })),
//!         cancel.clone(),
//!     );
//!
//!     tokio::signal::ctrl_c().await?;
//!     cancel.cancel();
//!     handle.join().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod errors;
pub mod message;
pub mod monitor;
pub mod receiver;
pub mod transport;

pub use errors::{ConsumerError, HandlerError, TransportError, TransportErrorKind};
pub use message::Message;
pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
pub(crate) mod test_utils;
