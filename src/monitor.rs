//! Metrics for consumers and queues.
//!
//! - [`ConsumeMetrics`] receives one record per processed message.
//! - [`PrometheusMetrics`] implements it on a caller-supplied registry and
//!   also carries queue-depth gauges fed by [`monitor_queue`].

use std::time::Duration;

use async_trait::async_trait;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::receiver::ProcessOutcome;
use crate::transport::{QueueDepth, QueueTransport, SqsTransport};

/// How often [`monitor_queue`] polls queue attributes by default.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

const CONSUME_TOTAL: &str = "sqs_consume_total";
const CONSUME_TIME_COST: &str = "sqs_consume_time_cost";
const NUM_OF_MESSAGES: &str = "sqs_num_of_messages";
const NUM_OF_MESSAGES_DELAYED: &str = "sqs_num_of_messages_delayed";
const NUM_OF_MESSAGES_NOT_VISIBLE: &str = "sqs_num_of_messages_not_visible";

/// Sink for per-message processing signals.
pub trait ConsumeMetrics: Send + Sync {
    fn record(&self, queue: &str, outcome: &ProcessOutcome, elapsed: Duration);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl ConsumeMetrics for NoopMetrics {
    fn record(&self, _queue: &str, _outcome: &ProcessOutcome, _elapsed: Duration) {}
}

/// Prometheus collectors for consumers, registered under a namespace.
#[derive(Clone)]
pub struct PrometheusMetrics {
    consume_total: CounterVec,
    consume_time_cost: HistogramVec,
    messages: GaugeVec,
    messages_delayed: GaugeVec,
    messages_not_visible: GaugeVec,
}

impl PrometheusMetrics {
    pub fn new(namespace: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        if namespace.is_empty() {
            return Err(prometheus::Error::Msg("namespace can't be empty".to_string()));
        }

        let consume_total = CounterVec::new(
            Opts::new(CONSUME_TOTAL, "SQS messages consumed").namespace(namespace),
            &["queue", "result"],
        )?;
        let consume_time_cost = HistogramVec::new(
            HistogramOpts::new(CONSUME_TIME_COST, "SQS message handling time in seconds")
                .namespace(namespace)
                .buckets(prometheus::exponential_buckets(0.02, 2.0, 11)?),
            &["queue"],
        )?;
        let gauge = |name: &str, help: &str| {
            GaugeVec::new(Opts::new(name, help).namespace(namespace), &["queue"])
        };
        let messages = gauge(NUM_OF_MESSAGES, "Approximate number of visible messages")?;
        let messages_delayed = gauge(NUM_OF_MESSAGES_DELAYED, "Approximate number of delayed messages")?;
        let messages_not_visible = gauge(
            NUM_OF_MESSAGES_NOT_VISIBLE,
            "Approximate number of in-flight messages",
        )?;

        registry.register(Box::new(consume_total.clone()))?;
        registry.register(Box::new(consume_time_cost.clone()))?;
        registry.register(Box::new(messages.clone()))?;
        registry.register(Box::new(messages_delayed.clone()))?;
        registry.register(Box::new(messages_not_visible.clone()))?;

        Ok(PrometheusMetrics {
            consume_total,
            consume_time_cost,
            messages,
            messages_delayed,
            messages_not_visible,
        })
    }

    pub fn set_queue_depth(&self, queue: &str, depth: &QueueDepth) {
        self.messages.with_label_values(&[queue]).set(depth.visible);
        self.messages_delayed
            .with_label_values(&[queue])
            .set(depth.delayed);
        self.messages_not_visible
            .with_label_values(&[queue])
            .set(depth.not_visible);
    }
}

impl ConsumeMetrics for PrometheusMetrics {
    fn record(&self, queue: &str, outcome: &ProcessOutcome, elapsed: Duration) {
        self.consume_total
            .with_label_values(&[queue, outcome.as_str()])
            .inc();
        self.consume_time_cost
            .with_label_values(&[queue])
            .observe(elapsed.as_secs_f64());
    }
}

/// Anything that can report approximate queue depth.
#[async_trait]
pub trait QueueDepthSource: Send + Sync {
    fn queue_name(&self) -> &str;

    async fn queue_depth(&self) -> Result<QueueDepth, TransportError>;
}

#[async_trait]
impl QueueDepthSource for SqsTransport {
    fn queue_name(&self) -> &str {
        QueueTransport::queue_name(self)
    }

    async fn queue_depth(&self) -> Result<QueueDepth, TransportError> {
        SqsTransport::queue_depth(self).await
    }
}

/// Publishes queue depth gauges every `interval` until `cancel` fires.
///
/// Errors are logged and the next tick tries again.
pub async fn monitor_queue<S>(
    source: &S,
    metrics: &PrometheusMetrics,
    interval: Duration,
    cancel: CancellationToken,
) where
    S: QueueDepthSource + ?Sized,
{
    let queue = source.queue_name().to_string();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("queue monitor for {} stopped", queue);
                return;
            }
            _ = ticker.tick() => {}
        }

        match source.queue_depth().await {
            Ok(depth) => metrics.set_queue_depth(&queue, &depth),
            Err(e) => log::error!("failed to read queue attributes for {}: {}", queue, e),
        }
    }
}
