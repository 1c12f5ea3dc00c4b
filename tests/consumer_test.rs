use async_trait::async_trait;
use rs_sqs_consumer::message::APPROXIMATE_RECEIVE_COUNT;
use rs_sqs_consumer::receiver::{Consumer, ReceiveOptions, handler_fn};
use rs_sqs_consumer::transport::QueueTransport;
use rs_sqs_consumer::{CancellationToken, HandlerError, Message, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Delete(String),
    Extend(String, Duration),
}

struct Stored {
    message: Message,
    receive_count: u32,
    visible: bool,
}

/// Queue that redelivers a message as soon as its visibility is changed,
/// bumping the receive count the way SQS does.
struct InMemoryQueue {
    messages: Mutex<HashMap<String, Stored>>,
    calls: Mutex<Vec<Call>>,
    report_receive_count: bool,
}

impl InMemoryQueue {
    fn new(ids: &[&str]) -> Self {
        let messages = ids
            .iter()
            .map(|id| {
                let stored = Stored {
                    message: Message::new(*id, format!("rh-{id}"), format!("body of {id}")),
                    receive_count: 0,
                    visible: true,
                };
                (id.to_string(), stored)
            })
            .collect();
        InMemoryQueue {
            messages: Mutex::new(messages),
            calls: Mutex::new(Vec::new()),
            report_receive_count: true,
        }
    }

    fn without_receive_count(mut self) -> Self {
        self.report_receive_count = false;
        self
    }

    fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| match c {
                Call::Delete(m) | Call::Extend(m, _) => m == id,
            })
            .collect()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    fn queue_name(&self) -> &str {
        "in-memory"
    }

    async fn fetch(
        &self,
        max_batch: i32,
        wait_time: Duration,
        _visibility_timeout: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        let batch: Vec<Message> = {
            let mut messages = self.messages.lock().unwrap();
            let mut ids: Vec<String> = messages
                .iter()
                .filter(|(_, s)| s.visible)
                .map(|(id, _)| id.clone())
                .collect();
            ids.sort();
            ids.truncate(max_batch as usize);
            let mut batch = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(stored) = messages.get_mut(&id) {
                    stored.visible = false;
                    stored.receive_count += 1;
                    let message = stored.message.clone();
                    batch.push(if self.report_receive_count {
                        message.with_attribute(
                            APPROXIMATE_RECEIVE_COUNT,
                            stored.receive_count.to_string(),
                        )
                    } else {
                        message
                    });
                }
            }
            batch
        };

        if batch.is_empty() {
            tokio::time::sleep(wait_time).await;
        }
        Ok(batch)
    }

    async fn delete(&self, message: &Message) -> Result<(), TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(message.message_id.clone()));
        self.messages.lock().unwrap().remove(&message.message_id);
        Ok(())
    }

    async fn extend_visibility(
        &self,
        message: &Message,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Extend(message.message_id.clone(), timeout));
        if let Some(stored) = self.messages.lock().unwrap().get_mut(&message.message_id) {
            stored.visible = true;
        }
        Ok(())
    }

    async fn send(&self, _body: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn schedule() -> ReceiveOptions {
    ReceiveOptions::default().with_retry_schedule(vec![secs(1), secs(5), secs(30)])
}

async fn run_until_empty<H>(queue: Arc<InMemoryQueue>, options: ReceiveOptions, handler: H)
where
    H: rs_sqs_consumer::receiver::MessageHandler + 'static,
{
    let consumer = Consumer::new(queue.clone(), options);
    let cancel = CancellationToken::new();
    let handle = consumer.spawn(Arc::new(handler), cancel.clone());

    for _ in 0..10_000 {
        if queue.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(queue.is_empty(), "queue was not drained");

    cancel.cancel();
    handle.join().await.expect("consumer should stop cleanly");
}

#[tokio::test(start_paused = true)]
async fn failing_handler_walks_the_schedule_then_deletes() {
    let queue = Arc::new(InMemoryQueue::new(&["m-1"]));

    run_until_empty(
        queue.clone(),
        schedule(),
        handler_fn(|_, _| async { Err(HandlerError::from("always fails")) }),
    )
    .await;

    assert_eq!(
        queue.calls(),
        vec![
            Call::Extend("m-1".into(), secs(1)),
            Call::Extend("m-1".into(), secs(5)),
            Call::Extend("m-1".into(), secs(30)),
            Call::Delete("m-1".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_is_retried_like_a_failing_one() {
    let queue = Arc::new(InMemoryQueue::new(&["m-1"]));

    run_until_empty(
        queue.clone(),
        schedule(),
        handler_fn(|_, message: Message| async move {
            if !message.body.is_empty() {
                panic!("cannot handle {}", message.body);
            }
            Ok(())
        }),
    )
    .await;

    assert_eq!(
        queue.calls(),
        vec![
            Call::Extend("m-1".into(), secs(1)),
            Call::Extend("m-1".into(), secs(5)),
            Call::Extend("m-1".into(), secs(30)),
            Call::Delete("m-1".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_receive_count_is_deleted_without_retry() {
    let queue = Arc::new(InMemoryQueue::new(&["m-1", "m-2"]).without_receive_count());

    run_until_empty(
        queue.clone(),
        schedule(),
        handler_fn(|_, _| async { Err(HandlerError::from("always fails")) }),
    )
    .await;

    assert_eq!(queue.calls_for("m-1"), vec![Call::Delete("m-1".into())]);
    assert_eq!(queue.calls_for("m-2"), vec![Call::Delete("m-2".into())]);
}

#[tokio::test(start_paused = true)]
async fn handler_recovering_on_third_attempt() {
    let queue = Arc::new(InMemoryQueue::new(&["m-1"]));

    run_until_empty(
        queue.clone(),
        schedule(),
        handler_fn(|_, message: Message| async move {
            match message.receive_count() {
                Some(n) if n < 3 => Err(HandlerError::from(format!("attempt {n} failed"))),
                _ => Ok(()),
            }
        }),
    )
    .await;

    assert_eq!(
        queue.calls(),
        vec![
            Call::Extend("m-1".into(), secs(1)),
            Call::Extend("m-1".into(), secs(5)),
            Call::Delete("m-1".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn burst_is_processed_within_the_concurrency_cap() {
    let ids: Vec<String> = (0..40).map(|i| format!("m-{i:02}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let queue = Arc::new(InMemoryQueue::new(&id_refs));

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let handler = {
        let running = running.clone();
        let peak = peak.clone();
        handler_fn(move |_, _| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(250)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };

    run_until_empty(
        queue.clone(),
        schedule().with_concurrency(4),
        handler,
    )
    .await;

    let calls = queue.calls();
    assert_eq!(calls.len(), 40);
    assert!(calls.iter().all(|c| matches!(c, Call::Delete(_))));
    assert_eq!(peak.load(Ordering::SeqCst), 4);
}
