use crate::errors::TransportError;
use crate::message::Message;
use crate::monitor::ConsumeMetrics;
use crate::receiver::ProcessOutcome;
use crate::transport::QueueTransport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Transport that hands out scripted fetch results and records what the
/// consumer did with each message. Once the script runs out, fetches behave
/// like an empty long poll.
pub(crate) struct MockTransport {
    name: String,
    script: Mutex<VecDeque<Result<Vec<Message>, TransportError>>>,
    fetches: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    extended: Mutex<Vec<(String, Duration)>>,
    delete_attempts: AtomicUsize,
    delete_error: Option<TransportError>,
    extend_attempts: AtomicUsize,
    extend_error: Option<TransportError>,
}

impl MockTransport {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fetches: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            extended: Mutex::new(Vec::new()),
            delete_attempts: AtomicUsize::new(0),
            delete_error: None,
            extend_attempts: AtomicUsize::new(0),
            extend_error: None,
        }
    }

    pub(crate) fn with_batch(self, batch: Vec<Message>) -> Self {
        self.script.lock().unwrap().push_back(Ok(batch));
        self
    }

    pub(crate) fn with_fetch_error(self, err: TransportError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    pub(crate) fn fail_deletes(mut self, err: TransportError) -> Self {
        self.delete_error = Some(err);
        self
    }

    pub(crate) fn fail_extends(mut self, err: TransportError) -> Self {
        self.extend_error = Some(err);
        self
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn extended(&self) -> Vec<(String, Duration)> {
        self.extended.lock().unwrap().clone()
    }

    pub(crate) fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn extend_attempts(&self) -> usize {
        self.extend_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueTransport for MockTransport {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        _max_batch: i32,
        wait_time: Duration,
        _visibility_timeout: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                tokio::time::sleep(wait_time).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete(&self, message: &Message) -> Result<(), TransportError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.delete_error {
            return Err(err.clone());
        }
        self.deleted.lock().unwrap().push(message.message_id.clone());
        Ok(())
    }

    async fn extend_visibility(
        &self,
        message: &Message,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.extend_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.extend_error {
            return Err(err.clone());
        }
        self.extended
            .lock()
            .unwrap()
            .push((message.message_id.clone(), timeout));
        Ok(())
    }

    async fn send(&self, _body: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingMetrics {
    records: Mutex<Vec<(String, &'static str)>>,
}

impl RecordingMetrics {
    pub(crate) fn outcomes(&self) -> Vec<(String, &'static str)> {
        self.records.lock().unwrap().clone()
    }
}

impl ConsumeMetrics for RecordingMetrics {
    fn record(&self, queue: &str, outcome: &ProcessOutcome, _elapsed: Duration) {
        self.records
            .lock()
            .unwrap()
            .push((queue.to_string(), outcome.as_str()));
    }
}
