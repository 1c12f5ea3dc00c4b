use std::collections::HashMap;

use aws_sdk_sqs::types::Message as SqsMessage;

/// System attribute carrying the approximate number of times a message was received.
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// A message fetched from the queue.
///
/// Owned by the processor handling it for one processing attempt; the
/// receipt handle is what the transport needs to delete it or change its
/// visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    /// System attributes such as `ApproximateReceiveCount` and `SentTimestamp`.
    pub attributes: HashMap<String, String>,
    /// String-valued user message attributes.
    pub message_attributes: HashMap<String, String>,
}

impl Message {
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Message {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_receive_count(self, count: u32) -> Self {
        self.with_attribute(APPROXIMATE_RECEIVE_COUNT, count.to_string())
    }

    /// Delivery attempt count as reported by the queue, 1 on first delivery.
    ///
    /// `None` when the attribute is missing or not a number.
    pub fn receive_count(&self) -> Option<u32> {
        self.attributes
            .get(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|v| v.trim().parse().ok())
    }
}

impl From<SqsMessage> for Message {
    fn from(value: SqsMessage) -> Self {
        let attributes = value
            .attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, v)| (name.as_str().to_string(), v))
            .collect();

        let message_attributes = value
            .message_attributes
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, v)| v.string_value.map(|s| (name, s)))
            .collect();

        Message {
            message_id: value.message_id.unwrap_or_default(),
            receipt_handle: value.receipt_handle.unwrap_or_default(),
            body: value.body.unwrap_or_default(),
            attributes,
            message_attributes,
        }
    }
}
