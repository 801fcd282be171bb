use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digestflow_core::MessageId;

/// A message as handed to a sink by a publisher.
///
/// The body is opaque to the sink; it never inspects or deduplicates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

impl OutgoingMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A message accepted by a topic.
///
/// This is the unit fanned out to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    message_id: MessageId,
    topic_id: String,
    published_at: DateTime<Utc>,
    subject: Option<String>,
    body: String,
}

impl Notification {
    pub fn new(
        message_id: MessageId,
        topic_id: impl Into<String>,
        published_at: DateTime<Utc>,
        message: OutgoingMessage,
    ) -> Self {
        Self {
            message_id,
            topic_id: topic_id.into(),
            published_at,
            subject: message.subject,
            body: message.body,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}
