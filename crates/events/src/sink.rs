//! Publish-side abstraction of a notification sink.
//!
//! ## Delivery Guarantees
//!
//! - `publish` returns once the message is durably accepted by the topic,
//!   not once any subscriber has received it.
//! - Each confirmed subscription gets its own at-least-once delivery. A
//!   subscriber that keeps failing does not block or fail the others, and
//!   never fails the publisher.
//! - No deduplication: publishing the same body twice yields two messages.
//! - Implementations must be safe for concurrent publishers.

use std::sync::Arc;

use thiserror::Error;

use digestflow_core::{MessageId, SubscriptionId};

use crate::notification::OutgoingMessage;
use crate::subscription::SubscriptionState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("topic already exists: {0}")]
    TopicExists(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("invalid subscription transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: SubscriptionState,
        to: SubscriptionState,
    },

    /// Internal lock poisoning.
    #[error("sink state poisoned")]
    Poisoned,
}

/// Anything a compute unit can publish to.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, topic_id: &str, message: OutgoingMessage) -> Result<MessageId, SinkError>;
}

impl<S> NotificationSink for Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn publish(&self, topic_id: &str, message: OutgoingMessage) -> Result<MessageId, SinkError> {
        (**self).publish(topic_id, message)
    }
}
