//! Subscription lifecycle.
//!
//! ```text
//! pending-confirmation ──confirm──▶ confirmed ──unsubscribe──▶ removed
//!          └─────────────────unsubscribe────────────────────────▲
//! ```
//!
//! There is no way back to `pending-confirmation`; a removed subscription
//! stays removed and a fresh one must be created.

use serde::{Deserialize, Serialize};

use digestflow_core::SubscriptionId;

use crate::sink::SinkError;

/// Delivery protocol of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Email,
    Sms,
    Sqs,
    Https,
    Lambda,
}

impl Protocol {
    /// Protocols whose endpoint owner must opt in out-of-band.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Protocol::Email | Protocol::Https)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Email => "email",
            Protocol::Sms => "sms",
            Protocol::Sqs => "sqs",
            Protocol::Https => "https",
            Protocol::Lambda => "lambda",
        }
    }
}

impl core::fmt::Display for Protocol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    PendingConfirmation,
    Confirmed,
    Removed,
}

/// A (topic, protocol, endpoint) registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    id: SubscriptionId,
    topic_id: String,
    protocol: Protocol,
    endpoint: String,
    state: SubscriptionState,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        topic_id: impl Into<String>,
        protocol: Protocol,
        endpoint: impl Into<String>,
    ) -> Self {
        let state = if protocol.requires_confirmation() {
            SubscriptionState::PendingConfirmation
        } else {
            SubscriptionState::Confirmed
        };
        Self {
            id,
            topic_id: topic_id.into(),
            protocol,
            endpoint: endpoint.into(),
            state,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn receives_deliveries(&self) -> bool {
        self.state == SubscriptionState::Confirmed
    }

    /// Apply the out-of-band confirmation. Confirming twice is a no-op.
    pub fn confirm(&mut self) -> Result<(), SinkError> {
        match self.state {
            SubscriptionState::PendingConfirmation | SubscriptionState::Confirmed => {
                self.state = SubscriptionState::Confirmed;
                Ok(())
            }
            SubscriptionState::Removed => Err(SinkError::InvalidTransition {
                from: self.state,
                to: SubscriptionState::Confirmed,
            }),
        }
    }

    pub fn unsubscribe(&mut self) -> Result<(), SinkError> {
        match self.state {
            SubscriptionState::Removed => Err(SinkError::InvalidTransition {
                from: self.state,
                to: SubscriptionState::Removed,
            }),
            _ => {
                self.state = SubscriptionState::Removed;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Subscription {
        Subscription::new(SubscriptionId::new(), "topic-1", Protocol::Email, "ops@example.com")
    }

    #[test]
    fn email_starts_pending_and_sqs_starts_confirmed() {
        assert_eq!(email().state(), SubscriptionState::PendingConfirmation);
        let sqs = Subscription::new(SubscriptionId::new(), "topic-1", Protocol::Sqs, "queue");
        assert_eq!(sqs.state(), SubscriptionState::Confirmed);
    }

    #[test]
    fn confirm_then_unsubscribe() {
        let mut sub = email();
        assert!(!sub.receives_deliveries());

        sub.confirm().unwrap();
        assert!(sub.receives_deliveries());
        sub.confirm().unwrap();

        sub.unsubscribe().unwrap();
        assert_eq!(sub.state(), SubscriptionState::Removed);
        assert!(!sub.receives_deliveries());
    }

    #[test]
    fn removed_is_terminal() {
        let mut sub = email();
        sub.unsubscribe().unwrap();

        assert!(matches!(sub.confirm(), Err(SinkError::InvalidTransition { .. })));
        assert!(matches!(sub.unsubscribe(), Err(SinkError::InvalidTransition { .. })));
    }
}
