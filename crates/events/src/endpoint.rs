//! Delivery targets.
//!
//! The sink talks to subscribers through [`DeliveryEndpoint`]. Real transports
//! (SMTP, SMS gateways, queues) live outside this crate; the in-memory
//! endpoints here back tests and the simulated platform.

use std::sync::Mutex;

use thiserror::Error;

use crate::notification::Notification;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Receives fanned-out notifications for one subscription.
pub trait DeliveryEndpoint: Send + Sync + core::fmt::Debug {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Endpoint that records every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingEndpoint {
    received: Mutex<Vec<Notification>>,
}

impl RecordingEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.received.lock().map(|r| r.len()).unwrap_or_default()
    }
}

impl DeliveryEndpoint for RecordingEndpoint {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let mut received = self
            .received
            .lock()
            .map_err(|_| DeliveryError("endpoint poisoned".to_string()))?;
        received.push(notification.clone());
        Ok(())
    }
}

/// Endpoint that fails a fixed number of attempts before accepting.
///
/// `usize::MAX` failures models an endpoint that is permanently unreachable.
#[derive(Debug)]
pub struct FlakyEndpoint {
    remaining_failures: Mutex<usize>,
    inner: RecordingEndpoint,
}

impl FlakyEndpoint {
    pub fn failing(times: usize) -> Self {
        Self {
            remaining_failures: Mutex::new(times),
            inner: RecordingEndpoint::new(),
        }
    }

    pub fn unreachable() -> Self {
        Self::failing(usize::MAX)
    }

    pub fn received(&self) -> Vec<Notification> {
        self.inner.received()
    }
}

impl DeliveryEndpoint for FlakyEndpoint {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let mut remaining = self
            .remaining_failures
            .lock()
            .map_err(|_| DeliveryError("endpoint poisoned".to_string()))?;
        if *remaining > 0 {
            *remaining = remaining.saturating_sub(1);
            return Err(DeliveryError("endpoint unreachable".to_string()));
        }
        drop(remaining);
        self.inner.deliver(notification)
    }
}
