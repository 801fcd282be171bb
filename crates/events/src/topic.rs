//! In-memory notification sink.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use digestflow_core::{Clock, MessageId, SubscriptionId};

use crate::endpoint::DeliveryEndpoint;
use crate::notification::{Notification, OutgoingMessage};
use crate::retry::RetryPolicy;
use crate::sink::{NotificationSink, SinkError};
use crate::subscription::{Protocol, Subscription};

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { error: String, retry_at: DateTime<Utc> },
    DeadLettered { error: String },
}

/// Audit entry for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    pub message_id: MessageId,
    pub subscription_id: SubscriptionId,
    pub endpoint: String,
    pub attempt: u32,
    pub attempted_at: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
}

/// Summary of one [`InMemorySink::dispatch_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Deliveries dropped because the subscription was removed meanwhile.
    pub skipped: usize,
}

/// Records kept per topic and in the delivery log before the oldest are
/// dropped.
pub const DEFAULT_RETENTION: usize = 1024;

#[derive(Debug)]
struct TopicState {
    name: String,
    accepted: VecDeque<Arc<Notification>>,
}

#[derive(Debug)]
struct SubscriptionEntry {
    subscription: Subscription,
    target: Arc<dyn DeliveryEndpoint>,
}

#[derive(Debug)]
struct PendingDelivery {
    notification: Arc<Notification>,
    subscription_id: SubscriptionId,
    attempt: u32,
    not_before: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SinkState {
    topics: BTreeMap<String, TopicState>,
    subscriptions: HashMap<SubscriptionId, SubscriptionEntry>,
    pending: VecDeque<PendingDelivery>,
    log: VecDeque<DeliveryRecord>,
}

fn trim_front<T>(queue: &mut VecDeque<T>, limit: usize) {
    let excess = queue.len().saturating_sub(limit);
    queue.drain(..excess);
}

/// In-memory pub/sub sink.
///
/// - Durable acceptance: every published message is appended to its topic's
///   log before `publish` returns.
/// - Fan-out targets are fixed at publish time: only subscriptions confirmed
///   at that instant get a delivery. Confirming later does not replay.
/// - Delivery runs outside the state lock, so a slow endpoint never blocks
///   publishers.
/// - Accepted messages and the delivery log are bounded by the retention
///   limit, oldest first. Queued deliveries are never trimmed.
#[derive(Debug)]
pub struct InMemorySink {
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    retention: usize,
    state: Mutex<SinkState>,
}

impl InMemorySink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_retry_policy(clock, RetryPolicy::default())
    }

    pub fn with_retry_policy(clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            clock,
            retry,
            retention: DEFAULT_RETENTION,
            state: Mutex::new(SinkState::default()),
        }
    }

    /// Keep at most `limit` accepted messages per topic and `limit` delivery
    /// records.
    pub fn with_retention(mut self, limit: usize) -> Self {
        self.retention = limit.max(1);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, SinkState>, SinkError> {
        self.state.lock().map_err(|_| SinkError::Poisoned)
    }

    pub fn create_topic(&self, topic_id: &str, name: &str) -> Result<(), SinkError> {
        let mut state = self.lock()?;
        if state.topics.contains_key(topic_id) {
            return Err(SinkError::TopicExists(topic_id.to_string()));
        }
        state.topics.insert(
            topic_id.to_string(),
            TopicState {
                name: name.to_string(),
                accepted: VecDeque::new(),
            },
        );
        info!(topic = topic_id, name, "topic created");
        Ok(())
    }

    /// Delete a topic together with its subscriptions and undelivered messages.
    pub fn delete_topic(&self, topic_id: &str) -> Result<(), SinkError> {
        let mut state = self.lock()?;
        if state.topics.remove(topic_id).is_none() {
            return Err(SinkError::TopicNotFound(topic_id.to_string()));
        }
        state
            .subscriptions
            .retain(|_, e| e.subscription.topic_id() != topic_id);
        state
            .pending
            .retain(|p| p.notification.topic_id() != topic_id);
        info!(topic = topic_id, "topic deleted");
        Ok(())
    }

    pub fn has_topic(&self, topic_id: &str) -> bool {
        self.lock()
            .map(|s| s.topics.contains_key(topic_id))
            .unwrap_or(false)
    }

    pub fn topic_name(&self, topic_id: &str) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|s| s.topics.get(topic_id).map(|t| t.name.clone()))
    }

    /// Register an endpoint on a topic.
    ///
    /// Protocols that need an opt-in start in `pending-confirmation`.
    pub fn subscribe(
        &self,
        topic_id: &str,
        protocol: Protocol,
        endpoint: &str,
        target: Arc<dyn DeliveryEndpoint>,
    ) -> Result<SubscriptionId, SinkError> {
        let mut state = self.lock()?;
        if !state.topics.contains_key(topic_id) {
            return Err(SinkError::TopicNotFound(topic_id.to_string()));
        }

        let subscription = Subscription::new(SubscriptionId::new(), topic_id, protocol, endpoint);
        let id = subscription.id();
        info!(
            topic = topic_id,
            subscription_id = %id,
            protocol = %protocol,
            state = ?subscription.state(),
            "subscription created"
        );
        state
            .subscriptions
            .insert(id, SubscriptionEntry { subscription, target });
        Ok(id)
    }

    /// Out-of-band confirmation (e.g. the recipient clicked the opt-in link).
    pub fn confirm(&self, subscription_id: SubscriptionId) -> Result<(), SinkError> {
        self.with_subscription(subscription_id, Subscription::confirm)?;
        info!(subscription_id = %subscription_id, "subscription confirmed");
        Ok(())
    }

    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<(), SinkError> {
        self.with_subscription(subscription_id, Subscription::unsubscribe)?;
        info!(subscription_id = %subscription_id, "subscription removed");
        Ok(())
    }

    fn with_subscription<F>(&self, subscription_id: SubscriptionId, f: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut Subscription) -> Result<(), SinkError>,
    {
        let mut state = self.lock()?;
        let entry = state
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or(SinkError::SubscriptionNotFound(subscription_id))?;
        f(&mut entry.subscription)
    }

    pub fn subscription(&self, subscription_id: SubscriptionId) -> Option<Subscription> {
        self.lock()
            .ok()
            .and_then(|s| s.subscriptions.get(&subscription_id).map(|e| e.subscription.clone()))
    }

    pub fn subscriptions(&self, topic_id: &str) -> Vec<Subscription> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        let mut subs: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|e| e.subscription.topic_id() == topic_id)
            .map(|e| e.subscription.clone())
            .collect();
        subs.sort_by_key(|s| s.id());
        subs
    }

    /// Retained messages accepted by a topic, oldest first.
    pub fn messages(&self, topic_id: &str) -> Vec<Notification> {
        self.lock()
            .ok()
            .and_then(|s| {
                s.topics
                    .get(topic_id)
                    .map(|t| t.accepted.iter().map(|n| n.as_ref().clone()).collect())
            })
            .unwrap_or_default()
    }

    /// Retained delivery attempts, in attempt order.
    pub fn delivery_log(&self) -> Vec<DeliveryRecord> {
        self.lock()
            .map(|s| s.log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pending_deliveries(&self) -> usize {
        self.lock().map(|s| s.pending.len()).unwrap_or_default()
    }

    /// Earliest instant at which a queued delivery becomes due.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .ok()
            .and_then(|s| s.pending.iter().map(|p| p.not_before).min())
    }

    /// Attempt every delivery that is due.
    ///
    /// Failed attempts are rescheduled with backoff until the retry policy is
    /// exhausted, then dead-lettered. Never returns a delivery failure to the
    /// caller; those are visible only in the log.
    pub fn dispatch_pending(&self) -> Result<DispatchReport, SinkError> {
        let now = self.clock.now();

        let due: Vec<(PendingDelivery, Option<(Arc<dyn DeliveryEndpoint>, String)>)> = {
            let mut state = self.lock()?;
            let (due, later): (Vec<_>, Vec<_>) =
                state.pending.drain(..).partition(|p| p.not_before <= now);
            state.pending.extend(later);
            due.into_iter()
                .map(|p| {
                    let target = state
                        .subscriptions
                        .get(&p.subscription_id)
                        .filter(|e| e.subscription.receives_deliveries())
                        .map(|e| (e.target.clone(), e.subscription.endpoint().to_string()));
                    (p, target)
                })
                .collect()
        };

        let mut report = DispatchReport::default();
        let mut records = Vec::with_capacity(due.len());
        let mut requeue = Vec::new();

        for (pending, target) in due {
            let Some((target, endpoint)) = target else {
                report.skipped += 1;
                continue;
            };

            let attempt = pending.attempt + 1;
            let outcome = match target.deliver(&pending.notification) {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(
                        message_id = %pending.notification.message_id(),
                        subscription_id = %pending.subscription_id,
                        attempt,
                        "delivered"
                    );
                    DeliveryOutcome::Delivered
                }
                Err(e) if self.retry.should_retry(attempt) => {
                    report.failed += 1;
                    let delay = chrono::Duration::from_std(self.retry.delay_after(attempt))
                        .unwrap_or_else(|_| chrono::Duration::zero());
                    let retry_at = now + delay;
                    warn!(
                        message_id = %pending.notification.message_id(),
                        subscription_id = %pending.subscription_id,
                        attempt,
                        error = %e,
                        %retry_at,
                        "delivery failed; will retry"
                    );
                    requeue.push(PendingDelivery {
                        notification: pending.notification.clone(),
                        subscription_id: pending.subscription_id,
                        attempt,
                        not_before: retry_at,
                    });
                    DeliveryOutcome::Failed {
                        error: e.to_string(),
                        retry_at,
                    }
                }
                Err(e) => {
                    report.dead_lettered += 1;
                    warn!(
                        message_id = %pending.notification.message_id(),
                        subscription_id = %pending.subscription_id,
                        attempt,
                        error = %e,
                        "delivery dead-lettered"
                    );
                    DeliveryOutcome::DeadLettered {
                        error: e.to_string(),
                    }
                }
            };

            records.push(DeliveryRecord {
                message_id: pending.notification.message_id(),
                subscription_id: pending.subscription_id,
                endpoint,
                attempt,
                attempted_at: now,
                outcome,
            });
        }

        let mut state = self.lock()?;
        state.log.extend(records);
        trim_front(&mut state.log, self.retention);
        state.pending.extend(requeue);
        Ok(report)
    }
}

impl NotificationSink for InMemorySink {
    fn publish(&self, topic_id: &str, message: OutgoingMessage) -> Result<MessageId, SinkError> {
        let now = self.clock.now();
        let mut state = self.lock()?;

        let notification = Arc::new(Notification::new(MessageId::new(), topic_id, now, message));
        let topic = state
            .topics
            .get_mut(topic_id)
            .ok_or_else(|| SinkError::TopicNotFound(topic_id.to_string()))?;
        topic.accepted.push_back(notification.clone());
        trim_front(&mut topic.accepted, self.retention);

        let targets: Vec<SubscriptionId> = state
            .subscriptions
            .values()
            .filter(|e| e.subscription.topic_id() == topic_id && e.subscription.receives_deliveries())
            .map(|e| e.subscription.id())
            .collect();

        for subscription_id in &targets {
            state.pending.push_back(PendingDelivery {
                notification: notification.clone(),
                subscription_id: *subscription_id,
                attempt: 0,
                not_before: now,
            });
        }

        info!(
            topic = topic_id,
            message_id = %notification.message_id(),
            fan_out = targets.len(),
            "message accepted"
        );
        Ok(notification.message_id())
    }
}
