//! `digestflow-events` -- the notification sink.
//!
//! A topic accepts one published message per pipeline run and fans it out to
//! its confirmed subscriptions. Publishing and delivering are separate steps:
//! `publish` returns once the message is durably accepted, delivery happens
//! later through [`InMemorySink::dispatch_pending`] (or a [`SinkDispatcher`]
//! thread calling it).

pub mod dispatcher;
pub mod endpoint;
pub mod notification;
pub mod retry;
pub mod sink;
pub mod subscription;
pub mod topic;

pub use dispatcher::{DispatcherConfig, DispatcherHandle, DispatcherStats, SinkDispatcher};
pub use endpoint::{DeliveryEndpoint, DeliveryError, FlakyEndpoint, RecordingEndpoint};
pub use notification::{Notification, OutgoingMessage};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use sink::{NotificationSink, SinkError};
pub use subscription::{Protocol, Subscription, SubscriptionState};
pub use topic::{DEFAULT_RETENTION, DeliveryOutcome, DeliveryRecord, DispatchReport, InMemorySink};
