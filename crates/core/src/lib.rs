//! `digestflow-core` -- shared building blocks for the digest pipeline.
//!
//! Pure types only: identifiers, resource names, the error model and the
//! clock abstraction. No IO lives here.

pub mod arn;
pub mod clock;
pub mod error;
pub mod id;

pub use arn::{Arn, PlatformContext};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{DeploymentId, MessageId, RunId, SubscriptionId};
