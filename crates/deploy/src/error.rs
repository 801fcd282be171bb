use thiserror::Error;

use digestflow_compute::ConfigError;
use digestflow_events::SinkError;
use digestflow_schedule::ScheduleError;

use crate::graph::{LogicalId, ResourceKind};

/// Deploy-time failures. Any of these aborts the whole deploy and leaves the
/// previously deployed stack untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeployError {
    #[error("invalid descriptor: {0}")]
    Descriptor(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Unit(#[from] ConfigError),

    #[error("over-broad grant '{grant}': {findings}")]
    OverBroadGrant { grant: String, findings: String },

    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(LogicalId),

    #[error("'{from}' references missing resource '{to}'")]
    DanglingReference { from: LogicalId, to: LogicalId },

    #[error("'{from}' expects '{to}' to be a {expected:?}, found {found:?}")]
    ReferenceKind {
        from: LogicalId,
        to: LogicalId,
        expected: ResourceKind,
        found: ResourceKind,
    },

    #[error("dependency cycle through: {0:?}")]
    Cycle(Vec<LogicalId>),

    #[error("no code registered for handler '{0}'")]
    MissingCode(String),

    #[error("physical resource '{0}' is owned by another stack")]
    PhysicalIdConflict(String),

    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to read descriptor: {0}")]
    Io(String),
}
