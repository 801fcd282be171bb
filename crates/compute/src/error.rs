use thiserror::Error;

use digestflow_auth::AuthzError;
use digestflow_core::RunId;
use digestflow_events::SinkError;

/// Problems with a unit's static definition. Raised at deploy time, or at
/// invocation time when a secret cannot be resolved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration key: {0}")]
    MissingKey(String),

    #[error("configuration key '{0}' holds a plaintext secret; use a secret reference")]
    PlaintextSecret(String),

    #[error("configuration key '{0}' is a secret reference, not a literal")]
    NotLiteral(String),

    #[error("secret '{0}' could not be resolved")]
    UnresolvedSecret(String),

    #[error("invalid handler reference '{0}': expected module.function")]
    InvalidHandler(String),

    #[error("invalid execution bound: {0}")]
    InvalidTimeout(String),
}

/// Why an invocation failed. No variant is retried by the runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("run {run_id} exceeded its execution bound of {bound_secs}s")]
    Timeout { run_id: RunId, bound_secs: u64 },

    #[error("unit '{unit}' is already running as {holder}")]
    Overlapping { unit: String, holder: RunId },

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{capability} call failed: {reason}")]
    External { capability: String, reason: String },

    #[error("at most one publish per invocation")]
    PublishLimit,

    #[error(transparent)]
    Publish(#[from] SinkError),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("handler panicked")]
    Panicked,

    #[error("failed to start worker: {0}")]
    Worker(String),
}

impl InvocationError {
    pub fn external(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::External {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}
