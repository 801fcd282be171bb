use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use digestflow_auth::{Action, PermissionGrant, PrincipalId, actions, authorize};
use digestflow_core::{Arn, Clock, PlatformContext, RunId};
use digestflow_events::OutgoingMessage;

use crate::env::{ConfigValue, EnvConfig};
use crate::error::{ConfigError, InvocationError};
use crate::secret::{SecretStore, SecretString};

#[derive(Debug, Default)]
struct OutboxState {
    message: Option<(String, OutgoingMessage)>,
    sealed: bool,
}

enum Rejected {
    Sealed,
    Full,
}

/// Holds the (single) publish of a run until the invoker decides its fate.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    state: Mutex<OutboxState>,
}

impl Outbox {
    fn put(&self, topic_id: &str, message: OutgoingMessage) -> Result<(), Rejected> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.sealed {
            return Err(Rejected::Sealed);
        }
        if state.message.is_some() {
            return Err(Rejected::Full);
        }
        state.message = Some((topic_id.to_string(), message));
        Ok(())
    }

    /// Close the outbox. Later publishes are rejected.
    pub(crate) fn seal(&self) -> Option<(String, OutgoingMessage)> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.sealed = true;
        state.message.take()
    }
}

/// Everything a handler may touch during one run.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    run_id: RunId,
    unit: String,
    env: Arc<EnvConfig>,
    secrets: Arc<dyn SecretStore>,
    grant: Arc<PermissionGrant>,
    principal: PrincipalId,
    platform: PlatformContext,
    clock: Arc<dyn Clock>,
    deadline: DateTime<Utc>,
    bound_secs: u64,
    outbox: Arc<Outbox>,
}

pub(crate) struct ContextParts {
    pub run_id: RunId,
    pub unit: String,
    pub env: Arc<EnvConfig>,
    pub secrets: Arc<dyn SecretStore>,
    pub grant: Arc<PermissionGrant>,
    pub principal: PrincipalId,
    pub platform: PlatformContext,
    pub clock: Arc<dyn Clock>,
    pub deadline: DateTime<Utc>,
    pub bound_secs: u64,
}

impl InvocationContext {
    pub(crate) fn new(parts: ContextParts, outbox: Arc<Outbox>) -> Self {
        Self {
            run_id: parts.run_id,
            unit: parts.unit,
            env: parts.env,
            secrets: parts.secrets,
            grant: parts.grant,
            principal: parts.principal,
            platform: parts.platform,
            clock: parts.clock,
            deadline: parts.deadline,
            bound_secs: parts.bound_secs,
            outbox,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn platform(&self) -> &PlatformContext {
        &self.platform
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Time left before the execution bound; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        (self.deadline - self.now()).max(Duration::zero())
    }

    pub fn check_deadline(&self) -> Result<(), InvocationError> {
        if self.now() > self.deadline {
            return Err(self.timeout());
        }
        Ok(())
    }

    pub(crate) fn timeout(&self) -> InvocationError {
        InvocationError::Timeout {
            run_id: self.run_id,
            bound_secs: self.bound_secs,
        }
    }

    /// A literal configuration value.
    pub fn config(&self, key: &str) -> Result<&str, InvocationError> {
        Ok(self.env.literal(key)?)
    }

    /// Resolve a secret-reference configuration value.
    pub fn secret(&self, key: &str) -> Result<SecretString, InvocationError> {
        match self.env.get(key) {
            Some(ConfigValue::SecretRef { secret }) => self
                .secrets
                .resolve(secret)
                .ok_or_else(|| ConfigError::UnresolvedSecret(secret.clone()).into()),
            Some(ConfigValue::Literal(_)) => Err(ConfigError::PlaintextSecret(key.to_string()).into()),
            None => Err(ConfigError::MissingKey(key.to_string()).into()),
        }
    }

    pub fn authorize(&self, action: &Action, resource: &str) -> Result<(), InvocationError> {
        authorize(&self.grant, &self.principal, action, resource)?;
        debug!(run_id = %self.run_id, action = %action, resource, "call authorized");
        Ok(())
    }

    /// Authorize a model invocation and return the model's resource name.
    pub fn authorize_model(&self, model_id: &str) -> Result<Arn, InvocationError> {
        let arn = self.platform.model_arn(model_id);
        self.authorize(&actions::MODEL_INVOKE, arn.as_str())?;
        Ok(arn)
    }

    /// Buffer the run's publish. It reaches the sink only if the run succeeds.
    pub fn publish(&self, topic_id: &str, message: OutgoingMessage) -> Result<(), InvocationError> {
        self.check_deadline()?;
        self.authorize(&actions::TOPIC_PUBLISH, topic_id)?;
        match self.outbox.put(topic_id, message) {
            Ok(()) => Ok(()),
            Err(Rejected::Sealed) => Err(self.timeout()),
            Err(Rejected::Full) => Err(InvocationError::PublishLimit),
        }
    }
}
