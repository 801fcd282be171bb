//! Time-bounded invocation of a compute unit.
//!
//! The handler runs on a worker thread. The invoker waits at most the unit's
//! bound in wall-clock time, then checks the injected clock against the
//! deadline as well, so simulations driven by a manual clock see the same
//! timeout semantics. Either way a timed-out run publishes nothing: the
//! outbox is sealed before its content is looked at. An exclusive unit's
//! lease is released by the worker thread itself, so an abandoned worker
//! keeps later runs out until it exits.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use digestflow_auth::{PermissionGrant, PrincipalId};
use digestflow_core::{Clock, MessageId, PlatformContext, RunId};
use digestflow_events::NotificationSink;
use digestflow_schedule::TriggerEvent;

use crate::context::{ContextParts, InvocationContext, Outbox};
use crate::env::{EnvConfig, EnvRequirements};
use crate::error::{ConfigError, InvocationError};
use crate::handler::Handler;
use crate::lease::{ConcurrencyPolicy, LeaseGuard, RunLeases};
use crate::secret::SecretStore;
use crate::unit::ComputeUnitSpec;

/// Platform-side wiring of a unit.
pub struct UnitRuntime {
    pub env: EnvConfig,
    pub requirements: EnvRequirements,
    pub secrets: Arc<dyn SecretStore>,
    pub grant: PermissionGrant,
    pub principal: PrincipalId,
    pub platform: PlatformContext,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn NotificationSink>,
    pub leases: Arc<RunLeases>,
    pub concurrency: ConcurrencyPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Succeeded { published: Option<MessageId> },
    Failed { error: InvocationError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    pub run_id: RunId,
    pub unit: String,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: InvocationOutcome,
}

impl InvocationRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Succeeded { .. })
    }

    pub fn published(&self) -> Option<MessageId> {
        match self.outcome {
            InvocationOutcome::Succeeded { published } => published,
            InvocationOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&InvocationError> {
        match &self.outcome {
            InvocationOutcome::Failed { error } => Some(error),
            InvocationOutcome::Succeeded { .. } => None,
        }
    }
}

pub struct Invoker {
    unit: ComputeUnitSpec,
    handler: Arc<dyn Handler>,
    env: Arc<EnvConfig>,
    secrets: Arc<dyn SecretStore>,
    grant: Arc<PermissionGrant>,
    principal: PrincipalId,
    platform: PlatformContext,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    leases: Arc<RunLeases>,
    concurrency: ConcurrencyPolicy,
}

impl core::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Invoker")
            .field("unit", &self.unit)
            .field("grant", &self.grant.name())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Invoker {
    /// Wire a handler to its unit. Fails on an invalid unit or configuration.
    pub fn new(
        unit: ComputeUnitSpec,
        handler: Arc<dyn Handler>,
        runtime: UnitRuntime,
    ) -> Result<Self, ConfigError> {
        unit.validate()?;
        runtime.env.validate(&runtime.requirements)?;
        Ok(Self {
            unit,
            handler,
            env: Arc::new(runtime.env),
            secrets: runtime.secrets,
            grant: Arc::new(runtime.grant),
            principal: runtime.principal,
            platform: runtime.platform,
            clock: runtime.clock,
            sink: runtime.sink,
            leases: runtime.leases,
            concurrency: runtime.concurrency,
        })
    }

    pub fn unit(&self) -> &ComputeUnitSpec {
        &self.unit
    }

    pub fn env(&self) -> &EnvConfig {
        &self.env
    }

    pub fn grant(&self) -> &PermissionGrant {
        &self.grant
    }

    pub fn invoke(&self, event: &TriggerEvent) -> InvocationRecord {
        let run_id = RunId::new();
        let started_at = self.clock.now();
        // Bounded by MAX_TIMEOUT_SECS in ComputeUnitSpec::validate.
        let deadline = started_at + Duration::seconds(self.unit.timeout_secs as i64);

        info!(
            unit = %self.unit.function_name,
            run_id = %run_id,
            scheduled_at = %event.scheduled_at,
            "invocation started"
        );

        let outcome = match self.run(run_id, deadline, event) {
            Ok(published) => {
                info!(
                    unit = %self.unit.function_name,
                    run_id = %run_id,
                    published = published.is_some(),
                    "invocation succeeded"
                );
                InvocationOutcome::Succeeded { published }
            }
            Err(err @ InvocationError::Overlapping { .. }) => {
                warn!(unit = %self.unit.function_name, run_id = %run_id, error = %err, "invocation rejected");
                InvocationOutcome::Failed { error: err }
            }
            Err(err) => {
                error!(unit = %self.unit.function_name, run_id = %run_id, error = %err, "invocation failed");
                InvocationOutcome::Failed { error: err }
            }
        };

        InvocationRecord {
            run_id,
            unit: self.unit.function_name.clone(),
            scheduled_at: event.scheduled_at,
            started_at,
            finished_at: self.clock.now(),
            outcome,
        }
    }

    fn run(
        &self,
        run_id: RunId,
        deadline: DateTime<Utc>,
        event: &TriggerEvent,
    ) -> Result<Option<MessageId>, InvocationError> {
        let lease = match self.concurrency {
            ConcurrencyPolicy::Exclusive => {
                self.leases
                    .acquire(&self.unit.function_name, run_id, self.clock.now(), deadline)?;
                Some(LeaseGuard::new(
                    self.leases.clone(),
                    self.unit.function_name.clone(),
                    run_id,
                ))
            }
            ConcurrencyPolicy::Allow => None,
        };
        self.execute(run_id, deadline, event, lease)
    }

    fn execute(
        &self,
        run_id: RunId,
        deadline: DateTime<Utc>,
        event: &TriggerEvent,
        lease: Option<LeaseGuard>,
    ) -> Result<Option<MessageId>, InvocationError> {
        let outbox = Arc::new(Outbox::default());
        let ctx = InvocationContext::new(
            ContextParts {
                run_id,
                unit: self.unit.function_name.clone(),
                env: self.env.clone(),
                secrets: self.secrets.clone(),
                grant: self.grant.clone(),
                principal: self.principal.clone(),
                platform: self.platform.clone(),
                clock: self.clock.clone(),
                deadline,
                bound_secs: self.unit.timeout_secs,
            },
            outbox.clone(),
        );

        let (tx, rx) = mpsc::channel();
        let handler = self.handler.clone();
        let worker_ctx = ctx.clone();
        let worker_event = event.clone();
        thread::Builder::new()
            .name(format!("{}-{}", self.unit.function_name, run_id))
            .spawn(move || {
                let result = handler.handle(&worker_event, &worker_ctx);
                drop(lease);
                let _ = tx.send(result);
            })
            .map_err(|e| InvocationError::Worker(e.to_string()))?;

        let result = match rx.recv_timeout(self.unit.timeout()) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                // The worker is abandoned; it can no longer publish.
                outbox.seal();
                self.leases.abandon(&self.unit.function_name, run_id);
                return Err(ctx.timeout());
            }
            Err(RecvTimeoutError::Disconnected) => Err(InvocationError::Panicked),
        };

        let pending = outbox.seal();
        result?;
        ctx.check_deadline()?;

        match pending {
            Some((topic_id, message)) => Ok(Some(self.sink.publish(&topic_id, message)?)),
            None => Ok(None),
        }
    }
}
