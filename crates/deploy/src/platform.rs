//! In-process platform that hosts deployed stacks.
//!
//! Mirrors what the managed platform does for the pipeline: it owns the
//! notification sink, runs each stack's scheduler against a manual clock and
//! invokes compute units when their rules fire.
//!
//! `deploy` is all-or-nothing. Everything that can fail (graph validation,
//! code lookup, configuration and secret checks, schedule compilation,
//! ownership of physical names) runs before the first mutation, so a failed
//! deploy leaves the previous stack serving exactly as before.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use digestflow_compute::{
    ConfigError, ConfigValue, EnvRequirements, Handler, InvocationRecord, Invoker, RunLeases,
    SecretStore, UnitRuntime,
};
use digestflow_core::{Clock, DeploymentId, ManualClock, SubscriptionId};
use digestflow_events::{
    DeliveryEndpoint, DispatchReport, InMemorySink, Notification, RecordingEndpoint, RetryPolicy,
    SubscriptionState,
};
use digestflow_schedule::{MissedTick, OutageWindows, ScheduleRule, Scheduler};

use crate::error::DeployError;
use crate::graph::{LogicalId, ResourceGraph, ResourceKind, ResourceSpec};
use crate::plan::{ChangeAction, Plan, plan};

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub deployment_id: DeploymentId,
    pub plan: Plan,
    pub outputs: BTreeMap<String, String>,
}

/// What happened during one [`SimulatedPlatform::advance_to`] call.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub invocations: Vec<InvocationRecord>,
    pub missed: Vec<MissedTick>,
    pub deliveries: DispatchReport,
}

impl TickReport {
    fn absorb(&mut self, report: DispatchReport) {
        self.deliveries.delivered += report.delivered;
        self.deliveries.failed += report.failed;
        self.deliveries.dead_lettered += report.dead_lettered;
        self.deliveries.skipped += report.skipped;
    }
}

#[derive(Debug)]
struct DeployedStack {
    deployment_id: DeploymentId,
    graph: ResourceGraph,
    scheduler: Scheduler,
    invokers: BTreeMap<LogicalId, Invoker>,
    subscriptions: BTreeMap<LogicalId, SubscriptionId>,
}

pub struct SimulatedPlatform {
    clock: ManualClock,
    sink: Arc<InMemorySink>,
    secrets: Arc<dyn SecretStore>,
    requirements: EnvRequirements,
    leases: Arc<RunLeases>,
    code: BTreeMap<String, Arc<dyn Handler>>,
    endpoints: BTreeMap<String, Arc<dyn DeliveryEndpoint>>,
    inboxes: BTreeMap<String, Arc<RecordingEndpoint>>,
    stacks: BTreeMap<String, DeployedStack>,
    outages: OutageWindows,
    history: Vec<InvocationRecord>,
}

impl core::fmt::Debug for SimulatedPlatform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedPlatform")
            .field("now", &self.clock.now())
            .field("stacks", &self.stacks.keys().collect::<Vec<_>>())
            .field("code", &self.code.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Units, grants and env resolved for one stack, ready to swap in.
struct Prepared {
    scheduler: Scheduler,
    invokers: BTreeMap<LogicalId, Invoker>,
}

impl SimulatedPlatform {
    pub fn new(start: DateTime<Utc>, secrets: impl SecretStore + 'static) -> Self {
        Self::with_retry_policy(start, secrets, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        start: DateTime<Utc>,
        secrets: impl SecretStore + 'static,
        retry: RetryPolicy,
    ) -> Self {
        let clock = ManualClock::new(start);
        let sink = Arc::new(InMemorySink::with_retry_policy(Arc::new(clock.clone()), retry));
        Self {
            clock,
            sink,
            secrets: Arc::new(secrets),
            requirements: EnvRequirements::digest(),
            leases: Arc::new(RunLeases::new()),
            code: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            inboxes: BTreeMap::new(),
            stacks: BTreeMap::new(),
            outages: OutageWindows::new(),
            history: Vec::new(),
        }
    }

    /// Configuration every unit hosted here must carry.
    pub fn with_requirements(mut self, requirements: EnvRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    pub fn sink(&self) -> &Arc<InMemorySink> {
        &self.sink
    }

    /// Upload code for a `module.function` entry point.
    pub fn register_code(&mut self, handler: impl Into<String>, code: Arc<dyn Handler>) {
        self.code.insert(handler.into(), code);
    }

    /// Route deliveries for `endpoint` to `target` instead of a recording
    /// inbox. Only affects subscriptions created afterwards.
    pub fn register_endpoint(&mut self, endpoint: impl Into<String>, target: Arc<dyn DeliveryEndpoint>) {
        self.endpoints.insert(endpoint.into(), target);
    }

    /// The platform is unavailable during `[start, end)`. Ticks in the
    /// window are dropped.
    pub fn add_outage(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.outages.add(start, end);
    }

    pub fn deploy(&mut self, graph: &ResourceGraph) -> Result<DeployReport, DeployError> {
        let stack = graph.stack_name.clone();
        let current = self.stacks.get(&stack);
        let plan = plan(graph, current.map(|s| &s.graph))?;

        self.check_ownership(graph)?;
        let prepared = self.prepare(graph, current)?;

        let previous = self.stacks.remove(&stack);
        let subscriptions = match self.apply_sink_changes(graph, previous.as_ref(), &plan) {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                if let Some(previous) = previous {
                    self.stacks.insert(stack, previous);
                }
                return Err(err);
            }
        };

        let deployment_id = DeploymentId::new();
        info!(
            stack = %stack,
            deployment_id = %deployment_id,
            created = plan.count(ChangeAction::Create),
            updated = plan.count(ChangeAction::Update),
            replaced = plan.count(ChangeAction::Replace),
            deleted = plan.count(ChangeAction::Delete),
            "stack deployed"
        );

        let outputs = graph.outputs();
        self.stacks.insert(
            stack,
            DeployedStack {
                deployment_id,
                graph: graph.clone(),
                scheduler: prepared.scheduler,
                invokers: prepared.invokers,
                subscriptions,
            },
        );
        Ok(DeployReport {
            deployment_id,
            plan,
            outputs,
        })
    }

    /// Tear a stack down: rules stop firing, topics and subscriptions go.
    pub fn destroy(&mut self, stack: &str) -> Result<(), DeployError> {
        let deployed = self
            .stacks
            .remove(stack)
            .ok_or_else(|| DeployError::StackNotFound(stack.to_string()))?;
        for topic in topic_ids(&deployed.graph) {
            if self.sink.has_topic(&topic) {
                self.sink.delete_topic(&topic)?;
            }
        }
        info!(stack, deployment_id = %deployed.deployment_id, "stack destroyed");
        Ok(())
    }

    /// Physical names of topics, units and rules are unique per platform.
    fn check_ownership(&self, graph: &ResourceGraph) -> Result<(), DeployError> {
        let owned_elsewhere: BTreeSet<String> = self
            .stacks
            .values()
            .filter(|s| s.graph.stack_name != graph.stack_name)
            .flat_map(|s| owned_names(&s.graph))
            .collect();
        let mine: BTreeSet<String> = self
            .stacks
            .get(&graph.stack_name)
            .map(|s| topic_ids(&s.graph).into_iter().collect())
            .unwrap_or_default();

        for name in owned_names(graph) {
            if owned_elsewhere.contains(&name) {
                return Err(DeployError::PhysicalIdConflict(name));
            }
        }
        for topic in topic_ids(graph) {
            if self.sink.has_topic(&topic) && !mine.contains(&topic) {
                return Err(DeployError::PhysicalIdConflict(topic));
            }
        }
        Ok(())
    }

    /// Build invokers and the next scheduler without touching live state.
    fn prepare(
        &self,
        graph: &ResourceGraph,
        current: Option<&DeployedStack>,
    ) -> Result<Prepared, DeployError> {
        let mut invokers = BTreeMap::new();
        for resource in graph.of_kind(ResourceKind::ComputeUnit) {
            let ResourceSpec::ComputeUnit(props) = &resource.spec else {
                continue;
            };
            let entry = props.unit.handler.to_string();
            let code = self
                .code
                .get(&entry)
                .cloned()
                .ok_or(DeployError::MissingCode(entry))?;

            let env = graph.resolved_env(&resource.id)?;
            for (_, value) in env.iter() {
                if let ConfigValue::SecretRef { secret } = value {
                    if self.secrets.resolve(secret).is_none() {
                        return Err(ConfigError::UnresolvedSecret(secret.clone()).into());
                    }
                }
            }
            let principal = graph
                .principal(&resource.id)
                .ok_or_else(|| DeployError::DanglingReference {
                    from: resource.id.clone(),
                    to: resource.id.clone(),
                })?;
            let runtime = UnitRuntime {
                env,
                requirements: self.requirements.clone(),
                secrets: Arc::clone(&self.secrets),
                grant: graph.effective_grant(&resource.id)?,
                principal,
                platform: graph.platform.clone(),
                clock: Arc::new(self.clock.clone()),
                sink: self.sink.clone(),
                leases: Arc::clone(&self.leases),
                concurrency: props.concurrency,
            };
            let invoker = Invoker::new(props.unit.clone(), code, runtime)?;
            invokers.insert(resource.id.clone(), invoker);
        }

        let now = self.clock.now();
        let mut scheduler = current.map(|s| s.scheduler.clone()).unwrap_or_default();
        let mut wanted = BTreeSet::new();
        for resource in graph.of_kind(ResourceKind::ScheduleRule) {
            let ResourceSpec::ScheduleRule(props) = &resource.spec else {
                continue;
            };
            let mut rule = ScheduleRule::new(props.name.clone(), props.spec.clone())
                .with_target(props.target.target.as_str());
            if !props.enabled {
                rule = rule.disabled();
            }
            scheduler.upsert_rule(rule, now)?;
            wanted.insert(props.name.clone());
        }
        let stale: Vec<String> = scheduler
            .rules()
            .filter(|r| !wanted.contains(&r.name))
            .map(|r| r.name.clone())
            .collect();
        for name in stale {
            scheduler.remove_rule(&name)?;
        }

        Ok(Prepared { scheduler, invokers })
    }

    /// The only mutating step of a deploy.
    fn apply_sink_changes(
        &mut self,
        graph: &ResourceGraph,
        previous: Option<&DeployedStack>,
        plan: &Plan,
    ) -> Result<BTreeMap<LogicalId, SubscriptionId>, DeployError> {
        let old_graph = previous.map(|p| &p.graph);
        let mut subscriptions = previous.map(|p| p.subscriptions.clone()).unwrap_or_default();

        // Removed or replaced subscriptions and topics go first.
        for change in &plan.changes {
            if !matches!(change.action, ChangeAction::Replace | ChangeAction::Delete) {
                continue;
            }
            match change.kind {
                ResourceKind::Subscription => {
                    if let Some(id) = subscriptions.remove(&change.id) {
                        self.drop_subscription(id)?;
                    }
                }
                ResourceKind::Topic => {
                    let old_id = old_graph.and_then(|g| g.physical_id(&change.id));
                    if let Some(old_id) = old_id.filter(|t| self.sink.has_topic(t)) {
                        self.sink.delete_topic(&old_id)?;
                    }
                }
                _ => {}
            }
        }

        for change in &plan.changes {
            if !matches!(change.action, ChangeAction::Create | ChangeAction::Replace) {
                continue;
            }
            let Some(resource) = graph.get(&change.id) else {
                continue;
            };
            match &resource.spec {
                ResourceSpec::Topic(props) => {
                    let topic_id = graph
                        .physical_id(&change.id)
                        .ok_or_else(|| DeployError::DanglingReference {
                            from: change.id.clone(),
                            to: change.id.clone(),
                        })?;
                    self.sink.create_topic(&topic_id, &props.name)?;
                }
                ResourceSpec::Subscription(props) => {
                    let topic_id = graph
                        .physical_id(&props.topic.target)
                        .ok_or_else(|| DeployError::DanglingReference {
                            from: change.id.clone(),
                            to: props.topic.target.clone(),
                        })?;
                    let target = self.endpoint_for(&props.endpoint);
                    let id = self
                        .sink
                        .subscribe(&topic_id, props.protocol, &props.endpoint, target)?;
                    subscriptions.insert(change.id.clone(), id);
                }
                _ => {}
            }
        }

        Ok(subscriptions)
    }

    fn drop_subscription(&self, id: SubscriptionId) -> Result<(), DeployError> {
        let live = self
            .sink
            .subscription(id)
            .is_some_and(|s| s.state() != SubscriptionState::Removed);
        if live {
            self.sink.unsubscribe(id)?;
        }
        Ok(())
    }

    fn endpoint_for(&mut self, endpoint: &str) -> Arc<dyn DeliveryEndpoint> {
        if let Some(target) = self.endpoints.get(endpoint) {
            return Arc::clone(target);
        }
        let inbox = self
            .inboxes
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(RecordingEndpoint::new()));
        Arc::clone(inbox) as Arc<dyn DeliveryEndpoint>
    }

    /// The endpoint owner opted in.
    pub fn confirm_subscription(&self, stack: &str, endpoint: &str) -> Result<(), DeployError> {
        let deployed = self
            .stacks
            .get(stack)
            .ok_or_else(|| DeployError::StackNotFound(stack.to_string()))?;
        let id = deployed
            .subscriptions
            .iter()
            .find(|(logical, _)| {
                matches!(
                    deployed.graph.get(logical).map(|r| &r.spec),
                    Some(ResourceSpec::Subscription(p)) if p.endpoint == endpoint
                )
            })
            .map(|(_, id)| *id)
            .ok_or_else(|| DeployError::SubscriptionNotFound(endpoint.to_string()))?;
        self.sink.confirm(id)?;
        Ok(())
    }

    pub fn subscription_state(&self, stack: &str, endpoint: &str) -> Option<SubscriptionState> {
        let deployed = self.stacks.get(stack)?;
        deployed.subscriptions.iter().find_map(|(logical, id)| {
            match deployed.graph.get(logical).map(|r| &r.spec) {
                Some(ResourceSpec::Subscription(p)) if p.endpoint == endpoint => {
                    self.sink.subscription(*id).map(|s| s.state())
                }
                _ => None,
            }
        })
    }

    /// Run every scheduled tick and due delivery up to `target`, in time
    /// order.
    pub fn advance_to(&mut self, target: DateTime<Utc>) -> Result<TickReport, DeployError> {
        let mut report = TickReport::default();
        loop {
            report.absorb(self.sink.dispatch_pending()?);

            let next_fire = self
                .stacks
                .values()
                .filter_map(|s| s.scheduler.next_fire_any())
                .min();
            let next = [next_fire, self.sink.next_due()]
                .into_iter()
                .flatten()
                .filter(|t| *t <= target)
                .min();
            let Some(next) = next else {
                break;
            };
            self.clock.set(next);
            self.run_due(&mut report);
        }

        self.clock.set(target);
        self.run_due(&mut report);
        report.absorb(self.sink.dispatch_pending()?);
        debug!(
            now = %self.clock.now(),
            invocations = report.invocations.len(),
            missed = report.missed.len(),
            delivered = report.deliveries.delivered,
            "platform advanced"
        );
        Ok(report)
    }

    fn run_due(&mut self, report: &mut TickReport) {
        let now = self.clock.now();
        for deployed in self.stacks.values_mut() {
            let pass = deployed.scheduler.advance_to(now, &self.outages);
            for missed in pass.missed {
                warn!(
                    stack = %deployed.graph.stack_name,
                    rule = %missed.rule,
                    scheduled_at = %missed.scheduled_at,
                    "tick missed during outage"
                );
                report.missed.push(missed);
            }
            for firing in pass.firings {
                let Some(invoker) = deployed.invokers.get(&LogicalId::new(firing.target.as_str())) else {
                    warn!(unit = %firing.target, "rule targets an unknown unit");
                    continue;
                };
                let record = invoker.invoke(&firing.event);
                self.history.push(record.clone());
                report.invocations.push(record);
            }
        }
    }

    pub fn outputs(&self, stack: &str) -> Option<BTreeMap<String, String>> {
        self.stacks.get(stack).map(|s| s.graph.outputs())
    }

    pub fn deployment_id(&self, stack: &str) -> Option<DeploymentId> {
        self.stacks.get(stack).map(|s| s.deployment_id)
    }

    pub fn deployed_graph(&self, stack: &str) -> Option<&ResourceGraph> {
        self.stacks.get(stack).map(|s| &s.graph)
    }

    /// Notifications delivered to an endpoint that has no registered target.
    pub fn inbox(&self, endpoint: &str) -> Vec<Notification> {
        self.inboxes
            .get(endpoint)
            .map(|inbox| inbox.received())
            .unwrap_or_default()
    }

    /// Every invocation so far, oldest first.
    pub fn history(&self) -> &[InvocationRecord] {
        &self.history
    }
}

fn topic_ids(graph: &ResourceGraph) -> Vec<String> {
    graph
        .of_kind(ResourceKind::Topic)
        .filter_map(|r| graph.physical_id(&r.id))
        .collect()
}

fn owned_names(graph: &ResourceGraph) -> Vec<String> {
    graph
        .resources()
        .filter(|r| {
            matches!(
                r.kind(),
                ResourceKind::Topic | ResourceKind::ComputeUnit | ResourceKind::ScheduleRule
            )
        })
        .filter_map(|r| graph.physical_id(&r.id))
        .collect()
}
