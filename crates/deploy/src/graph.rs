//! Resource graph.
//!
//! A stack is a DAG of typed resources. Edges are [`Ref`]s: a resource that
//! needs another resource's physical identity names it by logical id and by
//! the kind it expects to find there. The graph is built once by
//! [`crate::synthesize`], validated, and then only read.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use digestflow_auth::{Action, PermissionGrant, PolicyStatement, PrincipalId, ResourcePattern};
use digestflow_compute::{ComputeUnitSpec, ConcurrencyPolicy, EnvConfig};
use digestflow_core::PlatformContext;
use digestflow_events::Protocol;
use digestflow_schedule::CronSpec;

use crate::config::Packaging;
use crate::error::DeployError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Topic,
    Subscription,
    ComputeUnit,
    Grant,
    ScheduleRule,
    Output,
}

/// Typed edge to another resource of the same stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub target: LogicalId,
    pub kind: ResourceKind,
}

impl Ref {
    pub fn topic(target: impl Into<String>) -> Self {
        Self {
            target: LogicalId::new(target),
            kind: ResourceKind::Topic,
        }
    }

    pub fn compute_unit(target: impl Into<String>) -> Self {
        Self {
            target: LogicalId::new(target),
            kind: ResourceKind::ComputeUnit,
        }
    }
}

/// A statement resource: a literal pattern, or another resource's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    Pattern(ResourcePattern),
    Ref(Ref),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub actions: Vec<Action>,
    pub resources: Vec<ResourceValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicProps {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionProps {
    pub topic: Ref,
    pub protocol: Protocol,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnitProps {
    pub unit: ComputeUnitSpec,
    pub packaging: Packaging,
    pub role_name: String,
    pub concurrency: ConcurrencyPolicy,
    /// Static configuration.
    pub env: EnvConfig,
    /// Configuration filled with another resource's identity at deploy time.
    pub env_refs: BTreeMap<String, Ref>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantProps {
    pub name: String,
    /// The unit whose execution role receives the grant.
    pub role: Ref,
    pub statements: Vec<StatementSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRuleProps {
    pub name: String,
    pub spec: CronSpec,
    pub target: Ref,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputProps {
    pub description: String,
    pub value: Ref,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties", rename_all = "snake_case")]
pub enum ResourceSpec {
    Topic(TopicProps),
    Subscription(SubscriptionProps),
    ComputeUnit(ComputeUnitProps),
    Grant(GrantProps),
    ScheduleRule(ScheduleRuleProps),
    Output(OutputProps),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Topic(_) => ResourceKind::Topic,
            ResourceSpec::Subscription(_) => ResourceKind::Subscription,
            ResourceSpec::ComputeUnit(_) => ResourceKind::ComputeUnit,
            ResourceSpec::Grant(_) => ResourceKind::Grant,
            ResourceSpec::ScheduleRule(_) => ResourceKind::ScheduleRule,
            ResourceSpec::Output(_) => ResourceKind::Output,
        }
    }

    /// Every outgoing edge.
    pub fn references(&self) -> Vec<&Ref> {
        match self {
            ResourceSpec::Topic(_) => Vec::new(),
            ResourceSpec::Subscription(p) => vec![&p.topic],
            ResourceSpec::ComputeUnit(p) => p.env_refs.values().collect(),
            ResourceSpec::Grant(p) => {
                let mut refs = vec![&p.role];
                for statement in &p.statements {
                    for resource in &statement.resources {
                        if let ResourceValue::Ref(r) = resource {
                            refs.push(r);
                        }
                    }
                }
                refs
            }
            ResourceSpec::ScheduleRule(p) => vec![&p.target],
            ResourceSpec::Output(p) => vec![&p.value],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: LogicalId,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

impl Resource {
    pub fn new(id: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            id: LogicalId::new(id),
            spec,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGraph {
    pub stack_name: String,
    pub platform: PlatformContext,
    resources: BTreeMap<LogicalId, Resource>,
}

impl ResourceGraph {
    pub fn new(stack_name: impl Into<String>, platform: PlatformContext) -> Self {
        Self {
            stack_name: stack_name.into(),
            platform,
            resources: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, resource: Resource) -> Result<(), DeployError> {
        if self.resources.contains_key(&resource.id) {
            return Err(DeployError::DuplicateLogicalId(resource.id));
        }
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    pub fn get(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(move |r| r.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every reference resolves to a resource of the expected kind, and the
    /// graph is acyclic.
    pub fn validate(&self) -> Result<(), DeployError> {
        for resource in self.resources.values() {
            for r in resource.spec.references() {
                let target = self
                    .resources
                    .get(&r.target)
                    .ok_or_else(|| DeployError::DanglingReference {
                        from: resource.id.clone(),
                        to: r.target.clone(),
                    })?;
                if target.kind() != r.kind {
                    return Err(DeployError::ReferenceKind {
                        from: resource.id.clone(),
                        to: r.target.clone(),
                        expected: r.kind,
                        found: target.kind(),
                    });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Dependencies before dependents; ties broken by logical id.
    pub fn topological_order(&self) -> Result<Vec<LogicalId>, DeployError> {
        let mut pending: BTreeMap<&LogicalId, BTreeSet<&LogicalId>> = self
            .resources
            .values()
            .map(|r| {
                let deps = r
                    .spec
                    .references()
                    .into_iter()
                    .map(|dep| &dep.target)
                    .filter(|dep| self.resources.contains_key(*dep))
                    .collect();
                (&r.id, deps)
            })
            .collect();

        let mut order = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready: Vec<&LogicalId> = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                return Err(DeployError::Cycle(
                    pending.keys().map(|id| (*id).clone()).collect(),
                ));
            }
            for id in ready {
                pending.remove(id);
                for deps in pending.values_mut() {
                    deps.remove(id);
                }
                order.push(id.clone());
            }
        }
        Ok(order)
    }

    /// Logical ids `id` depends on directly.
    pub fn dependencies(&self, id: &LogicalId) -> Vec<LogicalId> {
        self.resources
            .get(id)
            .map(|r| r.spec.references().into_iter().map(|d| d.target.clone()).collect())
            .unwrap_or_default()
    }

    /// Physical identity a reference to `id` resolves to.
    pub fn physical_id(&self, id: &LogicalId) -> Option<String> {
        let resource = self.resources.get(id)?;
        let value = match &resource.spec {
            ResourceSpec::Topic(p) => p
                .physical_id
                .clone()
                .unwrap_or_else(|| self.platform.topic_arn(&p.name).to_string()),
            ResourceSpec::Subscription(p) => format!("{}:{}", p.protocol, p.endpoint),
            ResourceSpec::ComputeUnit(p) => self.platform.function_arn(&p.unit.function_name).to_string(),
            ResourceSpec::Grant(p) => p.name.clone(),
            ResourceSpec::ScheduleRule(p) => self.platform.rule_arn(&p.name).to_string(),
            ResourceSpec::Output(p) => return self.physical_id(&p.value.target),
        };
        Some(value)
    }

    fn resolve(&self, from: &LogicalId, r: &Ref) -> Result<String, DeployError> {
        self.physical_id(&r.target)
            .ok_or_else(|| DeployError::DanglingReference {
                from: from.clone(),
                to: r.target.clone(),
            })
    }

    /// The unit's configuration with every reference filled in.
    pub fn resolved_env(&self, unit: &LogicalId) -> Result<EnvConfig, DeployError> {
        let Some(ResourceSpec::ComputeUnit(props)) = self.get(unit).map(|r| &r.spec) else {
            return Err(DeployError::DanglingReference {
                from: unit.clone(),
                to: unit.clone(),
            });
        };
        let mut env = props.env.clone();
        for (key, r) in &props.env_refs {
            env = env.with_literal(key.clone(), self.resolve(unit, r)?);
        }
        Ok(env)
    }

    /// Execution identity of a unit.
    pub fn principal(&self, unit: &LogicalId) -> Option<PrincipalId> {
        match &self.get(unit)?.spec {
            ResourceSpec::ComputeUnit(p) => Some(PrincipalId::new(self.platform.role_arn(&p.role_name))),
            _ => None,
        }
    }

    /// A grant node as an evaluable grant.
    pub fn resolved_grant(&self, grant: &LogicalId) -> Result<PermissionGrant, DeployError> {
        let Some(ResourceSpec::Grant(props)) = self.get(grant).map(|r| &r.spec) else {
            return Err(DeployError::DanglingReference {
                from: grant.clone(),
                to: grant.clone(),
            });
        };
        let principal = self
            .principal(&props.role.target)
            .ok_or_else(|| DeployError::DanglingReference {
                from: grant.clone(),
                to: props.role.target.clone(),
            })?;

        let mut resolved = PermissionGrant::new(props.name.clone(), principal);
        for statement in &props.statements {
            let mut resources = Vec::with_capacity(statement.resources.len());
            for value in &statement.resources {
                resources.push(match value {
                    ResourceValue::Pattern(p) => p.clone(),
                    ResourceValue::Ref(r) => ResourcePattern::new(self.resolve(grant, r)?),
                });
            }
            let mut s = PolicyStatement::new(statement.actions.clone(), resources);
            if let Some(sid) = &statement.sid {
                s = s.with_sid(sid.clone());
            }
            resolved.add_statement(s);
        }
        Ok(resolved)
    }

    /// Every grant attached to `unit`, merged. Grants only add authority.
    pub fn effective_grant(&self, unit: &LogicalId) -> Result<PermissionGrant, DeployError> {
        let principal = self
            .principal(unit)
            .ok_or_else(|| DeployError::DanglingReference {
                from: unit.clone(),
                to: unit.clone(),
            })?;
        let mut merged = PermissionGrant::new(format!("{unit}Effective"), principal);
        for resource in self.of_kind(ResourceKind::Grant) {
            let ResourceSpec::Grant(props) = &resource.spec else {
                continue;
            };
            if &props.role.target == unit {
                merged.absorb(&self.resolved_grant(&resource.id)?);
            }
        }
        Ok(merged)
    }

    /// Declared outputs, name to value.
    pub fn outputs(&self) -> BTreeMap<String, String> {
        self.of_kind(ResourceKind::Output)
            .filter_map(|r| Some((r.id.to_string(), self.physical_id(&r.id)?)))
            .collect()
    }
}
