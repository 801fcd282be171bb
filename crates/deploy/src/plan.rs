//! Change planning between a deployed graph and a desired one.
//!
//! Resources keep their identity across deploys unless a property that
//! defines that identity changes. Only then is the resource replaced, and
//! everything pointing at it is refreshed.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::DeployError;
use crate::graph::{LogicalId, Resource, ResourceGraph, ResourceKind, ResourceSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Replace,
    Delete,
    NoOp,
}

impl ChangeAction {
    fn symbol(self) -> &'static str {
        match self {
            ChangeAction::Create => "+",
            ChangeAction::Update => "~",
            ChangeAction::Replace => "-/+",
            ChangeAction::Delete => "-",
            ChangeAction::NoOp => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    pub id: LogicalId,
    pub kind: ResourceKind,
    pub action: ChangeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub stack: String,
    /// Creates, updates and replacements in dependency order, then deletes in
    /// reverse dependency order.
    pub changes: Vec<ResourceChange>,
}

impl Plan {
    /// True when applying the plan changes nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.iter().all(|c| c.action == ChangeAction::NoOp)
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    pub fn action_for(&self, id: &LogicalId) -> Option<ChangeAction> {
        self.changes.iter().find(|c| &c.id == id).map(|c| c.action)
    }

    pub fn changes_of(&self, action: ChangeAction) -> impl Iterator<Item = &ResourceChange> {
        self.changes.iter().filter(move |c| c.action == action)
    }
}

impl core::fmt::Display for Plan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "stack {}", self.stack)?;
        for change in &self.changes {
            write!(f, "  {:>3} {:?} {}", change.action.symbol(), change.kind, change.id)?;
            if let Some(reason) = &change.reason {
                write!(f, " ({reason})")?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete",
            self.count(ChangeAction::Create),
            self.count(ChangeAction::Update),
            self.count(ChangeAction::Replace),
            self.count(ChangeAction::Delete),
        )
    }
}

/// Diff `desired` against what is deployed. `current` is `None` for a stack
/// that does not exist yet.
pub fn plan(desired: &ResourceGraph, current: Option<&ResourceGraph>) -> Result<Plan, DeployError> {
    desired.validate()?;
    let order = desired.topological_order()?;

    let platform_moved = current.is_some_and(|c| c.platform != desired.platform);
    let mut actions: BTreeMap<LogicalId, (ChangeAction, Option<String>)> = BTreeMap::new();

    for id in &order {
        let Some(resource) = desired.get(id) else {
            continue;
        };
        let old = current.and_then(|c| c.get(id));
        let (mut action, mut reason) = match old {
            None => (ChangeAction::Create, None),
            Some(_) if platform_moved => {
                (ChangeAction::Replace, Some("region or account changed".to_string()))
            }
            Some(old) => diff(old, resource),
        };

        if action != ChangeAction::Replace && action != ChangeAction::Create {
            let replaced_dep = desired
                .dependencies(id)
                .into_iter()
                .find(|dep| matches!(actions.get(dep), Some((ChangeAction::Replace, _))));
            if let Some(dep) = replaced_dep {
                if resource.kind() == ResourceKind::Subscription {
                    action = ChangeAction::Replace;
                } else {
                    action = ChangeAction::Update;
                }
                reason = Some(format!("{dep} is replaced"));
            }
        }
        actions.insert(id.clone(), (action, reason));
    }

    let mut changes: Vec<ResourceChange> = order
        .iter()
        .filter_map(|id| {
            let resource = desired.get(id)?;
            let (action, reason) = actions.remove(id)?;
            Some(ResourceChange {
                id: id.clone(),
                kind: resource.kind(),
                action,
                reason,
            })
        })
        .collect();

    if let Some(current) = current {
        let mut removed = current.topological_order()?;
        removed.reverse();
        for id in removed {
            if desired.get(&id).is_some() {
                continue;
            }
            if let Some(resource) = current.get(&id) {
                changes.push(ResourceChange {
                    id,
                    kind: resource.kind(),
                    action: ChangeAction::Delete,
                    reason: None,
                });
            }
        }
    }

    Ok(Plan {
        stack: desired.stack_name.clone(),
        changes,
    })
}

fn diff(old: &Resource, new: &Resource) -> (ChangeAction, Option<String>) {
    if old.spec == new.spec {
        return (ChangeAction::NoOp, None);
    }
    match replacement_reason(&old.spec, &new.spec) {
        Some(reason) => (ChangeAction::Replace, Some(reason)),
        None => (ChangeAction::Update, None),
    }
}

/// Properties that make up a resource's identity on the platform.
fn replacement_reason(old: &ResourceSpec, new: &ResourceSpec) -> Option<String> {
    let reason = match (old, new) {
        (ResourceSpec::Topic(a), ResourceSpec::Topic(b)) => {
            if a.name != b.name {
                "topic name changed"
            } else if a.physical_id != b.physical_id {
                "topic identity changed"
            } else {
                return None;
            }
        }
        (ResourceSpec::Subscription(a), ResourceSpec::Subscription(b)) => {
            if a.protocol != b.protocol || a.endpoint != b.endpoint || a.topic != b.topic {
                "subscription target changed"
            } else {
                return None;
            }
        }
        (ResourceSpec::ComputeUnit(a), ResourceSpec::ComputeUnit(b)) => {
            if a.unit.function_name != b.unit.function_name {
                "function name changed"
            } else if a.role_name != b.role_name {
                "execution role changed"
            } else {
                return None;
            }
        }
        (ResourceSpec::Grant(a), ResourceSpec::Grant(b)) => {
            if a.name != b.name {
                "grant name changed"
            } else {
                return None;
            }
        }
        (ResourceSpec::ScheduleRule(a), ResourceSpec::ScheduleRule(b)) => {
            if a.name != b.name {
                "rule name changed"
            } else {
                return None;
            }
        }
        (ResourceSpec::Output(_), ResourceSpec::Output(_)) => return None,
        _ => "resource type changed",
    };
    Some(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DescriptorConfig, ScheduleConfig, SubscriberConfig};
    use crate::synth::{self, synthesize};

    fn graph(config: &DescriptorConfig) -> ResourceGraph {
        synthesize(config).unwrap().graph
    }

    #[test]
    fn first_deploy_creates_everything_in_dependency_order() {
        let desired = graph(&DescriptorConfig::default());
        let plan = plan(&desired, None).unwrap();

        assert_eq!(plan.count(ChangeAction::Create), desired.len());
        let position = |id: &str| plan.changes.iter().position(|c| c.id.as_str() == id).unwrap();
        assert!(position(synth::TOPIC_ID) < position(synth::FUNCTION_ID));
        assert!(position(synth::FUNCTION_ID) < position(synth::POLICY_ID));
        assert!(position(synth::FUNCTION_ID) < position(synth::RULE_ID));
    }

    #[test]
    fn identical_redeploy_is_empty() {
        let desired = graph(&DescriptorConfig::default());
        let plan = plan(&desired, Some(&desired)).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.count(ChangeAction::NoOp), desired.len());
    }

    #[test]
    fn schedule_change_updates_only_the_rule() {
        let current = graph(&DescriptorConfig::default());
        let desired = graph(&DescriptorConfig {
            schedule: ScheduleConfig::Cron {
                expression: "cron(30 6 * * ? *)".to_string(),
            },
            ..DescriptorConfig::default()
        });
        let plan = plan(&desired, Some(&current)).unwrap();

        assert_eq!(plan.action_for(&synth::RULE_ID.into()), Some(ChangeAction::Update));
        assert_eq!(plan.count(ChangeAction::Update), 1);
        assert_eq!(plan.count(ChangeAction::Replace), 0);
    }

    #[test]
    fn renaming_the_topic_replaces_it_and_cascades() {
        let current = graph(&DescriptorConfig::default());
        let desired = graph(&DescriptorConfig {
            topic_name: "OtherTopic".to_string(),
            ..DescriptorConfig::default()
        });
        let plan = plan(&desired, Some(&current)).unwrap();

        assert_eq!(plan.action_for(&synth::TOPIC_ID.into()), Some(ChangeAction::Replace));
        let subscription = synth::subscription_id(&SubscriberConfig::email("ops@example.com"));
        assert_eq!(
            plan.action_for(&subscription.as_str().into()),
            Some(ChangeAction::Replace)
        );
        assert_eq!(plan.action_for(&synth::FUNCTION_ID.into()), Some(ChangeAction::Update));
        assert_eq!(plan.action_for(&synth::POLICY_ID.into()), Some(ChangeAction::Update));
        assert_eq!(plan.action_for(&synth::RULE_ID.into()), Some(ChangeAction::NoOp));
    }

    #[test]
    fn dropped_subscriber_is_deleted_last() {
        let current = graph(&DescriptorConfig {
            subscribers: vec![
                SubscriberConfig::email("ops@example.com"),
                SubscriberConfig::email("dev@example.com"),
            ],
            ..DescriptorConfig::default()
        });
        let desired = graph(&DescriptorConfig::default());
        let plan = plan(&desired, Some(&current)).unwrap();

        let last = plan.changes.last().unwrap();
        assert_eq!(last.action, ChangeAction::Delete);
        assert_eq!(
            last.id.as_str(),
            synth::subscription_id(&SubscriberConfig::email("dev@example.com"))
        );
        assert_eq!(plan.count(ChangeAction::Delete), 1);
    }

    #[test]
    fn display_summarizes_the_counts() {
        let desired = graph(&DescriptorConfig::default());
        let rendered = plan(&desired, None).unwrap().to_string();
        assert!(rendered.starts_with("stack SlackAnalyzerStack"));
        assert!(rendered.ends_with("6 to create, 0 to update, 0 to replace, 0 to delete"));
    }
}
