//! Descriptor to resource graph.

use std::collections::BTreeMap;

use tracing::{info, warn};

use digestflow_auth::{GrantFinding, ResourcePattern, Severity, actions, lint_grant};
use digestflow_compute::{ComputeUnitSpec, EnvConfig, EnvRequirements, HandlerRef, keys};
use digestflow_core::PlatformContext;
use digestflow_events::Protocol;
use digestflow_schedule::{CronSpec, ScheduleRule, to_utc};

use crate::config::{DescriptorConfig, GrantMode, ModelScope, Packaging, ScheduleConfig, SubscriberConfig};
use crate::error::DeployError;
use crate::graph::{
    ComputeUnitProps, GrantProps, LogicalId, OutputProps, Ref, Resource, ResourceGraph, ResourceSpec,
    ResourceValue, ScheduleRuleProps, StatementSpec, SubscriptionProps, TopicProps,
};

pub const TOPIC_ID: &str = "SlackReportTopic";
pub const FUNCTION_ID: &str = "SlackAnalyzerFunction";
pub const POLICY_ID: &str = "SlackAnalyzerFunctionServiceRoleDefaultPolicy";
pub const RULE_ID: &str = "DailySlackAnalysisRule";
pub const OUTPUT_ID: &str = "SnsTopicArn";

/// A validated graph plus everything worth telling the operator about it.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub graph: ResourceGraph,
    pub findings: Vec<GrantFinding>,
    pub warnings: Vec<String>,
}

pub fn synthesize(config: &DescriptorConfig) -> Result<Synthesis, DeployError> {
    let platform = PlatformContext::new(config.region.clone(), config.account.clone());
    let mut graph = ResourceGraph::new(config.stack_name.clone(), platform.clone());
    let mut warnings = Vec::new();

    graph.add(Resource::new(
        TOPIC_ID,
        ResourceSpec::Topic(TopicProps {
            name: config.topic_name.clone(),
            physical_id: config.topic_id.clone(),
        }),
    ))?;

    let mut seen: BTreeMap<String, &SubscriberConfig> = BTreeMap::new();
    for subscriber in &config.subscribers {
        check_subscriber(subscriber)?;
        let id = subscription_id(subscriber);
        match seen.get(&id) {
            Some(existing) if *existing == subscriber => continue,
            Some(existing) => {
                return Err(DeployError::Descriptor(format!(
                    "subscribers '{}' and '{}' both map to logical id {id}",
                    existing.endpoint, subscriber.endpoint
                )));
            }
            None => {
                seen.insert(id.clone(), subscriber);
            }
        }
        graph.add(Resource::new(
            id,
            ResourceSpec::Subscription(SubscriptionProps {
                topic: Ref::topic(TOPIC_ID),
                protocol: subscriber.protocol,
                endpoint: subscriber.endpoint.clone(),
            }),
        ))?;
    }

    let handler = HandlerRef::parse(&config.handler)?;
    let unit = ComputeUnitSpec::new(config.function_name.clone(), handler)
        .with_runtime(config.runtime.clone())
        .with_timeout_secs(config.timeout_secs);
    unit.validate()?;
    check_packaging(&config.packaging)?;

    if config.extra_env.contains_key(keys::NOTIFICATION_TOPIC_ID) {
        return Err(DeployError::Descriptor(format!(
            "{} is populated from the topic and cannot be set",
            keys::NOTIFICATION_TOPIC_ID
        )));
    }
    let mut env = EnvConfig::new()
        .with_secret(keys::CHANNEL_BOT_TOKEN, config.bot_token_secret.clone())
        .with_literal(keys::CHANNEL_ID, config.channel_id.clone())
        .with_literal(keys::MODEL_ID, config.model_id.clone());
    for (key, value) in &config.extra_env {
        env = env.with_value(key.clone(), value.clone());
    }
    let env_refs = BTreeMap::from([(keys::NOTIFICATION_TOPIC_ID.to_string(), Ref::topic(TOPIC_ID))]);

    graph.add(Resource::new(
        FUNCTION_ID,
        ResourceSpec::ComputeUnit(ComputeUnitProps {
            role_name: format!("{}ServiceRole", config.function_name),
            unit,
            packaging: config.packaging.clone(),
            concurrency: config.concurrency,
            env,
            env_refs,
        }),
    ))?;

    let model_resource = match config.model_scope {
        ModelScope::Exact => ResourcePattern::from(platform.model_arn(&config.model_id)),
        ModelScope::Any => ResourcePattern::any(),
    };
    graph.add(Resource::new(
        POLICY_ID,
        ResourceSpec::Grant(GrantProps {
            name: POLICY_ID.to_string(),
            role: Ref::compute_unit(FUNCTION_ID),
            statements: vec![
                StatementSpec {
                    sid: Some("InvokeModel".to_string()),
                    actions: vec![actions::MODEL_INVOKE],
                    resources: vec![ResourceValue::Pattern(model_resource)],
                },
                StatementSpec {
                    sid: Some("PublishReport".to_string()),
                    actions: vec![actions::TOPIC_PUBLISH],
                    resources: vec![ResourceValue::Ref(Ref::topic(TOPIC_ID))],
                },
            ],
        }),
    ))?;

    let spec = match &config.schedule {
        ScheduleConfig::Cron { expression } => CronSpec::parse(expression)?,
        ScheduleConfig::Local(trigger) => {
            let conversion = to_utc(trigger)?;
            warnings.extend(conversion.warnings);
            conversion.spec
        }
    };
    ScheduleRule::new(config.rule_name.clone(), spec.clone())
        .with_target(FUNCTION_ID)
        .validate()?;
    graph.add(Resource::new(
        RULE_ID,
        ResourceSpec::ScheduleRule(ScheduleRuleProps {
            name: config.rule_name.clone(),
            spec,
            target: Ref::compute_unit(FUNCTION_ID),
            enabled: true,
        }),
    ))?;

    graph.add(Resource::new(
        OUTPUT_ID,
        ResourceSpec::Output(OutputProps {
            description: "SNS Topic ARN for notifications".to_string(),
            value: Ref::topic(TOPIC_ID),
        }),
    ))?;

    graph.validate()?;

    let function = LogicalId::new(FUNCTION_ID);
    graph
        .resolved_env(&function)?
        .validate(&EnvRequirements::digest())?;

    let findings = lint(&graph, config)?;

    info!(
        stack = %graph.stack_name,
        resources = graph.len(),
        findings = findings.len(),
        "stack synthesized"
    );
    Ok(Synthesis {
        graph,
        findings,
        warnings,
    })
}

fn lint(graph: &ResourceGraph, config: &DescriptorConfig) -> Result<Vec<GrantFinding>, DeployError> {
    let grant = graph.resolved_grant(&LogicalId::new(POLICY_ID))?;
    let findings = lint_grant(&grant, &[actions::MODEL_INVOKE, actions::TOPIC_PUBLISH]);
    let errors: Vec<&GrantFinding> = findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .collect();

    if !errors.is_empty() && config.grant_mode == GrantMode::Strict {
        return Err(DeployError::OverBroadGrant {
            grant: grant.name().to_string(),
            findings: errors
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        });
    }
    for finding in &findings {
        warn!(grant = grant.name(), kind = ?finding.kind, "{}", finding.message);
    }
    Ok(findings)
}

fn check_subscriber(subscriber: &SubscriberConfig) -> Result<(), DeployError> {
    let endpoint = subscriber.endpoint.trim();
    let valid = match subscriber.protocol {
        Protocol::Email => endpoint.contains('@'),
        Protocol::Https => endpoint.starts_with("https://"),
        _ => !endpoint.is_empty(),
    };
    if valid {
        Ok(())
    } else {
        Err(DeployError::Descriptor(format!(
            "invalid {} subscriber endpoint '{}'",
            subscriber.protocol, subscriber.endpoint
        )))
    }
}

fn check_packaging(packaging: &Packaging) -> Result<(), DeployError> {
    let empty = match packaging {
        Packaging::Asset { path } => path.trim().is_empty(),
        Packaging::PythonBundle { entry, .. } => entry.trim().is_empty(),
    };
    if empty {
        return Err(DeployError::Descriptor("packaging needs a code location".to_string()));
    }
    Ok(())
}

/// Stable logical id derived from the endpoint, so adding or removing one
/// subscriber never renames another.
pub fn subscription_id(subscriber: &SubscriberConfig) -> String {
    let mut id = format!("{TOPIC_ID}{}", pascal(subscriber.protocol.as_str()));
    for part in subscriber
        .endpoint
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|p| !p.is_empty())
    {
        id.push_str(&pascal(part));
    }
    id
}

fn pascal(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
