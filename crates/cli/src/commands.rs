//! Subcommand implementations.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, Utc};
use tracing::info;

use digestflow_analyzer::{ChannelMessage, DigestHandler, ScriptedModel, StaticChannel};
use digestflow_compute::{InMemorySecretStore, InvocationOutcome, InvocationRecord};
use digestflow_deploy::{DescriptorConfig, SimulatedPlatform, plan as plan_changes, synthesize};

use crate::SimulateArgs;

const SIMULATED_TOKEN: &str = "xoxb-simulated";

/// Canned conversation posted to the channel every simulated day, as
/// (hours after midnight, text).
const DAILY_CHATTER: [(i64, &str); 3] = [
    (2, "How do I rotate the bot token without downtime?"),
    (7, "Is the release planning call moved to Thursday?"),
    (11, "How do I rotate the bot token? The docs look outdated."),
];

pub fn synth(config: &DescriptorConfig, out: &mut dyn Write) -> anyhow::Result<()> {
    let synthesis = synthesize(config).context("synthesizing stack")?;
    for warning in &synthesis.warnings {
        tracing::warn!("{warning}");
    }
    serde_json::to_writer_pretty(&mut *out, &synthesis.graph)?;
    writeln!(out)?;
    Ok(())
}

pub fn plan(config: &DescriptorConfig, out: &mut dyn Write) -> anyhow::Result<()> {
    let synthesis = synthesize(config).context("synthesizing stack")?;
    let plan = plan_changes(&synthesis.graph, None)?;
    writeln!(out, "{plan}")?;
    Ok(())
}

pub fn simulate(
    config: &DescriptorConfig,
    args: &SimulateArgs,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let start = args
        .start
        .unwrap_or_else(|| Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc());
    let synthesis = synthesize(config).context("synthesizing stack")?;

    let secrets = InMemorySecretStore::new().with_secret(config.bot_token_secret.clone(), SIMULATED_TOKEN);
    let mut platform = SimulatedPlatform::new(start, secrets);

    let channel = Arc::new(StaticChannel::new(SIMULATED_TOKEN));
    for day in 0..i64::from(args.days) {
        for (hour, text) in DAILY_CHATTER {
            let at = start + Duration::days(day) + Duration::hours(hour);
            channel.post(&config.channel_id, ChannelMessage::text(at, text));
        }
    }
    let model = Arc::new(
        ScriptedModel::new("- Nothing notable")
            .with_rule(
                "most frequent questions",
                "Q: How do I rotate the bot token?\nA: Update the stored secret; the next run picks it up.",
            )
            .with_rule("topics people are talking", "- Token rotation\n- Release planning"),
    );
    platform.register_code(config.handler.clone(), Arc::new(DigestHandler::new(channel, model)));

    let report = platform.deploy(&synthesis.graph).context("deploying stack")?;
    info!(deployment_id = %report.deployment_id, "simulation started");
    writeln!(out, "deployed {} ({})", config.stack_name, report.deployment_id)?;
    for (name, value) in &report.outputs {
        writeln!(out, "  output {name} = {value}")?;
    }

    if !args.unconfirmed {
        for subscriber in &config.subscribers {
            platform.confirm_subscription(&config.stack_name, &subscriber.endpoint)?;
        }
    }

    for day in 1..=i64::from(args.days) {
        let tick = platform.advance_to(start + Duration::days(day))?;
        for missed in &tick.missed {
            writeln!(out, "{} {} missed", timestamp(missed.scheduled_at), missed.rule)?;
        }
        for record in &tick.invocations {
            writeln!(out, "{}", describe(record))?;
        }
        let d = tick.deliveries;
        if d.delivered + d.failed + d.dead_lettered > 0 {
            writeln!(
                out,
                "  deliveries: {} delivered, {} failed, {} dead-lettered",
                d.delivered, d.failed, d.dead_lettered
            )?;
        }
    }

    writeln!(out, "summary:")?;
    for subscriber in &config.subscribers {
        writeln!(
            out,
            "  {}: {} report(s)",
            subscriber.endpoint,
            platform.inbox(&subscriber.endpoint).len()
        )?;
    }
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn describe(record: &InvocationRecord) -> String {
    let outcome = match &record.outcome {
        InvocationOutcome::Succeeded {
            published: Some(message_id),
        } => format!("published {message_id}"),
        InvocationOutcome::Succeeded { published: None } => "nothing to publish".to_string(),
        InvocationOutcome::Failed { error } => format!("failed: {error}"),
    };
    format!(
        "{} {} run {} {}",
        timestamp(record.scheduled_at),
        record.unit,
        record.run_id,
        outcome
    )
}
