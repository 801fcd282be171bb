use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use digestflow_compute::{Handler, InvocationContext, InvocationError, keys};
use digestflow_events::OutgoingMessage;
use digestflow_schedule::TriggerEvent;

use crate::channel::{ChannelReader, HISTORY_LIMIT};
use crate::model::ModelClient;
use crate::report::{Analysis, DigestReport, REPORT_SUBJECT};

/// Daily channel digest.
///
/// Window is the 24 hours before the invocation instant. An empty window is
/// a successful run that publishes nothing.
#[derive(Debug, Clone)]
pub struct DigestHandler {
    channel: Arc<dyn ChannelReader>,
    model: Arc<dyn ModelClient>,
    window: Duration,
    limit: usize,
}

impl DigestHandler {
    pub fn new(channel: Arc<dyn ChannelReader>, model: Arc<dyn ModelClient>) -> Self {
        Self {
            channel,
            model,
            window: Duration::hours(24),
            limit: HISTORY_LIMIT,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

impl Handler for DigestHandler {
    fn handle(&self, _event: &TriggerEvent, ctx: &InvocationContext) -> Result<(), InvocationError> {
        let channel_id = ctx.config(keys::CHANNEL_ID)?;
        let topic_id = ctx.config(keys::NOTIFICATION_TOPIC_ID)?;
        let model_id = ctx.config(keys::MODEL_ID)?;
        let token = ctx.secret(keys::CHANNEL_BOT_TOKEN)?;

        let latest = ctx.now();
        let oldest = latest - self.window;
        let messages = self
            .channel
            .history(&token, channel_id, oldest, latest, self.limit)?;

        let lines: Vec<&str> = messages
            .iter()
            .filter_map(|m| m.text.as_deref())
            .filter(|t| !t.trim().is_empty())
            .collect();
        if lines.is_empty() {
            info!(run_id = %ctx.run_id(), channel = channel_id, "no messages in window");
            return Ok(());
        }
        let transcript = lines.join("\n");

        ctx.authorize_model(model_id)?;
        let mut report = DigestReport::new(latest.date_naive());
        for analysis in Analysis::ALL {
            ctx.check_deadline()?;
            let body = self.model.invoke(model_id, &analysis.prompt(&transcript))?;
            report.add_section(analysis, body);
        }

        info!(
            run_id = %ctx.run_id(),
            channel = channel_id,
            messages = lines.len(),
            "digest ready"
        );
        ctx.publish(
            topic_id,
            OutgoingMessage::new(report.render()).with_subject(REPORT_SUBJECT),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use digestflow_auth::{PermissionGrant, PolicyStatement, PrincipalId, ResourcePattern, actions};
    use digestflow_compute::{
        ComputeUnitSpec, ConcurrencyPolicy, EnvConfig, EnvRequirements, HandlerRef,
        InMemorySecretStore, Invoker, RunLeases, UnitRuntime,
    };
    use digestflow_core::{Clock, ManualClock, PlatformContext};
    use digestflow_events::{InMemorySink, Protocol, RecordingEndpoint};

    use super::*;
    use crate::channel::{ChannelMessage, StaticChannel};
    use crate::model::ScriptedModel;

    const TOPIC: &str = "topic-1";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 18, 0, 0).unwrap()
    }

    struct Fixture {
        clock: ManualClock,
        sink: Arc<InMemorySink>,
        inbox: Arc<RecordingEndpoint>,
        channel: Arc<StaticChannel>,
        model: Arc<ScriptedModel>,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(now());
        let sink = Arc::new(InMemorySink::new(Arc::new(clock.clone())));
        sink.create_topic(TOPIC, "SlackReportTopic").unwrap();
        let inbox = Arc::new(RecordingEndpoint::new());
        sink.subscribe(TOPIC, Protocol::Sqs, "inbox", inbox.clone()).unwrap();
        Fixture {
            clock,
            sink,
            inbox,
            channel: Arc::new(StaticChannel::new("xoxb-1")),
            model: Arc::new(
                ScriptedModel::new("unused")
                    .with_rule("questions", "Q: how to deploy?\nA: run the pipeline.")
                    .with_rule("topics", "- release 2.0"),
            ),
        }
    }

    fn invoker(f: &Fixture, model_scope: &str) -> Invoker {
        let platform = PlatformContext::new("us-east-1", "123456789012");
        let principal = PrincipalId::new(platform.role_arn("AnalyzerRole"));
        let grant = PermissionGrant::new("AnalyzerPolicy", principal.clone())
            .with_statement(PolicyStatement::new(
                vec![actions::MODEL_INVOKE],
                vec![ResourcePattern::from(platform.model_arn(model_scope))],
            ))
            .with_statement(PolicyStatement::new(
                vec![actions::TOPIC_PUBLISH],
                vec![ResourcePattern::new(TOPIC)],
            ));
        let env = EnvConfig::new()
            .with_secret(keys::CHANNEL_BOT_TOKEN, "slack/bot-token")
            .with_literal(keys::CHANNEL_ID, "C1")
            .with_literal(keys::NOTIFICATION_TOPIC_ID, TOPIC)
            .with_literal(keys::MODEL_ID, "model-a");
        let handler = DigestHandler::new(f.channel.clone(), f.model.clone());

        Invoker::new(
            ComputeUnitSpec::new("SlackAnalyzerFunction", HandlerRef::parse("main.lambda_handler").unwrap()),
            Arc::new(handler),
            UnitRuntime {
                env,
                requirements: EnvRequirements::digest(),
                secrets: Arc::new(InMemorySecretStore::new().with_secret("slack/bot-token", "xoxb-1")),
                grant,
                principal,
                platform,
                clock: Arc::new(f.clock.clone()),
                sink: f.sink.clone(),
                leases: Arc::new(RunLeases::new()),
                concurrency: ConcurrencyPolicy::Exclusive,
            },
        )
        .unwrap()
    }

    fn tick(f: &Fixture) -> TriggerEvent {
        TriggerEvent::scheduled("DailySlackAnalysisRule", f.clock.now())
    }

    #[test]
    fn busy_day_yields_one_dated_report() {
        let f = fixture();
        f.channel.post("C1", ChannelMessage::text(now() - Duration::hours(2), "how do I deploy?"));
        f.channel.post("C1", ChannelMessage::event(now() - Duration::hours(1)));

        let record = invoker(&f, "model-a").invoke(&tick(&f));

        assert!(record.is_success(), "{:?}", record.outcome);
        let messages = f.sink.messages(TOPIC);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject(), Some(REPORT_SUBJECT));
        assert!(messages[0].body().contains("(2025-01-15)"));
        assert!(messages[0].body().contains("release 2.0"));
        assert!(messages[0].body().contains("how to deploy?"));

        let calls = f.model.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(model, prompt)| model == "model-a" && prompt.contains("how do I deploy?")));

        f.sink.dispatch_pending().unwrap();
        assert_eq!(f.inbox.count(), 1);
    }

    #[test]
    fn messages_outside_the_window_are_ignored() {
        let f = fixture();
        f.channel.post("C1", ChannelMessage::text(now() - Duration::hours(25), "yesterday"));

        let record = invoker(&f, "model-a").invoke(&tick(&f));

        assert!(record.is_success());
        assert_eq!(record.published(), None);
        assert!(f.model.calls().is_empty());
        assert!(f.sink.messages(TOPIC).is_empty());
    }

    #[test]
    fn model_failure_fails_the_run_without_publishing() {
        let f = fixture();
        f.channel.post("C1", ChannelMessage::text(now() - Duration::hours(2), "hi"));
        f.model.fail_with("throttled");

        let record = invoker(&f, "model-a").invoke(&tick(&f));

        assert!(matches!(
            record.error(),
            Some(InvocationError::External { capability, .. }) if capability == "model"
        ));
        assert!(f.sink.messages(TOPIC).is_empty());
    }

    #[test]
    fn channel_failure_fails_the_run_without_publishing() {
        let f = fixture();
        f.channel.fail_with("rate limited");

        let record = invoker(&f, "model-a").invoke(&tick(&f));

        assert!(matches!(
            record.error(),
            Some(InvocationError::External { capability, .. }) if capability == "channel"
        ));
        assert!(f.sink.messages(TOPIC).is_empty());
    }

    #[test]
    fn model_outside_the_grant_is_forbidden() {
        let f = fixture();
        f.channel.post("C1", ChannelMessage::text(now() - Duration::hours(2), "hi"));

        let record = invoker(&f, "model-b").invoke(&tick(&f));

        assert!(matches!(record.error(), Some(InvocationError::Forbidden(_))));
        assert!(f.model.calls().is_empty());
    }
}
