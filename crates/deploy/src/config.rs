//! Deployment descriptor configuration.
//!
//! One parameterized descriptor covers every variant of the stack: model,
//! subscriber list, packaging, schedule and execution bound. Values come from
//! a TOML file, then `DIGESTFLOW_*` environment variables override them.
//!
//! ```toml
//! stack_name = "SlackAnalyzerStack"
//! model_id = "us.amazon.nova-micro-v1:0"
//! channel_id = "C0123456789"
//!
//! [schedule]
//! kind = "local"
//! hour = 3
//! minute = 0
//! utc_offset_minutes = 540
//!
//! [[subscribers]]
//! protocol = "email"
//! endpoint = "ops@example.com"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use digestflow_compute::{ConcurrencyPolicy, ConfigValue, MAX_TIMEOUT_SECS};
use digestflow_events::Protocol;
use digestflow_schedule::{CronSpec, LocalTrigger};

use crate::error::DeployError;

pub const ENV_PREFIX: &str = "DIGESTFLOW_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Packaging {
    /// Plain code directory shipped as-is.
    Asset { path: String },
    /// Function bundled together with its dependency manifest.
    PythonBundle {
        entry: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requirements: Option<String>,
    },
}

impl Default for Packaging {
    fn default() -> Self {
        Packaging::Asset {
            path: "lambda".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// Cron expression already in UTC.
    Cron { expression: String },
    /// Local wall-clock time, converted to UTC at synth time.
    Local(LocalTrigger),
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig::Local(LocalTrigger::daily(3, 0, 9 * 60).in_zone("Asia/Tokyo"))
    }
}

impl ScheduleConfig {
    pub fn cron(spec: &CronSpec) -> Self {
        ScheduleConfig::Cron {
            expression: spec.expression(),
        }
    }
}

/// How lint findings on the grant are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantMode {
    /// Error-severity findings fail the deploy.
    #[default]
    Strict,
    /// Findings are logged and reported only.
    Lenient,
}

/// Which model resources the grant names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelScope {
    /// Exactly the configured model.
    #[default]
    Exact,
    /// Every model (`*`). Flagged as over-broad.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    pub protocol: Protocol,
    pub endpoint: String,
}

impl SubscriberConfig {
    pub fn email(address: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Email,
            endpoint: address.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    pub stack_name: String,
    pub region: String,
    pub account: String,
    pub topic_name: String,
    /// Fixed physical identifier for the topic; defaults to its ARN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    pub function_name: String,
    pub runtime: String,
    pub handler: String,
    pub timeout_secs: u64,
    pub packaging: Packaging,
    pub concurrency: ConcurrencyPolicy,
    pub channel_id: String,
    /// Secret-store id of the channel bot token.
    pub bot_token_secret: String,
    pub model_id: String,
    pub model_scope: ModelScope,
    pub grant_mode: GrantMode,
    pub schedule: ScheduleConfig,
    pub rule_name: String,
    pub subscribers: Vec<SubscriberConfig>,
    /// Additional configuration passed to the unit.
    pub extra_env: BTreeMap<String, ConfigValue>,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            stack_name: "SlackAnalyzerStack".to_string(),
            region: "us-east-1".to_string(),
            account: "000000000000".to_string(),
            topic_name: "SlackReportTopic".to_string(),
            topic_id: None,
            function_name: "SlackAnalyzerFunction".to_string(),
            runtime: "python3.11".to_string(),
            handler: "main.lambda_handler".to_string(),
            timeout_secs: MAX_TIMEOUT_SECS,
            packaging: Packaging::default(),
            concurrency: ConcurrencyPolicy::default(),
            channel_id: "C0000000000".to_string(),
            bot_token_secret: "slack/bot-token".to_string(),
            model_id: "us.amazon.nova-micro-v1:0".to_string(),
            model_scope: ModelScope::default(),
            grant_mode: GrantMode::default(),
            schedule: ScheduleConfig::default(),
            rule_name: "DailySlackAnalysisRule".to_string(),
            subscribers: vec![SubscriberConfig::email("ops@example.com")],
            extra_env: BTreeMap::new(),
        }
    }
}

impl DescriptorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, DeployError> {
        toml::from_str(raw).map_err(|e| DeployError::Descriptor(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DeployError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String, DeployError> {
        toml::to_string_pretty(self).map_err(|e| DeployError::Descriptor(e.to_string()))
    }

    /// Apply `DIGESTFLOW_*` overrides. Unknown variables are ignored.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<(), DeployError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = value.into();
            match name {
                "STACK_NAME" => self.stack_name = value,
                "REGION" => self.region = value,
                "ACCOUNT" => self.account = value,
                "TOPIC_ID" => self.topic_id = Some(value),
                "CHANNEL_ID" => self.channel_id = value,
                "MODEL_ID" => self.model_id = value,
                "BOT_TOKEN_SECRET" => self.bot_token_secret = value,
                "SCHEDULE" => self.schedule = ScheduleConfig::Cron { expression: value },
                "TIMEOUT_SECS" => {
                    self.timeout_secs = value.parse().map_err(|_| {
                        DeployError::Descriptor(format!("{ENV_PREFIX}TIMEOUT_SECS: '{value}' is not a number"))
                    })?;
                }
                "GRANT_MODE" => {
                    self.grant_mode = match value.to_ascii_lowercase().as_str() {
                        "strict" => GrantMode::Strict,
                        "lenient" => GrantMode::Lenient,
                        _ => {
                            return Err(DeployError::Descriptor(format!(
                                "{ENV_PREFIX}GRANT_MODE: expected strict or lenient, got '{value}'"
                            )));
                        }
                    };
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// File (if any) plus process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self, DeployError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(std::env::vars())?;
        Ok(config)
    }
}
