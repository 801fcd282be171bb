//! Resource names.
//!
//! Every deployed resource is addressed by an ARN-like string of the form
//! `arn:<partition>:<service>:<region>:<account>:<resource>`. Permission
//! grants, topic lookups and deployment outputs all speak in these names.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Model identifier prefixes that denote a cross-region inference profile
/// rather than a single foundation model.
const INFERENCE_PROFILE_PREFIXES: &[&str] = &["us.", "eu.", "apac.", "global."];

/// An ARN-like resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Arn(String);

impl Arn {
    /// Parse and validate a resource name.
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let parts: Vec<&str> = value.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" {
            return Err(DomainError::invalid_id(format!("Arn: malformed '{value}'")));
        }
        if parts[1].is_empty() || parts[2].is_empty() || parts[5].is_empty() {
            return Err(DomainError::validation(format!(
                "Arn: partition, service and resource are required in '{value}'"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Service segment (`sns`, `lambda`, `bedrock`, ...).
    pub fn service(&self) -> &str {
        self.0.split(':').nth(2).unwrap_or_default()
    }

    /// Resource segment (everything after the account).
    pub fn resource(&self) -> &str {
        self.0.splitn(6, ':').nth(5).unwrap_or_default()
    }
}

impl core::fmt::Display for Arn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Arn {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Arn> for String {
    fn from(value: Arn) -> Self {
        value.0
    }
}

/// Account and region a stack is deployed into.
///
/// Resolved once per deployment and handed to everything that needs to mint
/// resource names; never read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformContext {
    pub partition: String,
    pub region: String,
    pub account: String,
}

impl PlatformContext {
    pub fn new(region: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            partition: "aws".to_string(),
            region: region.into(),
            account: account.into(),
        }
    }

    fn arn(&self, service: &str, region: &str, account: &str, resource: &str) -> Arn {
        Arn(format!(
            "arn:{}:{}:{}:{}:{}",
            self.partition, service, region, account, resource
        ))
    }

    pub fn topic_arn(&self, topic_name: &str) -> Arn {
        self.arn("sns", &self.region, &self.account, topic_name)
    }

    pub fn function_arn(&self, function_name: &str) -> Arn {
        self.arn(
            "lambda",
            &self.region,
            &self.account,
            &format!("function:{function_name}"),
        )
    }

    /// Execution role names are global (no region segment).
    pub fn role_arn(&self, role_name: &str) -> Arn {
        self.arn("iam", "", &self.account, &format!("role/{role_name}"))
    }

    pub fn rule_arn(&self, rule_name: &str) -> Arn {
        self.arn("events", &self.region, &self.account, &format!("rule/{rule_name}"))
    }

    pub fn secret_arn(&self, secret_name: &str) -> Arn {
        self.arn(
            "secretsmanager",
            &self.region,
            &self.account,
            &format!("secret:{secret_name}"),
        )
    }

    /// Name of the model resource a `MODEL_ID` refers to.
    ///
    /// Geo-prefixed ids (`us.amazon.nova-micro-v1:0`) are account-scoped
    /// inference profiles; bare ids are foundation models with no account.
    pub fn model_arn(&self, model_id: &str) -> Arn {
        if INFERENCE_PROFILE_PREFIXES
            .iter()
            .any(|prefix| model_id.starts_with(prefix))
        {
            self.arn(
                "bedrock",
                &self.region,
                &self.account,
                &format!("inference-profile/{model_id}"),
            )
        } else {
            self.arn(
                "bedrock",
                &self.region,
                "",
                &format!("foundation-model/{model_id}"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PlatformContext {
        PlatformContext::new("us-east-1", "123456789012")
    }

    #[test]
    fn topic_arn_has_all_segments() {
        let arn = ctx().topic_arn("SlackReportTopic");
        assert_eq!(arn.as_str(), "arn:aws:sns:us-east-1:123456789012:SlackReportTopic");
        assert_eq!(arn.service(), "sns");
        assert_eq!(arn.resource(), "SlackReportTopic");
    }

    #[test]
    fn inference_profile_ids_are_account_scoped() {
        let arn = ctx().model_arn("us.amazon.nova-micro-v1:0");
        assert_eq!(
            arn.as_str(),
            "arn:aws:bedrock:us-east-1:123456789012:inference-profile/us.amazon.nova-micro-v1:0"
        );
    }

    #[test]
    fn foundation_model_ids_have_no_account() {
        let arn = ctx().model_arn("amazon.nova-lite-v1:0");
        assert_eq!(
            arn.as_str(),
            "arn:aws:bedrock:us-east-1::foundation-model/amazon.nova-lite-v1:0"
        );
        // Colons inside the resource segment survive parsing.
        assert_eq!(arn.resource(), "foundation-model/amazon.nova-lite-v1:0");
    }

    #[test]
    fn parse_rejects_malformed_names() {
        assert!(Arn::parse("topic-1").is_err());
        assert!(Arn::parse("arn:aws:sns:us-east-1:123").is_err());
        assert!(Arn::parse("arn:aws::us-east-1:123:x").is_err());
        assert!(Arn::parse("arn:aws:sns:us-east-1:123:topic-1").is_ok());
    }

    #[test]
    fn serde_validates_on_the_way_in() {
        let ok: Result<Arn, _> = serde_json::from_str("\"arn:aws:sns:r:1:t\"");
        assert!(ok.is_ok());
        let bad: Result<Arn, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
