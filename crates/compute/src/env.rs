//! Immutable configuration mapping injected into a unit.
//!
//! Values are either literals or references to a secret store. A key declared
//! secret must be a reference; literals under secret-looking keys are
//! rejected as plaintext secrets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Keys the digest unit reads.
pub mod keys {
    pub const CHANNEL_BOT_TOKEN: &str = "CHANNEL_BOT_TOKEN";
    pub const CHANNEL_ID: &str = "CHANNEL_ID";
    pub const NOTIFICATION_TOPIC_ID: &str = "NOTIFICATION_TOPIC_ID";
    pub const MODEL_ID: &str = "MODEL_ID";
}

const SECRET_SUFFIXES: &[&str] = &["_TOKEN", "_SECRET", "_PASSWORD", "_API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Literal(String),
    SecretRef { secret: String },
}

impl ConfigValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn secret(secret_id: impl Into<String>) -> Self {
        Self::SecretRef {
            secret: secret_id.into(),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::SecretRef { .. })
    }
}

/// Which keys a unit needs, and which of them must be secret references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRequirements {
    pub required: Vec<&'static str>,
    pub secret: Vec<&'static str>,
}

impl EnvRequirements {
    pub fn digest() -> Self {
        Self {
            required: vec![
                keys::CHANNEL_BOT_TOKEN,
                keys::CHANNEL_ID,
                keys::NOTIFICATION_TOPIC_ID,
                keys::MODEL_ID,
            ],
            secret: vec![keys::CHANNEL_BOT_TOKEN],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl EnvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_literal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), ConfigValue::literal(value));
        self
    }

    pub fn with_secret(mut self, key: impl Into<String>, secret_id: impl Into<String>) -> Self {
        self.values.insert(key.into(), ConfigValue::secret(secret_id));
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn literal(&self, key: &str) -> Result<&str, ConfigError> {
        match self.values.get(key) {
            Some(ConfigValue::Literal(v)) => Ok(v),
            Some(ConfigValue::SecretRef { .. }) => Err(ConfigError::NotLiteral(key.to_string())),
            None => Err(ConfigError::MissingKey(key.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn validate(&self, requirements: &EnvRequirements) -> Result<(), ConfigError> {
        for key in &requirements.required {
            match self.values.get(*key) {
                None => return Err(ConfigError::MissingKey((*key).to_string())),
                Some(ConfigValue::Literal(v)) if v.trim().is_empty() => {
                    return Err(ConfigError::MissingKey((*key).to_string()));
                }
                _ => {}
            }
        }
        for (key, value) in &self.values {
            let declared = requirements.secret.iter().any(|s| *s == key.as_str());
            if matches!(value, ConfigValue::Literal(_)) && (declared || looks_secret(key)) {
                return Err(ConfigError::PlaintextSecret(key.clone()));
            }
        }
        Ok(())
    }
}

fn looks_secret(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    SECRET_SUFFIXES.iter().any(|s| upper.ends_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> EnvConfig {
        EnvConfig::new()
            .with_secret(keys::CHANNEL_BOT_TOKEN, "slack/bot-token")
            .with_literal(keys::CHANNEL_ID, "C0123")
            .with_literal(keys::NOTIFICATION_TOPIC_ID, "topic-1")
            .with_literal(keys::MODEL_ID, "model-a")
    }

    #[test]
    fn complete_config_validates() {
        assert!(complete().validate(&EnvRequirements::digest()).is_ok());
    }

    #[test]
    fn missing_key_is_reported() {
        let mut env = complete();
        env.values.remove(keys::MODEL_ID);
        assert_eq!(
            env.validate(&EnvRequirements::digest()),
            Err(ConfigError::MissingKey(keys::MODEL_ID.to_string()))
        );
    }

    #[test]
    fn literal_token_is_a_plaintext_secret() {
        let env = complete().with_literal(keys::CHANNEL_BOT_TOKEN, "xoxb-123");
        assert_eq!(
            env.validate(&EnvRequirements::digest()),
            Err(ConfigError::PlaintextSecret(keys::CHANNEL_BOT_TOKEN.to_string()))
        );
    }

    #[test]
    fn undeclared_secret_looking_keys_are_rejected_too() {
        let env = complete().with_literal("OPENAI_API_KEY", "sk-1");
        assert!(matches!(
            env.validate(&EnvRequirements::digest()),
            Err(ConfigError::PlaintextSecret(_))
        ));
    }

    #[test]
    fn literal_lookup_distinguishes_secret_refs() {
        let env = complete();
        assert_eq!(env.literal(keys::MODEL_ID).unwrap(), "model-a");
        assert!(matches!(
            env.literal(keys::CHANNEL_BOT_TOKEN),
            Err(ConfigError::NotLiteral(_))
        ));
    }

    #[test]
    fn deserializes_literals_and_references() {
        let env: EnvConfig = serde_json::from_value(serde_json::json!({
            "CHANNEL_ID": "C0123",
            "CHANNEL_BOT_TOKEN": { "secret": "slack/bot-token" }
        }))
        .unwrap();
        assert_eq!(env.get(keys::CHANNEL_ID), Some(&ConfigValue::literal("C0123")));
        assert!(env.get(keys::CHANNEL_BOT_TOKEN).is_some_and(ConfigValue::is_secret));
    }
}
