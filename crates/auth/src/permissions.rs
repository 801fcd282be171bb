use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Well-known actions the pipeline needs.
pub mod actions {
    use super::Action;

    /// Invoke a hosted generative model.
    pub const MODEL_INVOKE: Action = Action::from_static("bedrock:InvokeModel");

    /// Publish a message to a notification topic.
    pub const TOPIC_PUBLISH: Action = Action::from_static("sns:Publish");
}

/// Action identifier, `service:Operation` (e.g. `"sns:Publish"`).
///
/// A trailing `*` in the operation (`"sns:*"`) or a bare `"*"` is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Cow<'static, str>);

impl Action {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn service(&self) -> &str {
        self.as_str().split(':').next().unwrap_or_default()
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str().ends_with('*')
    }

    /// Whether this (possibly wildcard) action covers `requested`.
    pub fn covers(&self, requested: &Action) -> bool {
        glob_match(self.as_str(), requested.as_str())
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource selector inside a policy statement.
///
/// `"*"` selects every resource; a trailing `*` selects by prefix; anything
/// else must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePattern(String);

impl ResourcePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn any() -> Self {
        Self("*".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        self.0 == "*"
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.ends_with('*')
    }

    pub fn matches(&self, resource: &str) -> bool {
        glob_match(&self.0, resource)
    }
}

impl core::fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourcePattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<digestflow_core::Arn> for ResourcePattern {
    fn from(value: digestflow_core::Arn) -> Self {
        Self(value.into())
    }
}

/// Trailing-star match only; a `*` anywhere else is literal.
fn glob_match(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}
