use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard};

use crate::error::AnalysisError;

/// A hosted text model.
pub trait ModelClient: Send + Sync + Debug {
    fn invoke(&self, model_id: &str, prompt: &str) -> Result<String, AnalysisError>;
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<(String, String)>,
    failure: Option<String>,
    calls: Vec<(String, String)>,
}

/// Deterministic model for simulations and tests.
///
/// Replies with the first rule whose needle occurs in the prompt, or the
/// default reply.
#[derive(Debug)]
pub struct ScriptedModel {
    default_reply: String,
    script: Mutex<Script>,
}

impl ScriptedModel {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            default_reply: default_reply.into(),
            script: Mutex::new(Script::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn with_rule(self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.lock().rules.push((needle.into(), reply.into()));
        self
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        self.lock().failure = Some(reason.into());
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    /// `(model_id, prompt)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.lock().calls.clone()
    }
}

impl ModelClient for ScriptedModel {
    fn invoke(&self, model_id: &str, prompt: &str) -> Result<String, AnalysisError> {
        let mut script = self.lock();
        script.calls.push((model_id.to_string(), prompt.to_string()));
        if let Some(reason) = &script.failure {
            return Err(AnalysisError::Model(reason.clone()));
        }
        let reply = script
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone());
        if reply.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        Ok(reply)
    }
}
