use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digestflow_compute::SecretString;

use crate::error::AnalysisError;

/// Page size asked of the channel per run.
pub const HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<String>,
    /// Absent for joins, file shares and similar non-text events.
    #[serde(default)]
    pub text: Option<String>,
}

impl ChannelMessage {
    pub fn text(ts: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            ts,
            user: None,
            text: Some(text.into()),
        }
    }

    pub fn event(ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            user: None,
            text: None,
        }
    }
}

/// Read access to a channel's history.
pub trait ChannelReader: Send + Sync + Debug {
    /// Messages with `oldest <= ts <= latest`, newest first, at most `limit`.
    fn history(
        &self,
        token: &SecretString,
        channel_id: &str,
        oldest: DateTime<Utc>,
        latest: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>, AnalysisError>;
}

#[derive(Debug, Default)]
struct ChannelState {
    messages: HashMap<String, Vec<ChannelMessage>>,
    outage: Option<String>,
}

/// In-memory channel history.
#[derive(Debug)]
pub struct StaticChannel {
    token: SecretString,
    state: Mutex<ChannelState>,
}

impl StaticChannel {
    /// A channel that only accepts `token`.
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
            state: Mutex::new(ChannelState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn post(&self, channel_id: &str, message: ChannelMessage) {
        self.lock()
            .messages
            .entry(channel_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn with_message(self, channel_id: &str, message: ChannelMessage) -> Self {
        self.post(channel_id, message);
        self
    }

    /// Make every read fail until [`StaticChannel::recover`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.lock().outage = Some(reason.into());
    }

    pub fn recover(&self) {
        self.lock().outage = None;
    }
}

impl ChannelReader for StaticChannel {
    fn history(
        &self,
        token: &SecretString,
        channel_id: &str,
        oldest: DateTime<Utc>,
        latest: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>, AnalysisError> {
        if token.expose() != self.token.expose() {
            return Err(AnalysisError::Unauthorized);
        }
        let state = self.lock();
        if let Some(reason) = &state.outage {
            return Err(AnalysisError::Channel(reason.clone()));
        }
        let mut found: Vec<ChannelMessage> = state
            .messages
            .get(channel_id)
            .map(|all| {
                all.iter()
                    .filter(|m| oldest <= m.ts && m.ts <= latest)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| b.ts.cmp(&a.ts));
        found.truncate(limit);
        Ok(found)
    }
}
