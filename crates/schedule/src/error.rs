use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("invalid local trigger: {0}")]
    InvalidLocalTime(String),

    #[error("schedule rule '{0}' has no targets")]
    NoTargets(String),

    #[error("schedule rule already registered: {0}")]
    DuplicateRule(String),

    #[error("schedule rule not found: {0}")]
    RuleNotFound(String),
}

impl ScheduleError {
    pub(crate) fn invalid(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}
