use serde::{Deserialize, Serialize};

use crate::cadence::{Cadence, CronSpec};
use crate::error::ScheduleError;

/// A cadence plus the targets it invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub name: String,
    pub spec: CronSpec,
    pub targets: Vec<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl ScheduleRule {
    pub fn new(name: impl Into<String>, spec: CronSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            targets: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check the rule is deployable and compile its cadence.
    pub fn validate(&self) -> Result<Cadence, ScheduleError> {
        if self.name.trim().is_empty() {
            return Err(ScheduleError::invalid(
                self.spec.expression(),
                "rule name must not be empty",
            ));
        }
        if self.targets.is_empty() {
            return Err(ScheduleError::NoTargets(self.name.clone()));
        }
        self.spec.compile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_without_targets_is_rejected() {
        let rule = ScheduleRule::new("daily", CronSpec::daily_at(18, 0));
        assert_eq!(
            rule.validate().unwrap_err(),
            ScheduleError::NoTargets("daily".to_string())
        );
    }

    #[test]
    fn targets_are_deduplicated() {
        let rule = ScheduleRule::new("daily", CronSpec::daily_at(18, 0))
            .with_target("fn")
            .with_target("fn");
        assert_eq!(rule.targets, vec!["fn".to_string()]);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn malformed_cadence_fails_validation() {
        let rule = ScheduleRule::new("daily", CronSpec::daily_at(30, 0)).with_target("fn");
        assert!(matches!(
            rule.validate(),
            Err(ScheduleError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn enabled_defaults_to_true_when_deserialized() {
        let rule: ScheduleRule = serde_json::from_value(serde_json::json!({
            "name": "daily",
            "spec": { "minute": "0", "hour": "18" },
            "targets": ["fn"]
        }))
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.spec, CronSpec::daily_at(18, 0));
    }
}
