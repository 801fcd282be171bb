//! Fixed-clock ticker.
//!
//! The scheduler keeps a cursor per rule. Each [`Scheduler::advance_to`] call
//! emits one firing per target for every tick in `(cursor, now]` and moves the
//! cursor to `now`. Ticks that fall inside a platform outage are reported as
//! missed and never replayed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cadence::Cadence;
use crate::error::ScheduleError;
use crate::rule::ScheduleRule;

pub const TRIGGER_SOURCE: &str = "digestflow.scheduler";
pub const TRIGGER_DETAIL_TYPE: &str = "Scheduled Event";

/// Generic trigger payload. Carries timing metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub source: String,
    pub detail_type: String,
    pub rule: String,
    pub scheduled_at: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn scheduled(rule: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            source: TRIGGER_SOURCE.to_string(),
            detail_type: TRIGGER_DETAIL_TYPE.to_string(),
            rule: rule.into(),
            scheduled_at,
        }
    }
}

/// Whether the platform could deliver a trigger at a given instant.
pub trait Availability {
    fn is_available(&self, at: &DateTime<Utc>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl Availability for AlwaysAvailable {
    fn is_available(&self, _at: &DateTime<Utc>) -> bool {
        true
    }
}

/// Half-open `[start, end)` windows during which the platform is down.
#[derive(Debug, Clone, Default)]
pub struct OutageWindows {
    windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl OutageWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.add(start, end);
        self
    }

    pub fn add(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        if start < end {
            self.windows.push((start, end));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Availability for OutageWindows {
    fn is_available(&self, at: &DateTime<Utc>) -> bool {
        !self
            .windows
            .iter()
            .any(|(start, end)| start <= at && at < end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    pub target: String,
    pub event: TriggerEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedTick {
    pub rule: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Outcome of one [`Scheduler::advance_to`] call, ordered by tick time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerPass {
    pub firings: Vec<Firing>,
    pub missed: Vec<MissedTick>,
}

impl SchedulerPass {
    pub fn is_empty(&self) -> bool {
        self.firings.is_empty() && self.missed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Registered {
    rule: ScheduleRule,
    cadence: Cadence,
    cursor: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    rules: BTreeMap<String, Registered>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Ticks at or before `now` are never fired.
    pub fn add_rule(&mut self, rule: ScheduleRule, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        if self.rules.contains_key(&rule.name) {
            return Err(ScheduleError::DuplicateRule(rule.name));
        }
        self.upsert_rule(rule, now)
    }

    /// Register or replace a rule, keeping the cursor of an existing one.
    pub fn upsert_rule(&mut self, rule: ScheduleRule, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let cadence = rule.validate()?;
        let cursor = self
            .rules
            .get(&rule.name)
            .map(|r| r.cursor)
            .unwrap_or(now);
        debug!(rule = %rule.name, cadence = %rule.spec, "schedule rule registered");
        self.rules.insert(
            rule.name.clone(),
            Registered {
                rule,
                cadence,
                cursor,
            },
        );
        Ok(())
    }

    pub fn remove_rule(&mut self, name: &str) -> Result<ScheduleRule, ScheduleError> {
        self.rules
            .remove(name)
            .map(|r| r.rule)
            .ok_or_else(|| ScheduleError::RuleNotFound(name.to_string()))
    }

    pub fn rule(&self, name: &str) -> Option<&ScheduleRule> {
        self.rules.get(name).map(|r| &r.rule)
    }

    pub fn rules(&self) -> impl Iterator<Item = &ScheduleRule> {
        self.rules.values().map(|r| &r.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Next tick of an enabled rule after its cursor.
    pub fn next_fire(&self, name: &str) -> Option<DateTime<Utc>> {
        let registered = self.rules.get(name)?;
        if !registered.rule.enabled {
            return None;
        }
        registered.cadence.next_after(&registered.cursor)
    }

    /// Earliest next tick across all enabled rules.
    pub fn next_fire_any(&self) -> Option<DateTime<Utc>> {
        self.rules.keys().filter_map(|name| self.next_fire(name)).min()
    }

    pub fn advance_to(&mut self, now: DateTime<Utc>, availability: &dyn Availability) -> SchedulerPass {
        let mut pass = SchedulerPass::default();

        for registered in self.rules.values_mut() {
            if now <= registered.cursor {
                continue;
            }
            let ticks = registered.cadence.ticks_between(&registered.cursor, &now);
            registered.cursor = now;

            if !registered.rule.enabled {
                if !ticks.is_empty() {
                    debug!(rule = %registered.rule.name, skipped = ticks.len(), "rule disabled");
                }
                continue;
            }

            for tick in ticks {
                if !availability.is_available(&tick) {
                    warn!(rule = %registered.rule.name, scheduled_at = %tick, "tick missed: platform unavailable");
                    pass.missed.push(MissedTick {
                        rule: registered.rule.name.clone(),
                        scheduled_at: tick,
                    });
                    continue;
                }
                for target in &registered.rule.targets {
                    pass.firings.push(Firing {
                        target: target.clone(),
                        event: TriggerEvent::scheduled(registered.rule.name.clone(), tick),
                    });
                }
            }
        }

        pass.firings
            .sort_by(|a, b| a.event.scheduled_at.cmp(&b.event.scheduled_at));
        pass.missed.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        pass
    }
}
