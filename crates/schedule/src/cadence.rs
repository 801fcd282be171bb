//! Cron cadences.
//!
//! Expressions use the six-field platform form
//! `minute hour day-of-month month day-of-week year`, where exactly one of
//! day-of-month and day-of-week is `?`. Evaluation is delegated to the `cron`
//! crate after translating to its seconds-first form.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Authored cadence, one string per field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CronSpec {
    pub minute: String,
    pub hour: String,
    pub day: String,
    pub month: String,
    pub week_day: String,
    pub year: String,
}

impl Default for CronSpec {
    fn default() -> Self {
        Self {
            minute: "*".to_string(),
            hour: "*".to_string(),
            day: "*".to_string(),
            month: "*".to_string(),
            week_day: "?".to_string(),
            year: "*".to_string(),
        }
    }
}

impl CronSpec {
    /// Every day at `hour:minute` UTC.
    pub fn daily_at(hour: u32, minute: u32) -> Self {
        Self {
            minute: minute.to_string(),
            hour: hour.to_string(),
            ..Self::default()
        }
    }

    /// Parse `cron(m h dom mon dow y)` or the bare six fields.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        let inner = trimmed
            .strip_prefix("cron(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(trimmed);

        let fields: Vec<&str> = inner.split_whitespace().collect();
        let [minute, hour, day, month, week_day, year] = fields.as_slice() else {
            return Err(ScheduleError::invalid(
                expr,
                format!("expected 6 fields, found {}", fields.len()),
            ));
        };

        Ok(Self {
            minute: minute.to_string(),
            hour: hour.to_string(),
            day: day.to_string(),
            month: month.to_string(),
            week_day: week_day.to_string(),
            year: year.to_string(),
        })
    }

    /// Platform rendering, e.g. `cron(0 18 * * ? *)`.
    pub fn expression(&self) -> String {
        format!(
            "cron({} {} {} {} {} {})",
            self.minute, self.hour, self.day, self.month, self.week_day, self.year
        )
    }

    /// Validate and compile.
    pub fn compile(&self) -> Result<Cadence, ScheduleError> {
        Cadence::compile(self)
    }

    fn engine_expression(&self) -> String {
        let any = |f: &str| if f == "?" { "*".to_string() } else { f.to_string() };
        format!(
            "0 {} {} {} {} {} {}",
            self.minute,
            self.hour,
            any(&self.day),
            self.month,
            any(&self.week_day),
            self.year
        )
    }
}

impl core::fmt::Display for CronSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.expression())
    }
}

/// A validated cadence that can enumerate its ticks.
#[derive(Debug, Clone)]
pub struct Cadence {
    spec: CronSpec,
    schedule: cron::Schedule,
}

impl Cadence {
    pub fn compile(spec: &CronSpec) -> Result<Self, ScheduleError> {
        let expr = spec.expression();

        for (name, value) in [
            ("minute", &spec.minute),
            ("hour", &spec.hour),
            ("month", &spec.month),
            ("year", &spec.year),
        ] {
            if value.trim().is_empty() || value.contains('?') {
                return Err(ScheduleError::invalid(
                    &expr,
                    format!("field '{name}' must not be empty or '?'"),
                ));
            }
        }

        match (spec.day.as_str(), spec.week_day.as_str()) {
            ("?", "?") => {
                return Err(ScheduleError::invalid(
                    &expr,
                    "one of day and week_day must be set",
                ));
            }
            (day, week_day) if day != "?" && week_day != "?" => {
                return Err(ScheduleError::invalid(
                    &expr,
                    "cannot supply both day and week_day; use '?' in one of them",
                ));
            }
            _ => {}
        }

        let schedule = cron::Schedule::from_str(&spec.engine_expression())
            .map_err(|e| ScheduleError::invalid(&expr, e.to_string()))?;

        Ok(Self {
            spec: spec.clone(),
            schedule,
        })
    }

    pub fn spec(&self) -> &CronSpec {
        &self.spec
    }

    /// First tick strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }

    /// Ticks in `(after, until]`.
    pub fn ticks_between(&self, after: &DateTime<Utc>, until: &DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(after)
            .take_while(|t| t <= until)
            .collect()
    }

    /// Whether `at` is exactly a tick instant.
    pub fn fires_at(&self, at: &DateTime<Utc>) -> bool {
        self.next_after(&(*at - Duration::seconds(1))) == Some(*at)
    }
}
