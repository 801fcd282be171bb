//! Authoring-time conversion of local trigger times to UTC cadences.
//!
//! The conversion uses one fixed UTC offset. For zones that observe daylight
//! saving the resulting cadence is off by the DST delta for part of the year;
//! that is reported as a warning and left to the author.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cadence::CronSpec;
use crate::error::ScheduleError;

const MINUTES_PER_DAY: i32 = 24 * 60;
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// "Fire at `hour:minute` local time" in a zone with a fixed offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrigger {
    pub hour: u32,
    pub minute: u32,
    /// Offset east of UTC, e.g. `540` for UTC+9.
    pub utc_offset_minutes: i32,
    /// Display label only (`"Asia/Tokyo"`); never used for arithmetic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Whether the local zone shifts its offset seasonally.
    #[serde(default)]
    pub observes_dst: bool,
    /// Restrict to local weekdays (1 = Sunday .. 7 = Saturday); `None` = every day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_days: Option<Vec<u8>>,
}

impl LocalTrigger {
    pub fn daily(hour: u32, minute: u32, utc_offset_minutes: i32) -> Self {
        Self {
            hour,
            minute,
            utc_offset_minutes,
            zone: None,
            observes_dst: false,
            week_days: None,
        }
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_dst(mut self) -> Self {
        self.observes_dst = true;
        self
    }

    pub fn on_week_days(mut self, days: Vec<u8>) -> Self {
        self.week_days = Some(days);
        self
    }

    pub fn offset(&self) -> Result<FixedOffset, ScheduleError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ScheduleError::InvalidLocalTime(format!(
                "offset {} minutes is not representable",
                self.utc_offset_minutes
            ))
        })
    }
}

/// Result of converting a [`LocalTrigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub spec: CronSpec,
    /// Calendar-day shift from local to UTC (-1, 0 or +1).
    pub day_shift: i32,
    pub warnings: Vec<String>,
}

/// Convert a local trigger to a UTC cadence.
pub fn to_utc(trigger: &LocalTrigger) -> Result<Conversion, ScheduleError> {
    if trigger.hour > 23 || trigger.minute > 59 {
        return Err(ScheduleError::InvalidLocalTime(format!(
            "{:02}:{:02} is not a time of day",
            trigger.hour, trigger.minute
        )));
    }
    if trigger.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
        return Err(ScheduleError::InvalidLocalTime(format!(
            "offset {} minutes exceeds ±14h",
            trigger.utc_offset_minutes
        )));
    }

    // Both bounds checked above, so the casts cannot truncate.
    let local = (trigger.hour * 60 + trigger.minute) as i32;
    let utc = local - trigger.utc_offset_minutes;
    let day_shift = utc.div_euclid(MINUTES_PER_DAY);
    let utc = utc.rem_euclid(MINUTES_PER_DAY);

    let week_day = match &trigger.week_days {
        None => "?".to_string(),
        Some(days) if days.is_empty() => {
            return Err(ScheduleError::InvalidLocalTime(
                "week_days must not be empty".to_string(),
            ));
        }
        Some(days) => {
            let mut shifted = Vec::with_capacity(days.len());
            for &d in days {
                if !(1..=7).contains(&d) {
                    return Err(ScheduleError::InvalidLocalTime(format!(
                        "weekday {d} is outside 1..=7"
                    )));
                }
                shifted.push((i32::from(d) - 1 + day_shift).rem_euclid(7) + 1);
            }
            shifted.sort_unstable();
            shifted.dedup();
            shifted
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    let spec = CronSpec {
        minute: (utc % 60).to_string(),
        hour: (utc / 60).to_string(),
        day: if week_day == "?" { "*".to_string() } else { "?".to_string() },
        week_day,
        ..CronSpec::default()
    };

    let mut warnings = Vec::new();
    if trigger.observes_dst {
        let zone = trigger.zone.as_deref().unwrap_or("the local zone");
        let msg = format!(
            "{zone} observes daylight saving; {} fires one hour off local {:02}:{:02} for part of the year",
            spec.expression(),
            trigger.hour,
            trigger.minute
        );
        warn!(zone, cadence = %spec, "fixed-offset conversion drifts under daylight saving");
        warnings.push(msg);
    }

    Ok(Conversion {
        spec,
        day_shift,
        warnings,
    })
}

/// Render a UTC tick in the trigger's local frame.
pub fn local_time(tick: &DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    tick.with_timezone(&offset)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Timelike};
    use proptest::prelude::*;

    use super::*;

    const UTC_PLUS_9: i32 = 9 * 60;

    #[test]
    fn three_am_utc_plus_nine_is_eighteen_utc_previous_day() {
        let conv = to_utc(&LocalTrigger::daily(3, 0, UTC_PLUS_9)).unwrap();
        assert_eq!(conv.spec, CronSpec::daily_at(18, 0));
        assert_eq!(conv.day_shift, -1);
        assert!(conv.warnings.is_empty());
    }

    #[test]
    fn eighteen_utc_fires_at_three_local_on_the_next_utc_day() {
        // January: no daylight-saving transition in either zone.
        let cadence = CronSpec::daily_at(18, 0).compile().unwrap();
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let tick = cadence.next_after(&start).unwrap();

        assert_eq!(tick, Utc.with_ymd_and_hms(2025, 1, 15, 18, 0, 0).unwrap());

        let offset = FixedOffset::east_opt(UTC_PLUS_9 * 60).unwrap();
        let local = local_time(&tick, offset);
        assert_eq!((local.hour(), local.minute()), (3, 0));
        assert_eq!((local.year(), local.month(), local.day()), (2025, 1, 16));
    }

    #[test]
    fn negative_offsets_shift_forward() {
        // 22:30 at UTC-5 is 03:30 UTC the next day.
        let conv = to_utc(&LocalTrigger::daily(22, 30, -5 * 60)).unwrap();
        assert_eq!(conv.spec.hour, "3");
        assert_eq!(conv.spec.minute, "30");
        assert_eq!(conv.day_shift, 1);
    }

    #[test]
    fn weekdays_shift_with_the_day() {
        // Monday (2) 03:00 UTC+9 is Sunday (1) 18:00 UTC; Sunday wraps to Saturday.
        let conv = to_utc(&LocalTrigger::daily(3, 0, UTC_PLUS_9).on_week_days(vec![2, 1])).unwrap();
        assert_eq!(conv.spec.week_day, "1,7");
        assert_eq!(conv.spec.day, "?");
    }

    #[test]
    fn dst_zones_carry_a_warning() {
        let trigger = LocalTrigger::daily(3, 0, 60).in_zone("Europe/Berlin").with_dst();
        let conv = to_utc(&trigger).unwrap();
        assert_eq!(conv.warnings.len(), 1);
        assert!(conv.warnings[0].contains("Europe/Berlin"));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(to_utc(&LocalTrigger::daily(24, 0, 0)).is_err());
        assert!(to_utc(&LocalTrigger::daily(3, 60, 0)).is_err());
        assert!(to_utc(&LocalTrigger::daily(3, 0, 15 * 60)).is_err());
        assert!(to_utc(&LocalTrigger::daily(3, 0, 0).on_week_days(vec![8])).is_err());
        assert!(to_utc(&LocalTrigger::daily(3, 0, 0).on_week_days(vec![])).is_err());
    }

    proptest! {
        #[test]
        fn converted_cadence_fires_at_the_local_time(
            hour in 0u32..24,
            minute in 0u32..60,
            offset_quarters in -48i32..=56,
            day_offset in 0i64..365,
        ) {
            let offset_minutes = offset_quarters * 15;
            let conv = to_utc(&LocalTrigger::daily(hour, minute, offset_minutes)).unwrap();
            let cadence = conv.spec.compile().unwrap();

            let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::days(day_offset);
            let tick = cadence.next_after(&start).unwrap();
            let local = local_time(&tick, FixedOffset::east_opt(offset_minutes * 60).unwrap());

            prop_assert_eq!((local.hour(), local.minute()), (hour, minute));
        }
    }
}
