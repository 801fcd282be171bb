//! `digestflow-schedule`
//!
//! **Responsibility:** the time-based trigger of the pipeline.
//!
//! - Cadences are cron expressions evaluated in UTC only.
//! - Local-time intents are converted to UTC when the descriptor is authored
//!   ([`timezone::to_utc`]); the scheduler itself never sees a timezone.
//! - The scheduler only decides *when* a target fires. It never learns
//!   whether the invocation succeeded.

pub mod cadence;
pub mod error;
pub mod rule;
pub mod scheduler;
pub mod timezone;

pub use cadence::{Cadence, CronSpec};
pub use error::ScheduleError;
pub use rule::ScheduleRule;
pub use scheduler::{
    AlwaysAvailable, Availability, Firing, MissedTick, OutageWindows, Scheduler, SchedulerPass,
    TRIGGER_SOURCE, TriggerEvent,
};
pub use timezone::{Conversion, LocalTrigger, local_time, to_utc};
