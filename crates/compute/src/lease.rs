//! Per-unit run lease.
//!
//! A unit whose previous run is still inside its execution bound rejects the
//! next invocation. A lease expires at the holder's deadline, except when the
//! run was abandoned on timeout: its worker thread may still be calling out,
//! so the lease is held until that worker exits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digestflow_core::RunId;

use crate::error::InvocationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// One run per unit at a time.
    #[default]
    Exclusive,
    /// Overlapping runs proceed independently.
    Allow,
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    run_id: RunId,
    expires_at: DateTime<Utc>,
    abandoned: bool,
}

impl Lease {
    fn live_at(&self, now: DateTime<Utc>) -> bool {
        self.abandoned || self.expires_at > now
    }
}

#[derive(Debug, Default)]
pub struct RunLeases {
    held: Mutex<HashMap<String, Lease>>,
}

impl RunLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Lease>> {
        self.held.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn acquire(
        &self,
        unit: &str,
        run_id: RunId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), InvocationError> {
        let mut held = self.lock();
        if let Some(lease) = held.get(unit) {
            if lease.live_at(now) && lease.run_id != run_id {
                return Err(InvocationError::Overlapping {
                    unit: unit.to_string(),
                    holder: lease.run_id,
                });
            }
        }
        held.insert(
            unit.to_string(),
            Lease {
                run_id,
                expires_at,
                abandoned: false,
            },
        );
        Ok(())
    }

    /// Keep `unit` held past its deadline until `run_id` releases it.
    /// Returns false if `run_id` no longer holds the lease.
    pub fn abandon(&self, unit: &str, run_id: RunId) -> bool {
        let mut held = self.lock();
        match held.get_mut(unit) {
            Some(lease) if lease.run_id == run_id => {
                lease.abandoned = true;
                true
            }
            _ => false,
        }
    }

    /// Release `unit` if `run_id` still holds it.
    pub fn release(&self, unit: &str, run_id: RunId) -> bool {
        let mut held = self.lock();
        match held.get(unit) {
            Some(lease) if lease.run_id == run_id => {
                held.remove(unit);
                true
            }
            _ => false,
        }
    }

    pub fn holder(&self, unit: &str, now: DateTime<Utc>) -> Option<RunId> {
        self.lock()
            .get(unit)
            .filter(|lease| lease.live_at(now))
            .map(|lease| lease.run_id)
    }
}

/// Releases a held lease when dropped, including on unwind.
#[derive(Debug)]
pub struct LeaseGuard {
    leases: Arc<RunLeases>,
    unit: String,
    run_id: RunId,
}

impl LeaseGuard {
    pub fn new(leases: Arc<RunLeases>, unit: impl Into<String>, run_id: RunId) -> Self {
        Self {
            leases,
            unit: unit.into(),
            run_id,
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.leases.release(&self.unit, self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 18, 0, 0).unwrap()
    }

    #[test]
    fn second_run_inside_the_bound_is_rejected() {
        let leases = RunLeases::new();
        let first = RunId::new();
        leases.acquire("fn", first, t0(), t0() + Duration::minutes(15)).unwrap();

        let err = leases
            .acquire("fn", RunId::new(), t0() + Duration::minutes(1), t0() + Duration::minutes(16))
            .unwrap_err();
        assert_eq!(
            err,
            InvocationError::Overlapping {
                unit: "fn".to_string(),
                holder: first
            }
        );
    }

    #[test]
    fn expired_lease_is_taken_over() {
        let leases = RunLeases::new();
        leases.acquire("fn", RunId::new(), t0(), t0() + Duration::minutes(15)).unwrap();

        let later = t0() + Duration::minutes(15);
        let next = RunId::new();
        leases.acquire("fn", next, later, later + Duration::minutes(15)).unwrap();
        assert_eq!(leases.holder("fn", later), Some(next));
    }

    #[test]
    fn release_only_by_holder() {
        let leases = RunLeases::new();
        let run = RunId::new();
        leases.acquire("fn", run, t0(), t0() + Duration::minutes(15)).unwrap();

        assert!(!leases.release("fn", RunId::new()));
        assert!(leases.release("fn", run));
        assert_eq!(leases.holder("fn", t0()), None);
    }

    #[test]
    fn abandoned_lease_outlives_its_deadline() {
        let leases = Arc::new(RunLeases::new());
        let run = RunId::new();
        leases.acquire("fn", run, t0(), t0() + Duration::minutes(15)).unwrap();
        let guard = LeaseGuard::new(leases.clone(), "fn", run);
        assert!(leases.abandon("fn", run));

        let next_day = t0() + Duration::days(1);
        assert_eq!(leases.holder("fn", next_day), Some(run));
        assert!(
            leases
                .acquire("fn", RunId::new(), next_day, next_day + Duration::minutes(15))
                .is_err()
        );

        drop(guard);
        assert_eq!(leases.holder("fn", next_day), None);
        assert!(!leases.abandon("fn", run));
    }

    #[test]
    fn units_are_independent() {
        let leases = RunLeases::new();
        leases.acquire("a", RunId::new(), t0(), t0() + Duration::minutes(15)).unwrap();
        assert!(leases.acquire("b", RunId::new(), t0(), t0() + Duration::minutes(15)).is_ok());
    }
}
