//! Push decision: whether a reading is different enough from what is already
//! stored to be worth persisting.
//!
//! Readings are coalesced while they stay within the deviation thresholds, but
//! a station is always written at least once per `push_delay` seconds.

use stratus::Reading;

use crate::{
    config::Ingest,
    store::{self, EntityStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// nothing is stored for this station yet
    ColdStart,
    /// the newest stored reading is older than the push delay
    BudgetElapsed,
    /// a measurement moved by more than its threshold
    Deviation,
    /// close enough to the newest stored reading, drop it
    Coalesce,
}

impl Decision {
    pub fn push(self) -> bool {
        !matches!(self, Self::Coalesce)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushPolicy {
    /// seconds
    pub push_delay: i64,
    pub temperature_deviation: f32,
    pub humidity_deviation: f32,
    pub pressure_deviation: f32,
}

impl Default for PushPolicy {
    fn default() -> Self {
        Self::from(&Ingest::default())
    }
}

impl From<&Ingest> for PushPolicy {
    fn from(cfg: &Ingest) -> Self {
        Self {
            push_delay: cfg.push_delay,
            temperature_deviation: cfg.temperature_deviation,
            humidity_deviation: cfg.humidity_deviation,
            pressure_deviation: cfg.pressure_deviation,
        }
    }
}

impl PushPolicy {
    /// `last` is the most recently *stored* reading, whatever the candidate's
    /// own timestamp is, and the elapsed time is measured from it to `now`.
    pub fn decide(&self, last: Option<&Reading>, candidate: &Reading, now: i64) -> Decision {
        let Some(last) = last else {
            return Decision::ColdStart;
        };
        if (now - last.timestamp).abs() > self.push_delay {
            return Decision::BudgetElapsed;
        }
        if (last.temperature - candidate.temperature).abs() > self.temperature_deviation
            || (last.pressure - candidate.pressure).abs() > self.pressure_deviation
            || (last.humidity - candidate.humidity).abs() > self.humidity_deviation
        {
            Decision::Deviation
        } else {
            Decision::Coalesce
        }
    }
}

/// [`PushPolicy`] applied against the entity store.
#[derive(Clone)]
pub struct PushEngine {
    store: EntityStore,
    policy: PushPolicy,
}

impl PushEngine {
    pub fn new(store: EntityStore, policy: PushPolicy) -> Self {
        Self { store, policy }
    }

    pub fn should_push(&self, candidate: &Reading, now: i64) -> store::Result<Decision> {
        let last = self.store.last_reading(candidate.station)?;
        Ok(self.policy.decide(last.as_ref(), candidate, now))
    }
}

#[cfg(test)]
mod test {
    use stratus::Reading;

    use super::{Decision, PushEngine, PushPolicy};
    use crate::store::EntityStore;

    fn reading(timestamp: i64, temperature: f32, humidity: f32, pressure: f32) -> Reading {
        Reading {
            station: 1,
            timestamp,
            temperature,
            humidity,
            pressure,
        }
    }

    #[test]
    fn budget_and_deviation() {
        let policy = PushPolicy::default();
        assert_eq!(policy.push_delay, 60);
        let last = reading(1000, 20.0, 50.0, 101_300.0);

        let same_later = reading(1070, 20.0, 50.0, 101_300.0);
        assert_eq!(
            policy.decide(Some(&last), &same_later, 1070),
            Decision::BudgetElapsed
        );

        let small_change = reading(1010, 20.1, 50.0, 101_300.0);
        assert_eq!(
            policy.decide(Some(&last), &small_change, 1010),
            Decision::Coalesce
        );
        assert!(!Decision::Coalesce.push());

        let warmer = reading(1010, 20.6, 50.0, 101_300.0);
        assert_eq!(policy.decide(Some(&last), &warmer, 1010), Decision::Deviation);
    }

    #[test]
    fn each_threshold() {
        let policy = PushPolicy::default();
        let last = reading(1000, 20.0, 50.0, 101_300.0);
        let at = |c: Reading| policy.decide(Some(&last), &c, 1000);
        assert_eq!(at(reading(1000, 20.0, 52.5, 101_300.0)), Decision::Deviation);
        assert_eq!(at(reading(1000, 20.0, 51.5, 101_300.0)), Decision::Coalesce);
        assert_eq!(at(reading(1000, 20.0, 50.0, 101_450.0)), Decision::Deviation);
        assert_eq!(at(reading(1000, 20.0, 50.0, 101_350.0)), Decision::Coalesce);
        // exactly at the budget is still within it
        assert_eq!(
            policy.decide(Some(&last), &last, 1060),
            Decision::Coalesce
        );
        // a stored reading from the future counts the same as one from the past
        assert_eq!(
            policy.decide(Some(&last), &last, 900),
            Decision::BudgetElapsed
        );
    }

    #[test]
    fn cold_start_always_pushes() {
        let policy = PushPolicy::default();
        let candidate = reading(5, 20.0, 50.0, 0.0);
        assert_eq!(policy.decide(None, &candidate, 5), Decision::ColdStart);
        assert!(Decision::ColdStart.push());
    }

    #[test]
    fn engine_uses_newest_stored_row() {
        let store = EntityStore::open_in_memory().unwrap();
        store.ensure_station(1, "").unwrap();
        let engine = PushEngine::new(store.clone(), PushPolicy::default());
        assert_eq!(
            engine.should_push(&reading(1000, 20.0, 50.0, 0.0), 1000).unwrap(),
            Decision::ColdStart
        );

        store.write_reading(&reading(1000, 20.0, 50.0, 0.0)).unwrap();
        store.write_reading(&reading(400, 30.0, 50.0, 0.0)).unwrap();
        // a backfilled candidate is compared to the newest row (ts 1000), not to its neighbour
        let backfill = reading(410, 20.2, 50.0, 0.0);
        assert_eq!(
            engine.should_push(&backfill, 1010).unwrap(),
            Decision::Coalesce
        );
    }
}
