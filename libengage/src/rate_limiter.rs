//! Daily rate limiting for engagement actions
//!
//! Pure counting and decision logic. Counters are keyed by calendar day and
//! zeroed whenever the day they were counted for is not today.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngageError, Result};
use crate::types::{ActionKind, ActionRecord};

/// Configured maximum per action kind per calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCaps {
    pub follow: u32,
    pub like: u32,
    pub comment: u32,
}

impl DailyCaps {
    pub fn new(follow: u32, like: u32, comment: u32) -> Self {
        Self {
            follow,
            like,
            comment,
        }
    }

    pub fn get(&self, kind: ActionKind) -> u32 {
        match kind {
            ActionKind::Follow => self.follow,
            ActionKind::Like => self.like,
            ActionKind::Comment => self.comment,
        }
    }
}

/// Count of successful actions per kind for one day.
///
/// This is a cache over the session's action log; `from_records` rebuilds it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyCounters(BTreeMap<ActionKind, u32>);

impl DailyCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay successful records into counters
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ActionRecord>) -> Self {
        let mut counters = Self::new();
        for record in records.into_iter().filter(|r| r.is_success()) {
            counters.increment(record.kind);
        }
        counters
    }

    pub fn get(&self, kind: ActionKind) -> u32 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    fn increment(&mut self, kind: ActionKind) {
        *self.0.entry(kind).or_insert(0) += 1;
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, u32)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

/// Rate limiter for daily engagement caps
#[derive(Debug, Clone)]
pub struct RateLimiter {
    caps: DailyCaps,
    counters: DailyCounters,
    /// Day the counters were accumulated on
    as_of: NaiveDate,
}

impl RateLimiter {
    /// Create a new rate limiter with zeroed counters
    pub fn new(caps: DailyCaps, today: NaiveDate) -> Self {
        Self::with_counters(caps, DailyCounters::new(), today)
    }

    /// Restore a rate limiter from previously counted values
    pub fn with_counters(caps: DailyCaps, counters: DailyCounters, as_of: NaiveDate) -> Self {
        Self {
            caps,
            counters,
            as_of,
        }
    }

    /// Zero all counters if they were counted on a different day.
    ///
    /// Returns true if a rollover happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.as_of == today {
            return false;
        }
        self.counters.clear();
        self.as_of = today;
        true
    }

    /// Check if another action of this kind is allowed today (without recording)
    pub fn may_perform(&mut self, kind: ActionKind, today: NaiveDate) -> bool {
        self.roll_over(today);
        self.counters.get(kind) < self.caps.get(kind)
    }

    /// Record a performed action
    ///
    /// Fails with `LimitExceeded` if `may_perform` would have returned false.
    pub fn record(&mut self, kind: ActionKind, today: NaiveDate) -> Result<()> {
        if !self.may_perform(kind, today) {
            return Err(EngageError::LimitExceeded { kind });
        }
        self.counters.increment(kind);
        Ok(())
    }

    /// Remaining allowance for a kind today
    pub fn remaining(&mut self, kind: ActionKind, today: NaiveDate) -> u32 {
        self.roll_over(today);
        self.caps.get(kind).saturating_sub(self.counters.get(kind))
    }

    /// True when none of the given kinds may be performed today
    pub fn is_exhausted(&mut self, kinds: &[ActionKind], today: NaiveDate) -> bool {
        kinds.iter().all(|kind| !self.may_perform(*kind, today))
    }

    pub fn counters(&self) -> &DailyCounters {
        &self.counters
    }

    pub fn caps(&self) -> DailyCaps {
        self.caps
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }
}
