//! Aggregate statistics over a session's action log

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::types::{ActionKind, ActionRecord, ErrorCategory, Outcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl KindStats {
    fn add(&mut self, outcome: Outcome) {
        self.attempted += 1;
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Failure => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub date: NaiveDate,
    pub per_kind: BTreeMap<ActionKind, KindStats>,
    pub total: KindStats,
    /// Successes over decided actions (success + failure); skips are neutral
    pub success_rate: f64,
    /// Failures and degradations by category
    pub error_categories: BTreeMap<ErrorCategory, u32>,
    pub unique_targets: usize,
}

impl RunStats {
    pub fn from_records<'a>(
        date: NaiveDate,
        records: impl IntoIterator<Item = &'a ActionRecord>,
    ) -> Self {
        let mut per_kind: BTreeMap<ActionKind, KindStats> = BTreeMap::new();
        let mut total = KindStats::default();
        let mut error_categories = BTreeMap::new();
        let mut targets = HashSet::new();

        for record in records {
            per_kind.entry(record.kind).or_default().add(record.outcome);
            total.add(record.outcome);
            targets.insert(record.target_id.as_str());

            for error in record.error.iter().chain(record.degradation.iter()) {
                *error_categories.entry(error.category).or_insert(0) += 1;
            }
        }

        let decided = total.succeeded + total.failed;
        let success_rate = if decided == 0 {
            0.0
        } else {
            f64::from(total.succeeded) / f64::from(decided)
        };

        Self {
            date,
            per_kind,
            total,
            success_rate,
            error_categories,
            unique_targets: targets.len(),
        }
    }

    pub fn kind(&self, kind: ActionKind) -> KindStats {
        self.per_kind.get(&kind).copied().unwrap_or_default()
    }

    pub fn category_count(&self, category: ErrorCategory) -> u32 {
        self.error_categories.get(&category).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Session {}: {} action(s) on {} target(s)",
            self.date, self.total.attempted, self.unique_targets
        )?;
        for kind in ActionKind::ALL {
            let s = self.kind(kind);
            writeln!(
                f,
                "  {:<8} succeeded {:>4}  failed {:>4}  skipped {:>4}",
                kind, s.succeeded, s.failed, s.skipped
            )?;
        }
        writeln!(f, "  success rate {:.1}%", self.success_rate * 100.0)?;
        if self.error_categories.is_empty() {
            write!(f, "  errors: none")
        } else {
            let errors: Vec<String> = self
                .error_categories
                .iter()
                .map(|(category, count)| format!("{} {}", category, count))
                .collect();
            write!(f, "  errors: {}", errors.join(", "))
        }
    }
}
