//! Weekly goal model and settlement outcome.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a settled week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekResult {
    BothHit,
    AOwes,
    BOwes,
    BothMissed,
}

impl WeekResult {
    /// Settlement truth table over whether each side hit their goal.
    ///
    /// The side that missed owes the wager; when both miss, nobody collects.
    pub fn evaluate(hit_a: bool, hit_b: bool) -> Self {
        match (hit_a, hit_b) {
            (true, true) => WeekResult::BothHit,
            (false, true) => WeekResult::AOwes,
            (true, false) => WeekResult::BOwes,
            (false, false) => WeekResult::BothMissed,
        }
    }

    /// Wire name, stable across devices.
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekResult::BothHit => "both_hit",
            WeekResult::AOwes => "a_owes",
            WeekResult::BOwes => "b_owes",
            WeekResult::BothMissed => "both_missed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "both_hit" => Some(WeekResult::BothHit),
            "a_owes" => Some(WeekResult::AOwes),
            "b_owes" => Some(WeekResult::BOwes),
            "both_missed" => Some(WeekResult::BothMissed),
            _ => None,
        }
    }
}

/// One calendar week of the pact.
///
/// Exactly one goal per pair per calendar week; `week_start` is the natural
/// dedup key. `result` stays `None` while the week is open and is set exactly
/// once at close — never overwritten by a later sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyGoal {
    pub id: Uuid,
    pub pair_id: Uuid,
    /// Start-of-week calendar date (timezone-naive)
    pub week_start: NaiveDate,
    pub goal_user_a: u8,
    pub goal_user_b: u8,
    pub wager_text: String,
    pub result: Option<WeekResult>,
}

impl WeeklyGoal {
    pub fn is_open(&self) -> bool {
        self.result.is_none()
    }

    /// Deterministic remote record identifier for this pair/week.
    ///
    /// Two devices racing to create the same week collide on this id instead
    /// of minting duplicates.
    pub fn record_id(pair_id: Uuid, week_start: NaiveDate) -> String {
        format!("week_{}_{}", pair_id, week_start.format("%Y-%m-%d"))
    }
}
