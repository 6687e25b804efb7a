// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Logged workout model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single logged workout with photo proof.
///
/// Immutable after creation except for late photo hydration: the binary
/// photo arrives locally at capture time but remote change projections carry
/// no asset bytes, so a merge must not clobber `photo_data` that has not been
/// re-fetched yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pair_id: Uuid,
    pub weekly_goal_id: Uuid,
    /// Photo bytes when held locally (capture side, or hydrated from remote)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_data: Option<Vec<u8>>,
    /// Remote record carrying the photo asset, for lazy fetch
    pub photo_record_id: Option<String>,
    pub caption: Option<String>,
    /// True capture timestamp
    pub logged_at: DateTime<Utc>,
    /// Effective calendar day the workout counts toward (3AM rule applied)
    pub workout_date: NaiveDate,
}
