// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! The pair record shared by both partners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A two-member accountability pair. One exists per shared group zone.
///
/// User A is defined as whoever created the pair (the owner); this fixes
/// which goal slot and wager-ower attribution each profile maps to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    pub id: Uuid,
    /// Member who created the pair (owner)
    pub user_a_id: Uuid,
    /// Joining member; nil until the partner joins
    pub user_b_id: Uuid,
    /// 1=Monday ... 7=Sunday
    pub week_start_day: u8,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
}

impl Pair {
    /// Whether a real partner has joined (user B is set and distinct).
    pub fn has_partner(&self) -> bool {
        !self.user_b_id.is_nil() && self.user_b_id != self.user_a_id
    }

    /// Placeholder pair used before any group exists.
    pub fn placeholder() -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            user_a_id: id,
            user_b_id: id,
            week_start_day: 1,
            invite_code: String::new(),
            created_at: Utc::now(),
        }
    }
}
