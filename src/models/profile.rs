// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Member profile model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name shown for a partner slot that nobody has joined yet.
pub const WAITING_FOR_PARTNER: &str = "Waiting for partner";

/// One member of a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub pair_id: Uuid,
    pub display_name: String,
    /// Committed workout days per week, 1..=7
    pub weekly_goal: u8,
    /// IANA timezone identifier of the member's device
    pub timezone: String,
}

impl UserProfile {
    /// Placeholder profile for the not-yet-joined partner slot, bound to the
    /// owner's identity so reads have something coherent to project.
    pub fn waiting_partner(owner: &UserProfile) -> Self {
        Self {
            id: owner.id,
            pair_id: owner.pair_id,
            display_name: WAITING_FOR_PARTNER.to_string(),
            weekly_goal: owner.weekly_goal,
            timezone: owner.timezone.clone(),
        }
    }

    pub fn is_waiting_placeholder(&self) -> bool {
        self.display_name == WAITING_FOR_PARTNER
    }
}
