// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Partner nudge model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A short message poking the partner. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nudge {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub pair_id: Uuid,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}
