// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Per-launch session state shared by the services.

use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::store::{ZoneHandle, ZoneScope};

/// Mutable session context resolved during setup/pairing.
#[derive(Debug, Default)]
pub(crate) struct Session {
    /// The active group zone, once discovered or created.
    pub zone: Option<ZoneHandle>,
    /// This device's stable member id, once the account identity resolves.
    pub my_member_id: Option<Uuid>,
    /// Members seen in the zone on the last refresh.
    pub member_count: usize,
    /// Set after the first successful sync since launch; notification events
    /// are suppressed before that so a fresh install does not replay history.
    pub completed_first_sync: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The settlement leader role: the device that sees the zone in its
    /// private scope is the group owner.
    pub fn is_owner(&self) -> bool {
        matches!(
            self.zone.as_ref().map(|z| z.scope),
            Some(ZoneScope::Private)
        )
    }
}

pub(crate) type SharedSession = Arc<RwLock<Session>>;
