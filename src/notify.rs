// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Notification collaborator boundary.
//!
//! The sync core decides *when* to emit an event and with what payload;
//! user-visible delivery belongs to the host platform.

use std::sync::Mutex;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::WeekResult;

/// Events the host may surface to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// The partner logged a workout that just arrived via sync.
    PartnerWorkout {
        workout_id: Uuid,
        partner_name: String,
        caption: Option<String>,
    },
    /// A nudge from the partner arrived via sync.
    Nudge {
        sender_name: String,
        message: String,
    },
    /// A week was settled.
    WeekResult {
        week_start: NaiveDate,
        result: WeekResult,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Discards every event; the default for hosts without notifications.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: NotificationEvent) {}
}

/// Captures events in order; used by tests and debug builds.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}
