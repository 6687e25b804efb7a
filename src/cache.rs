// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! In-memory domain cache — the single source of truth for the UI.
//!
//! All mutation goes through [`LocalCache::mutate`], which holds one write
//! lock for the duration of the closure and bumps a watch channel so the
//! presentation layer can re-read reactively. Reads are synchronous
//! projections and never touch the network.

use std::collections::HashSet;
use std::sync::RwLock;

use chrono::NaiveDate;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{Nudge, Pair, UserProfile, WeekResult, WeeklyGoal, Workout};
use crate::time_utils::start_of_week;

/// Delta-sync progress, surfaced for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Syncing,
    Synced,
}

/// The cached domain state plus UI-visible status flags.
#[derive(Debug, Clone)]
pub struct CacheState {
    pub pair: Pair,
    pub current_user: UserProfile,
    pub partner: UserProfile,
    /// Sorted newest week first.
    pub weekly_goals: Vec<WeeklyGoal>,
    pub workouts: Vec<Workout>,
    pub nudges: Vec<Nudge>,

    pub phase: SyncPhase,
    pub has_group: bool,
    pub is_loading: bool,
    /// Sticky until the next successful remote round-trip.
    pub is_offline: bool,
    pub needs_authentication: bool,
    pub is_storage_full: bool,
}

impl CacheState {
    fn placeholder() -> Self {
        let pair = Pair::placeholder();
        let current_user = UserProfile {
            id: pair.user_a_id,
            pair_id: pair.id,
            display_name: "Me".to_string(),
            weekly_goal: 4,
            timezone: "UTC".to_string(),
        };
        let partner = UserProfile {
            id: pair.user_b_id,
            pair_id: pair.id,
            display_name: "Partner".to_string(),
            weekly_goal: 4,
            timezone: "UTC".to_string(),
        };
        Self {
            pair,
            current_user,
            partner,
            weekly_goals: Vec::new(),
            workouts: Vec::new(),
            nudges: Vec::new(),
            phase: SyncPhase::Uninitialized,
            has_group: false,
            is_loading: true,
            is_offline: false,
            needs_authentication: false,
            is_storage_full: false,
        }
    }

    /// The open week, or a transient placeholder when no goal exists yet.
    ///
    /// The placeholder is never persisted; it exists so read paths never see
    /// "no current week".
    pub fn current_week(&self, today: NaiveDate) -> WeeklyGoal {
        if let Some(open) = self.weekly_goals.iter().find(|g| g.is_open()) {
            return open.clone();
        }
        if let Some(first) = self.weekly_goals.first() {
            return first.clone();
        }
        WeeklyGoal {
            id: Uuid::new_v4(),
            pair_id: self.pair.id,
            week_start: start_of_week(today, self.pair.week_start_day),
            goal_user_a: self.current_user.weekly_goal,
            goal_user_b: self.partner.weekly_goal,
            wager_text: String::new(),
            result: None,
        }
    }

    pub fn workouts_for(&self, weekly_goal_id: Uuid) -> Vec<Workout> {
        self.workouts
            .iter()
            .filter(|w| w.weekly_goal_id == weekly_goal_id)
            .cloned()
            .collect()
    }

    /// Distinct workout days a user logged within a week's goal.
    ///
    /// Multiple logs on the same calendar day count once.
    pub fn workout_days(&self, user_id: Uuid, goal: &WeeklyGoal) -> u8 {
        let unique: HashSet<NaiveDate> = self
            .workouts
            .iter()
            .filter(|w| w.weekly_goal_id == goal.id && w.user_id == user_id)
            .map(|w| w.workout_date)
            .collect();
        unique.len().min(7) as u8
    }

    /// Consecutive most-recent closed weeks where both partners hit.
    pub fn streak(&self) -> u32 {
        let mut streak = 0;
        for week in self.closed_weeks_newest_first() {
            if week.result == Some(WeekResult::BothHit) {
                streak += 1;
            } else {
                break;
            }
        }
        streak
    }

    /// Longest run of closed weeks where both partners hit.
    pub fn best_streak(&self) -> u32 {
        let mut best = 0;
        let mut current = 0;
        for week in self.closed_weeks_newest_first() {
            if week.result == Some(WeekResult::BothHit) {
                current += 1;
                best = best.max(current);
            } else {
                current = 0;
            }
        }
        best
    }

    /// Closed weeks, newest first.
    pub fn past_weeks(&self) -> Vec<WeeklyGoal> {
        self.closed_weeks_newest_first().cloned().collect()
    }

    pub fn latest_workout(&self, user_id: Uuid, today: NaiveDate) -> Option<Workout> {
        let current = self.current_week(today);
        self.workouts
            .iter()
            .filter(|w| w.weekly_goal_id == current.id && w.user_id == user_id)
            .max_by_key(|w| w.logged_at)
            .cloned()
    }

    pub fn has_logged_on(&self, user_id: Uuid, day: NaiveDate) -> bool {
        self.workouts
            .iter()
            .any(|w| w.user_id == user_id && w.workout_date == day)
    }

    fn closed_weeks_newest_first(&self) -> impl Iterator<Item = &WeeklyGoal> {
        // weekly_goals is kept sorted newest first by the merge paths.
        self.weekly_goals.iter().filter(|g| g.result.is_some())
    }

    /// Keep the newest-first ordering invariant after an upsert.
    pub fn sort_goals(&mut self) {
        self.weekly_goals
            .sort_by(|a, b| b.week_start.cmp(&a.week_start));
    }
}

/// Set the sticky UI flags a failure implies, per the error taxonomy.
pub(crate) fn apply_error_flags(state: &mut CacheState, err: &crate::error::SyncError) {
    use crate::error::SyncError;
    match err {
        SyncError::NetworkUnavailable => state.is_offline = true,
        SyncError::NotAuthenticated => state.needs_authentication = true,
        SyncError::QuotaExceeded => state.is_storage_full = true,
        _ => {}
    }
}

/// Shared, observable cache handle.
pub struct LocalCache {
    state: RwLock<CacheState>,
    version_tx: watch::Sender<u64>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(CacheState::placeholder()),
            version_tx,
        }
    }

    /// Run a read-only projection against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&CacheState) -> R) -> R {
        f(&self.state.read().expect("cache lock poisoned"))
    }

    /// Mutate the state and notify observers.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut CacheState) -> R) -> R {
        let result = {
            let mut state = self.state.write().expect("cache lock poisoned");
            f(&mut state)
        };
        self.version_tx.send_modify(|v| *v += 1);
        result
    }

    /// Observe cache versions; receivers wake on every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn goal(week_start: NaiveDate, result: Option<WeekResult>) -> WeeklyGoal {
        WeeklyGoal {
            id: Uuid::new_v4(),
            pair_id: Uuid::new_v4(),
            week_start,
            goal_user_a: 4,
            goal_user_b: 4,
            wager_text: String::new(),
            result,
        }
    }

    fn workout(user_id: Uuid, goal_id: Uuid, date: NaiveDate) -> Workout {
        Workout {
            id: Uuid::new_v4(),
            user_id,
            pair_id: Uuid::new_v4(),
            weekly_goal_id: goal_id,
            photo_data: None,
            photo_record_id: None,
            caption: None,
            logged_at: Utc::now(),
            workout_date: date,
        }
    }

    #[test]
    fn test_workout_days_counts_distinct_days_not_records() {
        let mut state = CacheState::placeholder();
        let g = goal(d(2026, 8, 3), None);
        let user = state.current_user.id;
        // Three logs on the same day, one on another.
        state.workouts.push(workout(user, g.id, d(2026, 8, 3)));
        state.workouts.push(workout(user, g.id, d(2026, 8, 3)));
        state.workouts.push(workout(user, g.id, d(2026, 8, 3)));
        state.workouts.push(workout(user, g.id, d(2026, 8, 4)));

        assert_eq!(state.workout_days(user, &g), 2);
    }

    #[test]
    fn test_workout_days_ignores_other_users_and_weeks() {
        let mut state = CacheState::placeholder();
        let g = goal(d(2026, 8, 3), None);
        let other_goal = goal(d(2026, 7, 27), None);
        let user = state.current_user.id;
        let partner = Uuid::new_v4();
        state.workouts.push(workout(user, g.id, d(2026, 8, 3)));
        state.workouts.push(workout(partner, g.id, d(2026, 8, 3)));
        state.workouts.push(workout(user, other_goal.id, d(2026, 7, 28)));

        assert_eq!(state.workout_days(user, &g), 1);
    }

    #[test]
    fn test_current_week_prefers_open_goal() {
        let mut state = CacheState::placeholder();
        let closed = goal(d(2026, 7, 27), Some(WeekResult::BothHit));
        let open = goal(d(2026, 8, 3), None);
        state.weekly_goals = vec![open.clone(), closed];

        assert_eq!(state.current_week(d(2026, 8, 5)).id, open.id);
    }

    #[test]
    fn test_current_week_placeholder_when_cache_empty() {
        let state = CacheState::placeholder();
        let week = state.current_week(d(2026, 8, 5));
        // Monday-start placeholder for a Wednesday.
        assert_eq!(week.week_start, d(2026, 8, 3));
        assert!(week.is_open());
        assert_eq!(week.goal_user_a, state.current_user.weekly_goal);
    }

    #[test]
    fn test_streaks() {
        let mut state = CacheState::placeholder();
        state.weekly_goals = vec![
            goal(d(2026, 8, 3), Some(WeekResult::BothHit)),
            goal(d(2026, 7, 27), Some(WeekResult::BothHit)),
            goal(d(2026, 7, 20), Some(WeekResult::AOwes)),
            goal(d(2026, 7, 13), Some(WeekResult::BothHit)),
            goal(d(2026, 7, 6), Some(WeekResult::BothHit)),
            goal(d(2026, 6, 29), Some(WeekResult::BothHit)),
        ];

        assert_eq!(state.streak(), 2);
        assert_eq!(state.best_streak(), 3);
    }

    #[test]
    fn test_past_weeks_excludes_open_week() {
        let mut state = CacheState::placeholder();
        state.weekly_goals = vec![
            goal(d(2026, 8, 3), None),
            goal(d(2026, 7, 27), Some(WeekResult::BOwes)),
        ];
        let past = state.past_weeks();
        assert_eq!(past.len(), 1);
        assert_eq!(past[0].week_start, d(2026, 7, 27));
    }

    #[test]
    fn test_mutate_bumps_version() {
        let cache = LocalCache::new();
        let rx = cache.subscribe();
        let before = *rx.borrow();
        cache.mutate(|state| state.has_group = true);
        assert_eq!(*rx.borrow(), before + 1);
        assert!(cache.read(|s| s.has_group));
    }
}
