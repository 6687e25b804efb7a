// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! The client facade the presentation layer drives.
//!
//! Every user-initiated write follows the optimistic pattern: apply to the
//! cache immediately, issue the remote write, roll the cache back on
//! failure. Reads are synchronous cache projections and never block on
//! network I/O; photo bytes are the one async exception.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::cache::{apply_error_flags, LocalCache};
use crate::config::{Config, ZONE_PREFIX};
use crate::diagnostics::DiagnosticsLog;
use crate::error::{Result, SyncError};
use crate::local_state::LocalStateStore;
use crate::models::{Nudge, Pair, UserProfile, WeeklyGoal, Workout};
use crate::notify::Notifier;
use crate::services::pairing::{stable_member_id, PairingService};
use crate::services::session::{Session, SharedSession};
use crate::services::sync::SyncEngine;
use crate::services::week::WeekLifecycle;
use crate::store::{AccountStatus, RemoteStore, SavePolicy, ZoneScope};
use crate::time_utils::effective_workout_date;

/// Photos memoized for lazy loading; evicted FIFO past this size.
const PHOTO_CACHE_CAPACITY: usize = 50;

/// Bounded, non-durable photo memo keyed by workout id.
struct PhotoCache {
    photos: DashMap<Uuid, Vec<u8>>,
    order: Mutex<VecDeque<Uuid>>,
}

impl PhotoCache {
    fn new() -> Self {
        Self {
            photos: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    fn get(&self, id: Uuid) -> Option<Vec<u8>> {
        self.photos.get(&id).map(|bytes| bytes.clone())
    }

    fn insert(&self, id: Uuid, bytes: Vec<u8>) {
        let mut order = self.order.lock().unwrap();
        if self.photos.insert(id, bytes).is_none() {
            order.push_back(id);
        }
        while order.len() > PHOTO_CACHE_CAPACITY {
            if let Some(evicted) = order.pop_front() {
                self.photos.remove(&evicted);
            }
        }
    }
}

/// The sync core's public surface.
pub struct SweatpactClient {
    store: Arc<dyn RemoteStore>,
    cache: Arc<LocalCache>,
    local_state: Arc<dyn LocalStateStore>,
    diagnostics: Arc<DiagnosticsLog>,
    session: SharedSession,
    sync: Arc<SyncEngine>,
    weeks: Arc<WeekLifecycle>,
    pairing: PairingService,
    photos: PhotoCache,
}

impl SweatpactClient {
    /// Wire the core to a store implementation chosen by the host:
    /// [`crate::store::MemoryStore`] for tests/offline demo,
    /// [`crate::store::FirestoreStore`] for production.
    pub fn new(
        config: Config,
        store: Arc<dyn RemoteStore>,
        local_state: Arc<dyn LocalStateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cache = Arc::new(LocalCache::new());
        let diagnostics = Arc::new(DiagnosticsLog::new());
        let session: SharedSession = Arc::new(RwLock::new(Session::new()));

        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&local_state),
            Arc::clone(&session),
            Arc::clone(&notifier),
            Arc::clone(&diagnostics),
        ));
        let weeks = Arc::new(WeekLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&session),
            Arc::clone(&notifier),
            Arc::clone(&diagnostics),
        ));
        let pairing = PairingService::new(
            config,
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&local_state),
            Arc::clone(&session),
            Arc::clone(&sync),
            Arc::clone(&diagnostics),
        );

        Self {
            store,
            cache,
            local_state,
            diagnostics,
            session,
            sync,
            weeks,
            pairing,
            photos: PhotoCache::new(),
        }
    }

    /// The observable cache; UIs subscribe for change notifications.
    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    /// Recent sync activity for support/debug views.
    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.snapshot()
    }

    // ─── Setup ───────────────────────────────────────────────────────

    /// Launch/foreground entry point: check the account, find the group
    /// zone, and reconcile. Errors surface through the cache status flags.
    pub async fn setup(&self) {
        self.diagnostics.push("setup() started");
        self.cache.mutate(|s| {
            s.is_loading = true;
            s.is_offline = false;
            s.is_storage_full = false;
        });

        let outcome = self.setup_inner().await;
        if let Err(err) = outcome {
            self.note_failure("setup", &err);
        }
        self.cache.mutate(|s| s.is_loading = false);
    }

    async fn setup_inner(&self) -> Result<()> {
        match self.store.account_status().await? {
            AccountStatus::Available => {
                self.cache.mutate(|s| s.needs_authentication = false);
            }
            AccountStatus::NeedsAuth => {
                self.cache.mutate(|s| {
                    s.needs_authentication = true;
                    s.has_group = false;
                });
                self.diagnostics.push("setup() exited: needs authentication");
                return Ok(());
            }
            AccountStatus::Unavailable => {
                self.cache.mutate(|s| {
                    s.is_offline = true;
                    s.has_group = false;
                });
                self.diagnostics.push("setup() exited: account unavailable");
                return Ok(());
            }
        }

        if let Some(identity) = self.store.account_identity().await? {
            self.session.write().unwrap().my_member_id = Some(stable_member_id(&identity));
        }

        // Owner devices find the zone in their private scope; joiners in
        // the shared scope.
        let zone = match self.store.discover_zone(ZoneScope::Private, ZONE_PREFIX).await? {
            Some(zone) => Some(zone),
            None => self.store.discover_zone(ZoneScope::Shared, ZONE_PREFIX).await?,
        };
        let Some(zone) = zone else {
            self.cache.mutate(|s| s.has_group = false);
            self.session.write().unwrap().member_count = 0;
            self.diagnostics.push("setup(): no group zone found");
            return Ok(());
        };
        self.diagnostics
            .push(format!("setup(): using zone {}", zone.name));
        self.session.write().unwrap().zone = Some(zone.clone());

        if !self.local_state.subscription_configured(&zone.name) {
            match self.store.create_subscription(&zone).await {
                Ok(()) => self.local_state.set_subscription_configured(&zone.name),
                Err(err) => tracing::warn!(error = %err, "Subscription setup failed; will retry"),
            }
        }

        self.perform_delta_sync().await?;

        let members = self.session.read().unwrap().member_count;
        let ready = members >= 2;
        self.cache.mutate(|s| s.has_group = ready);
        if ready {
            self.local_state.clear_pending_invite_code();
        }
        self.diagnostics
            .push(format!("setup() completed: members={members}, has_group={ready}"));
        Ok(())
    }

    // ─── Pairing ─────────────────────────────────────────────────────

    pub async fn create_group(&self, display_name: &str, weekly_goal: u8) -> Result<String> {
        self.pairing
            .create_group(display_name, weekly_goal)
            .await
            .inspect_err(|err| self.note_failure("create_group", err))
    }

    pub async fn join_group(&self, code: &str, display_name: &str, weekly_goal: u8) -> Result<()> {
        self.pairing
            .join_group(code, display_name, weekly_goal)
            .await
            .inspect_err(|err| self.note_failure("join_group", err))
    }

    pub async fn check_for_partner(&self) -> bool {
        self.pairing.check_for_partner().await
    }

    /// Poll for the partner until success or `cancel` flips (the waiting
    /// screen sets it when dismissed).
    pub async fn poll_for_partner(&self, cancel: &AtomicBool) -> bool {
        self.pairing.poll_for_partner(cancel).await
    }

    /// Invite code still waiting on a partner, surviving restarts.
    pub fn pending_invite_code(&self) -> Option<String> {
        self.local_state.pending_invite_code()
    }

    // ─── Sync ────────────────────────────────────────────────────────

    /// Incremental reconcile with the remote zone, then the weekly goal
    /// lifecycle pass.
    pub async fn perform_delta_sync(&self) -> Result<()> {
        // Captured before the sync flips it, so settlements of historical
        // weeks right after a fresh install stay quiet.
        let first_sync = !self.session.read().unwrap().completed_first_sync;
        self.sync.perform_delta_sync().await.inspect_err(|err| {
            self.note_failure("delta_sync", err);
        })?;
        self.weeks
            .ensure_current_week_goal(self.today(), first_sync)
            .await
            .inspect_err(|err| self.note_failure("ensure_week", err))
    }

    /// Settle expired weeks and create the current one if missing.
    pub async fn ensure_current_week_goal(&self) -> Result<()> {
        let first_sync = !self.session.read().unwrap().completed_first_sync;
        self.weeks
            .ensure_current_week_goal(self.today(), first_sync)
            .await
            .inspect_err(|err| self.note_failure("ensure_week", err))
    }

    // ─── Mutations (optimistic, rolled back on failure) ──────────────

    /// Log a workout with photo proof. On success an async delta sync picks
    /// up other recently-arrived remote state.
    pub async fn log_workout(&self, photo_data: Vec<u8>, caption: Option<String>) -> Result<()> {
        let workout_date = effective_workout_date(self.now_local());
        let (current_week, user_id, pair_id) = self.cache.read(|s| {
            (
                s.current_week(self.today()),
                s.current_user.id,
                s.pair.id,
            )
        });

        let workout = Workout {
            id: Uuid::new_v4(),
            user_id,
            pair_id,
            weekly_goal_id: current_week.id,
            photo_data: Some(photo_data),
            photo_record_id: None,
            caption,
            logged_at: Utc::now(),
            workout_date,
        };
        let workout_id = workout.id;
        self.cache.mutate(|s| s.workouts.push(workout.clone()));

        let Some(zone) = self.session.read().unwrap().zone.clone() else {
            // No group yet: the log stays local-only.
            return Ok(());
        };

        let record = crate::store::codec::workout_record(&zone, &workout);
        match self.store.save(&record, SavePolicy::CreateOnly).await {
            Ok(saved) => {
                self.cache.mutate(|s| {
                    if let Some(w) = s.workouts.iter_mut().find(|w| w.id == workout_id) {
                        w.photo_record_id = Some(saved.id.clone());
                    }
                });
                tracing::info!(workout = %workout_id, date = %workout_date, "Workout logged");

                let sync = Arc::clone(&self.sync);
                let weeks = Arc::clone(&self.weeks);
                let today = self.today();
                tokio::spawn(async move {
                    if sync.perform_delta_sync().await.is_ok() {
                        let _ = weeks.ensure_current_week_goal(today, false).await;
                    }
                });
                Ok(())
            }
            Err(err) => {
                // The UI must not keep showing a workout that never landed.
                self.cache
                    .mutate(|s| s.workouts.retain(|w| w.id != workout_id));
                let err: SyncError = err.into();
                self.note_failure("log_workout", &err);
                Err(err)
            }
        }
    }

    /// Update the open week's wager text.
    pub async fn update_wager(&self, text: &str) -> Result<()> {
        let Some((goal_id, previous)) = self.cache.mutate(|s| {
            s.weekly_goals.iter_mut().find(|g| g.is_open()).map(|g| {
                let prev = std::mem::replace(&mut g.wager_text, text.to_string());
                (g.id, prev)
            })
        }) else {
            return Ok(());
        };

        let restore = |client: &Self| {
            client.cache.mutate(|s| {
                if let Some(g) = s.weekly_goals.iter_mut().find(|g| g.id == goal_id) {
                    g.wager_text = previous.clone();
                }
            });
        };

        match self
            .save_goal_field(goal_id, "wagerText", text.to_string().into())
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                restore(self);
                self.note_failure("update_wager", &err);
                Err(err)
            }
        }
    }

    /// Change this user's committed days per week, propagating into the
    /// open week's slot.
    pub async fn update_weekly_goal(&self, days: u8) -> Result<()> {
        let (user_id, is_user_a, previous_days, open_goal) = self.cache.mutate(|s| {
            let previous = s.current_user.weekly_goal;
            s.current_user.weekly_goal = days;
            let is_user_a = s.current_user.id == s.pair.user_a_id;
            let open = s.weekly_goals.iter_mut().find(|g| g.is_open()).map(|g| {
                let prev_slot = if is_user_a {
                    std::mem::replace(&mut g.goal_user_a, days)
                } else {
                    std::mem::replace(&mut g.goal_user_b, days)
                };
                (g.id, prev_slot)
            });
            (s.current_user.id, is_user_a, previous, open)
        });

        let rollback = |client: &Self| {
            client.cache.mutate(|s| {
                s.current_user.weekly_goal = previous_days;
                if let Some((goal_id, prev_slot)) = open_goal {
                    if let Some(g) = s.weekly_goals.iter_mut().find(|g| g.id == goal_id) {
                        if is_user_a {
                            g.goal_user_a = prev_slot;
                        } else {
                            g.goal_user_b = prev_slot;
                        }
                    }
                }
            });
        };

        let result = async {
            self.save_member_field(user_id, "weeklyGoal", i64::from(days).into())
                .await?;
            if let Some((goal_id, _)) = open_goal {
                let field = if is_user_a { "goalUserA" } else { "goalUserB" };
                self.save_goal_field(goal_id, field, i64::from(days).into())
                    .await?;
            }
            Ok(())
        }
        .await;

        if let Err(err) = result {
            rollback(self);
            self.note_failure("update_weekly_goal", &err);
            return Err(err);
        }
        Ok(())
    }

    /// Rename this user.
    pub async fn update_display_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        let (user_id, previous) = self.cache.mutate(|s| {
            let prev = std::mem::replace(&mut s.current_user.display_name, name.to_string());
            (s.current_user.id, prev)
        });

        match self
            .save_member_field(user_id, "displayName", name.to_string().into())
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                self.cache
                    .mutate(|s| s.current_user.display_name = previous.clone());
                self.note_failure("update_display_name", &err);
                Err(err)
            }
        }
    }

    /// Change which day the pair's week starts on (1=Monday..7=Sunday).
    pub async fn update_week_start_day(&self, day: u8) -> Result<()> {
        let (pair_id, previous) = self.cache.mutate(|s| {
            let prev = std::mem::replace(&mut s.pair.week_start_day, day);
            (s.pair.id, prev)
        });

        let result = self
            .save_record_field(
                crate::store::RecordKind::Group,
                &pair_id.to_string(),
                "weekStartDay",
                i64::from(day).into(),
            )
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.cache.mutate(|s| s.pair.week_start_day = previous);
                self.note_failure("update_week_start_day", &err);
                Err(err)
            }
        }
    }

    /// Send the partner a nudge.
    pub async fn send_nudge(&self, message: &str) -> Result<()> {
        let nudge = self.cache.read(|s| Nudge {
            id: Uuid::new_v4(),
            sender_id: s.current_user.id,
            pair_id: s.pair.id,
            message: message.to_string(),
            sent_at: Utc::now(),
        });
        let nudge_id = nudge.id;
        self.cache.mutate(|s| s.nudges.push(nudge.clone()));

        let Some(zone) = self.session.read().unwrap().zone.clone() else {
            return Ok(());
        };
        let record = crate::store::codec::nudge_record(&zone, &nudge);
        match self.store.save(&record, SavePolicy::CreateOnly).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.cache.mutate(|s| s.nudges.retain(|n| n.id != nudge_id));
                let err: SyncError = err.into();
                self.note_failure("send_nudge", &err);
                Err(err)
            }
        }
    }

    // ─── Reads (pure cache projections) ──────────────────────────────

    pub fn get_pair(&self) -> Pair {
        self.cache.read(|s| s.pair.clone())
    }

    pub fn get_current_user(&self) -> UserProfile {
        self.cache.read(|s| s.current_user.clone())
    }

    pub fn get_partner(&self) -> UserProfile {
        self.cache.read(|s| s.partner.clone())
    }

    pub fn get_current_week(&self) -> WeeklyGoal {
        self.cache.read(|s| s.current_week(self.today()))
    }

    pub fn get_workouts(&self, weekly_goal: &WeeklyGoal) -> Vec<Workout> {
        self.cache.read(|s| s.workouts_for(weekly_goal.id))
    }

    pub fn get_nudges(&self) -> Vec<Nudge> {
        self.cache.read(|s| s.nudges.clone())
    }

    pub fn get_streak(&self) -> u32 {
        self.cache.read(|s| s.streak())
    }

    pub fn get_best_streak(&self) -> u32 {
        self.cache.read(|s| s.best_streak())
    }

    pub fn get_past_weeks(&self) -> Vec<WeeklyGoal> {
        self.cache.read(|s| s.past_weeks())
    }

    pub fn workout_days(&self, user_id: Uuid, weekly_goal: &WeeklyGoal) -> u8 {
        self.cache.read(|s| s.workout_days(user_id, weekly_goal))
    }

    pub fn latest_workout(&self, user_id: Uuid) -> Option<Workout> {
        self.cache.read(|s| s.latest_workout(user_id, self.today()))
    }

    pub fn has_logged_today(&self) -> bool {
        let today = effective_workout_date(self.now_local());
        self.cache
            .read(|s| s.has_logged_on(s.current_user.id, today))
    }

    /// Photo bytes for a workout: local bytes, then the in-memory cache,
    /// then a remote asset fetch, memoized by workout id.
    pub async fn load_photo(&self, workout_id: Uuid) -> Option<Vec<u8>> {
        let (local_bytes, photo_record_id) = self.cache.read(|s| {
            s.workouts
                .iter()
                .find(|w| w.id == workout_id)
                .map(|w| (w.photo_data.clone(), w.photo_record_id.clone()))
                .unwrap_or((None, None))
        });
        if let Some(bytes) = local_bytes {
            return Some(bytes);
        }
        if let Some(bytes) = self.photos.get(workout_id) {
            return Some(bytes);
        }

        let record_id = photo_record_id?;
        let zone = self.session.read().unwrap().zone.clone()?;
        match self.store.get(&zone, &record_id).await {
            Ok(Some(record)) => {
                let bytes = record.asset?;
                self.photos.insert(workout_id, bytes.clone());
                Some(bytes)
            }
            Ok(None) => None,
            Err(err) => {
                // The view shows a placeholder; nothing to surface.
                tracing::debug!(workout = %workout_id, error = %err, "Photo load failed");
                None
            }
        }
    }

    // ─── Internals ───────────────────────────────────────────────────

    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    fn now_local(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn note_failure(&self, op: &str, err: &SyncError) {
        tracing::warn!(op, error = %err, "Operation failed");
        self.diagnostics.push(format!("{op} failed: {err}"));
        self.cache.mutate(|s| apply_error_flags(s, err));
    }

    /// Read-modify-write one field of a member record.
    async fn save_member_field(
        &self,
        member_id: Uuid,
        field: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        self.save_record_field(
            crate::store::RecordKind::Member,
            &member_id.to_string(),
            field,
            value,
        )
        .await
    }

    /// Read-modify-write one field of the open weekly goal's record.
    async fn save_goal_field(
        &self,
        goal_id: Uuid,
        field: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let record_id = self.cache.read(|s| {
            s.weekly_goals
                .iter()
                .find(|g| g.id == goal_id)
                .map(|g| WeeklyGoal::record_id(g.pair_id, g.week_start))
        });
        let Some(record_id) = record_id else {
            return Ok(());
        };
        self.save_record_field(crate::store::RecordKind::WeeklyGoal, &record_id, field, value)
            .await
    }

    async fn save_record_field(
        &self,
        kind: crate::store::RecordKind,
        record_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let Some(zone) = self.session.read().unwrap().zone.clone() else {
            return Ok(());
        };
        let mut record = self
            .store
            .get(&zone, record_id)
            .await?
            .ok_or_else(|| SyncError::RecordNotFound(format!("{}/{record_id}", kind.as_str())))?;
        record.set(field, value);
        self.store.save(&record, SavePolicy::Overwrite).await?;
        Ok(())
    }
}
