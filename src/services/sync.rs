// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Change-token delta sync engine.
//!
//! Pulls the zone's change feed from the last persisted token, projects each
//! record into its domain entity, and merges upsert-by-id into the local
//! cache (remote wins, except in-flight local photo bytes). An invalidated
//! token falls back to exactly one full resynchronization; any other failure
//! leaves the token untouched so the next attempt retries from the same
//! point, and consumers tolerate redelivery.

use std::sync::Arc;

use crate::cache::{LocalCache, SyncPhase};
use crate::config::ZONE_PREFIX;
use crate::diagnostics::DiagnosticsLog;
use crate::error::Result;
use crate::local_state::LocalStateStore;
use crate::models::{UserProfile, WeeklyGoal};
use crate::notify::{NotificationEvent, Notifier};
use crate::services::session::SharedSession;
use crate::store::{
    codec, ChangeToken, DeletedRecord, RecordKind, RemoteRecord, RemoteStore, StoreError,
    ZoneHandle,
};

const MEMBER_QUERY_LIMIT: usize = 10;
const GOAL_QUERY_LIMIT: usize = 100;
const WORKOUT_QUERY_LIMIT: usize = 500;
const NUDGE_QUERY_LIMIT: usize = 200;

pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    cache: Arc<LocalCache>,
    local_state: Arc<dyn LocalStateStore>,
    session: SharedSession,
    notifier: Arc<dyn Notifier>,
    diagnostics: Arc<DiagnosticsLog>,
}

impl SyncEngine {
    pub(crate) fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<LocalCache>,
        local_state: Arc<dyn LocalStateStore>,
        session: SharedSession,
        notifier: Arc<dyn Notifier>,
        diagnostics: Arc<DiagnosticsLog>,
    ) -> Self {
        Self {
            store,
            cache,
            local_state,
            session,
            notifier,
            diagnostics,
        }
    }

    /// Incremental sync from the persisted change token.
    pub async fn perform_delta_sync(&self) -> Result<()> {
        let Some(zone) = self.session.read().unwrap().zone.clone() else {
            return Ok(());
        };

        self.cache.mutate(|s| s.phase = SyncPhase::Syncing);
        let outcome = self.delta_sync_pages(&zone).await;

        match outcome {
            Ok(()) => {
                self.cache.mutate(|s| {
                    s.phase = SyncPhase::Synced;
                    s.is_offline = false;
                });
                self.session.write().unwrap().completed_first_sync = true;
                Ok(())
            }
            Err(err) => {
                self.cache.mutate(|s| s.phase = SyncPhase::Synced);
                Err(err)
            }
        }
    }

    async fn delta_sync_pages(&self, zone: &ZoneHandle) -> Result<()> {
        let mut token = self.local_state.change_token(&zone.name).map(ChangeToken);
        let suppress_events = !self.session.read().unwrap().completed_first_sync;

        loop {
            let batch = match self.store.fetch_changes(zone, token.as_ref()).await {
                Ok(batch) => batch,
                Err(StoreError::ChangeTokenExpired) => {
                    self.diagnostics
                        .push("delta sync: change token invalidated, falling back to full resync");
                    tracing::warn!(zone = %zone.name, "Change token expired; full resync");
                    self.local_state.clear_change_token(&zone.name);
                    self.full_resync().await?;
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            tracing::debug!(
                zone = %zone.name,
                changed = batch.changed.len(),
                deleted = batch.deleted.len(),
                has_more = batch.has_more,
                "Fetched change page"
            );

            for record in &batch.changed {
                self.merge_record(record, suppress_events);
            }
            for deleted in &batch.deleted {
                self.remove_record(deleted);
            }

            // Persisting after each page keeps redelivery bounded to the
            // current page on a crash.
            self.local_state.set_change_token(&zone.name, batch.token.as_str());

            if !batch.has_more {
                return Ok(());
            }
            token = Some(batch.token);
        }
    }

    /// Merge one remote record into the cache, upsert-by-id.
    fn merge_record(&self, record: &RemoteRecord, suppress_events: bool) {
        let my_member_id = self.session.read().unwrap().my_member_id;

        match record.kind {
            RecordKind::Group => {
                let pair = codec::pair_from_record(record);
                self.cache.mutate(|s| {
                    let partner_joined = pair.has_partner() && !s.pair.has_partner();
                    s.pair = pair;
                    if partner_joined {
                        s.has_group = true;
                    }
                });
            }
            RecordKind::Member => {
                let fallback = self.cache.read(|s| s.pair.id);
                let profile = codec::profile_from_record(record, fallback);
                let identity = codec::member_account_identity(record).map(str::to_string);
                self.merge_member(profile, identity, my_member_id);
            }
            RecordKind::WeeklyGoal => {
                let fallback = self.cache.read(|s| s.pair.id);
                let goal = codec::weekly_goal_from_record(record, fallback);
                self.cache.mutate(|s| merge_goal(s, goal));
            }
            RecordKind::Workout => {
                let fallback = self.cache.read(|s| s.pair.id);
                let workout = codec::workout_from_record(record, fallback);
                let is_new = self.cache.mutate(|s| {
                    if let Some(existing) =
                        s.workouts.iter_mut().find(|w| w.id == workout.id)
                    {
                        // Remote wins, except in-flight photo bytes the
                        // change projection cannot carry.
                        let local_photo = existing.photo_data.take();
                        *existing = workout.clone();
                        if existing.photo_data.is_none() {
                            existing.photo_data = local_photo;
                        }
                        false
                    } else {
                        s.workouts.push(workout.clone());
                        true
                    }
                });
                if is_new && !suppress_events {
                    let (mine, partner_name) = self.cache.read(|s| {
                        (
                            workout.user_id == s.current_user.id,
                            s.partner.display_name.clone(),
                        )
                    });
                    if !mine {
                        self.notifier.notify(NotificationEvent::PartnerWorkout {
                            workout_id: workout.id,
                            partner_name,
                            caption: workout.caption.clone(),
                        });
                    }
                }
            }
            RecordKind::Nudge => {
                let fallback = self.cache.read(|s| s.pair.id);
                let nudge = codec::nudge_from_record(record, fallback);
                let is_new = self.cache.mutate(|s| {
                    if s.nudges.iter().any(|n| n.id == nudge.id) {
                        false
                    } else {
                        s.nudges.push(nudge.clone());
                        true
                    }
                });
                if is_new && !suppress_events {
                    let (mine, sender_name) = self.cache.read(|s| {
                        (
                            nudge.sender_id == s.current_user.id,
                            s.partner.display_name.clone(),
                        )
                    });
                    if !mine {
                        self.notifier.notify(NotificationEvent::Nudge {
                            sender_name,
                            message: nudge.message.clone(),
                        });
                    }
                }
            }
            // Public-namespace records never arrive through a zone feed.
            RecordKind::InviteCode => {}
        }
    }

    /// Fold a member record into the current-user/partner slots.
    fn merge_member(
        &self,
        profile: UserProfile,
        identity: Option<String>,
        my_member_id: Option<uuid::Uuid>,
    ) {
        let is_me = match my_member_id {
            Some(id) => profile.id == id,
            // Without a resolved identity, fall back to matching the cached
            // current user.
            None => self.cache.read(|s| s.current_user.id == profile.id),
        };
        if let Some(identity) = identity {
            tracing::debug!(member = %profile.id, identity = %identity, "Merged member record");
        }

        // Any member who is not me is the partner; seeing one means the
        // group is complete.
        let newly_joined = self.cache.mutate(|s| {
            if is_me {
                s.current_user = profile;
                false
            } else {
                let first_time = !s.has_group;
                s.partner = profile;
                s.has_group = true;
                first_time
            }
        });

        if newly_joined {
            let mut session = self.session.write().unwrap();
            session.member_count = session.member_count.max(2);
            drop(session);
            self.diagnostics.push("sync: partner profile arrived, group ready");
        }
    }

    fn remove_record(&self, deleted: &DeletedRecord) {
        self.cache.mutate(|s| match deleted.kind {
            RecordKind::Workout => {
                s.workouts.retain(|w| w.id.to_string() != deleted.id);
            }
            RecordKind::Nudge => {
                s.nudges.retain(|n| n.id.to_string() != deleted.id);
            }
            RecordKind::WeeklyGoal => {
                s.weekly_goals.retain(|g| {
                    WeeklyGoal::record_id(g.pair_id, g.week_start) != deleted.id
                        && g.id.to_string() != deleted.id
                });
            }
            // Group/member deletion would dissolve the pair; outside normal
            // flow, so only log it.
            RecordKind::Group | RecordKind::Member => {
                tracing::warn!(id = %deleted.id, "Ignoring deletion of pair-level record");
            }
            RecordKind::InviteCode => {}
        });
    }

    /// Refetch everything in the zone by query and rebuild the cache.
    pub async fn full_resync(&self) -> Result<()> {
        let Some(zone) = self.session.read().unwrap().zone.clone() else {
            return Ok(());
        };

        let group_record_id = zone
            .name
            .strip_prefix(ZONE_PREFIX)
            .unwrap_or(&zone.name)
            .to_string();
        let group_rec = self
            .store
            .get(&zone, &group_record_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(group_record_id.clone()))?;
        let pair = codec::pair_from_record(&group_rec);

        let members = self.store.query(&zone, RecordKind::Member, MEMBER_QUERY_LIMIT).await?;
        let goals = self.store.query(&zone, RecordKind::WeeklyGoal, GOAL_QUERY_LIMIT).await?;
        let workouts = self
            .store
            .query(&zone, RecordKind::Workout, WORKOUT_QUERY_LIMIT)
            .await?;
        let nudges = self.store.query(&zone, RecordKind::Nudge, NUDGE_QUERY_LIMIT).await?;

        let my_member_id = self.session.read().unwrap().my_member_id;
        let member_count = members.len();

        self.cache.mutate(|s| {
            let pair_id = pair.id;
            s.pair = pair;

            let profiles: Vec<UserProfile> = members
                .iter()
                .map(|rec| codec::profile_from_record(rec, pair_id))
                .collect();

            let me = my_member_id
                .and_then(|id| profiles.iter().find(|p| p.id == id))
                .or_else(|| profiles.first())
                .cloned();
            if let Some(me) = me {
                s.current_user = me;
            }
            match profiles.iter().find(|p| p.id != s.current_user.id) {
                Some(partner) => s.partner = partner.clone(),
                None => s.partner = UserProfile::waiting_partner(&s.current_user),
            }

            let old_goals = std::mem::take(&mut s.weekly_goals);
            s.weekly_goals = goals
                .iter()
                .map(|rec| {
                    let incoming = codec::weekly_goal_from_record(rec, pair_id);
                    // Write-once: a result already adopted locally survives
                    // even a full rebuild.
                    match old_goals
                        .iter()
                        .find(|g| g.week_start == incoming.week_start)
                        .and_then(|g| g.result)
                    {
                        Some(local_result) => WeeklyGoal {
                            result: Some(local_result),
                            ..incoming
                        },
                        None => incoming,
                    }
                })
                .collect();
            s.sort_goals();

            let old_workouts = std::mem::take(&mut s.workouts);
            s.workouts = workouts
                .iter()
                .map(|rec| {
                    let mut incoming = codec::workout_from_record(rec, pair_id);
                    if incoming.photo_data.is_none() {
                        // Preserve in-flight local bytes not yet uploaded.
                        if let Some(local) = old_workouts.iter().find(|w| w.id == incoming.id) {
                            incoming.photo_data = local.photo_data.clone();
                        }
                    }
                    incoming
                })
                .collect();

            s.nudges = nudges
                .iter()
                .map(|rec| codec::nudge_from_record(rec, pair_id))
                .collect();

            s.has_group = member_count >= 2;
        });

        {
            let mut session = self.session.write().unwrap();
            session.member_count = member_count;
            session.completed_first_sync = true;
        }

        tracing::info!(
            zone = %zone.name,
            members = member_count,
            goals = goals.len(),
            workouts = workouts.len(),
            "Full resync complete"
        );
        self.diagnostics.push(format!(
            "full resync: {} members, {} goals, {} workouts",
            member_count,
            goals.len(),
            workouts.len()
        ));
        Ok(())
    }
}

/// Upsert a goal by id, honoring write-once results and the one-goal-per-week
/// invariant.
fn merge_goal(state: &mut crate::cache::CacheState, incoming: WeeklyGoal) {
    if let Some(existing) = state.weekly_goals.iter_mut().find(|g| g.id == incoming.id) {
        let kept_result = existing.result;
        *existing = incoming;
        if kept_result.is_some() {
            existing.result = kept_result;
        }
    } else if let Some(same_week) = state
        .weekly_goals
        .iter_mut()
        .find(|g| g.week_start == incoming.week_start)
    {
        // A different id for the same week means this device lost the
        // creation race; the remote version is the winner.
        let kept_result = same_week.result;
        *same_week = incoming;
        if kept_result.is_some() {
            same_week.result = kept_result;
        }
    } else {
        state.weekly_goals.push(incoming);
    }
    state.sort_goals();
}
