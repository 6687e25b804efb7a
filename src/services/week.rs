// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Weekly goal lifecycle: settlement of expired weeks and race-tolerant
//! creation of the current week.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::cache::LocalCache;
use crate::diagnostics::DiagnosticsLog;
use crate::error::Result;
use crate::models::{WeekResult, WeeklyGoal};
use crate::notify::{NotificationEvent, Notifier};
use crate::services::session::SharedSession;
use crate::store::{codec, RemoteStore, SavePolicy, StoreError, ZoneHandle};
use crate::time_utils::start_of_week;

pub struct WeekLifecycle {
    store: Arc<dyn RemoteStore>,
    cache: Arc<LocalCache>,
    session: SharedSession,
    notifier: Arc<dyn Notifier>,
    diagnostics: Arc<DiagnosticsLog>,
    /// Single-flight guard: concurrent callers observe a no-op.
    in_flight: AtomicBool,
}

/// Releases the single-flight guard on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WeekLifecycle {
    pub(crate) fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<LocalCache>,
        session: SharedSession,
        notifier: Arc<dyn Notifier>,
        diagnostics: Arc<DiagnosticsLog>,
    ) -> Self {
        Self {
            store,
            cache,
            session,
            notifier,
            diagnostics,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Settle expired weeks and make sure the current week's goal exists.
    ///
    /// Safe to call concurrently with itself (later callers no-op) and with
    /// the same operation on the partner's device (the deterministic record
    /// id turns the race into a write collision the loser resolves by
    /// adopting the winner).
    ///
    /// `suppress_notifications` is set when this pass follows the device's
    /// first sync since launch, so historical settlements on a fresh install
    /// stay quiet.
    pub async fn ensure_current_week_goal(
        &self,
        today: NaiveDate,
        suppress_notifications: bool,
    ) -> Result<()> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("ensure_current_week_goal already running; skipping");
            return Ok(());
        }
        let _guard = FlightGuard(&self.in_flight);

        let (zone, is_owner) = {
            let session = self.session.read().unwrap();
            (session.zone.clone(), session.is_owner())
        };
        let Some(zone) = zone else {
            return Ok(());
        };

        let (pair, current_user, partner, goals) = self.cache.read(|s| {
            (
                s.pair.clone(),
                s.current_user.clone(),
                s.partner.clone(),
                s.weekly_goals.clone(),
            )
        });
        let current_start = start_of_week(today, pair.week_start_day);

        // 1. Close out any open week that ended. Only the owner writes the
        //    result; the partner device picks it up through sync.
        for goal in goals.iter().filter(|g| g.is_open() && g.week_start < current_start) {
            if is_owner {
                self.settle(&zone, goal, suppress_notifications).await?;
            }
        }

        // 2-3. Done if the current week already exists locally.
        if goals.iter().any(|g| g.week_start == current_start) {
            return Ok(());
        }

        // After a race, the winner's record may exist remotely without
        // having synced down yet.
        let record_id = WeeklyGoal::record_id(pair.id, current_start);
        if let Some(rec) = self.store.get(&zone, &record_id).await? {
            let goal = codec::weekly_goal_from_record(&rec, pair.id);
            self.adopt_goal(goal);
            return Ok(());
        }

        // 4. Carry each user's configured goal into the right slot, and the
        //    previous week's wager text as a convenience default.
        let (goal_a, goal_b) = if current_user.id == pair.user_a_id {
            (current_user.weekly_goal, partner.weekly_goal)
        } else {
            (partner.weekly_goal, current_user.weekly_goal)
        };
        let previous_wager = goals
            .iter()
            .filter(|g| g.week_start < current_start)
            .max_by_key(|g| g.week_start)
            .map(|g| g.wager_text.clone())
            .unwrap_or_default();

        let new_goal = WeeklyGoal {
            id: uuid::Uuid::new_v4(),
            pair_id: pair.id,
            week_start: current_start,
            goal_user_a: goal_a,
            goal_user_b: goal_b,
            wager_text: previous_wager,
            result: None,
        };

        // 5-6. Deterministic id: the loser of a two-device race collides on
        //      write and adopts the winner's record instead.
        let rec = codec::weekly_goal_record(&zone, &new_goal);
        match self.store.save(&rec, SavePolicy::CreateOnly).await {
            Ok(_) => {
                tracing::info!(week_start = %current_start, "Created weekly goal");
                self.diagnostics
                    .push(format!("created weekly goal for {current_start}"));
                self.adopt_goal(new_goal);
                Ok(())
            }
            Err(StoreError::Conflict) => {
                let winner = self
                    .store
                    .get(&zone, &record_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(record_id.clone()))?;
                tracing::info!(week_start = %current_start, "Lost week-creation race; adopting remote");
                self.diagnostics
                    .push(format!("week {current_start} already created remotely"));
                self.adopt_goal(codec::weekly_goal_from_record(&winner, pair.id));
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Compute and durably record an expired week's result exactly once.
    async fn settle(
        &self,
        zone: &ZoneHandle,
        goal: &WeeklyGoal,
        suppress_notifications: bool,
    ) -> Result<()> {
        let (days_a, days_b) = self.cache.read(|s| {
            (
                s.workout_days(s.pair.user_a_id, goal),
                s.workout_days(s.pair.user_b_id, goal),
            )
        });
        let hit_a = days_a >= goal.goal_user_a;
        let hit_b = days_b >= goal.goal_user_b;
        let computed = WeekResult::evaluate(hit_a, hit_b);

        let record_id = WeeklyGoal::record_id(goal.pair_id, goal.week_start);
        let final_result = match self.store.get(zone, &record_id).await? {
            Some(mut rec) => {
                if let Some(existing) = rec.str_field("result").and_then(WeekResult::parse) {
                    // Someone already settled this week; their value wins.
                    existing
                } else {
                    rec.set("result", computed.as_str());
                    match self.store.save(&rec, SavePolicy::IfUnchanged).await {
                        Ok(_) => computed,
                        Err(StoreError::Conflict) => {
                            // Concurrent writer got there first; re-read and
                            // adopt whatever they wrote.
                            let current = self
                                .store
                                .get(zone, &record_id)
                                .await?
                                .ok_or_else(|| StoreError::NotFound(record_id.clone()))?;
                            current
                                .str_field("result")
                                .and_then(WeekResult::parse)
                                .unwrap_or(computed)
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
            None => {
                // Local goal with no remote counterpart; publish it closed.
                let closed = WeeklyGoal {
                    result: Some(computed),
                    ..goal.clone()
                };
                let rec = codec::weekly_goal_record(zone, &closed);
                match self.store.save(&rec, SavePolicy::CreateOnly).await {
                    Ok(_) | Err(StoreError::Conflict) => {}
                    Err(err) => return Err(err.into()),
                }
                computed
            }
        };

        let changed = self.cache.mutate(|s| {
            match s.weekly_goals.iter_mut().find(|g| g.id == goal.id) {
                // Write-once: never replace a result that is already set.
                Some(local) if local.result.is_none() => {
                    local.result = Some(final_result);
                    true
                }
                _ => false,
            }
        });

        tracing::info!(
            week_start = %goal.week_start,
            days_a,
            days_b,
            result = final_result.as_str(),
            "Settled week"
        );
        self.diagnostics.push(format!(
            "settled week {}: {} ({} vs goal {}, {} vs goal {})",
            goal.week_start,
            final_result.as_str(),
            days_a,
            goal.goal_user_a,
            days_b,
            goal.goal_user_b
        ));

        if changed && !suppress_notifications {
            self.notifier.notify(NotificationEvent::WeekResult {
                week_start: goal.week_start,
                result: final_result,
            });
        }
        Ok(())
    }

    fn adopt_goal(&self, goal: WeeklyGoal) {
        self.cache.mutate(|s| {
            if let Some(existing) = s
                .weekly_goals
                .iter_mut()
                .find(|g| g.week_start == goal.week_start)
            {
                let kept_result = existing.result;
                *existing = goal;
                if kept_result.is_some() {
                    existing.result = kept_result;
                }
            } else {
                s.weekly_goals.push(goal);
            }
            s.sort_goals();
        });
    }
}
