// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Weekly goal lifecycle: race-tolerant creation, settlement, write-once.

mod common;

use chrono::{Duration, Utc};
use common::{paired_devices, zone_name, TestDevice};
use sweatpact::models::{WeekResult, WeeklyGoal, Workout};
use sweatpact::notify::NotificationEvent;
use sweatpact::store::{codec, RecordKind, RemoteStore, SavePolicy, ZoneHandle, ZoneScope};
use sweatpact::time_utils::start_of_week;
use uuid::Uuid;

fn group_zone(device: &TestDevice) -> ZoneHandle {
    ZoneHandle::new(zone_name(device), ZoneScope::Private)
}

fn current_week_start(device: &TestDevice) -> chrono::NaiveDate {
    start_of_week(
        chrono::Local::now().date_naive(),
        device.client.get_pair().week_start_day,
    )
}

/// Store an open goal for the previous week directly in the zone.
async fn seed_past_week(
    device: &TestDevice,
    goal_a: u8,
    goal_b: u8,
    wager: &str,
) -> WeeklyGoal {
    let pair = device.client.get_pair();
    let goal = WeeklyGoal {
        id: Uuid::new_v4(),
        pair_id: pair.id,
        week_start: current_week_start(device) - Duration::days(7),
        goal_user_a: goal_a,
        goal_user_b: goal_b,
        wager_text: wager.to_string(),
        result: None,
    };
    let zone = group_zone(device);
    device
        .store
        .save(&codec::weekly_goal_record(&zone, &goal), SavePolicy::CreateOnly)
        .await
        .unwrap();
    goal
}

/// Store a workout attributed to the given goal and calendar day.
async fn seed_workout(device: &TestDevice, user_id: Uuid, goal: &WeeklyGoal, day_offset: i64) {
    let workout = Workout {
        id: Uuid::new_v4(),
        user_id,
        pair_id: goal.pair_id,
        weekly_goal_id: goal.id,
        photo_data: None,
        photo_record_id: None,
        caption: None,
        logged_at: Utc::now(),
        workout_date: goal.week_start + Duration::days(day_offset),
    };
    let zone = group_zone(device);
    device
        .store
        .save(&codec::workout_record(&zone, &workout), SavePolicy::CreateOnly)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_owner_settles_expired_week() {
    let (owner, _joiner, _code) = paired_devices().await;
    let pair = owner.client.get_pair();

    // A hits 2/2, B logs only 1 of 2.
    let past = seed_past_week(&owner, 2, 2, "Loser buys sushi").await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;
    seed_workout(&owner, pair.user_a_id, &past, 2).await;
    seed_workout(&owner, pair.user_b_id, &past, 1).await;

    owner.client.perform_delta_sync().await.unwrap();

    let settled = owner.client.get_past_weeks();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].result, Some(WeekResult::BOwes));

    // The settlement fired a notification (not the first sync).
    assert!(owner.notifier.events().iter().any(|e| matches!(
        e,
        NotificationEvent::WeekResult { result: WeekResult::BOwes, .. }
    )));
}

#[tokio::test]
async fn test_same_day_logs_count_once_toward_settlement() {
    let (owner, _joiner, _code) = paired_devices().await;
    let pair = owner.client.get_pair();

    // A logs three times on one day against a 2-day goal: still 1 day.
    let past = seed_past_week(&owner, 2, 1, "wager").await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;
    seed_workout(&owner, pair.user_b_id, &past, 0).await;

    owner.client.perform_delta_sync().await.unwrap();

    let settled = owner.client.get_past_weeks();
    assert_eq!(settled[0].result, Some(WeekResult::AOwes));
}

#[tokio::test]
async fn test_non_owner_does_not_settle() {
    let (owner, joiner, _code) = paired_devices().await;
    let pair = owner.client.get_pair();

    let past = seed_past_week(&owner, 1, 1, "wager").await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;

    // Only the joiner syncs; the result must stay unwritten remotely.
    joiner.client.perform_delta_sync().await.unwrap();

    let zone = group_zone(&owner);
    let record_id = WeeklyGoal::record_id(pair.id, past.week_start);
    let rec = owner.store.get(&zone, &record_id).await.unwrap().unwrap();
    assert!(rec.str_field("result").is_none());

    // Once the owner syncs, it settles, and the joiner adopts via sync.
    owner.client.perform_delta_sync().await.unwrap();
    joiner.client.perform_delta_sync().await.unwrap();
    let theirs = joiner.client.get_past_weeks();
    assert_eq!(theirs[0].result, Some(WeekResult::BOwes));
}

#[tokio::test]
async fn test_settlement_adopts_existing_remote_result() {
    let (owner, _joiner, _code) = paired_devices().await;
    let pair = owner.client.get_pair();

    // Both would hit, but the partner's device already settled differently;
    // the existing remote value wins.
    let past = seed_past_week(&owner, 1, 1, "wager").await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;
    seed_workout(&owner, pair.user_b_id, &past, 0).await;

    let zone = group_zone(&owner);
    let record_id = WeeklyGoal::record_id(pair.id, past.week_start);
    let mut rec = owner.store.get(&zone, &record_id).await.unwrap().unwrap();
    rec.set("result", "both_missed");
    owner.store.save(&rec, SavePolicy::Overwrite).await.unwrap();

    owner.client.perform_delta_sync().await.unwrap();

    let settled = owner.client.get_past_weeks();
    assert_eq!(settled[0].result, Some(WeekResult::BothMissed));
}

#[tokio::test]
async fn test_result_is_write_once_against_later_syncs() {
    let (owner, _joiner, _code) = paired_devices().await;
    let pair = owner.client.get_pair();

    let past = seed_past_week(&owner, 2, 2, "wager").await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;
    seed_workout(&owner, pair.user_a_id, &past, 1).await;
    owner.client.perform_delta_sync().await.unwrap();
    assert_eq!(
        owner.client.get_past_weeks()[0].result,
        Some(WeekResult::BOwes)
    );

    // A rogue write flips the remote value; the local result must not move.
    let zone = group_zone(&owner);
    let record_id = WeeklyGoal::record_id(pair.id, past.week_start);
    let mut rec = owner.store.get(&zone, &record_id).await.unwrap().unwrap();
    rec.set("result", "both_hit");
    owner.store.save(&rec, SavePolicy::Overwrite).await.unwrap();

    owner.client.perform_delta_sync().await.unwrap();
    assert_eq!(
        owner.client.get_past_weeks()[0].result,
        Some(WeekResult::BOwes)
    );
}

#[tokio::test]
async fn test_concurrent_week_creation_converges() {
    let (owner, joiner, _code) = paired_devices().await;
    let pair = owner.client.get_pair();
    let zone = group_zone(&owner);
    let week_start = current_week_start(&owner);

    // Remove the current week so both devices race to recreate it.
    let record_id = WeeklyGoal::record_id(pair.id, week_start);
    owner.store.delete(&zone, &record_id).await.unwrap();

    let (a, b) = tokio::join!(
        owner.client.perform_delta_sync(),
        joiner.client.perform_delta_sync()
    );
    a.unwrap();
    b.unwrap();

    // Exactly one record for the week exists, and both devices converge on
    // the same goal.
    assert_eq!(
        owner.store.record_count(&zone.name, RecordKind::WeeklyGoal),
        1
    );
    let wa = owner.client.get_current_week();
    let wb = joiner.client.get_current_week();
    assert_eq!(wa.week_start, week_start);
    assert_eq!(wb.week_start, week_start);
    // Late deltas propagate the winner everywhere.
    owner.client.perform_delta_sync().await.unwrap();
    joiner.client.perform_delta_sync().await.unwrap();
    assert_eq!(
        owner.client.get_current_week().id,
        joiner.client.get_current_week().id
    );
}

#[tokio::test]
async fn test_new_week_carries_forward_goals_and_wager() {
    let (owner, _joiner, _code) = paired_devices().await;
    let pair = owner.client.get_pair();
    let zone = group_zone(&owner);
    let week_start = current_week_start(&owner);

    // Leave only a closed past week behind, then let the lifecycle rebuild
    // the current one.
    let record_id = WeeklyGoal::record_id(pair.id, week_start);
    owner.store.delete(&zone, &record_id).await.unwrap();

    let past = seed_past_week(&owner, 2, 2, "Loser does the dishes").await;
    seed_workout(&owner, pair.user_a_id, &past, 0).await;

    owner.client.perform_delta_sync().await.unwrap();

    let week = owner.client.get_current_week();
    assert_eq!(week.week_start, week_start);
    assert!(week.is_open());
    // Owner committed 4 at creation, joiner joined with 3.
    assert_eq!(week.goal_user_a, 4);
    assert_eq!(week.goal_user_b, 3);
    assert_eq!(week.wager_text, "Loser does the dishes");
}

#[tokio::test]
async fn test_repeated_ensure_is_a_noop() {
    let (owner, _joiner, _code) = paired_devices().await;
    let zone = group_zone(&owner);

    let (a, b) = tokio::join!(
        owner.client.ensure_current_week_goal(),
        owner.client.ensure_current_week_goal()
    );
    a.unwrap();
    b.unwrap();
    owner.client.ensure_current_week_goal().await.unwrap();

    assert_eq!(
        owner.store.record_count(&zone.name, RecordKind::WeeklyGoal),
        1
    );
}
