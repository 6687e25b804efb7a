// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Pairing handshake: group creation, invite-code lifecycle, partner
//! detection.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{fresh_device, paired_devices, second_device};
use sweatpact::store::{RecordKind, RemoteStore, SavePolicy, ZoneHandle};
use sweatpact::SyncError;

#[tokio::test]
async fn test_create_group_returns_typeable_code_and_seeds_cache() {
    let owner = fresh_device("account-a");
    let code = owner.client.create_group("Sammy", 4).await.unwrap();

    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let pair = owner.client.get_pair();
    assert_eq!(pair.invite_code, code);
    assert!(!pair.has_partner());

    let me = owner.client.get_current_user();
    assert_eq!(me.display_name, "Sammy");
    assert_eq!(me.weekly_goal, 4);
    assert_eq!(pair.user_a_id, me.id);

    // The initial week exists with both slots defaulted to the creator's
    // goal, and the pending code survives for the waiting screen.
    let week = owner.client.get_current_week();
    assert_eq!(week.goal_user_a, 4);
    assert_eq!(week.goal_user_b, 4);
    assert!(week.is_open());
    assert_eq!(owner.client.pending_invite_code().as_deref(), Some(code.as_str()));
}

#[tokio::test]
async fn test_create_group_rejects_blank_name() {
    let owner = fresh_device("account-a");
    let err = owner.client.create_group("   ", 4).await.unwrap_err();
    assert!(matches!(err, SyncError::GroupCreationFailed));
}

#[tokio::test]
async fn test_join_propagates_goal_and_flips_ready() {
    let (owner, joiner, _code) = paired_devices().await;

    // Joiner occupies the B slot with their own goal.
    let pair = joiner.client.get_pair();
    assert!(pair.has_partner());
    let week = joiner.client.get_current_week();
    assert_eq!(week.goal_user_a, 4);
    assert_eq!(week.goal_user_b, 3);

    // Both sides see each other's names after the refresh.
    assert_eq!(joiner.client.get_partner().display_name, "Sammy");
    assert_eq!(owner.client.get_partner().display_name, "Jotta");
    assert!(owner.client.cache().read(|s| s.has_group));

    // Owner's pending invite code is cleared once the group is ready.
    assert!(owner.client.pending_invite_code().is_none());
}

#[tokio::test]
async fn test_join_unknown_code_fails_not_found() {
    let owner = fresh_device("account-a");
    owner.client.create_group("Sammy", 4).await.unwrap();

    let joiner = second_device(&owner, "account-b");
    let err = joiner
        .client
        .join_group("ZZZZZZ", "Jotta", 3)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InviteCodeNotFound));
}

#[tokio::test]
async fn test_join_normalizes_code_case_and_whitespace() {
    let owner = fresh_device("account-a");
    let code = owner.client.create_group("Sammy", 4).await.unwrap();

    let joiner = second_device(&owner, "account-b");
    let sloppy = format!("  {}  ", code.to_lowercase());
    joiner.client.join_group(&sloppy, "Jotta", 3).await.unwrap();
    assert!(joiner.client.get_pair().has_partner());
}

#[tokio::test]
async fn test_accepted_code_cannot_be_reused() {
    let (owner, _joiner, code) = paired_devices().await;

    let third = second_device(&owner, "account-c");
    let err = third
        .client
        .join_group(&code, "Intruder", 2)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InviteCodeNotFound));

    // The legitimate partner is untouched.
    let pair = owner.client.get_pair();
    assert_eq!(pair.user_b_id, owner.client.get_partner().id);
}

#[tokio::test]
async fn test_expired_code_fails_expired() {
    let owner = fresh_device("account-a");
    let code = owner.client.create_group("Sammy", 4).await.unwrap();

    // Age the invite record past its expiry.
    let public = ZoneHandle::public();
    let mut rec = owner.store.get(&public, &code).await.unwrap().unwrap();
    let past = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
    rec.set("expiresAt", past);
    owner.store.save(&rec, SavePolicy::Overwrite).await.unwrap();

    let joiner = second_device(&owner, "account-b");
    let err = joiner
        .client
        .join_group(&code, "Jotta", 3)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InviteCodeExpired));
}

#[tokio::test]
async fn test_rejoin_same_account_updates_member_in_place() {
    let owner = fresh_device("account-a");
    let code = owner.client.create_group("Sammy", 4).await.unwrap();

    let joiner = second_device(&owner, "account-b");
    joiner.client.join_group(&code, "Jotta", 3).await.unwrap();

    // Simulate a crash-and-retry join from the same account before the code
    // flips: re-activate the code and join again.
    let public = ZoneHandle::public();
    let mut rec = owner.store.get(&public, &code).await.unwrap().unwrap();
    rec.set("status", "active");
    owner.store.save(&rec, SavePolicy::Overwrite).await.unwrap();

    let retry = second_device(&owner, "account-b");
    retry.client.join_group(&code, "Jotta R", 5).await.unwrap();

    // The stable identity reused the member record instead of minting a
    // third member.
    let zone = common::zone_name(&owner);
    assert_eq!(owner.store.record_count(&zone, RecordKind::Member), 2);
}

#[tokio::test]
async fn test_check_for_partner_false_while_waiting() {
    let owner = fresh_device("account-a");
    owner.client.create_group("Sammy", 4).await.unwrap();

    assert!(!owner.client.check_for_partner().await);
    assert!(!owner.client.cache().read(|s| s.has_group));
    assert!(owner.client.pending_invite_code().is_some());
}

#[tokio::test]
async fn test_poll_for_partner_stops_on_cancel() {
    let owner = fresh_device("account-a");
    owner.client.create_group("Sammy", 4).await.unwrap();

    let cancel = Arc::new(AtomicBool::new(true));
    // Pre-cancelled: the loop must observe the flag and bail immediately.
    assert!(!owner.client.poll_for_partner(&cancel).await);
    assert!(cancel.load(Ordering::Acquire));
}
