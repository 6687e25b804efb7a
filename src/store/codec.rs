// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Record ↔ domain model mapping.
//!
//! Wire field names are fixed so both devices, and any importer of old data,
//! agree on the schema. Parsing is lenient: a malformed or missing field
//! falls back to a sensible default instead of failing the whole sync pass.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{Nudge, Pair, UserProfile, WeekResult, WeeklyGoal, Workout};
use crate::store::record::{RecordKind, RemoteRecord, ZoneHandle};

/// Invite-code record statuses.
pub mod invite_status {
    pub const PENDING: &str = "pending";
    pub const ACTIVE: &str = "active";
    pub const ACCEPTED: &str = "accepted";
}

const DEFAULT_WEEKLY_GOAL: u8 = 4;

fn uuid_field(rec: &RemoteRecord, key: &str) -> Option<Uuid> {
    rec.str_field(key).and_then(|s| Uuid::parse_str(s).ok())
}

fn date_field(rec: &RemoteRecord, key: &str) -> Option<NaiveDate> {
    rec.str_field(key)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn datetime_field(rec: &RemoteRecord, key: &str) -> Option<DateTime<Utc>> {
    rec.str_field(key)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn goal_days(rec: &RemoteRecord, key: &str) -> u8 {
    rec.int_field(key)
        .and_then(|v| u8::try_from(v).ok())
        .filter(|v| (1..=7).contains(v))
        .unwrap_or(DEFAULT_WEEKLY_GOAL)
}

// ─── Group ───────────────────────────────────────────────────────────

pub fn group_record(zone: &ZoneHandle, pair: &Pair) -> RemoteRecord {
    let mut rec = RemoteRecord::new(zone.clone(), RecordKind::Group, pair.id.to_string());
    rec.set("userAId", pair.user_a_id.to_string())
        .set(
            "userBId",
            if pair.user_b_id.is_nil() {
                String::new()
            } else {
                pair.user_b_id.to_string()
            },
        )
        .set("weekStartDay", i64::from(pair.week_start_day))
        .set("inviteCode", pair.invite_code.clone())
        .set("maxMembers", 2);
    rec
}

pub fn pair_from_record(rec: &RemoteRecord) -> Pair {
    let user_a = uuid_field(rec, "userAId").unwrap_or_else(Uuid::new_v4);
    let user_b = uuid_field(rec, "userBId").unwrap_or(Uuid::nil());
    Pair {
        id: Uuid::parse_str(&rec.id).unwrap_or_else(|_| Uuid::new_v4()),
        user_a_id: user_a,
        user_b_id: user_b,
        week_start_day: rec
            .int_field("weekStartDay")
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| (1..=7).contains(v))
            .unwrap_or(1),
        invite_code: rec.str_field("inviteCode").unwrap_or_default().to_string(),
        created_at: rec.created_at.unwrap_or_else(Utc::now),
    }
}

// ─── Member ──────────────────────────────────────────────────────────

pub fn member_record(
    zone: &ZoneHandle,
    profile: &UserProfile,
    role: &str,
    account_identity: Option<&str>,
) -> RemoteRecord {
    let mut rec = RemoteRecord::new(zone.clone(), RecordKind::Member, profile.id.to_string());
    rec.set("groupRef", profile.pair_id.to_string())
        .set("displayName", profile.display_name.clone())
        .set("weeklyGoal", i64::from(profile.weekly_goal))
        .set("role", role.to_string())
        .set("timezone", profile.timezone.clone())
        .set("joinedAt", Utc::now().to_rfc3339());
    if let Some(identity) = account_identity {
        rec.set("userRecordName", identity.to_string());
    }
    rec
}

pub fn profile_from_record(rec: &RemoteRecord, fallback_pair_id: Uuid) -> UserProfile {
    UserProfile {
        id: Uuid::parse_str(&rec.id).unwrap_or_else(|_| Uuid::new_v4()),
        pair_id: uuid_field(rec, "groupRef").unwrap_or(fallback_pair_id),
        display_name: rec.str_field("displayName").unwrap_or("Unknown").to_string(),
        weekly_goal: goal_days(rec, "weeklyGoal"),
        timezone: rec.str_field("timezone").unwrap_or("UTC").to_string(),
    }
}

/// The account credential a member record was created under, when present.
pub fn member_account_identity(rec: &RemoteRecord) -> Option<&str> {
    rec.str_field("userRecordName")
}

// ─── WeeklyGoal ──────────────────────────────────────────────────────

pub fn weekly_goal_record(zone: &ZoneHandle, goal: &WeeklyGoal) -> RemoteRecord {
    let mut rec = RemoteRecord::new(
        zone.clone(),
        RecordKind::WeeklyGoal,
        WeeklyGoal::record_id(goal.pair_id, goal.week_start),
    );
    rec.set("weeklyGoalId", goal.id.to_string())
        .set("groupRef", goal.pair_id.to_string())
        .set("weekStart", goal.week_start.format("%Y-%m-%d").to_string())
        .set("goalUserA", i64::from(goal.goal_user_a))
        .set("goalUserB", i64::from(goal.goal_user_b))
        .set("wagerText", goal.wager_text.clone());
    if let Some(result) = goal.result {
        rec.set("result", result.as_str());
    }
    rec
}

pub fn weekly_goal_from_record(rec: &RemoteRecord, fallback_pair_id: Uuid) -> WeeklyGoal {
    WeeklyGoal {
        id: uuid_field(rec, "weeklyGoalId").unwrap_or_else(Uuid::new_v4),
        pair_id: uuid_field(rec, "groupRef").unwrap_or(fallback_pair_id),
        week_start: date_field(rec, "weekStart").unwrap_or_else(|| Utc::now().date_naive()),
        goal_user_a: goal_days(rec, "goalUserA"),
        goal_user_b: goal_days(rec, "goalUserB"),
        wager_text: rec.str_field("wagerText").unwrap_or_default().to_string(),
        result: rec.str_field("result").and_then(WeekResult::parse),
    }
}

// ─── Workout ─────────────────────────────────────────────────────────

pub fn workout_record(zone: &ZoneHandle, workout: &Workout) -> RemoteRecord {
    let mut rec = RemoteRecord::new(zone.clone(), RecordKind::Workout, workout.id.to_string());
    rec.set("memberRef", workout.user_id.to_string())
        .set("groupRef", workout.pair_id.to_string())
        .set("weeklyGoalRef", workout.weekly_goal_id.to_string())
        .set("loggedAt", workout.logged_at.to_rfc3339())
        .set(
            "workoutDate",
            workout.workout_date.format("%Y-%m-%d").to_string(),
        );
    if let Some(caption) = &workout.caption {
        rec.set("caption", caption.clone());
    }
    rec.asset = workout.photo_data.clone();
    rec
}

pub fn workout_from_record(rec: &RemoteRecord, fallback_pair_id: Uuid) -> Workout {
    let logged_at = datetime_field(rec, "loggedAt").unwrap_or_else(Utc::now);
    Workout {
        id: Uuid::parse_str(&rec.id).unwrap_or_else(|_| Uuid::new_v4()),
        user_id: uuid_field(rec, "memberRef").unwrap_or(Uuid::nil()),
        pair_id: uuid_field(rec, "groupRef").unwrap_or(fallback_pair_id),
        weekly_goal_id: uuid_field(rec, "weeklyGoalRef").unwrap_or(Uuid::nil()),
        photo_data: rec.asset.clone(),
        photo_record_id: Some(rec.id.clone()),
        caption: rec.str_field("caption").map(str::to_string),
        logged_at,
        workout_date: date_field(rec, "workoutDate").unwrap_or_else(|| logged_at.date_naive()),
    }
}

// ─── Nudge ───────────────────────────────────────────────────────────

pub fn nudge_record(zone: &ZoneHandle, nudge: &Nudge) -> RemoteRecord {
    let mut rec = RemoteRecord::new(zone.clone(), RecordKind::Nudge, nudge.id.to_string());
    rec.set("senderRef", nudge.sender_id.to_string())
        .set("groupRef", nudge.pair_id.to_string())
        .set("message", nudge.message.clone())
        .set("sentAt", nudge.sent_at.to_rfc3339());
    rec
}

pub fn nudge_from_record(rec: &RemoteRecord, fallback_pair_id: Uuid) -> Nudge {
    Nudge {
        id: Uuid::parse_str(&rec.id).unwrap_or_else(|_| Uuid::new_v4()),
        sender_id: uuid_field(rec, "senderRef").unwrap_or(Uuid::nil()),
        pair_id: uuid_field(rec, "groupRef").unwrap_or(fallback_pair_id),
        message: rec.str_field("message").unwrap_or_default().to_string(),
        sent_at: datetime_field(rec, "sentAt").unwrap_or_else(Utc::now),
    }
}

// ─── InviteCode ──────────────────────────────────────────────────────

pub fn invite_code_record(code: &str, expires_at: DateTime<Utc>) -> RemoteRecord {
    let mut rec = RemoteRecord::new(ZoneHandle::public(), RecordKind::InviteCode, code);
    rec.set("code", code.to_string())
        .set("status", invite_status::PENDING)
        .set("expiresAt", expires_at.to_rfc3339());
    rec
}

pub fn invite_expires_at(rec: &RemoteRecord) -> Option<DateTime<Utc>> {
    datetime_field(rec, "expiresAt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::ZoneScope;

    fn test_zone() -> ZoneHandle {
        ZoneHandle::new("SweatpactGroup_test", ZoneScope::Private)
    }

    #[test]
    fn test_pair_round_trip() {
        let pair = Pair {
            id: Uuid::new_v4(),
            user_a_id: Uuid::new_v4(),
            user_b_id: Uuid::nil(),
            week_start_day: 3,
            invite_code: "ABC234".to_string(),
            created_at: Utc::now(),
        };
        let rec = group_record(&test_zone(), &pair);
        let parsed = pair_from_record(&rec);

        assert_eq!(parsed.id, pair.id);
        assert_eq!(parsed.user_a_id, pair.user_a_id);
        // Empty userBId parses back to nil until a partner joins.
        assert!(parsed.user_b_id.is_nil());
        assert_eq!(parsed.week_start_day, 3);
        assert_eq!(parsed.invite_code, "ABC234");
    }

    #[test]
    fn test_weekly_goal_result_omitted_while_open() {
        let goal = WeeklyGoal {
            id: Uuid::new_v4(),
            pair_id: Uuid::new_v4(),
            week_start: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            goal_user_a: 4,
            goal_user_b: 5,
            wager_text: "Loser buys sushi".to_string(),
            result: None,
        };
        let rec = weekly_goal_record(&test_zone(), &goal);
        assert!(rec.str_field("result").is_none());

        let parsed = weekly_goal_from_record(&rec, goal.pair_id);
        assert_eq!(parsed.id, goal.id);
        assert_eq!(parsed.week_start, goal.week_start);
        assert_eq!(parsed.goal_user_b, 5);
        assert!(parsed.result.is_none());
    }

    #[test]
    fn test_weekly_goal_out_of_range_days_fall_back() {
        let goal = WeeklyGoal {
            id: Uuid::new_v4(),
            pair_id: Uuid::new_v4(),
            week_start: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            goal_user_a: 4,
            goal_user_b: 4,
            wager_text: String::new(),
            result: Some(WeekResult::AOwes),
        };
        let mut rec = weekly_goal_record(&test_zone(), &goal);
        rec.set("goalUserA", 99);
        let parsed = weekly_goal_from_record(&rec, goal.pair_id);
        assert_eq!(parsed.goal_user_a, DEFAULT_WEEKLY_GOAL);
        assert_eq!(parsed.result, Some(WeekResult::AOwes));
    }

    #[test]
    fn test_workout_round_trip_keeps_asset_and_dates() {
        let workout = Workout {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            pair_id: Uuid::new_v4(),
            weekly_goal_id: Uuid::new_v4(),
            photo_data: Some(vec![1, 2, 3]),
            photo_record_id: None,
            caption: Some("Leg day".to_string()),
            logged_at: "2026-08-05T02:30:00Z".parse().unwrap(),
            workout_date: NaiveDate::from_ymd_opt(2026, 8, 4).unwrap(),
        };
        let rec = workout_record(&test_zone(), &workout);
        let parsed = workout_from_record(&rec, workout.pair_id);

        assert_eq!(parsed.id, workout.id);
        assert_eq!(parsed.photo_data, Some(vec![1, 2, 3]));
        assert_eq!(parsed.photo_record_id, Some(workout.id.to_string()));
        assert_eq!(parsed.caption.as_deref(), Some("Leg day"));
        assert_eq!(parsed.logged_at, workout.logged_at);
        // workout_date survives independently of logged_at's calendar day.
        assert_eq!(parsed.workout_date, workout.workout_date);
    }

    #[test]
    fn test_change_feed_projection_lacks_photo_bytes() {
        let workout = Workout {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            pair_id: Uuid::new_v4(),
            weekly_goal_id: Uuid::new_v4(),
            photo_data: Some(vec![9; 16]),
            photo_record_id: None,
            caption: None,
            logged_at: Utc::now(),
            workout_date: Utc::now().date_naive(),
        };
        let rec = workout_record(&test_zone(), &workout).without_asset();
        let parsed = workout_from_record(&rec, workout.pair_id);
        assert!(parsed.photo_data.is_none());
        assert_eq!(parsed.photo_record_id, Some(workout.id.to_string()));
    }
}
