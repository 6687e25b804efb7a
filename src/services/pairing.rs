// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Pairing coordinator: group creation, invite-code handshake, and
//! partner-join polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cache::{apply_error_flags, LocalCache};
use crate::config::{Config, ZONE_PREFIX};
use crate::diagnostics::DiagnosticsLog;
use crate::error::{Result, SyncError};
use crate::local_state::LocalStateStore;
use crate::models::{Pair, UserProfile, WeeklyGoal};
use crate::services::session::SharedSession;
use crate::services::sync::SyncEngine;
use crate::store::{
    codec, codec::invite_status, RecordKind, RemoteStore, SavePolicy, StoreError, ZoneHandle,
};
use crate::time_utils::start_of_week;

/// Human-typeable code alphabet; visually ambiguous characters excluded.
const INVITE_CODE_CHARACTERS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const INVITE_CODE_LENGTH: usize = 6;
const RESERVE_ATTEMPTS: usize = 20;
const MEMBER_QUERY_LIMIT: usize = 10;
const GOAL_QUERY_LIMIT: usize = 100;

/// Stable member id derived from the device's account credential, so
/// re-running setup on the same account reuses one identity instead of
/// minting duplicates.
pub(crate) fn stable_member_id(account_identity: &str) -> Uuid {
    let digest = Sha256::digest(account_identity.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

pub struct PairingService {
    config: Config,
    store: Arc<dyn RemoteStore>,
    cache: Arc<LocalCache>,
    local_state: Arc<dyn LocalStateStore>,
    session: SharedSession,
    sync: Arc<SyncEngine>,
    diagnostics: Arc<DiagnosticsLog>,
}

impl PairingService {
    pub(crate) fn new(
        config: Config,
        store: Arc<dyn RemoteStore>,
        cache: Arc<LocalCache>,
        local_state: Arc<dyn LocalStateStore>,
        session: SharedSession,
        sync: Arc<SyncEngine>,
        diagnostics: Arc<DiagnosticsLog>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            local_state,
            session,
            sync,
            diagnostics,
        }
    }

    /// Create the group zone, records, sharing grant, and invite code.
    ///
    /// There is no compensating rollback: a failure partway leaves the
    /// reserved invite code to expire on its own and a fresh call allocates
    /// a new zone.
    pub async fn create_group(&self, display_name: &str, weekly_goal: u8) -> Result<String> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(SyncError::GroupCreationFailed);
        }
        self.diagnostics
            .push(format!("create_group: name={name}, goal={weekly_goal}"));

        let group_id = Uuid::new_v4();
        let zone_name = format!("{}{}", ZONE_PREFIX, group_id);

        let identity = self.store.account_identity().await.ok().flatten();
        let my_member_id = identity
            .as_deref()
            .map(stable_member_id)
            .unwrap_or_else(Uuid::new_v4);
        if let Some(identity) = &identity {
            let digest = Sha256::digest(identity.as_bytes());
            self.diagnostics.push(format!(
                "create_group: derived member id from account digest {}",
                hex::encode(&digest[..4])
            ));
        }

        let invite_code = self.reserve_invite_code().await?;
        self.diagnostics
            .push(format!("create_group: reserved invite code {invite_code}"));

        let zone = self.store.create_zone(&zone_name).await?;

        let pair = Pair {
            id: group_id,
            user_a_id: my_member_id,
            user_b_id: Uuid::nil(),
            week_start_day: 1,
            invite_code: invite_code.clone(),
            created_at: Utc::now(),
        };
        self.store
            .save(&codec::group_record(&zone, &pair), SavePolicy::CreateOnly)
            .await?;

        let me = UserProfile {
            id: my_member_id,
            pair_id: group_id,
            display_name: name.to_string(),
            weekly_goal,
            timezone: self.config.timezone.clone(),
        };
        self.store
            .save(
                &codec::member_record(&zone, &me, "owner", identity.as_deref()),
                SavePolicy::CreateOnly,
            )
            .await?;

        let share = self.store.create_share(&zone).await?;
        self.diagnostics.push("create_group: created sharing grant");

        // Publish the share URL onto the reserved code and flip it active.
        let mut code_rec = self
            .store
            .get(&ZoneHandle::public(), &invite_code)
            .await?
            .ok_or(SyncError::GroupCreationFailed)?;
        code_rec
            .set("shareURL", share.url.clone())
            .set("creatorName", name.to_string())
            .set("status", invite_status::ACTIVE);
        self.store.save(&code_rec, SavePolicy::Overwrite).await?;
        self.diagnostics.push("create_group: invite code published");

        // Initial weekly goal; both slots default to the creator's goal
        // until the partner joins with their own.
        let week_start = start_of_week(chrono::Local::now().date_naive(), pair.week_start_day);
        let goal = WeeklyGoal {
            id: Uuid::new_v4(),
            pair_id: group_id,
            week_start,
            goal_user_a: weekly_goal,
            goal_user_b: weekly_goal,
            wager_text: String::new(),
            result: None,
        };
        self.store
            .save(&codec::weekly_goal_record(&zone, &goal), SavePolicy::CreateOnly)
            .await?;

        {
            let mut session = self.session.write().unwrap();
            session.zone = Some(zone);
            session.my_member_id = Some(my_member_id);
            session.member_count = 1;
        }
        self.cache.mutate(|s| {
            s.current_user = me.clone();
            s.partner = UserProfile::waiting_partner(&me);
            s.pair = pair;
            s.weekly_goals = vec![goal];
            s.workouts.clear();
            s.nudges.clear();
            s.has_group = false;
        });

        // Durable so the waiting screen survives a restart.
        self.local_state.set_pending_invite_code(&invite_code);

        tracing::info!(group = %group_id, "Group created; waiting for partner");
        self.diagnostics.push("create_group: success, waiting for partner");
        Ok(invite_code)
    }

    /// Redeem an invite code and bind this device into the shared zone.
    pub async fn join_group(
        &self,
        code: &str,
        display_name: &str,
        weekly_goal: u8,
    ) -> Result<()> {
        let code = code.trim().to_uppercase();
        let name = display_name.trim();
        if code.is_empty() || name.is_empty() {
            return Err(SyncError::InviteCodeNotFound);
        }
        self.diagnostics
            .push(format!("join_group: code={code}, name={name}"));

        let mut code_rec = self
            .store
            .get(&ZoneHandle::public(), &code)
            .await?
            .ok_or(SyncError::InviteCodeNotFound)?;
        if code_rec.str_field("status") != Some(invite_status::ACTIVE) {
            return Err(SyncError::InviteCodeNotFound);
        }
        let expires_at = codec::invite_expires_at(&code_rec).ok_or(SyncError::InviteCodeNotFound)?;
        if expires_at <= Utc::now() {
            return Err(SyncError::InviteCodeExpired);
        }
        self.diagnostics
            .push(format!("join_group: code valid until {expires_at}"));

        let share_url = code_rec
            .str_field("shareURL")
            .ok_or(SyncError::ShareAcceptFailed)?
            .to_string();

        let metadata = self
            .store
            .resolve_share(&share_url)
            .await
            .map_err(share_error)?;
        let zone = self
            .store
            .accept_share(&metadata)
            .await
            .map_err(share_error)?;
        self.diagnostics
            .push(format!("join_group: accepted share into zone {}", zone.name));

        let group_record_id = zone
            .name
            .strip_prefix(ZONE_PREFIX)
            .unwrap_or(&zone.name)
            .to_string();
        let mut group_rec = self
            .store
            .get(&zone, &group_record_id)
            .await?
            .ok_or(SyncError::ShareAcceptFailed)?;
        let pair = codec::pair_from_record(&group_rec);

        let identity = self.store.account_identity().await.ok().flatten();
        let my_member_id = identity
            .as_deref()
            .map(stable_member_id)
            .unwrap_or_else(Uuid::new_v4);

        // Upsert keyed by the stable identity: a re-join after a crash
        // updates the existing member record in place.
        let me = UserProfile {
            id: my_member_id,
            pair_id: pair.id,
            display_name: name.to_string(),
            weekly_goal,
            timezone: self.config.timezone.clone(),
        };
        self.store
            .save(
                &codec::member_record(&zone, &me, "member", identity.as_deref()),
                SavePolicy::Overwrite,
            )
            .await?;
        self.diagnostics.push("join_group: member record upserted");

        // Claim the B slot unless a different partner already holds it.
        if pair.user_b_id.is_nil() || pair.user_b_id == pair.user_a_id {
            group_rec.set("userBId", my_member_id.to_string());
            match self.store.save(&group_rec, SavePolicy::IfUnchanged).await {
                Ok(_) => {}
                Err(StoreError::Conflict) => {
                    let current = self
                        .store
                        .get(&zone, &group_record_id)
                        .await?
                        .ok_or(SyncError::ShareAcceptFailed)?;
                    let current_pair = codec::pair_from_record(&current);
                    if current_pair.user_b_id.is_nil()
                        || current_pair.user_b_id == current_pair.user_a_id
                    {
                        let mut retry = current;
                        retry.set("userBId", my_member_id.to_string());
                        self.store.save(&retry, SavePolicy::Overwrite).await?;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.propagate_joiner_goal(&zone, &pair, my_member_id, weekly_goal)
            .await?;

        // Terminal state; the code must not be reusable.
        code_rec
            .set("status", invite_status::ACCEPTED)
            .set("acceptedAt", Utc::now().to_rfc3339());
        self.store.save(&code_rec, SavePolicy::Overwrite).await?;
        self.diagnostics.push("join_group: invite code marked accepted");

        {
            let mut session = self.session.write().unwrap();
            session.zone = Some(zone);
            session.my_member_id = Some(my_member_id);
        }
        self.sync.full_resync().await?;

        let members = self.session.read().unwrap().member_count;
        self.cache.mutate(|s| s.has_group = members >= 2);
        tracing::info!(members, "Joined group");
        self.diagnostics
            .push(format!("join_group: success, members={members}"));
        Ok(())
    }

    /// Write the joiner's weekly goal into the open week's slot.
    async fn propagate_joiner_goal(
        &self,
        zone: &ZoneHandle,
        pair: &Pair,
        joiner_id: Uuid,
        weekly_goal: u8,
    ) -> Result<()> {
        let goals = self.store.query(zone, RecordKind::WeeklyGoal, GOAL_QUERY_LIMIT).await?;
        let open = goals
            .into_iter()
            .map(|rec| {
                let parsed = codec::weekly_goal_from_record(&rec, pair.id);
                (rec, parsed)
            })
            .filter(|(_, g)| g.is_open())
            .max_by_key(|(_, g)| g.week_start);

        if let Some((mut rec, _)) = open {
            let field = if pair.user_a_id == joiner_id {
                "goalUserA"
            } else {
                "goalUserB"
            };
            rec.set(field, i64::from(weekly_goal));
            self.store.save(&rec, SavePolicy::Overwrite).await?;
        }
        Ok(())
    }

    /// One partner-presence probe. Returns true once the group is ready.
    pub async fn check_for_partner(&self) -> bool {
        let Some(zone) = self.session.read().unwrap().zone.clone() else {
            return false;
        };

        let members = match self.store.query(&zone, RecordKind::Member, MEMBER_QUERY_LIMIT).await {
            Ok(members) => members,
            Err(err) => {
                let err: SyncError = err.into();
                self.cache.mutate(|s| apply_error_flags(s, &err));
                self.diagnostics
                    .push(format!("check_for_partner failed: {err}"));
                return false;
            }
        };

        self.session.write().unwrap().member_count = members.len();
        if members.len() < 2 {
            tracing::debug!(members = members.len(), "Still waiting for partner");
            return false;
        }

        if let Err(err) = self.sync.full_resync().await {
            self.cache.mutate(|s| apply_error_flags(s, &err));
            self.diagnostics
                .push(format!("partner refresh failed: {err}"));
            return false;
        }
        self.cache.mutate(|s| s.has_group = true);
        self.local_state.clear_pending_invite_code();
        self.diagnostics.push("check_for_partner: partner joined");
        true
    }

    /// Poll until the partner joins or `cancel` flips; checks the flag
    /// cooperatively at each iteration.
    pub async fn poll_for_partner(&self, cancel: &AtomicBool) -> bool {
        loop {
            if cancel.load(Ordering::Acquire) {
                tracing::debug!("Partner poll cancelled");
                return false;
            }
            if self.check_for_partner().await {
                return true;
            }
            tokio::time::sleep(self.config.partner_poll_interval).await;
        }
    }

    /// Reserve a globally unique code via create-only insert into the public
    /// namespace; collisions retry with a fresh code.
    async fn reserve_invite_code(&self) -> Result<String> {
        let ttl = Duration::hours(self.config.invite_code_ttl_hours);
        for _ in 0..RESERVE_ATTEMPTS {
            let code = generate_invite_code();
            let rec = codec::invite_code_record(&code, Utc::now() + ttl);
            match self.store.save(&rec, SavePolicy::CreateOnly).await {
                Ok(_) => return Ok(code),
                Err(StoreError::Conflict) => {
                    tracing::debug!(code = %code, "Invite code collision; retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.diagnostics.push("reserve_invite_code: exhausted attempts");
        Err(SyncError::GroupCreationFailed)
    }
}

fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LENGTH)
        .map(|_| INVITE_CODE_CHARACTERS[rng.gen_range(0..INVITE_CODE_CHARACTERS.len())] as char)
        .collect()
}

/// Share resolution/acceptance failures surface as `ShareAcceptFailed`
/// except where the taxonomy already has a sharper variant.
fn share_error(err: StoreError) -> SyncError {
    match err {
        StoreError::Network => SyncError::NetworkUnavailable,
        StoreError::NotAuthenticated => SyncError::NotAuthenticated,
        StoreError::QuotaExceeded => SyncError::QuotaExceeded,
        _ => SyncError::ShareAcceptFailed,
    }
}
