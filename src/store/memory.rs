// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! In-memory remote store for tests and offline demo.
//!
//! One [`MemoryStore`] per device; multiple devices share a backend via
//! [`MemoryStore::client`], so two-writer races can be exercised in-process.
//! Fault injection (`set_offline`, `fail_next_write`, `expire_change_tokens`)
//! covers the failure paths the networked backend produces in the wild.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::store::record::{
    AccountStatus, ChangeBatch, ChangeToken, DeletedRecord, RecordKind, RemoteRecord, SavePolicy,
    ShareHandle, ShareMetadata, StoreError, ZoneHandle, ZoneScope,
};
use crate::store::RemoteStore;

/// Change-feed page size; small enough that tests exercise paging.
const CHANGE_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone)]
struct ChangeEntry {
    seq: u64,
    id: String,
    kind: RecordKind,
    deleted: bool,
}

#[derive(Debug, Default)]
struct ZoneState {
    owner: String,
    participants: HashSet<String>,
    records: HashMap<String, RemoteRecord>,
    log: Vec<ChangeEntry>,
    next_seq: u64,
    /// Tokens pointing below this sequence are expired.
    floor_seq: u64,
}

#[derive(Default)]
struct BackendState {
    zones: HashMap<String, ZoneState>,
    public_records: HashMap<String, RemoteRecord>,
    shares: HashMap<String, String>,
}

/// In-memory [`RemoteStore`] implementation.
pub struct MemoryStore {
    backend: Arc<Mutex<BackendState>>,
    account: String,
    status: Mutex<AccountStatus>,
    offline: AtomicBool,
    fail_next_write: Mutex<Option<StoreError>>,
}

impl MemoryStore {
    pub fn new(account: &str) -> Self {
        Self {
            backend: Arc::new(Mutex::new(BackendState::default())),
            account: account.to_string(),
            status: Mutex::new(AccountStatus::Available),
            offline: AtomicBool::new(false),
            fail_next_write: Mutex::new(None),
        }
    }

    /// A second device bound to the same backend under its own account.
    pub fn client(&self, account: &str) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            account: account.to_string(),
            status: Mutex::new(AccountStatus::Available),
            offline: AtomicBool::new(false),
            fail_next_write: Mutex::new(None),
        }
    }

    pub fn set_account_status(&self, status: AccountStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Simulate a dropped connection: every operation fails with `Network`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next save or delete fail with the given error.
    pub fn fail_next_write(&self, err: StoreError) {
        *self.fail_next_write.lock().unwrap() = Some(err);
    }

    /// Invalidate every change token handed out so far for a zone.
    pub fn expire_change_tokens(&self, zone_name: &str) {
        let mut backend = self.backend.lock().unwrap();
        if let Some(zone) = backend.zones.get_mut(zone_name) {
            zone.floor_seq = zone.next_seq;
        }
    }

    /// Number of stored records of one kind in a zone (test convenience).
    pub fn record_count(&self, zone_name: &str, kind: RecordKind) -> usize {
        let backend = self.backend.lock().unwrap();
        backend
            .zones
            .get(zone_name)
            .map(|z| z.records.values().filter(|r| r.kind == kind).count())
            .unwrap_or(0)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Network);
        }
        Ok(())
    }

    fn take_write_fault(&self) -> Result<(), StoreError> {
        if let Some(err) = self.fail_next_write.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }
}

fn apply_policy(
    existing: Option<&RemoteRecord>,
    record: &RemoteRecord,
    policy: SavePolicy,
) -> Result<i64, StoreError> {
    match (existing, policy) {
        (Some(_), SavePolicy::CreateOnly) => Err(StoreError::Conflict),
        (Some(cur), SavePolicy::IfUnchanged) if cur.version != record.version => {
            Err(StoreError::Conflict)
        }
        (Some(cur), _) => Ok(cur.version + 1),
        (None, _) => Ok(1),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn account_status(&self) -> Result<AccountStatus, StoreError> {
        self.check_online()?;
        Ok(*self.status.lock().unwrap())
    }

    async fn account_identity(&self) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        Ok(Some(self.account.clone()))
    }

    async fn discover_zone(
        &self,
        scope: ZoneScope,
        name_prefix: &str,
    ) -> Result<Option<ZoneHandle>, StoreError> {
        self.check_online()?;
        let backend = self.backend.lock().unwrap();
        let found = backend.zones.iter().find(|(name, zone)| {
            if !name.starts_with(name_prefix) {
                return false;
            }
            match scope {
                ZoneScope::Private => zone.owner == self.account,
                ZoneScope::Shared => {
                    zone.owner != self.account && zone.participants.contains(&self.account)
                }
                ZoneScope::Public => false,
            }
        });
        Ok(found.map(|(name, _)| ZoneHandle::new(name.clone(), scope)))
    }

    async fn create_zone(&self, name: &str) -> Result<ZoneHandle, StoreError> {
        self.check_online()?;
        let mut backend = self.backend.lock().unwrap();
        let zone = backend.zones.entry(name.to_string()).or_default();
        if zone.owner.is_empty() {
            zone.owner = self.account.clone();
            zone.participants.insert(self.account.clone());
            zone.next_seq = 1;
        } else if zone.owner != self.account {
            return Err(StoreError::Conflict);
        }
        Ok(ZoneHandle::new(name, ZoneScope::Private))
    }

    async fn create_share(&self, zone: &ZoneHandle) -> Result<ShareHandle, StoreError> {
        self.check_online()?;
        let mut backend = self.backend.lock().unwrap();
        if !backend.zones.contains_key(&zone.name) {
            return Err(StoreError::NotFound(zone.name.clone()));
        }
        let url = format!("sweatshare://{}", zone.name);
        backend.shares.insert(url.clone(), zone.name.clone());
        Ok(ShareHandle { url })
    }

    async fn resolve_share(&self, url: &str) -> Result<ShareMetadata, StoreError> {
        self.check_online()?;
        let backend = self.backend.lock().unwrap();
        let zone_name = backend
            .shares
            .get(url)
            .ok_or_else(|| StoreError::NotFound(url.to_string()))?;
        Ok(ShareMetadata {
            url: url.to_string(),
            zone_name: zone_name.clone(),
        })
    }

    async fn accept_share(&self, metadata: &ShareMetadata) -> Result<ZoneHandle, StoreError> {
        self.check_online()?;
        let mut backend = self.backend.lock().unwrap();
        let zone = backend
            .zones
            .get_mut(&metadata.zone_name)
            .ok_or_else(|| StoreError::NotFound(metadata.zone_name.clone()))?;
        zone.participants.insert(self.account.clone());
        Ok(ZoneHandle::new(metadata.zone_name.clone(), ZoneScope::Shared))
    }

    async fn get(
        &self,
        zone: &ZoneHandle,
        id: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        self.check_online()?;
        let backend = self.backend.lock().unwrap();
        if zone.scope == ZoneScope::Public {
            return Ok(backend.public_records.get(id).cloned());
        }
        Ok(backend
            .zones
            .get(&zone.name)
            .and_then(|z| z.records.get(id))
            .cloned())
    }

    async fn save(
        &self,
        record: &RemoteRecord,
        policy: SavePolicy,
    ) -> Result<RemoteRecord, StoreError> {
        self.check_online()?;
        self.take_write_fault()?;
        let mut backend = self.backend.lock().unwrap();

        if record.zone.scope == ZoneScope::Public {
            let next_version = apply_policy(backend.public_records.get(&record.id), record, policy)?;
            let mut stored = record.clone();
            stored.version = next_version;
            stored.created_at.get_or_insert_with(Utc::now);
            backend.public_records.insert(stored.id.clone(), stored.clone());
            return Ok(stored);
        }

        let zone = backend
            .zones
            .get_mut(&record.zone.name)
            .ok_or_else(|| StoreError::NotFound(record.zone.name.clone()))?;

        let next_version = apply_policy(zone.records.get(&record.id), record, policy)?;
        let mut stored = record.clone();
        stored.version = next_version;
        if let Some(existing) = zone.records.get(&record.id) {
            stored.created_at = existing.created_at;
        }
        stored.created_at.get_or_insert_with(Utc::now);

        let seq = zone.next_seq;
        zone.next_seq += 1;
        zone.log.push(ChangeEntry {
            seq,
            id: stored.id.clone(),
            kind: stored.kind,
            deleted: false,
        });
        zone.records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, zone: &ZoneHandle, id: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.take_write_fault()?;
        let mut backend = self.backend.lock().unwrap();

        if zone.scope == ZoneScope::Public {
            backend.public_records.remove(id);
            return Ok(());
        }

        let zone_state = backend
            .zones
            .get_mut(&zone.name)
            .ok_or_else(|| StoreError::NotFound(zone.name.clone()))?;
        if let Some(removed) = zone_state.records.remove(id) {
            let seq = zone_state.next_seq;
            zone_state.next_seq += 1;
            zone_state.log.push(ChangeEntry {
                seq,
                id: removed.id,
                kind: removed.kind,
                deleted: true,
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        zone: &ZoneHandle,
        kind: RecordKind,
        limit: usize,
    ) -> Result<Vec<RemoteRecord>, StoreError> {
        self.check_online()?;
        let backend = self.backend.lock().unwrap();
        if zone.scope == ZoneScope::Public {
            return Ok(backend
                .public_records
                .values()
                .filter(|r| r.kind == kind)
                .take(limit)
                .cloned()
                .collect());
        }
        let zone_state = backend
            .zones
            .get(&zone.name)
            .ok_or_else(|| StoreError::NotFound(zone.name.clone()))?;
        Ok(zone_state
            .records
            .values()
            .filter(|r| r.kind == kind)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_changes(
        &self,
        zone: &ZoneHandle,
        since: Option<&ChangeToken>,
    ) -> Result<ChangeBatch, StoreError> {
        self.check_online()?;
        let backend = self.backend.lock().unwrap();
        let zone_state = backend
            .zones
            .get(&zone.name)
            .ok_or_else(|| StoreError::NotFound(zone.name.clone()))?;

        let since_seq = match since {
            None => 0,
            Some(token) => {
                let seq: u64 = token
                    .as_str()
                    .parse()
                    .map_err(|_| StoreError::ChangeTokenExpired)?;
                if seq < zone_state.floor_seq {
                    return Err(StoreError::ChangeTokenExpired);
                }
                seq
            }
        };

        let pending: Vec<&ChangeEntry> = zone_state
            .log
            .iter()
            .filter(|e| e.seq > since_seq)
            .collect();
        let page = &pending[..pending.len().min(CHANGE_PAGE_SIZE)];
        let has_more = pending.len() > page.len();
        let last_seq = page.last().map(|e| e.seq).unwrap_or(since_seq);

        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for entry in page {
            if entry.deleted {
                deleted.push(DeletedRecord {
                    id: entry.id.clone(),
                    kind: entry.kind,
                });
            } else if let Some(rec) = zone_state.records.get(&entry.id) {
                changed.push(rec.without_asset());
            }
            // A saved-then-deleted record shows up only via its deletion
            // entry; the save entry finds no current record and is skipped.
        }

        Ok(ChangeBatch {
            changed,
            deleted,
            token: ChangeToken(last_seq.to_string()),
            has_more,
        })
    }

    async fn create_subscription(&self, _zone: &ZoneHandle) -> Result<(), StoreError> {
        self.check_online()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_in(zone: &ZoneHandle, id: &str) -> RemoteRecord {
        let mut rec = RemoteRecord::new(zone.clone(), RecordKind::Workout, id);
        rec.set("caption", "test");
        rec
    }

    #[tokio::test]
    async fn test_create_only_conflicts_on_second_insert() {
        let store = MemoryStore::new("acct-a");
        let zone = store.create_zone("SweatpactGroup_z1").await.unwrap();
        let rec = record_in(&zone, "r1");

        store.save(&rec, SavePolicy::CreateOnly).await.unwrap();
        let err = store.save(&rec, SavePolicy::CreateOnly).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_if_unchanged_detects_concurrent_writer() {
        let store = MemoryStore::new("acct-a");
        let zone = store.create_zone("SweatpactGroup_z1").await.unwrap();
        let saved = store
            .save(&record_in(&zone, "r1"), SavePolicy::CreateOnly)
            .await
            .unwrap();

        // Another writer bumps the version.
        store.save(&saved, SavePolicy::Overwrite).await.unwrap();

        // Saving with the stale version loses.
        let err = store.save(&saved, SavePolicy::IfUnchanged).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_change_feed_pages_and_advances_token() {
        let store = MemoryStore::new("acct-a");
        let zone = store.create_zone("SweatpactGroup_z1").await.unwrap();
        for i in 0..(CHANGE_PAGE_SIZE + 5) {
            store
                .save(&record_in(&zone, &format!("r{}", i)), SavePolicy::CreateOnly)
                .await
                .unwrap();
        }

        let first = store.fetch_changes(&zone, None).await.unwrap();
        assert_eq!(first.changed.len(), CHANGE_PAGE_SIZE);
        assert!(first.has_more);

        let second = store.fetch_changes(&zone, Some(&first.token)).await.unwrap();
        assert_eq!(second.changed.len(), 5);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let store = MemoryStore::new("acct-a");
        let zone = store.create_zone("SweatpactGroup_z1").await.unwrap();
        store
            .save(&record_in(&zone, "r1"), SavePolicy::CreateOnly)
            .await
            .unwrap();
        let batch = store.fetch_changes(&zone, None).await.unwrap();

        store.expire_change_tokens(&zone.name);
        let err = store
            .fetch_changes(&zone, Some(&batch.token))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ChangeTokenExpired));
    }

    #[tokio::test]
    async fn test_shared_zone_discovery_after_accept() {
        let owner = MemoryStore::new("acct-a");
        let joiner = owner.client("acct-b");
        let zone = owner.create_zone("SweatpactGroup_z1").await.unwrap();
        let share = owner.create_share(&zone).await.unwrap();

        assert!(joiner
            .discover_zone(ZoneScope::Shared, "SweatpactGroup_")
            .await
            .unwrap()
            .is_none());

        let metadata = joiner.resolve_share(&share.url).await.unwrap();
        joiner.accept_share(&metadata).await.unwrap();

        let found = joiner
            .discover_zone(ZoneScope::Shared, "SweatpactGroup_")
            .await
            .unwrap()
            .expect("zone visible after accepting share");
        assert_eq!(found.name, zone.name);
        assert_eq!(found.scope, ZoneScope::Shared);

        // The owner still sees it as private, not shared.
        assert!(owner
            .discover_zone(ZoneScope::Shared, "SweatpactGroup_")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_offline_fails_everything_with_network() {
        let store = MemoryStore::new("acct-a");
        let zone = store.create_zone("SweatpactGroup_z1").await.unwrap();
        store.set_offline(true);
        let err = store.get(&zone, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::Network));
    }

    #[tokio::test]
    async fn test_change_feed_strips_assets() {
        let store = MemoryStore::new("acct-a");
        let zone = store.create_zone("SweatpactGroup_z1").await.unwrap();
        let mut rec = record_in(&zone, "r1");
        rec.asset = Some(vec![7; 32]);
        store.save(&rec, SavePolicy::CreateOnly).await.unwrap();

        let batch = store.fetch_changes(&zone, None).await.unwrap();
        assert!(batch.changed[0].asset.is_none());
        // Direct gets still include the asset.
        let direct = store.get(&zone, "r1").await.unwrap().unwrap();
        assert_eq!(direct.asset, Some(vec![7; 32]));
    }
}
