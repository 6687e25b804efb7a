// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Remote document store abstraction.
//!
//! The sync core talks to the cloud through the [`RemoteStore`] trait and is
//! wired to one of two implementations at construction time:
//! [`MemoryStore`] (in-process fixture for tests and offline demo) or
//! [`FirestoreStore`] (networked backend).

pub mod codec;
pub mod firestore;
pub mod memory;
pub mod record;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use record::{
    AccountStatus, ChangeBatch, ChangeToken, DeletedRecord, RecordKind, RemoteRecord, SavePolicy,
    ShareHandle, ShareMetadata, StoreError, ZoneHandle, ZoneScope,
};

use async_trait::async_trait;

/// Capability interface over the remote record store.
///
/// All operations are asynchronous and fail with [`StoreError`]; the sync
/// core maps those into its own taxonomy exactly once at the boundary.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Availability of the device's cloud account.
    async fn account_status(&self) -> Result<AccountStatus, StoreError>;

    /// Stable account credential used to derive member identities, when the
    /// store can provide one.
    async fn account_identity(&self) -> Result<Option<String>, StoreError>;

    /// Find an existing zone by name prefix in the given scope.
    async fn discover_zone(
        &self,
        scope: ZoneScope,
        name_prefix: &str,
    ) -> Result<Option<ZoneHandle>, StoreError>;

    /// Create a zone in the caller's private scope.
    async fn create_zone(&self, name: &str) -> Result<ZoneHandle, StoreError>;

    /// Create a sharing grant for a zone and return its URL.
    async fn create_share(&self, zone: &ZoneHandle) -> Result<ShareHandle, StoreError>;

    /// Resolve a sharing grant URL into acceptable metadata.
    async fn resolve_share(&self, url: &str) -> Result<ShareMetadata, StoreError>;

    /// Accept a sharing grant, binding this account to the shared zone.
    async fn accept_share(&self, metadata: &ShareMetadata) -> Result<ZoneHandle, StoreError>;

    /// Fetch one record by id, including binary assets.
    async fn get(&self, zone: &ZoneHandle, id: &str)
        -> Result<Option<RemoteRecord>, StoreError>;

    /// Save a record under the given policy; returns the stored record with
    /// its new version.
    async fn save(
        &self,
        record: &RemoteRecord,
        policy: SavePolicy,
    ) -> Result<RemoteRecord, StoreError>;

    /// Delete a record by id. Deleting a missing record is not an error.
    async fn delete(&self, zone: &ZoneHandle, id: &str) -> Result<(), StoreError>;

    /// Fetch up to `limit` records of one kind from a zone.
    async fn query(
        &self,
        zone: &ZoneHandle,
        kind: RecordKind,
        limit: usize,
    ) -> Result<Vec<RemoteRecord>, StoreError>;

    /// Fetch one page of changes since a token (`None` = from the beginning).
    /// Changed records carry no binary assets.
    async fn fetch_changes(
        &self,
        zone: &ZoneHandle,
        since: Option<&ChangeToken>,
    ) -> Result<ChangeBatch, StoreError>;

    /// Register the one-time change push subscription for a zone.
    async fn create_subscription(&self, zone: &ZoneHandle) -> Result<(), StoreError>;
}
