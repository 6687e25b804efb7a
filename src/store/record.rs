// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Generic record, zone, and change-feed types for the remote store.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Where a zone is mounted from this device's point of view.
///
/// The owner sees the group zone in its private scope; the joiner sees the
/// same zone in the shared scope after accepting the grant. The public scope
/// holds invite codes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneScope {
    Private,
    Shared,
    Public,
}

/// Handle to a record zone as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneHandle {
    pub name: String,
    pub scope: ZoneScope,
}

impl ZoneHandle {
    pub fn new(name: impl Into<String>, scope: ZoneScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    /// The well-known public namespace (invite codes).
    pub fn public() -> Self {
        Self {
            name: "_public".to_string(),
            scope: ZoneScope::Public,
        }
    }
}

/// Record types stored in a group zone or the public namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RecordKind {
    Group,
    Member,
    WeeklyGoal,
    Workout,
    Nudge,
    InviteCode,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Group => "Group",
            RecordKind::Member => "Member",
            RecordKind::WeeklyGoal => "WeeklyGoal",
            RecordKind::Workout => "Workout",
            RecordKind::Nudge => "Nudge",
            RecordKind::InviteCode => "InviteCode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Group" => Some(RecordKind::Group),
            "Member" => Some(RecordKind::Member),
            "WeeklyGoal" => Some(RecordKind::WeeklyGoal),
            "Workout" => Some(RecordKind::Workout),
            "Nudge" => Some(RecordKind::Nudge),
            "InviteCode" => Some(RecordKind::InviteCode),
            _ => None,
        }
    }
}

/// A schemaless record in the remote store.
///
/// `version` is the optimistic-concurrency counter maintained by the store
/// (0 for a record that has never been saved). `asset` carries binary
/// content on direct gets and saves only; change-feed projections strip it.
#[derive(Debug, Clone)]
pub struct RemoteRecord {
    pub id: String,
    pub zone: ZoneHandle,
    pub kind: RecordKind,
    pub version: i64,
    pub fields: Map<String, Value>,
    pub asset: Option<Vec<u8>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    pub fn new(zone: ZoneHandle, kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            zone,
            kind,
            version: 0,
            fields: Map::new(),
            asset: None,
            created_at: None,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn int_field(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// Strip binary content, as the change feed does.
    pub fn without_asset(&self) -> Self {
        Self {
            asset: None,
            ..self.clone()
        }
    }
}

/// Opaque cursor into a zone's change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeToken(pub String);

impl ChangeToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A deleted-record notice in the change feed.
#[derive(Debug, Clone)]
pub struct DeletedRecord {
    pub id: String,
    pub kind: RecordKind,
}

/// One page of changes since a token.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub changed: Vec<RemoteRecord>,
    pub deleted: Vec<DeletedRecord>,
    pub token: ChangeToken,
    pub has_more: bool,
}

/// Cloud account availability as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Available,
    Unavailable,
    NeedsAuth,
}

/// A sharing grant for a zone.
#[derive(Debug, Clone)]
pub struct ShareHandle {
    pub url: String,
}

/// Resolved metadata for a sharing grant URL.
#[derive(Debug, Clone)]
pub struct ShareMetadata {
    pub url: String,
    pub zone_name: String,
}

/// Save semantics against the record's version counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Fail with `Conflict` if any record with this id already exists.
    CreateOnly,
    /// Fail with `Conflict` unless the stored version matches the one on the
    /// record being saved.
    IfUnchanged,
    /// Last writer wins.
    Overwrite,
}

/// Low-level store errors, mapped once into [`crate::error::SyncError`] at
/// the boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("network unavailable")]
    Network,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("write conflict")]
    Conflict,

    #[error("change token expired")]
    ChangeTokenExpired,

    #[error("server error: {0}")]
    Server(String),

    #[error("unknown store error: {0}")]
    Unknown(String),
}
