// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Application error types surfaced to the presentation layer.

use crate::store::StoreError;

/// Errors surfaced from the sync core to the UI layer.
///
/// Low-level store errors are mapped into this taxonomy exactly once, at the
/// store boundary; call sites above the boundary only ever see these
/// variants. Write conflicts and change-token expiry are resolved internally
/// and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No internet connection; changes will sync when back online")]
    NetworkUnavailable,

    #[error("Not signed in to a cloud account")]
    NotAuthenticated,

    #[error("Cloud storage is full")]
    QuotaExceeded,

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invite code not found")]
    InviteCodeNotFound,

    #[error("Invite code has expired")]
    InviteCodeExpired,

    #[error("Could not accept the shared group")]
    ShareAcceptFailed,

    #[error("Could not create the group")]
    GroupCreationFailed,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Network => SyncError::NetworkUnavailable,
            StoreError::NotAuthenticated => SyncError::NotAuthenticated,
            StoreError::QuotaExceeded => SyncError::QuotaExceeded,
            StoreError::NotFound(id) => SyncError::RecordNotFound(id),
            // Conflicts and token expiry are resolved at their call sites by
            // re-reading and adopting the winner; reaching this mapping means
            // a path failed to do so.
            StoreError::Conflict => SyncError::ServerError("unresolved write conflict".into()),
            StoreError::ChangeTokenExpired => {
                SyncError::ServerError("unresolved change-token expiry".into())
            }
            StoreError::Server(msg) => SyncError::ServerError(msg),
            StoreError::Unknown(msg) => SyncError::Unknown(anyhow::anyhow!(msg)),
        }
    }
}

/// Result type alias for the sync core.
pub type Result<T> = std::result::Result<T, SyncError>;
