// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Durable local state outside the cache.
//!
//! Three things survive restarts: the pending invite code (cleared once the
//! group becomes ready), the per-zone change token, and the one-time
//! "subscription configured" flag per zone.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Durable key-value state the sync core needs across restarts.
pub trait LocalStateStore: Send + Sync {
    fn pending_invite_code(&self) -> Option<String>;
    fn set_pending_invite_code(&self, code: &str);
    fn clear_pending_invite_code(&self);

    fn change_token(&self, zone_name: &str) -> Option<String>;
    fn set_change_token(&self, zone_name: &str, token: &str);
    fn clear_change_token(&self, zone_name: &str);

    fn subscription_configured(&self, zone_name: &str) -> bool;
    fn set_subscription_configured(&self, zone_name: &str);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    pending_invite_code: Option<String>,
    change_tokens: HashMap<String, String>,
    subscriptions: HashSet<String>,
}

/// In-memory implementation for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryLocalState {
    state: Mutex<PersistedState>,
}

impl MemoryLocalState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStateStore for MemoryLocalState {
    fn pending_invite_code(&self) -> Option<String> {
        self.state.lock().unwrap().pending_invite_code.clone()
    }

    fn set_pending_invite_code(&self, code: &str) {
        self.state.lock().unwrap().pending_invite_code = Some(code.to_string());
    }

    fn clear_pending_invite_code(&self) {
        self.state.lock().unwrap().pending_invite_code = None;
    }

    fn change_token(&self, zone_name: &str) -> Option<String> {
        self.state.lock().unwrap().change_tokens.get(zone_name).cloned()
    }

    fn set_change_token(&self, zone_name: &str, token: &str) {
        self.state
            .lock()
            .unwrap()
            .change_tokens
            .insert(zone_name.to_string(), token.to_string());
    }

    fn clear_change_token(&self, zone_name: &str) {
        self.state.lock().unwrap().change_tokens.remove(zone_name);
    }

    fn subscription_configured(&self, zone_name: &str) -> bool {
        self.state.lock().unwrap().subscriptions.contains(zone_name)
    }

    fn set_subscription_configured(&self, zone_name: &str) {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(zone_name.to_string());
    }
}

/// JSON-file-backed implementation for real hosts.
pub struct FileLocalState {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl FileLocalState {
    /// Load existing state from `path`, or start empty if the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let state = std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        }
    }

    fn persist(&self, state: &PersistedState) {
        let write = serde_json::to_vec_pretty(state)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| std::fs::write(&self.path, bytes).map_err(anyhow::Error::from));
        if let Err(err) = write {
            tracing::warn!(path = %self.path.display(), error = %err, "Failed to persist local state");
        }
    }

    fn update(&self, f: impl FnOnce(&mut PersistedState)) {
        let mut state = self.state.lock().unwrap();
        f(&mut state);
        self.persist(&state);
    }
}

impl LocalStateStore for FileLocalState {
    fn pending_invite_code(&self) -> Option<String> {
        self.state.lock().unwrap().pending_invite_code.clone()
    }

    fn set_pending_invite_code(&self, code: &str) {
        self.update(|s| s.pending_invite_code = Some(code.to_string()));
    }

    fn clear_pending_invite_code(&self) {
        self.update(|s| s.pending_invite_code = None);
    }

    fn change_token(&self, zone_name: &str) -> Option<String> {
        self.state.lock().unwrap().change_tokens.get(zone_name).cloned()
    }

    fn set_change_token(&self, zone_name: &str, token: &str) {
        self.update(|s| {
            s.change_tokens
                .insert(zone_name.to_string(), token.to_string());
        });
    }

    fn clear_change_token(&self, zone_name: &str) {
        self.update(|s| {
            s.change_tokens.remove(zone_name);
        });
    }

    fn subscription_configured(&self, zone_name: &str) -> bool {
        self.state.lock().unwrap().subscriptions.contains(zone_name)
    }

    fn set_subscription_configured(&self, zone_name: &str) {
        self.update(|s| {
            s.subscriptions.insert(zone_name.to_string());
        });
    }
}
