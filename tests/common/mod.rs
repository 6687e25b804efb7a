// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Shared harness: clients wired to an in-memory backend so two-device
//! flows run entirely in-process.

use std::sync::Arc;

use sweatpact::config::Config;
use sweatpact::local_state::MemoryLocalState;
use sweatpact::notify::RecordingNotifier;
use sweatpact::store::{MemoryStore, RemoteStore};
use sweatpact::SweatpactClient;

pub struct TestDevice {
    pub client: SweatpactClient,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub local_state: Arc<MemoryLocalState>,
}

#[allow(dead_code)]
pub fn device_with_store(store: Arc<MemoryStore>) -> TestDevice {
    let notifier = Arc::new(RecordingNotifier::new());
    let local_state = Arc::new(MemoryLocalState::new());
    let store_dyn: Arc<dyn RemoteStore> = store.clone();
    let local_state_dyn: Arc<dyn sweatpact::local_state::LocalStateStore> =
        local_state.clone();
    let notifier_dyn: Arc<dyn sweatpact::notify::Notifier> = notifier.clone();
    let client = SweatpactClient::new(Config::default(), store_dyn, local_state_dyn, notifier_dyn);
    TestDevice {
        client,
        store,
        notifier,
        local_state,
    }
}

/// A first device with a fresh backend.
#[allow(dead_code)]
pub fn fresh_device(account: &str) -> TestDevice {
    device_with_store(Arc::new(MemoryStore::new(account)))
}

/// Another device on the same backend under a different account.
#[allow(dead_code)]
pub fn second_device(first: &TestDevice, account: &str) -> TestDevice {
    device_with_store(Arc::new(first.store.client(account)))
}

/// Owner creates a group, partner joins, owner detects the join.
#[allow(dead_code)]
pub async fn paired_devices() -> (TestDevice, TestDevice, String) {
    let owner = fresh_device("account-a");
    let code = owner
        .client
        .create_group("Sammy", 4)
        .await
        .expect("create_group");

    let joiner = second_device(&owner, "account-b");
    joiner
        .client
        .join_group(&code, "Jotta", 3)
        .await
        .expect("join_group");

    assert!(owner.client.check_for_partner().await, "partner not detected");
    (owner, joiner, code)
}

/// Zone name the pair's records live in.
#[allow(dead_code)]
pub fn zone_name(device: &TestDevice) -> String {
    format!(
        "{}{}",
        sweatpact::config::ZONE_PREFIX,
        device.client.get_pair().id
    )
}
