// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Services module - the sync core's business logic.

pub mod client;
pub mod pairing;
mod session;
pub mod sync;
pub mod week;

pub use client::SweatpactClient;
pub use pairing::PairingService;
pub use sync::SyncEngine;
pub use week::WeekLifecycle;
