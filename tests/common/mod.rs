//! Fakes and helpers shared by the integration tests

#![allow(dead_code)]

#[macro_use]
pub mod assertions;
pub mod fake_remote;
pub mod persister;

pub use fake_remote::*;
pub use persister::*;

use std::time::Duration;

use notesync::client::events::SyncEvent;
use tokio::sync::broadcast;

/// Collect every event already sitting in a receiver
pub fn drain(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Let spawned tasks run without advancing the paused clock much
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock and let woken tasks run
pub async fn advance(by: Duration) {
    tokio::time::sleep(by).await;
    settle().await;
}
