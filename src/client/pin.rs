//! Pin toggles against a flip-only endpoint.
//!
//! The server only offers "toggle", so rapid local flips cannot be sent one
//! by one without racing. [`PinSync`] keeps the desired value per note, runs at
//! most one toggle request at a time, and after each response compares the
//! server's value with the latest desired one, toggling again until they agree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::api::RemoteStore;
use crate::client::events::{EventBus, SyncEvent};
use crate::shared::ids::NoteId;

/// Toggle round-trips allowed per settle before giving up
const MAX_PIN_ROUNDS: usize = 4;

type SettleHook = Arc<dyn Fn(NoteId, bool) + Send + Sync>;

struct PinEntry {
    desired: bool,
    server: bool,
}

/// Converges the server pin flag to the latest local choice
#[derive(Clone)]
pub struct PinSync {
    remote: Arc<dyn RemoteStore>,
    bus: EventBus<SyncEvent>,
    entries: Arc<Mutex<HashMap<NoteId, PinEntry>>>,
    on_settle: SettleHook,
}

impl PinSync {
    /// `on_settle` receives the authoritative value once the note settles
    /// (the desired value, or the last server value after a failure).
    pub fn new<F>(remote: Arc<dyn RemoteStore>, bus: EventBus<SyncEvent>, on_settle: F) -> Self
    where
        F: Fn(NoteId, bool) + Send + Sync + 'static,
    {
        Self {
            remote,
            bus,
            entries: Arc::new(Mutex::new(HashMap::new())),
            on_settle: Arc::new(on_settle),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<NoteId, PinEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Request `desired` for a note whose last known server value is `server`.
    ///
    /// Returns `true` when a new worker was started, `false` when an
    /// in-flight one will pick up the new value.
    pub fn request(&self, note_id: NoteId, desired: bool, server: bool) -> bool {
        {
            let mut entries = self.entries();
            if let Some(entry) = entries.get_mut(&note_id) {
                entry.desired = desired;
                return false;
            }
            entries.insert(note_id, PinEntry { desired, server });
        }
        let this = self.clone();
        tokio::spawn(async move { this.settle(note_id).await });
        true
    }

    pub fn is_pending(&self, note_id: NoteId) -> bool {
        self.entries().contains_key(&note_id)
    }

    /// Forget a note (deleted locally); a running worker stops after its current request
    pub fn forget(&self, note_id: NoteId) {
        self.entries().remove(&note_id);
    }

    async fn settle(&self, note_id: NoteId) {
        for round in 0..=MAX_PIN_ROUNDS {
            let done = {
                let mut entries = self.entries();
                match entries.get(&note_id).map(|entry| (entry.desired, entry.server)) {
                    None => return,
                    Some((desired, server)) if desired == server => {
                        entries.remove(&note_id);
                        Some(server)
                    }
                    Some(_) => None,
                }
            };
            if let Some(pinned) = done {
                self.finish(note_id, pinned);
                return;
            }
            if round == MAX_PIN_ROUNDS {
                break;
            }

            match self.remote.toggle_pin(note_id).await {
                Ok(note) => {
                    if let Some(entry) = self.entries().get_mut(&note_id) {
                        entry.server = note.is_pinned;
                    }
                }
                Err(e) => {
                    tracing::error!("failed to toggle pin on note {}: {}", note_id, e);
                    let server = self.entries().remove(&note_id).map(|entry| entry.server);
                    self.bus.emit(SyncEvent::PersistFailed {
                        resource: format!("note:{}:pin", note_id),
                        message: e.to_string(),
                    });
                    if let Some(server) = server {
                        self.finish(note_id, server);
                    }
                    return;
                }
            }
        }

        let server = self.entries().remove(&note_id).map(|entry| entry.server);
        if let Some(server) = server {
            tracing::warn!("pin state of note {} did not converge", note_id);
            self.bus.emit(SyncEvent::PersistFailed {
                resource: format!("note:{}:pin", note_id),
                message: "pin state did not converge".to_string(),
            });
            self.finish(note_id, server);
        }
    }

    fn finish(&self, note_id: NoteId, pinned: bool) {
        (self.on_settle)(note_id, pinned);
        self.bus.emit(SyncEvent::PinSettled { note_id, pinned });
    }
}
