//! "Newly arrived" markers for tree nodes announced by push events.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::events::{EventBus, SyncEvent};

#[derive(Default)]
struct ArrivalState {
    seen: HashSet<Uuid>,
    active: HashMap<Uuid, JoinHandle<()>>,
}

/// Flags ids the client had not seen before, for a fixed duration
#[derive(Clone)]
pub struct NewArrivals {
    highlight: Duration,
    bus: EventBus<SyncEvent>,
    state: Arc<Mutex<ArrivalState>>,
}

impl NewArrivals {
    pub fn new(highlight: Duration, bus: EventBus<SyncEvent>) -> Self {
        Self {
            highlight,
            bus,
            state: Arc::new(Mutex::new(ArrivalState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, ArrivalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record ids as known without flagging them
    pub fn observe<I: IntoIterator<Item = Uuid>>(&self, ids: I) {
        self.state().seen.extend(ids);
    }

    pub fn has_seen(&self, id: Uuid) -> bool {
        self.state().seen.contains(&id)
    }

    /// Flag `id` as newly arrived unless it was seen before
    pub fn mark(&self, id: Uuid) -> bool {
        {
            let mut state = self.state();
            if !state.seen.insert(id) {
                return false;
            }
            let this = self.clone();
            let highlight = self.highlight;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(highlight).await;
                this.state().active.remove(&id);
                this.bus.emit(SyncEvent::ArrivalCleared { id });
            });
            state.active.insert(id, timer);
        }
        tracing::debug!("{} flagged as newly arrived", id);
        self.bus.emit(SyncEvent::NewlyArrived { id });
        true
    }

    pub fn is_new(&self, id: Uuid) -> bool {
        self.state().active.contains_key(&id)
    }

    /// Drop every marker without emitting clear events
    pub fn reset(&self) {
        let mut state = self.state();
        for (_, timer) in state.active.drain() {
            timer.abort();
        }
    }

    pub fn highlight(&self) -> Duration {
        self.highlight
    }
}
