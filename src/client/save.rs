//! Debounced, serialized note persistence.
//!
//! Each document moves through `Idle → Dirty → (debounce) → Saving → Idle |
//! Error`. Edits only overwrite the document's single latest-snapshot slot and
//! re-arm one single-shot timer, so a burst of edits collapses into one write
//! carrying the last snapshot. At most one write per document is in flight; an
//! edit made while saving is picked up when that write resolves. Failures are
//! surfaced and never retried automatically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::client::events::{EventBus, SyncEvent};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::ids::NoteId;
use crate::shared::notes::NoteSnapshot;

/// Save state of one document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Dirty,
    Saving,
    Error(String),
}

/// Remote write used by the coordinator
pub trait NotePersister: Send + Sync + 'static {
    fn persist(&self, note_id: NoteId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<()>>;
}

struct DocSlot {
    epoch: u64,
    status: SaveStatus,
    latest: Option<NoteSnapshot>,
    timer: Option<JoinHandle<()>>,
    timer_seq: u64,
    in_flight: bool,
    dirty_during_save: bool,
}

impl DocSlot {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            status: SaveStatus::Idle,
            latest: None,
            timer: None,
            timer_seq: 0,
            in_flight: false,
            dirty_during_save: false,
        }
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    persister: Arc<dyn NotePersister>,
    debounce: Duration,
    bus: EventBus<SyncEvent>,
    slots: Mutex<HashMap<NoteId, DocSlot>>,
    epochs: AtomicU64,
}

/// Per-document save scheduler
#[derive(Clone)]
pub struct SaveCoordinator {
    inner: Arc<Inner>,
}

enum Begin {
    Started(NoteSnapshot),
    Nothing,
}

#[derive(Clone, Copy)]
enum Trigger {
    Timer(u64),
    Flush,
}

impl SaveCoordinator {
    pub fn new(persister: Arc<dyn NotePersister>, debounce: Duration, bus: EventBus<SyncEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                persister,
                debounce,
                bus,
                slots: Mutex::new(HashMap::new()),
                epochs: AtomicU64::new(0),
            }),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<NoteId, DocSlot>> {
        self.inner.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit_status(&self, note_id: NoteId, status: SaveStatus) {
        self.inner.bus.emit(SyncEvent::SaveStatus { note_id, status });
    }

    /// Record the latest local state of `note_id` and (re)arm its debounce timer
    pub fn mark_dirty(&self, note_id: NoteId, snapshot: NoteSnapshot) {
        let changed = {
            let mut slots = self.slots();
            let slot = slots
                .entry(note_id)
                .or_insert_with(|| DocSlot::new(self.inner.epochs.fetch_add(1, Ordering::Relaxed)));
            slot.latest = Some(snapshot);
            if slot.in_flight {
                slot.dirty_during_save = true;
                false
            } else {
                let changed = slot.status != SaveStatus::Dirty;
                slot.status = SaveStatus::Dirty;
                self.arm(note_id, slot);
                changed
            }
        };
        if changed {
            self.emit_status(note_id, SaveStatus::Dirty);
        }
    }

    fn arm(&self, note_id: NoteId, slot: &mut DocSlot) {
        slot.abort_timer();
        slot.timer_seq += 1;
        let this = self.clone();
        let epoch = slot.epoch;
        let seq = slot.timer_seq;
        let debounce = self.inner.debounce;
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = this.run_save(note_id, epoch, Trigger::Timer(seq)).await {
                tracing::debug!("debounced save of {} failed: {}", note_id, e);
            }
        }));
    }

    fn begin(&self, note_id: NoteId, epoch: u64, trigger: Trigger) -> Begin {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&note_id) else {
            return Begin::Nothing;
        };
        if epoch != slot.epoch || slot.in_flight {
            return Begin::Nothing;
        }
        match trigger {
            Trigger::Timer(seq) if seq != slot.timer_seq => return Begin::Nothing,
            // Runs inside the timer task itself; aborting it would cancel the write
            Trigger::Timer(_) => slot.timer = None,
            Trigger::Flush => slot.abort_timer(),
        }
        let Some(snapshot) = slot.latest.take() else {
            return Begin::Nothing;
        };
        slot.in_flight = true;
        slot.status = SaveStatus::Saving;
        Begin::Started(snapshot)
    }

    async fn run_save(&self, note_id: NoteId, epoch: u64, trigger: Trigger) -> SyncResult<()> {
        let snapshot = match self.begin(note_id, epoch, trigger) {
            Begin::Started(snapshot) => snapshot,
            Begin::Nothing => return Ok(()),
        };
        self.emit_status(note_id, SaveStatus::Saving);
        tracing::debug!("persisting note {}", note_id);
        let result = self.inner.persister.persist(note_id, snapshot).await;
        self.complete(note_id, epoch, result.clone());
        result
    }

    fn complete(&self, note_id: NoteId, epoch: u64, result: SyncResult<()>) {
        let mut events = Vec::new();
        {
            let mut slots = self.slots();
            let slot = match slots.get_mut(&note_id) {
                Some(slot) if slot.epoch == epoch => slot,
                _ => {
                    tracing::debug!("ignoring write completion for cancelled note {}", note_id);
                    return;
                }
            };
            slot.in_flight = false;

            if let Err(e) = &result {
                tracing::error!("failed to save note {}: {}", note_id, e);
                events.push(SyncEvent::PersistFailed {
                    resource: format!("note:{}", note_id),
                    message: e.to_string(),
                });
            }

            let status = if std::mem::take(&mut slot.dirty_during_save) {
                self.arm(note_id, slot);
                SaveStatus::Dirty
            } else {
                match &result {
                    Ok(()) => SaveStatus::Idle,
                    Err(e) => SaveStatus::Error(e.to_string()),
                }
            };
            slot.status = status.clone();
            events.push(SyncEvent::SaveStatus { note_id, status });
        }
        for event in events {
            self.inner.bus.emit(event);
        }
    }

    /// Persist a dirty document now instead of waiting for the timer.
    ///
    /// A document already saving is left alone; its pending edits follow the
    /// in-flight write.
    pub async fn flush(&self, note_id: NoteId) -> SyncResult<()> {
        let epoch = match self.slots().get(&note_id) {
            Some(slot) => slot.epoch,
            None => return Ok(()),
        };
        self.run_save(note_id, epoch, Trigger::Flush).await
    }

    /// Flush every dirty document, returning the first failure
    pub async fn flush_all(&self) -> SyncResult<()> {
        let dirty: Vec<NoteId> = self
            .slots()
            .iter()
            .filter(|(_, slot)| slot.status == SaveStatus::Dirty && !slot.in_flight)
            .map(|(id, _)| *id)
            .collect();
        let mut first_error: Option<SyncError> = None;
        for note_id in dirty {
            if let Err(e) = self.flush(note_id).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop pending state for a document; an in-flight write's result is ignored
    pub fn cancel(&self, note_id: NoteId) -> bool {
        let removed = self.slots().remove(&note_id);
        match removed {
            Some(mut slot) => {
                slot.abort_timer();
                tracing::debug!("cancelled save state for note {}", note_id);
                true
            }
            None => false,
        }
    }

    pub fn cancel_many(&self, note_ids: &[NoteId]) {
        for note_id in note_ids {
            self.cancel(*note_id);
        }
    }

    pub fn status(&self, note_id: NoteId) -> SaveStatus {
        self.slots()
            .get(&note_id)
            .map(|slot| slot.status.clone())
            .unwrap_or_default()
    }

    pub fn has_pending(&self, note_id: NoteId) -> bool {
        self.slots()
            .get(&note_id)
            .is_some_and(|slot| slot.in_flight || slot.latest.is_some())
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }
}
