//! Recording [`NotePersister`] for save coordinator tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use notesync::client::save::NotePersister;
use notesync::shared::error::{SyncError, SyncResult};
use notesync::shared::ids::NoteId;
use notesync::shared::notes::NoteSnapshot;
use tokio::time::Instant;

/// One persist call as seen by the server
#[derive(Debug, Clone)]
pub struct Write {
    pub note_id: NoteId,
    pub snapshot: NoteSnapshot,
    pub started: Instant,
}

#[derive(Default)]
struct Recorded {
    writes: Vec<Write>,
    failures: VecDeque<SyncError>,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Clone, Default)]
pub struct RecordingPersister {
    latency: Duration,
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write takes `latency` to complete
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_next(&self, message: &str) {
        self.recorded()
            .failures
            .push_back(SyncError::persist("note", message));
    }

    pub fn writes(&self) -> Vec<Write> {
        self.recorded().writes.clone()
    }

    pub fn writes_for(&self, note_id: NoteId) -> Vec<Write> {
        self.writes()
            .into_iter()
            .filter(|write| write.note_id == note_id)
            .collect()
    }

    /// Highest number of writes that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.recorded().max_in_flight
    }
}

impl NotePersister for RecordingPersister {
    fn persist(&self, note_id: NoteId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            {
                let mut recorded = self.recorded();
                recorded.writes.push(Write {
                    note_id,
                    snapshot,
                    started: Instant::now(),
                });
                recorded.in_flight += 1;
                recorded.max_in_flight = recorded.max_in_flight.max(recorded.in_flight);
            }
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let mut recorded = self.recorded();
            recorded.in_flight -= 1;
            match recorded.failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}
