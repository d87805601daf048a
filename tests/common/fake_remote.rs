//! In-memory [`RemoteStore`] for integration tests
//!
//! Behaves like the REST API closely enough for the sync core: ids are
//! assigned server-side, sections are stored flat and served nested, and every
//! call is recorded. Individual operations can be delayed or made to fail.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use notesync::client::api::RemoteStore;
use notesync::shared::error::{SyncError, SyncResult};
use notesync::shared::ids::{ConversationId, MessageId, NoteId, NotebookId, SectionId, UserId, VersionId};
use notesync::shared::messaging::{Conversation, Message, MessageStatus, SendMessageRequest};
use notesync::shared::notes::{
    Note, NoteSnapshot, NoteSummary, NoteVersion, Notebook, NotebookRequest, Section, ShareNoteRequest,
};

#[derive(Default)]
struct FakeState {
    notebooks: Vec<Notebook>,
    sections: Vec<Section>,
    notes: Vec<Note>,
    versions: HashMap<VersionId, Note>,
    conversations: Vec<Conversation>,
    history: HashMap<ConversationId, Vec<Message>>,
    calls: Vec<String>,
    failures: HashMap<&'static str, VecDeque<SyncError>>,
    always_fail: HashSet<&'static str>,
    delays: HashMap<&'static str, Duration>,
    history_delays: HashMap<ConversationId, Duration>,
    shares: Vec<(NoteId, ShareNoteRequest)>,
}

/// Shared handle to the fake server; clones see the same data
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Make the next call to `op` fail with a persist error
    pub fn fail_next(&self, op: &'static str) {
        self.state()
            .failures
            .entry(op)
            .or_default()
            .push_back(SyncError::persist(op, "injected failure"));
    }

    pub fn fail_always(&self, op: &'static str) {
        self.state().always_fail.insert(op);
    }

    pub fn delay(&self, op: &'static str, by: Duration) {
        self.state().delays.insert(op, by);
    }

    pub fn delay_history(&self, conversation_id: ConversationId, by: Duration) {
        self.state().history_delays.insert(conversation_id, by);
    }

    pub fn seed_notebook(&self, title: &str) -> Notebook {
        let notebook = Notebook::new(title, None);
        self.state().notebooks.push(notebook.clone());
        notebook
    }

    pub fn seed_section(&self, notebook_id: NotebookId, parent_id: Option<SectionId>, title: &str) -> Section {
        let section = Section {
            id: SectionId::new(),
            title: title.to_string(),
            parent_id,
            notebook_id,
            children: Vec::new(),
        };
        self.state().sections.push(section.clone());
        section
    }

    pub fn seed_note(&self, section_id: SectionId, title: &str) -> Note {
        let note = Note::new(section_id, title);
        self.state().notes.push(note.clone());
        note
    }

    pub fn seed_version(&self, note: &Note, title: &str) -> VersionId {
        let id = VersionId::new();
        let mut version = note.clone();
        version.title = title.to_string();
        self.state().versions.insert(id, version);
        id
    }

    pub fn seed_message(&self, conversation_id: ConversationId, content: &str) -> Message {
        let message = new_message(conversation_id, content);
        self.state()
            .history
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        message
    }

    pub fn remove_notebook(&self, id: NotebookId) {
        self.state().notebooks.retain(|nb| nb.id != id);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.split(':').next() == Some(op))
            .count()
    }

    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.state().notes.iter().find(|n| n.id == id).cloned()
    }

    pub fn section(&self, id: SectionId) -> Option<Section> {
        self.state().sections.iter().find(|s| s.id == id).cloned()
    }

    pub fn notebook(&self, id: NotebookId) -> Option<Notebook> {
        self.state().notebooks.iter().find(|nb| nb.id == id).cloned()
    }

    pub fn shares(&self) -> Vec<(NoteId, ShareNoteRequest)> {
        self.state().shares.clone()
    }

    /// Overwrite a note as if another client had saved it
    pub fn edit_remotely(&self, id: NoteId, title: &str) {
        if let Some(note) = self.state().notes.iter_mut().find(|n| n.id == id) {
            note.title = title.to_string();
            note.updated_at = Some(Utc::now());
        }
    }

    pub fn section_count(&self) -> usize {
        self.state().sections.len()
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn enter(&self, op: &'static str, detail: String) -> SyncResult<()> {
        let delay = {
            let mut state = self.state();
            state.calls.push(if detail.is_empty() {
                op.to_string()
            } else {
                format!("{}:{}", op, detail)
            });
            state.delays.get(op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        if state.always_fail.contains(op) {
            return Err(SyncError::persist(op, "injected failure"));
        }
        if let Some(err) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(())
    }

    fn nest(sections: &[Section], notebook_id: NotebookId, parent: Option<SectionId>) -> Vec<Section> {
        sections
            .iter()
            .filter(|s| s.notebook_id == notebook_id && s.parent_id == parent)
            .map(|s| {
                let mut nested = s.clone();
                nested.children = Self::nest(sections, notebook_id, Some(s.id));
                nested
            })
            .collect()
    }

    fn drop_section_subtree(state: &mut FakeState, id: SectionId) {
        let children: Vec<SectionId> = state
            .sections
            .iter()
            .filter(|s| s.parent_id == Some(id))
            .map(|s| s.id)
            .collect();
        for child in children {
            Self::drop_section_subtree(state, child);
        }
        state.sections.retain(|s| s.id != id);
        state.notes.retain(|n| n.section_id != id);
    }
}

pub fn new_message(conversation_id: ConversationId, content: &str) -> Message {
    Message {
        id: MessageId::new(),
        conversation_id,
        sender_id: UserId::new(),
        content: content.to_string(),
        media_ref: None,
        reply_to_id: None,
        created_at: Utc::now(),
        status: MessageStatus::Sent,
    }
}

impl RemoteStore for FakeRemote {
    fn list_notebooks(&self) -> BoxFuture<'_, SyncResult<Vec<Notebook>>> {
        Box::pin(async move {
            self.enter("list_notebooks", String::new()).await?;
            Ok(self.state().notebooks.clone())
        })
    }

    fn create_notebook(&self, request: NotebookRequest) -> BoxFuture<'_, SyncResult<Notebook>> {
        Box::pin(async move {
            self.enter("create_notebook", request.title.clone()).await?;
            let notebook = Notebook::new(request.title, Some(request.color));
            self.state().notebooks.push(notebook.clone());
            Ok(notebook)
        })
    }

    fn update_notebook(&self, id: NotebookId, request: NotebookRequest) -> BoxFuture<'_, SyncResult<Notebook>> {
        Box::pin(async move {
            self.enter("update_notebook", id.to_string()).await?;
            let mut state = self.state();
            let notebook = state
                .notebooks
                .iter_mut()
                .find(|nb| nb.id == id)
                .ok_or_else(|| SyncError::stale(id))?;
            notebook.title = request.title;
            notebook.color = request.color;
            Ok(notebook.clone())
        })
    }

    fn delete_notebook(&self, id: NotebookId) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("delete_notebook", id.to_string()).await?;
            let mut state = self.state();
            state.notebooks.retain(|nb| nb.id != id);
            let roots: Vec<SectionId> = state
                .sections
                .iter()
                .filter(|s| s.notebook_id == id && s.parent_id.is_none())
                .map(|s| s.id)
                .collect();
            for root in roots {
                Self::drop_section_subtree(&mut state, root);
            }
            Ok(())
        })
    }

    fn reorder_notebooks(&self, ids: Vec<NotebookId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("reorder_notebooks", String::new()).await?;
            let mut state = self.state();
            state
                .notebooks
                .sort_by_key(|nb| ids.iter().position(|id| *id == nb.id).unwrap_or(usize::MAX));
            Ok(())
        })
    }

    fn section_tree(&self, notebook_id: NotebookId) -> BoxFuture<'_, SyncResult<Vec<Section>>> {
        Box::pin(async move {
            self.enter("section_tree", notebook_id.to_string()).await?;
            let state = self.state();
            Ok(Self::nest(&state.sections, notebook_id, None))
        })
    }

    fn create_section(&self, notebook_id: NotebookId, title: String) -> BoxFuture<'_, SyncResult<Section>> {
        Box::pin(async move {
            self.enter("create_section", title.clone()).await?;
            Ok(self.seed_section(notebook_id, None, &title))
        })
    }

    fn create_sub_section(&self, parent_id: SectionId, title: String) -> BoxFuture<'_, SyncResult<Section>> {
        Box::pin(async move {
            self.enter("create_sub_section", title.clone()).await?;
            let notebook_id = self
                .section(parent_id)
                .map(|s| s.notebook_id)
                .ok_or_else(|| SyncError::stale(parent_id))?;
            Ok(self.seed_section(notebook_id, Some(parent_id), &title))
        })
    }

    fn section_children(&self, parent_id: SectionId) -> BoxFuture<'_, SyncResult<Vec<Section>>> {
        Box::pin(async move {
            self.enter("section_children", parent_id.to_string()).await?;
            let state = self.state();
            let notebook_id = state
                .sections
                .iter()
                .find(|s| s.id == parent_id)
                .map(|s| s.notebook_id)
                .ok_or_else(|| SyncError::stale(parent_id))?;
            Ok(Self::nest(&state.sections, notebook_id, Some(parent_id)))
        })
    }

    fn move_section(&self, id: SectionId, parent_id: Option<SectionId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("move_section", id.to_string()).await?;
            let mut state = self.state();
            let section = state
                .sections
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| SyncError::stale(id))?;
            section.parent_id = parent_id;
            Ok(())
        })
    }

    fn rename_section(&self, id: SectionId, title: String) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("rename_section", id.to_string()).await?;
            let mut state = self.state();
            let section = state
                .sections
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| SyncError::stale(id))?;
            section.title = title;
            Ok(())
        })
    }

    fn delete_section(&self, id: SectionId) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("delete_section", id.to_string()).await?;
            Self::drop_section_subtree(&mut self.state(), id);
            Ok(())
        })
    }

    fn reorder_sections(&self, notebook_id: NotebookId, ids: Vec<SectionId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("reorder_sections", notebook_id.to_string()).await?;
            let mut state = self.state();
            state
                .sections
                .sort_by_key(|s| ids.iter().position(|id| *id == s.id).unwrap_or(usize::MAX));
            Ok(())
        })
    }

    fn list_notes(&self, section_id: SectionId) -> BoxFuture<'_, SyncResult<Vec<Note>>> {
        Box::pin(async move {
            self.enter("list_notes", section_id.to_string()).await?;
            Ok(self
                .state()
                .notes
                .iter()
                .filter(|n| n.section_id == section_id)
                .cloned()
                .collect())
        })
    }

    fn get_note(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.enter("get_note", id.to_string()).await?;
            self.note(id).ok_or_else(|| SyncError::stale(id))
        })
    }

    fn search_notes(&self, query: String) -> BoxFuture<'_, SyncResult<Vec<NoteSummary>>> {
        Box::pin(async move {
            self.enter("search_notes", query.clone()).await?;
            let needle = query.to_lowercase();
            Ok(self
                .state()
                .notes
                .iter()
                .filter(|n| n.title.to_lowercase().contains(&needle))
                .map(|n| NoteSummary {
                    id: n.id,
                    title: n.title.clone(),
                    content: n.content.clone(),
                    updated_at: n.updated_at,
                })
                .collect())
        })
    }

    fn share_note(&self, id: NoteId, request: ShareNoteRequest) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("share_note", id.to_string()).await?;
            let mut state = self.state();
            if !state.notes.iter().any(|n| n.id == id) {
                return Err(SyncError::stale(id));
            }
            state.shares.push((id, request));
            Ok(())
        })
    }

    fn create_note(&self, section_id: SectionId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.enter("create_note", snapshot.title.clone()).await?;
            let mut note = Note::new(section_id, snapshot.title);
            note.content = snapshot.content;
            note.updated_at = Some(Utc::now());
            self.state().notes.push(note.clone());
            Ok(note)
        })
    }

    fn update_note(&self, id: NoteId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.enter("update_note", id.to_string()).await?;
            let mut state = self.state();
            let note = state
                .notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| SyncError::stale(id))?;
            note.apply_snapshot(&snapshot);
            note.updated_at = Some(Utc::now());
            Ok(note.clone())
        })
    }

    fn update_tags(&self, id: NoteId, tags: Vec<String>) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.enter("update_tags", id.to_string()).await?;
            let mut state = self.state();
            let note = state
                .notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| SyncError::stale(id))?;
            note.tags = tags;
            Ok(note.clone())
        })
    }

    fn delete_note(&self, id: NoteId) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("delete_note", id.to_string()).await?;
            self.state().notes.retain(|n| n.id != id);
            Ok(())
        })
    }

    fn toggle_pin(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.enter("toggle_pin", id.to_string()).await?;
            let mut state = self.state();
            let note = state
                .notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| SyncError::stale(id))?;
            note.is_pinned = !note.is_pinned;
            Ok(note.clone())
        })
    }

    fn pinned_notes(&self) -> BoxFuture<'_, SyncResult<Vec<Note>>> {
        Box::pin(async move {
            self.enter("pinned_notes", String::new()).await?;
            Ok(self.state().notes.iter().filter(|n| n.is_pinned).cloned().collect())
        })
    }

    fn reorder_notes(&self, ids: Vec<NoteId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.enter("reorder_notes", String::new()).await?;
            let mut state = self.state();
            state
                .notes
                .sort_by_key(|n| ids.iter().position(|id| *id == n.id).unwrap_or(usize::MAX));
            Ok(())
        })
    }

    fn list_versions(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Vec<NoteVersion>>> {
        Box::pin(async move {
            self.enter("list_versions", id.to_string()).await?;
            Ok(self
                .state()
                .versions
                .iter()
                .filter(|(_, note)| note.id == id)
                .map(|(version_id, note)| NoteVersion {
                    id: *version_id,
                    note_id: id,
                    title: note.title.clone(),
                    content: note.content.clone(),
                    created_at: None,
                })
                .collect())
        })
    }

    fn restore_version(&self, version_id: VersionId) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.enter("restore_version", version_id.to_string()).await?;
            let mut state = self.state();
            let version = state
                .versions
                .get(&version_id)
                .cloned()
                .ok_or_else(|| SyncError::stale(version_id))?;
            if let Some(note) = state.notes.iter_mut().find(|n| n.id == version.id) {
                note.apply_snapshot(&version.snapshot());
            }
            Ok(version)
        })
    }

    fn list_conversations(&self) -> BoxFuture<'_, SyncResult<Vec<Conversation>>> {
        Box::pin(async move {
            self.enter("list_conversations", String::new()).await?;
            Ok(self.state().conversations.clone())
        })
    }

    fn message_history(&self, conversation_id: ConversationId) -> BoxFuture<'_, SyncResult<Vec<Message>>> {
        Box::pin(async move {
            self.enter("message_history", conversation_id.to_string()).await?;
            let delay = self.state().history_delays.get(&conversation_id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self
                .state()
                .history
                .get(&conversation_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn send_message(
        &self,
        conversation_id: ConversationId,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, SyncResult<Message>> {
        Box::pin(async move {
            self.enter("send_message", conversation_id.to_string()).await?;
            let mut message = new_message(conversation_id, &request.content);
            message.media_ref = request.media_url;
            message.reply_to_id = request.reply_to_id;
            self.state()
                .history
                .entry(conversation_id)
                .or_default()
                .push(message.clone());
            Ok(message)
        })
    }
}
