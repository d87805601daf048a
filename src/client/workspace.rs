//! Local-first operations on the notebook tree.
//!
//! [`NotesWorkspace`] owns the [`TreeStore`] and applies every mutation locally
//! before it reaches the server. Creates are inserted under a temporary id and
//! swapped for the server's id when the response arrives; moves and reorders
//! are reverted when the server rejects them; renames and edits are
//! fire-and-forget. Validation failures never touch the tree or the network.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::client::api::RemoteStore;
use crate::client::events::{EventBus, SyncEvent};
use crate::client::pin::PinSync;
use crate::client::save::{NotePersister, SaveCoordinator, SaveStatus};
use crate::client::tree::{validate_title, NodeRef, ParentRef, TreeStore};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::ids::{NoteId, NotebookId, SectionId, VersionId};
use crate::shared::notes::{
    Note, NoteSnapshot, NoteSummary, NoteVersion, Notebook, NotebookRequest, PermissionLevel, Section,
    ShareNoteRequest,
};

type SharedTree = Arc<Mutex<TreeStore>>;

fn lock(tree: &SharedTree) -> MutexGuard<'_, TreeStore> {
    tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writes note snapshots and records the confirmation in the tree
struct TreePersister {
    remote: Arc<dyn RemoteStore>,
    tree: SharedTree,
}

impl NotePersister for TreePersister {
    fn persist(&self, note_id: NoteId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            let saved = self.remote.update_note(note_id, snapshot).await?;
            if !lock(&self.tree).apply_saved_note(&saved) {
                tracing::debug!("note {} was removed while saving", note_id);
            }
            Ok(())
        })
    }
}

/// Notebook tree plus the coordinators that persist it
#[derive(Clone)]
pub struct NotesWorkspace {
    tree: SharedTree,
    remote: Arc<dyn RemoteStore>,
    saves: SaveCoordinator,
    pins: PinSync,
    bus: EventBus<SyncEvent>,
    // Ids created locally whose server copy does not exist yet
    pending: Arc<Mutex<HashSet<Uuid>>>,
}

impl NotesWorkspace {
    pub fn new(remote: Arc<dyn RemoteStore>, save_debounce: std::time::Duration, bus: EventBus<SyncEvent>) -> Self {
        let tree: SharedTree = Arc::new(Mutex::new(TreeStore::new()));
        let persister = Arc::new(TreePersister {
            remote: remote.clone(),
            tree: tree.clone(),
        });
        let saves = SaveCoordinator::new(persister, save_debounce, bus.clone());
        let settle_tree = tree.clone();
        let pins = PinSync::new(remote.clone(), bus.clone(), move |note_id, pinned| {
            if lock(&settle_tree).set_pinned(note_id, pinned).is_err() {
                tracing::debug!("pin settled for removed note {}", note_id);
            }
        });
        Self {
            tree,
            remote,
            saves,
            pins,
            bus,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn tree(&self) -> MutexGuard<'_, TreeStore> {
        lock(&self.tree)
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_pending(&self, id: Uuid) -> bool {
        self.pending().contains(&id)
    }

    /// Run `f` against the current tree
    pub fn read<R>(&self, f: impl FnOnce(&TreeStore) -> R) -> R {
        f(&self.tree())
    }

    pub fn saves(&self) -> &SaveCoordinator {
        &self.saves
    }

    pub fn pins(&self) -> &PinSync {
        &self.pins
    }

    pub fn bus(&self) -> &EventBus<SyncEvent> {
        &self.bus
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    fn report(&self, resource: String, error: &SyncError) {
        tracing::error!("failed to persist {}: {}", resource, error);
        self.bus.emit(SyncEvent::PersistFailed {
            resource,
            message: error.to_string(),
        });
    }

    /// Spawn a persist whose failure is reported but never reverted
    fn fire_and_forget<F>(&self, resource: String, write: F)
    where
        F: FnOnce(Arc<dyn RemoteStore>) -> BoxFuture<'static, SyncResult<()>>,
    {
        let this = self.clone();
        let future = write(self.remote.clone());
        tokio::spawn(async move {
            if let Err(e) = future.await {
                this.report(resource, &e);
            }
        });
    }

    fn forget_notes(&self, notes: &[NoteId]) {
        self.saves.cancel_many(notes);
        for note in notes {
            self.pins.forget(*note);
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Replace the notebook list with the server's
    pub async fn load_notebooks(&self) -> SyncResult<()> {
        let notebooks = self.remote.list_notebooks().await?;
        let removal = {
            let mut tree = self.tree();
            // Keep notebooks still being created
            let pending: Vec<Notebook> = tree
                .notebooks()
                .into_iter()
                .filter(|nb| self.is_pending(nb.id.as_uuid()))
                .cloned()
                .collect();
            let mut merged = notebooks;
            merged.extend(pending);
            tree.replace_notebooks(merged)
        };
        self.forget_notes(&removal.notes);
        tracing::info!("loaded notebook list");
        self.bus.emit(SyncEvent::TreeRefreshed { notebook_id: None });
        Ok(())
    }

    async fn fetch_sections(&self, notebook_id: NotebookId) -> SyncResult<()> {
        let sections = self.remote.section_tree(notebook_id).await?;
        let dropped = {
            let mut tree = self.tree();
            let keep = self.pending().clone();
            tree.replace_sections(notebook_id, sections, &keep)?
        };
        self.forget_notes(&dropped);
        tracing::debug!("fetched sections of notebook {}", notebook_id);
        self.bus.emit(SyncEvent::TreeRefreshed {
            notebook_id: Some(notebook_id),
        });
        Ok(())
    }

    /// Expand a notebook, fetching its sections when none are cached or the
    /// cached ones were invalidated. Returns whether a fetch happened.
    pub async fn expand_notebook(&self, notebook_id: NotebookId) -> SyncResult<bool> {
        let needs_fetch = {
            let mut tree = self.tree();
            if tree.notebook(notebook_id).is_none() {
                return Err(SyncError::stale(notebook_id));
            }
            tree.set_expanded(notebook_id, true);
            tree.needs_fetch(notebook_id) && !self.is_pending(notebook_id.as_uuid())
        };
        if needs_fetch {
            self.fetch_sections(notebook_id).await?;
        }
        Ok(needs_fetch)
    }

    pub fn collapse_notebook(&self, notebook_id: NotebookId) {
        self.tree().set_expanded(notebook_id, false);
    }

    /// React to a server-side change of a notebook: refetch now when it is
    /// expanded, otherwise invalidate it for the next expand.
    pub async fn refresh_notebook(&self, notebook_id: NotebookId) -> SyncResult<bool> {
        let expanded = {
            let mut tree = self.tree();
            if tree.notebook(notebook_id).is_none() {
                return Err(SyncError::stale(notebook_id));
            }
            if !tree.is_expanded(notebook_id) {
                tree.mark_stale(notebook_id);
            }
            tree.is_expanded(notebook_id)
        };
        if expanded {
            self.fetch_sections(notebook_id).await?;
        } else {
            tracing::debug!("notebook {} marked stale", notebook_id);
        }
        Ok(expanded)
    }

    /// Bring the whole tree up to date after a change the tree cannot place:
    /// reload the notebook list, refetch expanded notebooks and invalidate
    /// the collapsed ones already loaded. Returns the first refetch failure.
    pub async fn reload_all(&self) -> SyncResult<()> {
        self.load_notebooks().await?;
        let expanded: Vec<NotebookId> = {
            let mut tree = self.tree();
            let pending = self.pending();
            let ids: Vec<NotebookId> = tree
                .notebook_ids()
                .iter()
                .copied()
                .filter(|id| !pending.contains(&id.as_uuid()))
                .collect();
            let mut expanded = Vec::new();
            for id in ids {
                if tree.is_expanded(id) {
                    expanded.push(id);
                } else if tree.is_loaded(id) {
                    tree.mark_stale(id);
                }
            }
            expanded
        };
        let mut first_error = None;
        for notebook_id in expanded {
            if let Err(e) = self.fetch_sections(notebook_id).await {
                tracing::warn!("refetch of notebook {} failed: {}", notebook_id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Direct children of a section as the server has them
    pub async fn section_children(&self, parent_id: SectionId) -> SyncResult<Vec<Section>> {
        if self.is_pending(parent_id.as_uuid()) {
            return Ok(Vec::new());
        }
        self.remote.section_children(parent_id).await
    }

    /// Load a section's notes. Notes with unsaved local edits keep them.
    pub async fn load_section_notes(&self, section_id: SectionId) -> SyncResult<Vec<NoteId>> {
        let notes = self.remote.list_notes(section_id).await?;
        let mut tree = self.tree();
        let local: Vec<(NoteId, NoteSnapshot)> = notes
            .iter()
            .filter(|note| self.saves.has_pending(note.id))
            .filter_map(|note| tree.note(note.id).map(|local| (note.id, local.snapshot())))
            .collect();
        let keep = self.pending().clone();
        let dropped = tree.replace_notes(section_id, notes, &keep)?;
        for (id, snapshot) in local {
            tree.apply_snapshot(id, &snapshot)?;
        }
        let ids = tree
            .section(section_id)
            .map(|section| section.notes.clone())
            .unwrap_or_default();
        drop(tree);
        self.forget_notes(&dropped);
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub async fn create_notebook(&self, title: &str, color: Option<String>) -> SyncResult<NotebookId> {
        let title = validate_title(title)?;
        let local = Notebook::new(title, color);
        let temp = local.id;
        let request = NotebookRequest {
            title: local.title.clone(),
            color: local.color.clone(),
        };
        self.pending().insert(temp.as_uuid());
        if let Err(e) = self.tree().insert_notebook(local) {
            self.pending().remove(&temp.as_uuid());
            return Err(e);
        }

        let result = self.remote.create_notebook(request).await;
        match result {
            Ok(server) => {
                let id = server.id;
                let reconciled = {
                    let mut tree = self.tree();
                    self.pending().remove(&temp.as_uuid());
                    tree.reconcile_notebook(temp, server)
                };
                match reconciled {
                    Ok(true) => self.push_notebook(id),
                    Ok(false) => {}
                    Err(_) => {
                        self.discard_orphan(format!("notebook:{}", id), move |remote| {
                            Box::pin(async move { remote.delete_notebook(id).await })
                        });
                        return Err(SyncError::stale(temp));
                    }
                }
                tracing::info!("created notebook {}", id);
                Ok(id)
            }
            Err(e) => {
                self.drop_pending(NodeRef::Notebook(temp));
                self.report(format!("notebook:{}", temp), &e);
                Err(e)
            }
        }
    }

    pub async fn create_section(&self, notebook_id: NotebookId, title: &str) -> SyncResult<SectionId> {
        self.create_section_under(notebook_id, None, title).await
    }

    pub async fn create_sub_section(&self, parent_id: SectionId, title: &str) -> SyncResult<SectionId> {
        let notebook_id = self
            .tree()
            .section(parent_id)
            .map(|s| s.notebook_id)
            .ok_or_else(|| SyncError::stale(parent_id))?;
        self.create_section_under(notebook_id, Some(parent_id), title).await
    }

    async fn create_section_under(
        &self,
        notebook_id: NotebookId,
        parent: Option<SectionId>,
        title: &str,
    ) -> SyncResult<SectionId> {
        let title = validate_title(title)?;
        if self.is_pending(notebook_id.as_uuid()) || parent.is_some_and(|p| self.is_pending(p.as_uuid())) {
            return Err(SyncError::validation("parentId", "parent is still being created"));
        }
        let temp = SectionId::new();
        self.pending().insert(temp.as_uuid());
        if let Err(e) = self.tree().insert_section(temp, notebook_id, parent, &title) {
            self.pending().remove(&temp.as_uuid());
            return Err(e);
        }

        let result = match parent {
            Some(parent_id) => self.remote.create_sub_section(parent_id, title).await,
            None => self.remote.create_section(notebook_id, title).await,
        };
        match result {
            Ok(server) => {
                let id = server.id;
                let reconciled = {
                    let mut tree = self.tree();
                    self.pending().remove(&temp.as_uuid());
                    tree.reconcile_section(temp, &server)
                };
                match reconciled {
                    Ok(true) => self.push_section_title(id),
                    Ok(false) => {}
                    Err(_) => {
                        self.discard_orphan(format!("section:{}", id), move |remote| {
                            Box::pin(async move { remote.delete_section(id).await })
                        });
                        return Err(SyncError::stale(temp));
                    }
                }
                tracing::info!("created section {}", id);
                Ok(id)
            }
            Err(e) => {
                self.drop_pending(NodeRef::Section(temp));
                self.report(format!("section:{}", temp), &e);
                Err(e)
            }
        }
    }

    pub async fn create_note(&self, section_id: SectionId, title: &str) -> SyncResult<NoteId> {
        let title = validate_title(title)?;
        if self.is_pending(section_id.as_uuid()) {
            return Err(SyncError::validation("sectionId", "section is still being created"));
        }
        let local = Note::new(section_id, title);
        let temp = local.id;
        let snapshot = local.snapshot();
        self.pending().insert(temp.as_uuid());
        if let Err(e) = self.tree().insert_note(local) {
            self.pending().remove(&temp.as_uuid());
            return Err(e);
        }

        let result = self.remote.create_note(section_id, snapshot).await;
        match result {
            Ok(server) => {
                let id = server.id;
                let reconciled = {
                    let mut tree = self.tree();
                    self.pending().remove(&temp.as_uuid());
                    tree.reconcile_note(temp, server)
                };
                match reconciled {
                    Ok(true) => {
                        // Edited while the create was in flight
                        let snapshot = self.tree().note(id).map(Note::snapshot);
                        if let Some(snapshot) = snapshot {
                            self.saves.mark_dirty(id, snapshot);
                        }
                    }
                    Ok(false) => {}
                    Err(_) => {
                        self.discard_orphan(format!("note:{}", id), move |remote| {
                            Box::pin(async move { remote.delete_note(id).await })
                        });
                        return Err(SyncError::stale(temp));
                    }
                }
                tracing::info!("created note {}", id);
                Ok(id)
            }
            Err(e) => {
                self.drop_pending(NodeRef::Note(temp));
                self.report(format!("note:{}", temp), &e);
                Err(e)
            }
        }
    }

    /// Remove the local node of a failed create
    fn drop_pending(&self, node: NodeRef) {
        let mut tree = self.tree();
        self.pending().remove(&node.uuid());
        if tree.remove(node).is_err() {
            tracing::debug!("failed create {:?} was already removed", node);
        }
    }

    /// A create finished after its local node was deleted
    fn discard_orphan<F>(&self, resource: String, delete: F)
    where
        F: FnOnce(Arc<dyn RemoteStore>) -> BoxFuture<'static, SyncResult<()>>,
    {
        tracing::warn!("{} was deleted locally before its create completed", resource);
        self.fire_and_forget(resource, delete);
    }

    // ------------------------------------------------------------------
    // Rename
    // ------------------------------------------------------------------

    /// Rename locally and persist in the background
    pub fn rename(&self, node: NodeRef, title: &str) -> SyncResult<()> {
        self.tree().rename(node, title)?;
        if self.is_pending(node.uuid()) {
            return Ok(());
        }
        match node {
            NodeRef::Notebook(id) => self.push_notebook(id),
            NodeRef::Section(id) => self.push_section_title(id),
            NodeRef::Note(id) => {
                let snapshot = self.tree().note(id).map(Note::snapshot);
                if let Some(snapshot) = snapshot {
                    self.saves.mark_dirty(id, snapshot);
                    let saves = self.saves.clone();
                    tokio::spawn(async move {
                        if let Err(e) = saves.flush(id).await {
                            tracing::debug!("rename of note {} not saved: {}", id, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    pub fn recolor_notebook(&self, id: NotebookId, color: impl Into<String>) -> SyncResult<()> {
        self.tree().set_notebook_color(id, color.into())?;
        if !self.is_pending(id.as_uuid()) {
            self.push_notebook(id);
        }
        Ok(())
    }

    fn push_notebook(&self, id: NotebookId) {
        let request = self.tree().notebook(id).map(|node| NotebookRequest {
            title: node.notebook.title.clone(),
            color: node.notebook.color.clone(),
        });
        if let Some(request) = request {
            self.fire_and_forget(format!("notebook:{}", id), move |remote| {
                Box::pin(async move { remote.update_notebook(id, request).await.map(|_| ()) })
            });
        }
    }

    fn push_section_title(&self, id: SectionId) {
        let title = self.tree().section(id).map(|s| s.title.clone());
        if let Some(title) = title {
            self.fire_and_forget(format!("section:{}", id), move |remote| {
                Box::pin(async move { remote.rename_section(id, title).await })
            });
        }
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Reparent a section; reverted when the server rejects the move
    pub async fn move_section(&self, id: SectionId, new_parent: Option<SectionId>) -> SyncResult<()> {
        if self.is_pending(id.as_uuid()) || new_parent.is_some_and(|p| self.is_pending(p.as_uuid())) {
            return Err(SyncError::validation("parentId", "section is still being created"));
        }
        let placement = self.tree().move_section(id, new_parent)?;
        if let Err(e) = self.remote.move_section(id, new_parent).await {
            if let Err(revert) = self.tree().restore_section(id, placement) {
                tracing::warn!("could not revert move of section {}: {}", id, revert);
            }
            self.report(format!("section:{}", id), &e);
            return Err(e);
        }
        Ok(())
    }

    /// Apply a new child order; reverted when the server rejects it
    pub async fn reorder(&self, parent: ParentRef, ordered: Vec<Uuid>) -> SyncResult<()> {
        if ordered.iter().any(|id| self.is_pending(*id)) {
            return Err(SyncError::validation("orderedIds", "a child is still being created"));
        }
        let (previous, notebook_id) = {
            let mut tree = self.tree();
            let notebook_id = match parent {
                ParentRef::Notebook(id) => Some(id),
                ParentRef::Section(id) | ParentRef::SectionNotes(id) => tree.notebook_of(NodeRef::Section(id)),
                ParentRef::Notebooks => None,
            };
            (tree.reorder(parent, &ordered)?, notebook_id)
        };

        let result = match (parent, notebook_id) {
            (ParentRef::Notebooks, _) => {
                self.remote
                    .reorder_notebooks(ordered.iter().map(|id| NotebookId::from(*id)).collect())
                    .await
            }
            (ParentRef::SectionNotes(_), _) => {
                self.remote
                    .reorder_notes(ordered.iter().map(|id| NoteId::from(*id)).collect())
                    .await
            }
            (_, Some(notebook_id)) => {
                self.remote
                    .reorder_sections(notebook_id, ordered.iter().map(|id| SectionId::from(*id)).collect())
                    .await
            }
            (_, None) => Err(SyncError::stale(parent_uuid(parent))),
        };

        if let Err(e) = result {
            if let Err(revert) = self.tree().reorder(parent, &previous) {
                tracing::warn!("could not revert reorder: {}", revert);
            }
            self.report(format!("order:{}", parent_uuid(parent)), &e);
            return Err(e);
        }
        Ok(())
    }

    /// Delete a node with everything below it.
    ///
    /// Save state of every removed note is cancelled first, so a write that
    /// completes afterwards cannot bring a note back. When the server rejects
    /// the delete the affected part of the tree is refetched.
    pub async fn delete(&self, node: NodeRef) -> SyncResult<()> {
        let owner = self.read(|tree| tree.notebook_of(node));
        let removal = self.tree().remove(node)?;
        self.forget_notes(&removal.notes);
        tracing::info!(
            "deleted {:?} ({} sections, {} notes)",
            node,
            removal.sections.len(),
            removal.notes.len()
        );

        if self.is_pending(node.uuid()) {
            return Ok(());
        }
        let result = match node {
            NodeRef::Notebook(id) => self.remote.delete_notebook(id).await,
            NodeRef::Section(id) => self.remote.delete_section(id).await,
            NodeRef::Note(id) => self.remote.delete_note(id).await,
        };
        if let Err(e) = result {
            self.report(node_resource(node), &e);
            let refetch = match (node, owner) {
                (NodeRef::Notebook(_), _) | (_, None) => self.load_notebooks().await,
                (_, Some(notebook_id)) => {
                    self.tree().mark_stale(notebook_id);
                    self.refresh_notebook(notebook_id).await.map(|_| ())
                }
            };
            if let Err(refetch) = refetch {
                tracing::warn!("refetch after failed delete failed: {}", refetch);
            }
            return Err(e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Apply an editor snapshot and schedule its save
    pub fn edit_note(&self, note_id: NoteId, snapshot: NoteSnapshot) -> SyncResult<()> {
        validate_title(&snapshot.title)?;
        self.tree().apply_snapshot(note_id, &snapshot)?;
        if !self.is_pending(note_id.as_uuid()) {
            self.saves.mark_dirty(note_id, snapshot);
        }
        Ok(())
    }

    /// Refetch one note for the editor. A note with unsaved edits keeps
    /// its local copy; returns the note as the tree now holds it.
    pub async fn fetch_note(&self, note_id: NoteId) -> SyncResult<Note> {
        if self.is_pending(note_id.as_uuid()) {
            return Err(SyncError::validation("id", "note is still being created"));
        }
        let server = self.remote.get_note(note_id).await?;
        let mut tree = self.tree();
        if !tree.contains(NodeRef::Note(note_id)) {
            // Section not loaded; nothing local to refresh
            return Ok(server);
        }
        if self.saves.has_pending(note_id) {
            tracing::debug!("keeping unsaved edits of note {}", note_id);
        } else {
            tree.replace_note(server)?;
        }
        tree.note(note_id).cloned().ok_or_else(|| SyncError::stale(note_id))
    }

    /// Full-text search over the user's notes; a blank query matches nothing
    pub async fn search_notes(&self, query: &str) -> SyncResult<Vec<NoteSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.remote.search_notes(query.to_string()).await
    }

    pub async fn share_note(&self, note_id: NoteId, username: &str, level: PermissionLevel) -> SyncResult<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SyncError::validation("username", "must not be blank"));
        }
        if self.is_pending(note_id.as_uuid()) {
            return Err(SyncError::validation("id", "note is still being created"));
        }
        let request = ShareNoteRequest {
            username: username.to_string(),
            permission_level: level,
        };
        self.remote.share_note(note_id, request).await.map_err(|e| {
            self.report(format!("note:{}:share", note_id), &e);
            e
        })?;
        tracing::info!("shared note {} with {}", note_id, username);
        Ok(())
    }

    pub async fn flush_note(&self, note_id: NoteId) -> SyncResult<()> {
        self.saves.flush(note_id).await
    }

    pub async fn update_tags(&self, note_id: NoteId, tags: Vec<String>) -> SyncResult<()> {
        let previous = self.tree().set_tags(note_id, tags.clone())?;
        if let Err(e) = self.remote.update_tags(note_id, tags).await {
            let _ = self.tree().set_tags(note_id, previous);
            self.report(format!("note:{}:tags", note_id), &e);
            return Err(e);
        }
        Ok(())
    }

    /// Flip the pin flag locally; the server converges in the background.
    /// Returns the new local value.
    pub fn toggle_pin(&self, note_id: NoteId) -> SyncResult<bool> {
        if self.is_pending(note_id.as_uuid()) {
            return Err(SyncError::validation("id", "note is still being created"));
        }
        let desired = {
            let mut tree = self.tree();
            let current = tree.note(note_id).map(|n| n.is_pinned).ok_or_else(|| SyncError::stale(note_id))?;
            tree.set_pinned(note_id, !current)?;
            !current
        };
        // With no toggle in flight the local value was the server's
        self.pins.request(note_id, desired, !desired);
        Ok(desired)
    }

    pub async fn pinned_notes(&self) -> SyncResult<Vec<Note>> {
        self.remote.pinned_notes().await
    }

    pub async fn list_versions(&self, note_id: NoteId) -> SyncResult<Vec<NoteVersion>> {
        self.remote.list_versions(note_id).await
    }

    /// Replace a note with one of its versions, discarding unsaved edits.
    /// When the restore fails the edits are scheduled for saving again.
    pub async fn restore_version(&self, note_id: NoteId, version_id: VersionId) -> SyncResult<Note> {
        if !self.read(|tree| tree.contains(NodeRef::Note(note_id))) {
            return Err(SyncError::stale(note_id));
        }
        let unsaved =
            self.saves.has_pending(note_id) || matches!(self.saves.status(note_id), SaveStatus::Error(_));
        self.saves.cancel(note_id);
        let restored = match self.remote.restore_version(version_id).await {
            Ok(note) if note.id == note_id => note,
            Ok(_) => {
                let e = SyncError::validation("versionId", "version belongs to another note");
                self.rearm_unsaved(note_id, unsaved);
                return Err(e);
            }
            Err(e) => {
                self.report(format!("note:{}:restore", note_id), &e);
                self.rearm_unsaved(note_id, unsaved);
                return Err(e);
            }
        };
        self.tree().replace_note(restored.clone())?;
        tracing::info!("restored note {} to version {}", note_id, version_id);
        Ok(restored)
    }

    fn rearm_unsaved(&self, note_id: NoteId, unsaved: bool) {
        if !unsaved {
            return;
        }
        let snapshot = self.tree().note(note_id).map(Note::snapshot);
        if let Some(snapshot) = snapshot {
            tracing::debug!("restore failed, saving local edits of note {} again", note_id);
            self.saves.mark_dirty(note_id, snapshot);
        }
    }
}

fn node_resource(node: NodeRef) -> String {
    match node {
        NodeRef::Notebook(id) => format!("notebook:{}", id),
        NodeRef::Section(id) => format!("section:{}", id),
        NodeRef::Note(id) => format!("note:{}", id),
    }
}

fn parent_uuid(parent: ParentRef) -> Uuid {
    match parent {
        ParentRef::Notebooks => Uuid::nil(),
        ParentRef::Notebook(id) => id.as_uuid(),
        ParentRef::Section(id) | ParentRef::SectionNotes(id) => id.as_uuid(),
    }
}
