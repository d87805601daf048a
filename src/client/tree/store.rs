use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::{validate_title, NodeRef, NotebookNode, ParentRef, Placement, Removal, SectionNode};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::ids::{NoteId, NotebookId, SectionId};
use crate::shared::notes::{Note, NoteSnapshot, Notebook, Section};

/// Arena of the workspace hierarchy
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    order: Vec<NotebookId>,
    notebooks: HashMap<NotebookId, NotebookNode>,
    sections: HashMap<SectionId, SectionNode>,
    notes: HashMap<NoteId, Note>,
    loaded: HashSet<NotebookId>,
    stale: HashSet<NotebookId>,
    expanded: HashSet<NotebookId>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Notebooks in display order
    pub fn notebooks(&self) -> Vec<&Notebook> {
        self.order
            .iter()
            .filter_map(|id| self.notebooks.get(id))
            .map(|node| &node.notebook)
            .collect()
    }

    pub fn notebook_ids(&self) -> &[NotebookId] {
        &self.order
    }

    /// Every node id currently in the tree
    pub fn node_ids(&self) -> Vec<Uuid> {
        let notebooks = self.order.iter().map(|id| id.as_uuid());
        let sections = self.sections.keys().map(|id| id.as_uuid());
        let notes = self.notes.keys().map(|id| id.as_uuid());
        notebooks.chain(sections).chain(notes).collect()
    }

    pub fn notebook(&self, id: NotebookId) -> Option<&NotebookNode> {
        self.notebooks.get(&id)
    }

    pub fn section(&self, id: SectionId) -> Option<&SectionNode> {
        self.sections.get(&id)
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        match node {
            NodeRef::Notebook(id) => self.notebooks.contains_key(&id),
            NodeRef::Section(id) => self.sections.contains_key(&id),
            NodeRef::Note(id) => self.notes.contains_key(&id),
        }
    }

    /// Classify a raw id against the known nodes
    pub fn locate(&self, id: Uuid) -> Option<NodeRef> {
        if self.notebooks.contains_key(&NotebookId::from(id)) {
            Some(NodeRef::Notebook(NotebookId::from(id)))
        } else if self.sections.contains_key(&SectionId::from(id)) {
            Some(NodeRef::Section(SectionId::from(id)))
        } else if self.notes.contains_key(&NoteId::from(id)) {
            Some(NodeRef::Note(NoteId::from(id)))
        } else {
            None
        }
    }

    /// Notebook that owns a node
    pub fn notebook_of(&self, node: NodeRef) -> Option<NotebookId> {
        match node {
            NodeRef::Notebook(id) => self.notebooks.contains_key(&id).then_some(id),
            NodeRef::Section(id) => self.sections.get(&id).map(|s| s.notebook_id),
            NodeRef::Note(id) => self
                .notes
                .get(&id)
                .and_then(|note| self.sections.get(&note.section_id))
                .map(|s| s.notebook_id),
        }
    }

    /// Ordered ids of a child list
    pub fn children(&self, parent: ParentRef) -> SyncResult<Vec<Uuid>> {
        Ok(match parent {
            ParentRef::Notebooks => self.order.iter().map(|id| id.as_uuid()).collect(),
            ParentRef::Notebook(id) => self
                .notebooks
                .get(&id)
                .ok_or_else(|| SyncError::stale(id))?
                .roots
                .iter()
                .map(|id| id.as_uuid())
                .collect(),
            ParentRef::Section(id) => self
                .sections
                .get(&id)
                .ok_or_else(|| SyncError::stale(id))?
                .children
                .iter()
                .map(|id| id.as_uuid())
                .collect(),
            ParentRef::SectionNotes(id) => self
                .sections
                .get(&id)
                .ok_or_else(|| SyncError::stale(id))?
                .notes
                .iter()
                .map(|id| id.as_uuid())
                .collect(),
        })
    }

    /// True when `node` sits anywhere below `ancestor`
    pub fn is_descendant(&self, ancestor: SectionId, node: SectionId) -> bool {
        let mut current = self.sections.get(&node).and_then(|s| s.parent);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.sections.len() {
                break;
            }
            current = self.sections.get(&id).and_then(|s| s.parent);
        }
        false
    }

    /// The section and all sections below it, depth-first
    pub fn subtree(&self, root: SectionId) -> Vec<SectionId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.sections.get(&id) {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Notes under a section, sub-sections included
    pub fn subtree_notes(&self, root: SectionId) -> Vec<NoteId> {
        self.subtree(root)
            .into_iter()
            .filter_map(|id| self.sections.get(&id))
            .flat_map(|node| node.notes.iter().copied())
            .collect()
    }

    /// Locally known pinned notes
    pub fn pinned_notes(&self) -> Vec<&Note> {
        let mut pinned: Vec<&Note> = self.notes.values().filter(|note| note.is_pinned).collect();
        pinned.sort_by(|a, b| a.title.cmp(&b.title));
        pinned
    }

    /// Rebuild the nested wire shape of a notebook's sections
    pub fn outline(&self, notebook_id: NotebookId) -> Vec<Section> {
        fn build(store: &TreeStore, id: SectionId) -> Option<Section> {
            let node = store.sections.get(&id)?;
            Some(Section {
                id,
                title: node.title.clone(),
                parent_id: node.parent,
                notebook_id: node.notebook_id,
                children: node.children.iter().filter_map(|c| build(store, *c)).collect(),
            })
        }
        self.notebooks
            .get(&notebook_id)
            .map(|nb| nb.roots.iter().filter_map(|id| build(self, *id)).collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // View state
    // ------------------------------------------------------------------

    pub fn is_loaded(&self, id: NotebookId) -> bool {
        self.loaded.contains(&id)
    }

    pub fn is_stale(&self, id: NotebookId) -> bool {
        self.stale.contains(&id)
    }

    pub fn mark_stale(&mut self, id: NotebookId) {
        if self.notebooks.contains_key(&id) {
            self.stale.insert(id);
        }
    }

    pub fn is_expanded(&self, id: NotebookId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn set_expanded(&mut self, id: NotebookId, expanded: bool) {
        if expanded && self.notebooks.contains_key(&id) {
            self.expanded.insert(id);
        } else {
            self.expanded.remove(&id);
        }
    }

    /// Whether an expand must fetch instead of serving cached children
    pub fn needs_fetch(&self, id: NotebookId) -> bool {
        !self.is_loaded(id) || self.is_stale(id)
    }

    // ------------------------------------------------------------------
    // Inserts
    // ------------------------------------------------------------------

    pub fn insert_notebook(&mut self, notebook: Notebook) -> SyncResult<()> {
        validate_title(&notebook.title)?;
        if self.notebooks.contains_key(&notebook.id) {
            return Err(SyncError::validation("id", format!("notebook {} already exists", notebook.id)));
        }
        self.order.push(notebook.id);
        self.notebooks.insert(
            notebook.id,
            NotebookNode {
                notebook,
                roots: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append a section to a notebook root list or to a parent section
    pub fn insert_section(
        &mut self,
        id: SectionId,
        notebook_id: NotebookId,
        parent: Option<SectionId>,
        title: &str,
    ) -> SyncResult<()> {
        let title = validate_title(title)?;
        if self.sections.contains_key(&id) {
            return Err(SyncError::validation("id", format!("section {} already exists", id)));
        }
        if !self.notebooks.contains_key(&notebook_id) {
            return Err(SyncError::stale(notebook_id));
        }
        if let Some(parent_id) = parent {
            let parent_node = self.sections.get(&parent_id).ok_or_else(|| SyncError::stale(parent_id))?;
            if parent_node.notebook_id != notebook_id {
                return Err(SyncError::validation(
                    "parentId",
                    "parent section belongs to another notebook",
                ));
            }
        }
        self.section_siblings_mut(notebook_id, parent)?.push(id);
        self.sections.insert(
            id,
            SectionNode {
                id,
                title,
                notebook_id,
                parent,
                children: Vec::new(),
                notes: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn insert_note(&mut self, note: Note) -> SyncResult<()> {
        validate_title(&note.title)?;
        if self.notes.contains_key(&note.id) {
            return Err(SyncError::validation("id", format!("note {} already exists", note.id)));
        }
        let section = self
            .sections
            .get_mut(&note.section_id)
            .ok_or_else(|| SyncError::stale(note.section_id))?;
        section.notes.push(note.id);
        self.notes.insert(note.id, note);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Temporary id reconciliation
    // ------------------------------------------------------------------

    /// Swap a locally created notebook for the server's id, keeping its position.
    ///
    /// A local rename made while the create was in flight wins; returns `true`
    /// when the local title or color differs from the server's.
    pub fn reconcile_notebook(&mut self, temp: NotebookId, server: Notebook) -> SyncResult<bool> {
        let mut node = self.notebooks.remove(&temp).ok_or_else(|| SyncError::stale(temp))?;
        let server_id = server.id;
        let diverged = node.notebook.title != server.title || node.notebook.color != server.color;
        node.notebook.id = server_id;
        for root in &node.roots {
            for id in self.subtree(*root) {
                if let Some(section) = self.sections.get_mut(&id) {
                    section.notebook_id = server_id;
                }
            }
        }
        self.notebooks.insert(server_id, node);
        replace_id(&mut self.order, temp, server_id);
        for set in [&mut self.loaded, &mut self.stale, &mut self.expanded] {
            if set.remove(&temp) {
                set.insert(server_id);
            }
        }
        Ok(diverged)
    }

    /// Swap a locally created section for the server's id.
    ///
    /// Returns `true` when the local title differs from the server's.
    pub fn reconcile_section(&mut self, temp: SectionId, server: &Section) -> SyncResult<bool> {
        let mut node = self.sections.remove(&temp).ok_or_else(|| SyncError::stale(temp))?;
        let server_id = server.id;
        let diverged = node.title != server.title;
        node.id = server_id;
        for child in &node.children {
            if let Some(child) = self.sections.get_mut(child) {
                child.parent = Some(server_id);
            }
        }
        for note in &node.notes {
            if let Some(note) = self.notes.get_mut(note) {
                note.section_id = server_id;
            }
        }
        let (notebook_id, parent) = (node.notebook_id, node.parent);
        self.sections.insert(server_id, node);
        let siblings = self.section_siblings_mut(notebook_id, parent)?;
        replace_id(siblings, temp, server_id);
        Ok(diverged)
    }

    /// Swap a locally created note for the server's copy.
    ///
    /// Local title and content win over the server's. Returns `true` when they
    /// differ from what the server holds.
    pub fn reconcile_note(&mut self, temp: NoteId, mut server: Note) -> SyncResult<bool> {
        let local = self.notes.remove(&temp).ok_or_else(|| SyncError::stale(temp))?;
        let diverged = local.title != server.title || local.content != server.content;
        server.title = local.title;
        server.content = local.content;
        server.section_id = local.section_id;
        if let Some(section) = self.sections.get_mut(&local.section_id) {
            replace_id(&mut section.notes, temp, server.id);
        }
        self.notes.insert(server.id, server);
        Ok(diverged)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Rename any node; returns the previous title
    pub fn rename(&mut self, node: NodeRef, title: &str) -> SyncResult<String> {
        let title = validate_title(title)?;
        let slot = match node {
            NodeRef::Notebook(id) => &mut self.notebooks.get_mut(&id).ok_or_else(|| SyncError::stale(id))?.notebook.title,
            NodeRef::Section(id) => &mut self.sections.get_mut(&id).ok_or_else(|| SyncError::stale(id))?.title,
            NodeRef::Note(id) => &mut self.notes.get_mut(&id).ok_or_else(|| SyncError::stale(id))?.title,
        };
        Ok(std::mem::replace(slot, title))
    }

    pub fn set_notebook_color(&mut self, id: NotebookId, color: String) -> SyncResult<String> {
        let node = self.notebooks.get_mut(&id).ok_or_else(|| SyncError::stale(id))?;
        Ok(std::mem::replace(&mut node.notebook.color, color))
    }

    /// Reparent a section under `new_parent`, or to its notebook root.
    ///
    /// Rejected without mutation when the target is the section itself, one of
    /// its descendants, or in another notebook. Returns the old placement.
    pub fn move_section(&mut self, id: SectionId, new_parent: Option<SectionId>) -> SyncResult<Placement> {
        let node = self.sections.get(&id).ok_or_else(|| SyncError::stale(id))?;
        let notebook_id = node.notebook_id;
        let old_parent = node.parent;

        if let Some(target) = new_parent {
            if target == id {
                return Err(SyncError::validation("parentId", "a section cannot be its own parent"));
            }
            let target_node = self.sections.get(&target).ok_or_else(|| SyncError::stale(target))?;
            if target_node.notebook_id != notebook_id {
                return Err(SyncError::validation(
                    "parentId",
                    "cannot move a section into another notebook",
                ));
            }
            if self.is_descendant(id, target) {
                return Err(SyncError::validation(
                    "parentId",
                    "cannot move a section under its own descendant",
                ));
            }
        }

        let old_siblings = self.section_siblings_mut(notebook_id, old_parent)?;
        let index = old_siblings
            .iter()
            .position(|s| *s == id)
            .ok_or_else(|| SyncError::stale(id))?;
        old_siblings.remove(index);
        self.section_siblings_mut(notebook_id, new_parent)?.push(id);
        if let Some(node) = self.sections.get_mut(&id) {
            node.parent = new_parent;
        }

        Ok(Placement {
            parent: section_parent_ref(notebook_id, old_parent),
            index,
        })
    }

    /// Put a section back where a [`Placement`] says it was
    pub fn restore_section(&mut self, id: SectionId, placement: Placement) -> SyncResult<()> {
        let node = self.sections.get(&id).ok_or_else(|| SyncError::stale(id))?;
        let notebook_id = node.notebook_id;
        let current = node.parent;
        let parent = match placement.parent {
            ParentRef::Notebook(nb) if nb == notebook_id => None,
            ParentRef::Section(section) if section != id && !self.is_descendant(id, section) => Some(section),
            _ => return Err(SyncError::validation("placement", "placement does not fit this section")),
        };
        if let Some(parent_id) = parent {
            if !self.sections.contains_key(&parent_id) {
                return Err(SyncError::stale(parent_id));
            }
        }

        self.section_siblings_mut(notebook_id, current)?.retain(|s| *s != id);
        let siblings = self.section_siblings_mut(notebook_id, parent)?;
        let index = placement.index.min(siblings.len());
        siblings.insert(index, id);
        if let Some(node) = self.sections.get_mut(&id) {
            node.parent = parent;
        }
        Ok(())
    }

    /// Replace a child list with a permutation of itself; returns the old order
    pub fn reorder(&mut self, parent: ParentRef, ordered: &[Uuid]) -> SyncResult<Vec<Uuid>> {
        let current = self.children(parent)?;
        if !is_permutation(&current, ordered) {
            return Err(SyncError::validation(
                "orderedIds",
                "must be a permutation of the current children",
            ));
        }
        self.write_children(parent, ordered)?;
        Ok(current)
    }

    fn write_children(&mut self, parent: ParentRef, ordered: &[Uuid]) -> SyncResult<()> {
        match parent {
            ParentRef::Notebooks => {
                self.order = ordered.iter().map(|id| NotebookId::from(*id)).collect();
            }
            ParentRef::Notebook(id) => {
                self.notebooks.get_mut(&id).ok_or_else(|| SyncError::stale(id))?.roots =
                    ordered.iter().map(|id| SectionId::from(*id)).collect();
            }
            ParentRef::Section(id) => {
                self.sections.get_mut(&id).ok_or_else(|| SyncError::stale(id))?.children =
                    ordered.iter().map(|id| SectionId::from(*id)).collect();
            }
            ParentRef::SectionNotes(id) => {
                self.sections.get_mut(&id).ok_or_else(|| SyncError::stale(id))?.notes =
                    ordered.iter().map(|id| NoteId::from(*id)).collect();
            }
        }
        Ok(())
    }

    /// Delete a node and everything below it
    pub fn remove(&mut self, node: NodeRef) -> SyncResult<Removal> {
        match node {
            NodeRef::Note(id) => {
                let note = self.notes.remove(&id).ok_or_else(|| SyncError::stale(id))?;
                let mut placement = None;
                if let Some(section) = self.sections.get_mut(&note.section_id) {
                    if let Some(index) = section.notes.iter().position(|n| *n == id) {
                        section.notes.remove(index);
                        placement = Some(Placement {
                            parent: ParentRef::SectionNotes(note.section_id),
                            index,
                        });
                    }
                }
                Ok(Removal {
                    notes: vec![id],
                    placement,
                    ..Removal::default()
                })
            }
            NodeRef::Section(id) => {
                let node = self.sections.get(&id).ok_or_else(|| SyncError::stale(id))?;
                let (notebook_id, parent) = (node.notebook_id, node.parent);
                let siblings = self.section_siblings_mut(notebook_id, parent)?;
                let index = siblings.iter().position(|s| *s == id);
                siblings.retain(|s| *s != id);

                let doomed = self.subtree(id);
                let mut removal = self.drop_sections(doomed);
                removal.placement = index.map(|index| Placement {
                    parent: section_parent_ref(notebook_id, parent),
                    index,
                });
                Ok(removal)
            }
            NodeRef::Notebook(id) => {
                let node = self.notebooks.remove(&id).ok_or_else(|| SyncError::stale(id))?;
                let index = self.order.iter().position(|n| *n == id);
                self.order.retain(|n| *n != id);
                for set in [&mut self.loaded, &mut self.stale, &mut self.expanded] {
                    set.remove(&id);
                }

                let doomed: Vec<SectionId> = node.roots.iter().flat_map(|root| self.subtree(*root)).collect();
                let mut removal = self.drop_sections(doomed);
                removal.notebooks.push(id);
                removal.placement = index.map(|index| Placement {
                    parent: ParentRef::Notebooks,
                    index,
                });
                Ok(removal)
            }
        }
    }

    fn drop_sections(&mut self, ids: Vec<SectionId>) -> Removal {
        let mut removal = Removal::default();
        for id in ids {
            if let Some(node) = self.sections.remove(&id) {
                for note in node.notes {
                    if self.notes.remove(&note).is_some() {
                        removal.notes.push(note);
                    }
                }
                removal.sections.push(id);
            }
        }
        removal
    }

    // ------------------------------------------------------------------
    // Note state
    // ------------------------------------------------------------------

    pub fn apply_snapshot(&mut self, id: NoteId, snapshot: &NoteSnapshot) -> SyncResult<()> {
        let note = self.notes.get_mut(&id).ok_or_else(|| SyncError::stale(id))?;
        note.apply_snapshot(snapshot);
        Ok(())
    }

    /// Record a confirmed write. Returns `false` (and changes nothing) when the
    /// note no longer exists locally.
    pub fn apply_saved_note(&mut self, saved: &Note) -> bool {
        match self.notes.get_mut(&saved.id) {
            Some(note) => {
                note.updated_at = saved.updated_at;
                true
            }
            None => false,
        }
    }

    /// Replace a note's data in place (e.g. after restoring a version)
    pub fn replace_note(&mut self, note: Note) -> SyncResult<()> {
        let existing = self.notes.get_mut(&note.id).ok_or_else(|| SyncError::stale(note.id))?;
        let section_id = existing.section_id;
        *existing = note;
        existing.section_id = section_id;
        Ok(())
    }

    pub fn set_tags(&mut self, id: NoteId, tags: Vec<String>) -> SyncResult<Vec<String>> {
        let note = self.notes.get_mut(&id).ok_or_else(|| SyncError::stale(id))?;
        Ok(std::mem::replace(&mut note.tags, tags))
    }

    /// Set the local pin flag; returns the previous value
    pub fn set_pinned(&mut self, id: NoteId, pinned: bool) -> SyncResult<bool> {
        let note = self.notes.get_mut(&id).ok_or_else(|| SyncError::stale(id))?;
        Ok(std::mem::replace(&mut note.is_pinned, pinned))
    }

    // ------------------------------------------------------------------
    // Server refreshes
    // ------------------------------------------------------------------

    /// Adopt the server's notebook list. Notebooks missing from it are removed
    /// with everything below them.
    pub fn replace_notebooks(&mut self, notebooks: Vec<Notebook>) -> Removal {
        let incoming: HashSet<NotebookId> = notebooks.iter().map(|nb| nb.id).collect();
        let gone: Vec<NotebookId> = self
            .order
            .iter()
            .filter(|id| !incoming.contains(id))
            .copied()
            .collect();

        let mut removal = Removal::default();
        for id in gone {
            if let Ok(part) = self.remove(NodeRef::Notebook(id)) {
                removal.notebooks.extend(part.notebooks);
                removal.sections.extend(part.sections);
                removal.notes.extend(part.notes);
            }
        }

        self.order.clear();
        let mut seen = HashSet::new();
        for notebook in notebooks {
            if !seen.insert(notebook.id) {
                continue;
            }
            self.order.push(notebook.id);
            match self.notebooks.get_mut(&notebook.id) {
                Some(node) => node.notebook = notebook,
                None => {
                    self.notebooks.insert(
                        notebook.id,
                        NotebookNode {
                            notebook,
                            roots: Vec::new(),
                        },
                    );
                }
            }
        }
        removal
    }

    /// Adopt the server's section tree for one notebook. Notes of sections that
    /// survive are kept; notes of vanished sections are dropped and returned.
    /// Adopt the server's section tree for a notebook. Sections listed in
    /// `keep` are local creates the server does not know yet; they survive
    /// under their old parent when it still exists, otherwise as roots.
    /// Returns the notes whose section vanished.
    pub fn replace_sections(
        &mut self,
        notebook_id: NotebookId,
        tree: Vec<Section>,
        keep: &HashSet<Uuid>,
    ) -> SyncResult<Vec<NoteId>> {
        let roots = self
            .notebooks
            .get(&notebook_id)
            .ok_or_else(|| SyncError::stale(notebook_id))?
            .roots
            .clone();

        let mut kept_notes: HashMap<SectionId, Vec<NoteId>> = HashMap::new();
        let mut carried = Vec::new();
        let existing: Vec<SectionId> = roots.iter().flat_map(|root| self.subtree(*root)).collect();
        for id in existing {
            match self.sections.remove(&id) {
                Some(node) if keep.contains(&id.as_uuid()) => carried.push(node),
                Some(node) => {
                    kept_notes.insert(id, node.notes);
                }
                None => {}
            }
        }

        let mut seen = HashSet::new();
        let mut new_roots = Vec::new();
        for section in tree {
            if let Some(id) = self.adopt_section(section, notebook_id, None, &mut kept_notes, &mut seen) {
                new_roots.push(id);
            }
        }
        if let Some(node) = self.notebooks.get_mut(&notebook_id) {
            node.roots = new_roots;
        }

        // Preorder, so a carried parent is back before its carried children
        for mut node in carried {
            let parent = node
                .parent
                .filter(|p| self.sections.get(p).is_some_and(|s| s.notebook_id == notebook_id));
            node.parent = parent;
            node.children.clear();
            let id = node.id;
            self.sections.insert(id, node);
            self.section_siblings_mut(notebook_id, parent)?.push(id);
        }

        let mut dropped = Vec::new();
        for (_, notes) in kept_notes {
            for note in notes {
                if self.notes.remove(&note).is_some() {
                    dropped.push(note);
                }
            }
        }

        self.loaded.insert(notebook_id);
        self.stale.remove(&notebook_id);
        Ok(dropped)
    }

    fn adopt_section(
        &mut self,
        section: Section,
        notebook_id: NotebookId,
        parent: Option<SectionId>,
        kept_notes: &mut HashMap<SectionId, Vec<NoteId>>,
        seen: &mut HashSet<SectionId>,
    ) -> Option<SectionId> {
        let id = section.id;
        if !seen.insert(id) || self.sections.contains_key(&id) {
            tracing::warn!("skipping duplicate section {} in server tree", id);
            return None;
        }
        let title = validate_title(&section.title).unwrap_or_else(|_| "Untitled".to_string());
        self.sections.insert(
            id,
            SectionNode {
                id,
                title,
                notebook_id,
                parent,
                children: Vec::new(),
                notes: kept_notes.remove(&id).unwrap_or_default(),
            },
        );
        let mut children = Vec::new();
        for child in section.children {
            if let Some(child_id) = self.adopt_section(child, notebook_id, Some(id), kept_notes, seen) {
                children.push(child_id);
            }
        }
        if let Some(node) = self.sections.get_mut(&id) {
            node.children = children;
        }
        Some(id)
    }

    /// Adopt the server's note list for a section; returns notes that vanished.
    /// Notes listed in `keep` are still being created and stay at the end.
    pub fn replace_notes(
        &mut self,
        section_id: SectionId,
        notes: Vec<Note>,
        keep: &HashSet<Uuid>,
    ) -> SyncResult<Vec<NoteId>> {
        let previous = self
            .sections
            .get(&section_id)
            .ok_or_else(|| SyncError::stale(section_id))?
            .notes
            .clone();

        let mut order = Vec::with_capacity(notes.len());
        let mut incoming = HashSet::new();
        for mut note in notes {
            if !incoming.insert(note.id) {
                continue;
            }
            note.section_id = section_id;
            order.push(note.id);
            self.notes.insert(note.id, note);
        }

        let mut dropped = Vec::new();
        for id in previous {
            if incoming.contains(&id) {
                continue;
            }
            if keep.contains(&id.as_uuid()) && self.notes.contains_key(&id) {
                order.push(id);
            } else if self.notes.remove(&id).is_some() {
                dropped.push(id);
            }
        }
        if let Some(section) = self.sections.get_mut(&section_id) {
            section.notes = order;
        }
        Ok(dropped)
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    /// Check every structural invariant, describing the first violation
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut listed = HashSet::new();
        for id in &self.order {
            if !listed.insert(*id) {
                return Err(format!("notebook {} listed twice", id));
            }
            if !self.notebooks.contains_key(id) {
                return Err(format!("notebook {} listed but missing", id));
            }
        }
        if listed.len() != self.notebooks.len() {
            return Err("notebook map and order disagree".to_string());
        }

        let mut placed = HashSet::new();
        for (nb_id, node) in &self.notebooks {
            for root in &node.roots {
                let section = self.sections.get(root).ok_or_else(|| format!("root {} missing", root))?;
                if section.parent.is_some() || section.notebook_id != *nb_id {
                    return Err(format!("root {} has wrong parent or notebook", root));
                }
                if !placed.insert(*root) {
                    return Err(format!("section {} placed twice", root));
                }
            }
        }
        for (id, section) in &self.sections {
            if !self.notebooks.contains_key(&section.notebook_id) {
                return Err(format!("section {} in unknown notebook", id));
            }
            for child in &section.children {
                let child_node = self.sections.get(child).ok_or_else(|| format!("child {} missing", child))?;
                if child_node.parent != Some(*id) || child_node.notebook_id != section.notebook_id {
                    return Err(format!("child {} does not point back to {}", child, id));
                }
                if !placed.insert(*child) {
                    return Err(format!("section {} placed twice", child));
                }
            }
            if self.is_descendant(*id, *id) {
                return Err(format!("section {} is its own ancestor", id));
            }
            for note in &section.notes {
                let note_node = self.notes.get(note).ok_or_else(|| format!("note {} missing", note))?;
                if note_node.section_id != *id {
                    return Err(format!("note {} listed under the wrong section", note));
                }
            }
        }
        if placed.len() != self.sections.len() {
            return Err("some sections are not reachable from a notebook".to_string());
        }
        let listed_notes: usize = self.sections.values().map(|s| s.notes.len()).sum();
        if listed_notes != self.notes.len() {
            return Err("note map and section lists disagree".to_string());
        }
        Ok(())
    }

    fn section_siblings_mut(
        &mut self,
        notebook_id: NotebookId,
        parent: Option<SectionId>,
    ) -> SyncResult<&mut Vec<SectionId>> {
        match parent {
            Some(parent_id) => self
                .sections
                .get_mut(&parent_id)
                .map(|node| &mut node.children)
                .ok_or_else(|| SyncError::stale(parent_id)),
            None => self
                .notebooks
                .get_mut(&notebook_id)
                .map(|node| &mut node.roots)
                .ok_or_else(|| SyncError::stale(notebook_id)),
        }
    }
}

fn section_parent_ref(notebook_id: NotebookId, parent: Option<SectionId>) -> ParentRef {
    match parent {
        Some(section) => ParentRef::Section(section),
        None => ParentRef::Notebook(notebook_id),
    }
}

fn replace_id<T: PartialEq + Copy>(list: &mut [T], from: T, to: T) {
    for slot in list.iter_mut() {
        if *slot == from {
            *slot = to;
        }
    }
}

fn is_permutation(current: &[Uuid], ordered: &[Uuid]) -> bool {
    if current.len() != ordered.len() {
        return false;
    }
    let expected: HashSet<&Uuid> = current.iter().collect();
    let given: HashSet<&Uuid> = ordered.iter().collect();
    given.len() == ordered.len() && expected == given
}
