//! Local-first tree operations against an in-memory server

#[macro_use]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{advance, drain, settle, FakeRemote};
use notesync::client::api::RemoteStore;
use notesync::client::events::{EventBus, SyncEvent};
use notesync::client::save::SaveStatus;
use notesync::client::tree::{NodeRef, ParentRef};
use notesync::client::workspace::NotesWorkspace;
use notesync::shared::error::SyncError;
use notesync::shared::ids::{NoteId, NotebookId, SectionId};
use notesync::shared::notes::{NoteSnapshot, PermissionLevel};
use pretty_assertions::assert_eq;
use serde_json::json;

const DEBOUNCE: Duration = Duration::from_secs(1);

struct Fixture {
    fake: FakeRemote,
    workspace: NotesWorkspace,
    bus: EventBus<SyncEvent>,
    notebook: NotebookId,
}

impl Fixture {
    /// One notebook, loaded and expanded
    async fn new() -> Self {
        let fake = FakeRemote::new();
        let notebook = fake.seed_notebook("Physics").id;
        let bus = EventBus::new();
        let remote: Arc<dyn RemoteStore> = Arc::new(fake.clone());
        let workspace = NotesWorkspace::new(remote, DEBOUNCE, bus.clone());
        workspace.load_notebooks().await.unwrap();
        workspace.expand_notebook(notebook).await.unwrap();
        Self {
            fake,
            workspace,
            bus,
            notebook,
        }
    }

    /// Seed a section with one note on the server and load both
    async fn section_with_note(&self, title: &str) -> (SectionId, NoteId) {
        let section = self.fake.seed_section(self.notebook, None, title).id;
        let note = self.fake.seed_note(section, "Kinematics").id;
        self.workspace.refresh_notebook(self.notebook).await.unwrap();
        self.workspace.load_section_notes(section).await.unwrap();
        (section, note)
    }

    fn root_titles(&self) -> Vec<String> {
        self.workspace
            .read(|tree| tree.outline(self.notebook))
            .into_iter()
            .map(|s| s.title)
            .collect()
    }

    fn temp_section(&self, title: &str) -> SectionId {
        self.workspace
            .read(|tree| tree.outline(self.notebook))
            .into_iter()
            .find(|s| s.title == title)
            .map(|s| s.id)
            .expect("section not in tree")
    }
}

#[tokio::test(start_paused = true)]
async fn create_nested_sections_then_reject_cycle() {
    let fx = Fixture::new().await;
    let a = assert_ok!(fx.workspace.create_section(fx.notebook, "A").await);
    let b = assert_ok!(fx.workspace.create_sub_section(a, "B").await);

    let err = fx.workspace.move_section(a, Some(b)).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(fx.fake.count("move_section"), 0, "no network call on validation failure");

    let outline = fx.workspace.read(|tree| tree.outline(fx.notebook));
    assert_eq!(outline.len(), 1);
    assert_eq!(outline[0].id, a);
    assert_eq!(outline[0].children.len(), 1);
    assert_eq!(outline[0].children[0].id, b);
    assert!(fx.workspace.read(|tree| tree.check_invariants()).is_ok());
}

#[tokio::test(start_paused = true)]
async fn created_nodes_carry_server_ids() {
    let fx = Fixture::new().await;
    let notebook = assert_ok!(fx.workspace.create_notebook("Chemistry", None).await);
    assert!(fx.fake.notebook(notebook).is_some());

    let section = assert_ok!(fx.workspace.create_section(fx.notebook, "Optics").await);
    assert!(fx.fake.section(section).is_some());
    let note = assert_ok!(fx.workspace.create_note(section, "Lenses").await);
    assert!(fx.fake.note(note).is_some());
    assert_eq!(
        fx.workspace.read(|tree| tree.section(section).map(|s| s.notes.clone())),
        Some(vec![note])
    );
}

#[tokio::test(start_paused = true)]
async fn failed_create_removes_the_temporary_node() {
    let fx = Fixture::new().await;
    let mut events = fx.bus.subscribe();
    fx.fake.fail_next("create_notebook");

    assert_err!(fx.workspace.create_notebook("Biology", None).await);
    assert_eq!(fx.workspace.read(|tree| tree.notebook_ids().len()), 1);
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, SyncEvent::PersistFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn blank_title_is_rejected_before_any_request() {
    let fx = Fixture::new().await;
    assert_err!(fx.workspace.create_section(fx.notebook, "   ").await, SyncError::Validation { .. });
    assert_eq!(fx.fake.count("create_section"), 0);
}

#[tokio::test(start_paused = true)]
async fn rename_during_create_wins_and_is_pushed() {
    let fx = Fixture::new().await;
    fx.fake.delay("create_section", Duration::from_millis(200));

    let workspace = fx.workspace.clone();
    let notebook = fx.notebook;
    let create = tokio::spawn(async move { workspace.create_section(notebook, "Draft").await });
    settle().await;

    let temp = fx.temp_section("Draft");
    assert_ok!(fx.workspace.rename(NodeRef::Section(temp), "Thermodynamics"));
    assert_eq!(fx.fake.count("rename_section"), 0, "pending ids stay local");

    advance(Duration::from_millis(300)).await;
    let id = create.await.unwrap().unwrap();
    assert_ne!(id, temp);
    assert_eq!(fx.root_titles(), vec!["Thermodynamics"]);
    settle().await;
    assert_eq!(fx.fake.section(id).unwrap().title, "Thermodynamics");
}

#[tokio::test(start_paused = true)]
async fn delete_during_create_discards_the_server_copy() {
    let fx = Fixture::new().await;
    let section = assert_ok!(fx.workspace.create_section(fx.notebook, "Optics").await);
    fx.fake.delay("create_note", Duration::from_millis(200));

    let workspace = fx.workspace.clone();
    let create = tokio::spawn(async move { workspace.create_note(section, "Prisms").await });
    settle().await;

    let temp = fx
        .workspace
        .read(|tree| tree.section(section).and_then(|s| s.notes.first().copied()))
        .expect("temporary note inserted");
    assert_ok!(fx.workspace.delete(NodeRef::Note(temp)).await);
    assert_eq!(fx.fake.count("delete_note"), 0);

    advance(Duration::from_millis(300)).await;
    assert_err!(create.await.unwrap(), SyncError::StaleReference { .. });
    settle().await;
    assert_eq!(fx.fake.count("delete_note"), 1);
    assert!(fx.workspace.read(|tree| tree.section(section).unwrap().notes.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn refetch_during_section_create_keeps_the_pending_node() {
    let fx = Fixture::new().await;
    fx.fake.delay("create_section", Duration::from_millis(500));
    let workspace = fx.workspace.clone();
    let notebook = fx.notebook;
    let create = tokio::spawn(async move { workspace.create_section(notebook, "Draft").await });
    settle().await;
    let temp = fx.temp_section("Draft");

    advance(Duration::from_millis(100)).await;
    assert!(assert_ok!(fx.workspace.refresh_notebook(fx.notebook).await));
    assert!(fx.workspace.read(|tree| tree.section(temp).is_some()), "refetch kept the temporary node");

    advance(Duration::from_millis(600)).await;
    let id = assert_ok!(create.await.unwrap());
    settle().await;
    assert!(fx.fake.section(id).is_some());
    assert!(fx.workspace.read(|tree| tree.section(id).is_some()));
    assert!(fx.workspace.read(|tree| tree.section(temp).is_none()));
    assert_eq!(fx.root_titles(), vec!["Draft"]);
    assert_eq!(fx.fake.count("delete_section"), 0);
}

#[tokio::test(start_paused = true)]
async fn note_reload_during_note_create_keeps_the_pending_note() {
    let fx = Fixture::new().await;
    let (section, existing) = fx.section_with_note("Mechanics").await;
    fx.fake.delay("create_note", Duration::from_millis(500));
    let workspace = fx.workspace.clone();
    let create = tokio::spawn(async move { workspace.create_note(section, "Momentum").await });
    settle().await;

    advance(Duration::from_millis(100)).await;
    let listed = assert_ok!(fx.workspace.load_section_notes(section).await);
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], existing);

    advance(Duration::from_millis(600)).await;
    let id = assert_ok!(create.await.unwrap());
    settle().await;
    assert!(fx.fake.note(id).is_some());
    assert_eq!(fx.workspace.read(|tree| tree.section(section).unwrap().notes.clone()), vec![existing, id]);
    assert_eq!(fx.fake.count("delete_note"), 0);
    fx.workspace.read(|tree| tree.check_invariants()).unwrap();
}

#[tokio::test(start_paused = true)]
async fn children_of_pending_parent_are_refused() {
    let fx = Fixture::new().await;
    fx.fake.delay("create_section", Duration::from_millis(200));
    let workspace = fx.workspace.clone();
    let notebook = fx.notebook;
    let create = tokio::spawn(async move { workspace.create_section(notebook, "Draft").await });
    settle().await;

    let temp = fx.temp_section("Draft");
    assert_err!(fx.workspace.create_sub_section(temp, "Child").await, SyncError::Validation { .. });
    advance(Duration::from_millis(300)).await;
    assert_ok!(create.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn failed_move_is_reverted() {
    let fx = Fixture::new().await;
    let first = assert_ok!(fx.workspace.create_section(fx.notebook, "First").await);
    let second = assert_ok!(fx.workspace.create_section(fx.notebook, "Second").await);
    let third = assert_ok!(fx.workspace.create_section(fx.notebook, "Third").await);
    let before = fx.workspace.read(|tree| tree.outline(fx.notebook));
    let mut events = fx.bus.subscribe();
    fx.fake.fail_next("move_section");

    assert_err!(fx.workspace.move_section(second, Some(first)).await);
    assert_eq!(fx.workspace.read(|tree| tree.outline(fx.notebook)), before);
    assert_eq!(
        fx.workspace.read(|tree| tree.notebook(fx.notebook).unwrap().roots.clone()),
        vec![first, second, third]
    );
    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        SyncEvent::PersistFailed { resource, .. } if resource == &format!("section:{}", second)
    )));
}

#[tokio::test(start_paused = true)]
async fn successful_move_reaches_the_server() {
    let fx = Fixture::new().await;
    let first = assert_ok!(fx.workspace.create_section(fx.notebook, "First").await);
    let second = assert_ok!(fx.workspace.create_section(fx.notebook, "Second").await);

    assert_ok!(fx.workspace.move_section(second, Some(first)).await);
    assert_eq!(fx.fake.section(second).unwrap().parent_id, Some(first));
    assert_eq!(fx.workspace.read(|tree| tree.section(second).unwrap().parent), Some(first));
}

#[tokio::test(start_paused = true)]
async fn failed_reorder_is_reverted() {
    let fx = Fixture::new().await;
    let first = assert_ok!(fx.workspace.create_section(fx.notebook, "First").await);
    let second = assert_ok!(fx.workspace.create_section(fx.notebook, "Second").await);
    fx.fake.fail_next("reorder_sections");

    let parent = ParentRef::Notebook(fx.notebook);
    assert_err!(fx.workspace.reorder(parent, vec![second.as_uuid(), first.as_uuid()]).await);
    assert_eq!(
        fx.workspace.read(|tree| tree.children(parent)).unwrap(),
        vec![first.as_uuid(), second.as_uuid()]
    );

    assert_ok!(fx.workspace.reorder(parent, vec![second.as_uuid(), first.as_uuid()]).await);
    assert_eq!(
        fx.workspace.read(|tree| tree.children(parent)).unwrap(),
        vec![second.as_uuid(), first.as_uuid()]
    );
}

#[tokio::test(start_paused = true)]
async fn delete_cancels_pending_saves_of_the_subtree() {
    let fx = Fixture::new().await;
    let (section, note) = fx.section_with_note("Mechanics").await;

    fx.workspace
        .edit_note(note, NoteSnapshot::new("Kinematics", json!({ "type": "doc", "v": 2 })))
        .unwrap();
    assert_eq!(fx.workspace.saves().status(note), SaveStatus::Dirty);

    assert_ok!(fx.workspace.delete(NodeRef::Section(section)).await);
    assert!(!fx.workspace.saves().has_pending(note));

    advance(Duration::from_secs(3)).await;
    assert_eq!(fx.fake.count("update_note"), 0);
    assert!(fx.fake.section(section).is_none());
}

#[tokio::test(start_paused = true)]
async fn write_finishing_after_delete_does_not_resurrect_note() {
    let fx = Fixture::new().await;
    let (section, note) = fx.section_with_note("Mechanics").await;
    fx.fake.delay("update_note", Duration::from_millis(500));

    fx.workspace
        .edit_note(note, NoteSnapshot::new("Kinematics", json!({ "type": "doc", "v": 3 })))
        .unwrap();
    advance(Duration::from_millis(1100)).await;
    assert_eq!(fx.workspace.saves().status(note), SaveStatus::Saving);

    assert_ok!(fx.workspace.delete(NodeRef::Section(section)).await);
    advance(Duration::from_secs(1)).await;

    assert!(fx.workspace.read(|tree| tree.note(note).is_none()));
    assert!(fx.workspace.read(|tree| tree.check_invariants()).is_ok());
}

#[tokio::test(start_paused = true)]
async fn failed_delete_refetches_the_notebook() {
    let fx = Fixture::new().await;
    let (section, _) = fx.section_with_note("Mechanics").await;
    fx.fake.fail_next("delete_section");

    assert_err!(fx.workspace.delete(NodeRef::Section(section)).await);
    assert!(fx.workspace.read(|tree| tree.section(section).is_some()));
}

#[tokio::test(start_paused = true)]
async fn edits_are_debounced_into_one_update() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;

    for n in 0..10 {
        fx.workspace
            .edit_note(note, NoteSnapshot::new("Kinematics", json!({ "type": "doc", "n": n })))
            .unwrap();
        advance(Duration::from_millis(100)).await;
    }
    advance(Duration::from_secs(2)).await;

    assert_eq!(fx.fake.count("update_note"), 1);
    assert_eq!(fx.fake.note(note).unwrap().content, json!({ "type": "doc", "n": 9 }));
    assert_eq!(fx.workspace.saves().status(note), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn double_toggle_while_request_in_flight_converges() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;
    fx.fake.delay("toggle_pin", Duration::from_millis(100));
    let mut events = fx.bus.subscribe();

    assert_eq!(fx.workspace.toggle_pin(note).unwrap(), true);
    advance(Duration::from_millis(10)).await;
    assert_eq!(fx.workspace.toggle_pin(note).unwrap(), false);

    advance(Duration::from_millis(500)).await;
    assert!(!fx.workspace.pins().is_pending(note));
    assert!(!fx.fake.note(note).unwrap().is_pinned);
    assert!(!fx.workspace.read(|tree| tree.note(note).unwrap().is_pinned));
    assert_eq!(fx.fake.count("toggle_pin"), 2);
    assert!(drain(&mut events).contains(&SyncEvent::PinSettled { note_id: note, pinned: false }));
}

#[tokio::test(start_paused = true)]
async fn single_toggle_pins_on_the_server() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;

    assert!(fx.workspace.toggle_pin(note).unwrap());
    settle().await;
    assert!(fx.fake.note(note).unwrap().is_pinned);
    let pinned = assert_ok!(fx.workspace.pinned_notes().await);
    assert_eq!(pinned.iter().map(|n| n.id).collect::<Vec<_>>(), vec![note]);
}

#[tokio::test(start_paused = true)]
async fn failed_tag_update_is_reverted() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;
    fx.fake.fail_next("update_tags");

    assert_err!(fx.workspace.update_tags(note, vec!["exam".into()]).await);
    assert!(fx.workspace.read(|tree| tree.note(note).unwrap().tags.is_empty()));

    assert_ok!(fx.workspace.update_tags(note, vec!["exam".into()]).await);
    assert_eq!(fx.workspace.read(|tree| tree.note(note).unwrap().tags.clone()), vec!["exam"]);
}

#[tokio::test(start_paused = true)]
async fn restoring_a_version_replaces_local_content() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;
    let server_note = fx.fake.note(note).unwrap();
    let version = fx.fake.seed_version(&server_note, "Kinematics (old)");

    fx.workspace
        .edit_note(note, NoteSnapshot::new("Unsaved", json!({ "type": "doc" })))
        .unwrap();
    let restored = assert_ok!(fx.workspace.restore_version(note, version).await);

    assert_eq!(restored.title, "Kinematics (old)");
    assert_eq!(fx.workspace.read(|tree| tree.note(note).unwrap().title.clone()), "Kinematics (old)");
    advance(Duration::from_secs(2)).await;
    assert_eq!(fx.fake.count("update_note"), 0, "unsaved edits were discarded");
}

#[tokio::test(start_paused = true)]
async fn failed_restore_keeps_unsaved_edits() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;
    let server_note = fx.fake.note(note).unwrap();
    let version = fx.fake.seed_version(&server_note, "Kinematics (old)");
    fx.workspace
        .edit_note(note, NoteSnapshot::new("Edited", json!({ "type": "doc" })))
        .unwrap();
    fx.fake.fail_next("restore_version");

    assert_err!(fx.workspace.restore_version(note, version).await, SyncError::Persist { .. });
    assert_eq!(fx.workspace.read(|tree| tree.note(note).unwrap().title.clone()), "Edited");

    advance(Duration::from_secs(3)).await;
    assert_eq!(fx.fake.count("update_note"), 1);
    assert_eq!(fx.fake.note(note).unwrap().title, "Edited");
    assert_eq!(fx.workspace.saves().status(note), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_restore_without_edits_saves_nothing() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;
    let server_note = fx.fake.note(note).unwrap();
    let version = fx.fake.seed_version(&server_note, "Kinematics (old)");
    fx.fake.fail_next("restore_version");

    assert!(fx.workspace.restore_version(note, version).await.is_err());
    advance(Duration::from_secs(3)).await;
    assert_eq!(fx.fake.count("update_note"), 0);
}

#[tokio::test(start_paused = true)]
async fn fetch_note_refreshes_unless_edits_are_pending() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;

    fx.fake.edit_remotely(note, "Kinematics (remote)");
    let fetched = assert_ok!(fx.workspace.fetch_note(note).await);
    assert_eq!(fetched.title, "Kinematics (remote)");
    assert_eq!(fx.workspace.read(|tree| tree.note(note).unwrap().title.clone()), "Kinematics (remote)");

    fx.workspace
        .edit_note(note, NoteSnapshot::new("Local draft", json!({ "type": "doc" })))
        .unwrap();
    fx.fake.edit_remotely(note, "Kinematics (again)");
    let fetched = assert_ok!(fx.workspace.fetch_note(note).await);
    assert_eq!(fetched.title, "Local draft");

    assert_err!(fx.workspace.fetch_note(NoteId::new()).await, SyncError::StaleReference { .. });
}

#[tokio::test(start_paused = true)]
async fn search_skips_blank_queries() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;

    assert!(assert_ok!(fx.workspace.search_notes("   ").await).is_empty());
    assert_eq!(fx.fake.count("search_notes"), 0);

    let hits = assert_ok!(fx.workspace.search_notes(" kinem ").await);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, note);
    assert_eq!(fx.fake.calls().last().map(String::as_str), Some("search_notes:kinem"));
}

#[tokio::test(start_paused = true)]
async fn share_validates_username_and_reports_failures() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;
    let mut events = fx.bus.subscribe();

    assert_err!(
        fx.workspace.share_note(note, "  ", PermissionLevel::Viewer).await,
        SyncError::Validation { .. }
    );
    assert_eq!(fx.fake.count("share_note"), 0);

    assert_ok!(fx.workspace.share_note(note, " ada ", PermissionLevel::Editor).await);
    let shares = fx.fake.shares();
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].0, note);
    assert_eq!(shares[0].1.username, "ada");
    assert_eq!(shares[0].1.permission_level, PermissionLevel::Editor);

    fx.fake.fail_next("share_note");
    assert!(fx.workspace.share_note(note, "grace", PermissionLevel::Viewer).await.is_err());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SyncEvent::PersistFailed { resource, .. } if resource.ends_with(":share"))));
}

#[tokio::test(start_paused = true)]
async fn section_children_come_from_the_server() {
    let fx = Fixture::new().await;
    let parent = fx.fake.seed_section(fx.notebook, None, "Mechanics").id;
    let child = fx.fake.seed_section(fx.notebook, Some(parent), "Kinematics").id;

    let children = assert_ok!(fx.workspace.section_children(parent).await);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, child);
    assert_eq!(children[0].parent_id, Some(parent));
    assert_err!(fx.workspace.section_children(SectionId::new()).await, SyncError::StaleReference { .. });
}

#[tokio::test(start_paused = true)]
async fn refresh_of_collapsed_notebook_defers_fetch_until_expand() {
    let fx = Fixture::new().await;
    fx.workspace.collapse_notebook(fx.notebook);
    let fetches = fx.fake.count("section_tree");
    let added = fx.fake.seed_section(fx.notebook, None, "Waves").id;

    assert!(!assert_ok!(fx.workspace.refresh_notebook(fx.notebook).await));
    assert_eq!(fx.fake.count("section_tree"), fetches);
    assert!(fx.workspace.read(|tree| tree.is_stale(fx.notebook)));

    assert!(assert_ok!(fx.workspace.expand_notebook(fx.notebook).await));
    assert!(fx.workspace.read(|tree| tree.section(added).is_some()));
    assert!(!assert_ok!(fx.workspace.expand_notebook(fx.notebook).await), "cached after fetch");
}

#[tokio::test(start_paused = true)]
async fn refresh_of_expanded_notebook_fetches_now() {
    let fx = Fixture::new().await;
    let added = fx.fake.seed_section(fx.notebook, None, "Waves").id;

    assert!(assert_ok!(fx.workspace.refresh_notebook(fx.notebook).await));
    assert!(fx.workspace.read(|tree| tree.section(added).is_some()));
}

#[tokio::test(start_paused = true)]
async fn notebook_list_reload_drops_removed_notebooks() {
    let fx = Fixture::new().await;
    let (_, note) = fx.section_with_note("Mechanics").await;
    fx.workspace
        .edit_note(note, NoteSnapshot::new("Kinematics", json!({ "type": "doc" })))
        .unwrap();

    fx.fake.remove_notebook(fx.notebook);
    assert_ok!(fx.workspace.load_notebooks().await);
    assert!(fx.workspace.read(|tree| tree.notebook(fx.notebook).is_none()));
    assert!(!fx.workspace.saves().has_pending(note));
}
