use super::*;
use crate::geometry::Margins;
use crate::host::memory::{
    ContainerFault, DocumentFault, MemoryContainers, MemoryDocument, TEST_SVG, document_info,
};

const SOURCE: &str = "graph TD\nA-->B";

struct Fixture {
    document: Arc<MemoryDocument>,
    containers: Arc<MemoryContainers>,
    store: DiagramStore,
    inserter: DocumentInserter,
}

fn fixture_with(info: HostInfo) -> Fixture {
    let document = MemoryDocument::new();
    let containers = MemoryContainers::new();
    let store = DiagramStore::new(containers.clone());
    let inserter = DocumentInserter::new(document.clone(), store.clone(), info, EngineConfig::default());
    Fixture { document, containers, store, inserter }
}

fn fixture() -> Fixture {
    fixture_with(document_info())
}

/// Run both phases and return the new diagram id.
async fn insert_placed(f: &Fixture, source: &str) -> String {
    f.inserter.insert(source, TEST_SVG).await.unwrap();
    let outcome = f.inserter.insert_at_current_position().await.unwrap();
    outcome.diagram_id().unwrap().to_string()
}

// =========================================================================
// two-phase insert
// =========================================================================

#[tokio::test]
async fn insert_awaits_user_placement() {
    let f = fixture();
    let outcome = f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();

    assert!(matches!(outcome, Outcome::AwaitingUserAction { .. }));
    assert!(!outcome.is_terminal());
    assert!(f.inserter.is_awaiting_placement().await);
    assert_eq!(f.document.listener_count(), 1);
    assert!(f.document.pictures().is_empty());
    assert!(f.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn exit_removes_listener_and_allows_a_fresh_cycle() {
    let f = fixture();
    f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();

    f.inserter.exit_insertion_mode().await;
    assert_eq!(f.document.listener_count(), 0);
    assert!(!f.inserter.is_awaiting_placement().await);
    assert!(matches!(
        f.inserter.insert_at_current_position().await,
        Err(EmbedError::NoPendingInsertion)
    ));

    let outcome = f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();
    assert!(matches!(outcome, Outcome::AwaitingUserAction { .. }));
    assert_eq!(f.document.listener_count(), 1);
}

#[tokio::test]
async fn exit_without_pending_insertion_is_a_no_op() {
    let f = fixture();
    f.inserter.exit_insertion_mode().await;
    f.inserter.exit_insertion_mode().await;
    assert_eq!(f.document.listener_count(), 0);
}

#[tokio::test]
async fn second_insert_replaces_the_pending_listener() {
    let f = fixture();
    f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();
    f.inserter.insert("graph LR\nX-->Y", TEST_SVG).await.unwrap();
    assert_eq!(f.document.listener_count(), 1);

    let id = f.inserter.insert_at_current_position().await.unwrap().diagram_id().unwrap().to_string();
    assert_eq!(f.store.get(&id).await.unwrap().source_code, "graph LR\nX-->Y");
}

#[tokio::test]
async fn selection_changes_are_counted_while_awaiting() {
    let f = fixture();
    f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();
    f.document.fire_selection_changed();
    f.document.fire_selection_changed();
    assert_eq!(f.inserter.selection_changes(), 2);

    f.inserter.insert_at_current_position().await.unwrap();
    f.document.fire_selection_changed();
    assert_eq!(f.inserter.selection_changes(), 2);
}

#[tokio::test]
async fn placement_persists_and_tags_the_picture() {
    let f = fixture();
    let id = insert_placed(&f, SOURCE).await;

    assert_eq!(f.document.listener_count(), 0);
    assert!(!f.inserter.is_awaiting_placement().await);
    let record = f.store.get(&id).await.unwrap();
    assert!(record.shape_tagged);
    assert_eq!(record.geometry_hint, None);

    // 200x100 diagram on a letter page is fitted to the 468pt text width.
    let picture = f.document.pictures().pop().unwrap();
    assert!((picture.width - 468.0).abs() < 1e-9);
    assert!((picture.height - 234.0).abs() < 1e-9);
    assert_eq!(tagger::picture_id(&picture), Some(id.as_str()));

    f.document.select_picture(Some(picture.id.as_str()));
    let recovered = f.inserter.recover_selected().await.unwrap().unwrap();
    assert_eq!(recovered.source_code, SOURCE);
}

#[tokio::test]
async fn location_follows_selected_text() {
    let f = fixture();
    insert_placed(&f, SOURCE).await;
    f.document.set_selection_text(true);
    insert_placed(&f, SOURCE).await;

    let locations: Vec<InsertLocation> = f.document.inserts().into_iter().map(|i| i.location).collect();
    assert_eq!(locations, vec![InsertLocation::Replace, InsertLocation::After]);
}

#[tokio::test]
async fn unreadable_page_setup_uses_letter() {
    let f = fixture();
    f.document.set_page_setup(PageSetup { width: 100.0, height: 100.0, margins: Margins::uniform(60.0) });
    insert_placed(&f, SOURCE).await;
    f.document.fail(DocumentFault::PageSetup);
    insert_placed(&f, SOURCE).await;

    for picture in f.document.pictures() {
        assert!((picture.width - 468.0).abs() < 1e-9);
    }
}

#[tokio::test]
async fn failed_placement_still_exits_insertion_mode() {
    let f = fixture();
    f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();
    f.document.fail(DocumentFault::Insert);

    let err = f.inserter.insert_at_current_position().await.unwrap_err();
    assert!(matches!(err, EmbedError::Placement { .. }));
    assert_eq!(f.document.listener_count(), 0);
    assert!(f.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn description_failure_records_size_hint() {
    let f = fixture();
    f.document.fail(DocumentFault::Description);
    let id = insert_placed(&f, SOURCE).await;

    let record = f.store.get(&id).await.unwrap();
    assert!(!record.shape_tagged);
    let hint = record.geometry_hint.unwrap();
    assert!((hint.width - 468.0).abs() < 1e-9);

    let picture = f.document.pictures().pop().unwrap();
    f.document.select_picture(Some(picture.id.as_str()));
    assert_eq!(f.inserter.recover_selected().await.unwrap(), None);
}

#[tokio::test]
async fn host_without_selection_events_still_inserts() {
    let f = fixture_with(HostInfo::new("Word").with_api_set("WordApi", "1.4"));
    f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();
    assert_eq!(f.document.listener_count(), 0);
    assert!(f.inserter.insert_at_current_position().await.is_ok());
}

#[tokio::test]
async fn persistence_failure_after_placement_is_composite() {
    let f = fixture();
    f.inserter.insert(SOURCE, TEST_SVG).await.unwrap();
    f.containers.fail(ContainerFault::Add);

    let err = f.inserter.insert_at_current_position().await.unwrap_err();
    assert!(matches!(err, EmbedError::Persistence { placed: true, .. }));
    assert_eq!(f.document.pictures().len(), 1);
    assert_eq!(f.document.listener_count(), 0);
}

// =========================================================================
// update
// =========================================================================

#[tokio::test]
async fn update_rewrites_record_and_replaces_selection() {
    let f = fixture();
    let id = insert_placed(&f, SOURCE).await;
    let before = f.store.get(&id).await.unwrap();

    let outcome = f.inserter.update(&id, "graph TD\nA-->C", TEST_SVG).await.unwrap();
    assert_eq!(outcome.diagram_id(), Some(id.as_str()));

    let after = f.store.get(&id).await.unwrap();
    assert_eq!(after.source_code, "graph TD\nA-->C");
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(f.store.list().await.unwrap().len(), 1);

    let newest = f.document.pictures().pop().unwrap();
    assert_eq!(tagger::picture_id(&newest), Some(id.as_str()));
    assert_eq!(f.document.inserts().pop().unwrap().location, InsertLocation::Replace);
}

#[tokio::test]
async fn update_of_unknown_id_is_not_found() {
    let f = fixture();
    let err = f.inserter.update("mermaid-missing", SOURCE, TEST_SVG).await.unwrap_err();
    assert!(matches!(err, EmbedError::NotFound { what: "the saved diagram source", .. }));
    assert!(f.document.inserts().is_empty());
}

#[tokio::test]
async fn failed_update_restores_previous_record() {
    let f = fixture();
    let id = insert_placed(&f, SOURCE).await;
    f.document.fail(DocumentFault::Insert);

    let err = f.inserter.update(&id, "graph TD\nA-->C", TEST_SVG).await.unwrap_err();
    assert!(err.to_string().contains("the saved source was kept"));
    assert_eq!(f.store.get(&id).await.unwrap().source_code, SOURCE);
}

#[tokio::test]
async fn update_with_bad_markup_changes_nothing() {
    let f = fixture();
    let id = insert_placed(&f, SOURCE).await;
    let entries = f.containers.entries();

    let err = f.inserter.update(&id, "graph TD\nA-->C", "<svg").await.unwrap_err();
    assert!(matches!(err, EmbedError::Render(_)));
    assert_eq!(f.containers.entries(), entries);
}

// =========================================================================
// recover / diagnostics
// =========================================================================

#[tokio::test]
async fn foreign_picture_recovers_nothing() {
    let f = fixture();
    let picture = f.document.add_picture(Some("Company logo"));
    f.document.select_picture(Some(picture.as_str()));
    assert_eq!(f.inserter.recover_selected().await.unwrap(), None);

    f.document.select_picture(None);
    assert_eq!(f.inserter.recover_selected().await.unwrap(), None);
}

#[tokio::test]
async fn inventory_reports_orphans() {
    let f = fixture();
    let kept = insert_placed(&f, SOURCE).await;
    let removed = insert_placed(&f, "sequenceDiagram\nA->>B: hi").await;
    let removed_picture = f.document.pictures().pop().unwrap();
    f.document.remove_picture(&removed_picture.id);

    let inventory = f.inserter.inventory().await.unwrap();
    let presence = |id: &str| inventory.iter().find(|e| e.record.id == id).unwrap().presence.clone();
    assert!(matches!(presence(&kept), Presence::Tagged { .. }));
    assert_eq!(presence(&removed), Presence::Orphaned);
    assert!(f.inserter.list_all().await.unwrap().contains("1 orphaned"));
}

#[tokio::test]
async fn describe_selection_names_the_diagram() {
    let f = fixture();
    assert_eq!(f.inserter.describe_selection().await.unwrap(), "No picture selected.");

    let id = insert_placed(&f, SOURCE).await;
    let picture = f.document.pictures().pop().unwrap();
    f.document.select_picture(Some(picture.id.as_str()));
    let summary = f.inserter.describe_selection().await.unwrap();
    assert_eq!(summary, format!("Picture {} 468x234 pt, diagram {id}, source saved", picture.id));
}
