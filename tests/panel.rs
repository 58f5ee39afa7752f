mod common;

use std::sync::Arc;

use serde_json::json;

use linkharvest::constants::{OVERLAY_COUNT_ID, OVERLAY_LIST_ID, TOGGLE_BUTTON_ID};
use linkharvest::links::LinkRecord;
use linkharvest::panel::{
    BodyMarginReservation, DomMount, LogNavigator, NoReservation, PanelController, PanelState,
    RenderError, RenderTarget, SurfaceConfig, TextMount, render,
};

fn overlay_panel(
    doc: &linkharvest::dom::Document,
    store: &Arc<dyn linkharvest::store::KeyValueStore>,
) -> (Arc<PanelController>, BodyMarginReservation) {
    let cfg = common::default_config();
    let mount = DomMount::install(doc, &cfg.overlay_id, &cfg.panel.title).expect("install");
    let controller = Arc::new(PanelController::new(
        SurfaceConfig::top_overlay(&cfg),
        common::synchronizer(store),
        Box::new(mount),
        Box::new(BodyMarginReservation::new(doc)),
        Box::new(LogNavigator),
    ));
    (controller, BodyMarginReservation::new(doc))
}

fn margin(doc: &linkharvest::dom::Document) -> Option<String> {
    doc.style_property(doc.body().expect("body"), "margin-right")
}

#[test]
fn body_margin_follows_panel_state() {
    let store = common::memory_store();
    let doc = common::top_document(
        "https://a.test/",
        r#"<body style="color: red; margin-right: 12px"><a href="/a">A</a></body>"#,
    );
    let (panel, _) = overlay_panel(&doc, &store);

    panel.show();
    assert_eq!(margin(&doc).as_deref(), Some("300px"));
    panel.minimize();
    assert_eq!(margin(&doc).as_deref(), Some("40px"));
    panel.expand();
    assert_eq!(margin(&doc).as_deref(), Some("300px"));
    panel.hide();
    assert_eq!(margin(&doc).as_deref(), Some("12px"));
    assert_eq!(doc.style_property(doc.body().expect("body"), "color").as_deref(), Some("red"));
}

#[test]
fn toggle_button_label_tracks_state() {
    let store = common::memory_store();
    let doc = common::top_document("https://a.test/", "<body></body>");
    let (panel, _) = overlay_panel(&doc, &store);
    let label = |doc: &linkharvest::dom::Document| {
        let tree = doc.snapshot();
        tree.text_content(tree.element_by_id(TOGGLE_BUTTON_ID).expect("toggle"))
    };

    assert_eq!(label(&doc), "Open");
    assert_eq!(panel.toggle(), PanelState::Open);
    assert_eq!(label(&doc), "Close");
    assert_eq!(panel.toggle(), PanelState::Minimized);
    assert_eq!(label(&doc), "Expand");
    assert_eq!(panel.toggle(), PanelState::Closed);
    assert_eq!(label(&doc), "Open");
}

#[test]
fn reinstalling_replaces_a_stale_overlay() {
    let store = common::memory_store();
    let doc = common::top_document("https://a.test/", "<body></body>");
    let (first, _) = overlay_panel(&doc, &store);
    first.show();
    let (_second, reservation) = overlay_panel(&doc, &store);

    let tree = doc.snapshot();
    let cfg = common::default_config();
    let overlays = tree
        .descendants(tree.root())
        .filter(|id| tree.element(*id).and_then(|el| el.id()) == Some(cfg.overlay_id.as_str()))
        .count();
    assert_eq!(overlays, 1);
    assert_eq!(reservation.original(), "0px");
}

#[test]
fn overlay_renders_newest_first_with_count() {
    let store = common::memory_store();
    common::synchronizer(&store)
        .merge(vec![
            LinkRecord::new("https://a.test/old", "Old", false, 1_000),
            LinkRecord::new("https://a.test/new", "New", true, 2_000),
        ])
        .expect("seed");
    let doc = common::top_document("https://a.test/", "<body></body>");
    let (panel, _) = overlay_panel(&doc, &store);
    assert_eq!(panel.initialize().expect("init"), PanelState::Open);

    let tree = doc.snapshot();
    let count = tree.element_by_id(OVERLAY_COUNT_ID).expect("count");
    assert_eq!(tree.text_content(count), "2 unique link(s)");
    let list = tree.element_by_id(OVERLAY_LIST_ID).expect("list");
    let first_anchor = tree
        .descendants(list)
        .find(|id| tree.element(*id).is_some_and(|el| el.is("a")))
        .expect("anchor");
    assert_eq!(
        tree.element(first_anchor).and_then(|el| el.attr("href")),
        Some("https://a.test/new")
    );
}

#[test]
fn clear_shows_empty_state_on_every_surface() {
    let cfg = common::default_config();
    let store = common::memory_store();
    common::synchronizer(&store)
        .merge(vec![LinkRecord::new("https://a.test/", "A", false, 1)])
        .expect("seed");

    let doc = common::top_document("https://a.test/", "<body></body>");
    let (overlay, _) = overlay_panel(&doc, &store);
    let docked = Arc::new(PanelController::new(
        SurfaceConfig::docked(&cfg),
        common::synchronizer(&store),
        Box::new(TextMount::new()),
        Box::new(NoReservation),
        Box::new(LogNavigator),
    ));
    let overlay_listener = overlay.spawn_listener();
    let docked_listener = docked.spawn_listener();
    overlay.initialize().expect("init overlay");
    docked.initialize().expect("init docked");

    docked.clear().expect("clear");
    assert!(docked.current_view().expect("view").is_empty());
    overlay_listener.stop();
    docked_listener.stop();

    assert!(common::stored(&store).is_empty());
    for panel in [&overlay, &docked] {
        let view = panel.current_view().expect("view");
        assert!(view.is_empty());
        assert_eq!(view.count_line, "0 unique link(s)");
    }
    let text = render::render_text(&docked.current_view().expect("view"));
    assert!(text.contains(&cfg.panel.empty_message));
}

#[test]
fn render_without_list_container_fails_only_that_call() {
    let store = common::memory_store();
    let doc = common::top_document("https://a.test/", "<body></body>");
    let cfg = common::default_config();
    let mount = DomMount::install(&doc, &cfg.overlay_id, "Links").expect("install");
    let list = doc.element_by_id(OVERLAY_LIST_ID).expect("list");
    doc.remove_node(list).expect("remove");

    let view = render::build_view("Links", "none", &common::stored(&store));
    assert!(matches!(mount.render(&view), Err(RenderError::MissingAnchor(_))));
    assert!(mount.apply_state(PanelState::Open).is_ok());
}

#[test]
fn write_landing_after_clear_wins_over_the_optimistic_render() {
    let cfg = common::default_config();
    let double = Arc::new(common::WriteAfterClearStore::new(json!([
        {"href": "https://b.test/", "text": "B", "isAjax": false, "timestamp": 2}
    ])));
    let store: Arc<dyn linkharvest::store::KeyValueStore> = double.clone();
    common::synchronizer(&store)
        .merge(vec![LinkRecord::new("https://a.test/", "A", false, 1)])
        .expect("seed");

    let docked = Arc::new(PanelController::new(
        SurfaceConfig::docked(&cfg),
        common::synchronizer(&store),
        Box::new(TextMount::new()),
        Box::new(NoReservation),
        Box::new(LogNavigator),
    ));
    let listener = docked.spawn_listener();
    docked.initialize().expect("init");

    // hold the clearing thread until the listener has drawn both the empty
    // collection and the write that followed it
    let before = docked.render_count();
    let watched = Arc::downgrade(&docked);
    double.on_clear(move || {
        common::wait_until("listener renders", || {
            watched
                .upgrade()
                .is_none_or(|panel| panel.render_count() >= before + 2)
        });
    });
    docked.clear().expect("clear");
    listener.stop();

    assert_eq!(common::stored_hrefs(&store), vec!["https://b.test/"]);
    let view = docked.current_view().expect("view");
    assert_eq!(view.count_line, "1 unique link(s)");
    assert_eq!(view.items()[0].href, "https://b.test/");
}
