//! # Reactive Panel Controller
//!
//! One controller type drives every surface (docked panel, top-frame
//! overlay, child-frame overlay). A surface differs only in its mount, its
//! layout reservation strategy and its [`SurfaceConfig`].
//!
//! Rendering is always from scratch: every store change for the watched key
//! re-renders the full deduplicated, newest-first list. Renders of a value
//! read directly from the store (initial load, optimistic clear) yield to any
//! change notification rendered after the read began.

pub mod layout;
pub mod render;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crossbeam_channel::{Sender, bounded, select};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::links::LinkCollection;
use crate::store::{StoreChange, StoreError};
use crate::synchronizer::StoreSynchronizer;

pub use layout::{BodyMarginReservation, LayoutReservation, NoReservation};
pub use render::{DomMount, PanelBody, PanelItem, PanelView, RenderError, RenderTarget, TextMount};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Closed,
    Open,
    Minimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Show,
    Minimize,
    Expand,
    Hide,
    /// The overlay's single button: open, then minimize, then close.
    Toggle,
}

impl PanelState {
    /// Next state for `action`, or `None` when the action does not apply.
    pub fn apply(self, action: PanelAction) -> Option<PanelState> {
        use PanelAction as A;
        use PanelState::{Closed, Minimized, Open};
        match (self, action) {
            (Closed, A::Show) => Some(Open),
            (Open, A::Minimize) => Some(Minimized),
            (Minimized, A::Expand) => Some(Open),
            (Open | Minimized, A::Hide) => Some(Closed),
            (Closed, A::Toggle) => Some(Open),
            (Open, A::Toggle) => Some(Minimized),
            (Minimized, A::Toggle) => Some(Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Docked,
    TopOverlay,
    FrameOverlay,
}

#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub kind: SurfaceKind,
    pub title: String,
    pub empty_message: String,
    pub default_width: u32,
    pub minimized_width: u32,
    /// Open on initialization when the store already holds links.
    pub auto_show: bool,
    /// Render the empty view right after a clear instead of waiting for the
    /// change notification.
    pub optimistic_clear: bool,
}

impl SurfaceConfig {
    fn base(cfg: &Config, kind: SurfaceKind, title: &str) -> Self {
        Self {
            kind,
            title: title.to_string(),
            empty_message: cfg.panel.empty_message.clone(),
            default_width: cfg.panel.default_width,
            minimized_width: cfg.panel.minimized_width,
            auto_show: false,
            optimistic_clear: false,
        }
    }

    pub fn docked(cfg: &Config) -> Self {
        Self {
            optimistic_clear: true,
            ..Self::base(cfg, SurfaceKind::Docked, &cfg.panel.docked_title)
        }
    }

    pub fn top_overlay(cfg: &Config) -> Self {
        Self {
            auto_show: true,
            ..Self::base(cfg, SurfaceKind::TopOverlay, &cfg.panel.title)
        }
    }

    pub fn frame_overlay(cfg: &Config) -> Self {
        Self::base(cfg, SurfaceKind::FrameOverlay, &cfg.panel.child_frame_title)
    }
}

/// Host-side handler for the open-link action.
pub trait Navigator: Send + Sync {
    fn open(&self, href: &str);
}

/// Navigator for hosts without a browsing context: records the request in
/// the log.
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn open(&self, href: &str) {
        info!("open link href={href}");
    }
}

pub struct PanelController {
    surface: SurfaceConfig,
    sync: StoreSynchronizer,
    mount: Box<dyn RenderTarget>,
    layout: Box<dyn LayoutReservation>,
    navigator: Box<dyn Navigator>,
    state: Mutex<PanelState>,
    rendered: Mutex<Rendered>,
    renders: AtomicU64,
}

/// Mount contents and the notification generation that produced them.
#[derive(Default)]
struct Rendered {
    notified: u64,
    view: Option<PanelView>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PanelController {
    pub fn new(
        surface: SurfaceConfig,
        sync: StoreSynchronizer,
        mount: Box<dyn RenderTarget>,
        layout: Box<dyn LayoutReservation>,
        navigator: Box<dyn Navigator>,
    ) -> Self {
        Self {
            surface,
            sync,
            mount,
            layout,
            navigator,
            state: Mutex::new(PanelState::Closed),
            rendered: Mutex::new(Rendered::default()),
            renders: AtomicU64::new(0),
        }
    }

    pub fn surface(&self) -> &SurfaceConfig {
        &self.surface
    }

    pub fn state(&self) -> PanelState {
        *lock(&self.state)
    }

    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Acquire)
    }

    pub fn current_view(&self) -> Option<PanelView> {
        lock(&self.rendered).view.clone()
    }

    fn notified(&self) -> u64 {
        lock(&self.rendered).notified
    }

    /// Render what is stored now and auto-open when configured to.
    pub fn initialize(&self) -> Result<PanelState, StoreError> {
        let since = self.notified();
        let collection = self.sync.load()?;
        debug!(
            "panel init surface={:?} stored={}",
            self.surface.kind,
            collection.len()
        );
        if let Err(err) = self.render_snapshot(&collection, since) {
            warn!("initial render failed surface={:?}: {err}", self.surface.kind);
        }
        if self.surface.auto_show && !collection.is_empty() {
            self.show();
        }
        Ok(self.state())
    }

    /// Render `collection` unconditionally, as the newest known value.
    pub fn render_collection(&self, collection: &LinkCollection) -> Result<(), RenderError> {
        let mut rendered = lock(&self.rendered);
        rendered.notified += 1;
        self.draw(&mut rendered, collection)
    }

    /// Render a value read from the store after generation `since` was
    /// observed. Returns `false` when a notification render has happened
    /// since then, leaving the newer rendering in place.
    fn render_snapshot(&self, collection: &LinkCollection, since: u64) -> Result<bool, RenderError> {
        let mut rendered = lock(&self.rendered);
        if rendered.notified != since {
            debug!(
                "skipping stale render surface={:?} since={since} notified={}",
                self.surface.kind, rendered.notified
            );
            return Ok(false);
        }
        self.draw(&mut rendered, collection)?;
        Ok(true)
    }

    fn draw(&self, rendered: &mut Rendered, collection: &LinkCollection) -> Result<(), RenderError> {
        let view = render::build_view(&self.surface.title, &self.surface.empty_message, collection);
        self.mount.render(&view)?;
        rendered.view = Some(view);
        self.renders.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// React to one store notification. Other keys are ignored; a value that
    /// does not decode leaves the current rendering in place.
    pub fn on_store_change(&self, change: &StoreChange) {
        if change.key != self.sync.key() {
            return;
        }
        match LinkCollection::from_value(change.new_value.clone()) {
            Ok(collection) => {
                debug!(
                    "store changed surface={:?} links={}",
                    self.surface.kind,
                    collection.len()
                );
                if let Err(err) = self.render_collection(&collection) {
                    warn!("render failed surface={:?}: {err}", self.surface.kind);
                }
            }
            Err(err) => warn!("ignoring undecodable value for key={}: {err}", change.key),
        }
    }

    pub fn show(&self) -> PanelState {
        self.dispatch(PanelAction::Show)
    }

    pub fn minimize(&self) -> PanelState {
        self.dispatch(PanelAction::Minimize)
    }

    pub fn expand(&self) -> PanelState {
        self.dispatch(PanelAction::Expand)
    }

    pub fn hide(&self) -> PanelState {
        self.dispatch(PanelAction::Hide)
    }

    pub fn toggle(&self) -> PanelState {
        self.dispatch(PanelAction::Toggle)
    }

    /// Apply `action`; actions that do not apply to the current state are
    /// ignored. Returns the resulting state.
    pub fn dispatch(&self, action: PanelAction) -> PanelState {
        let mut state = lock(&self.state);
        let Some(next) = state.apply(action) else {
            debug!("ignoring {action:?} in state {:?}", *state);
            return *state;
        };
        match (*state, next) {
            (PanelState::Closed, PanelState::Open) => {
                let width = self
                    .mount
                    .rendered_width()
                    .filter(|w| *w > 0)
                    .unwrap_or(self.surface.default_width);
                self.layout.reserve(width);
            }
            (PanelState::Minimized, PanelState::Open) => self.layout.reserve(self.surface.default_width),
            (_, PanelState::Minimized) => self.layout.reserve(self.surface.minimized_width),
            (_, PanelState::Closed) => self.layout.release(),
            _ => {}
        }
        if let Err(err) = self.mount.apply_state(next) {
            warn!("failed to reflect state {next:?}: {err}");
        }
        debug!("panel {:?} -> {next:?} surface={:?}", *state, self.surface.kind);
        *state = next;
        next
    }

    /// The surface was resized to `width`; re-reserve while fully open.
    pub fn resize(&self, width: u32) -> bool {
        let state = lock(&self.state);
        if *state != PanelState::Open {
            return false;
        }
        self.layout.reserve(width);
        true
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        info!("clearing collected links surface={:?}", self.surface.kind);
        let since = self.notified();
        self.sync.clear()?;
        if self.surface.optimistic_clear {
            if let Err(err) = self.render_snapshot(&LinkCollection::new(), since) {
                warn!("optimistic clear render failed: {err}");
            }
        }
        Ok(())
    }

    /// Hand a rendered link to the navigator. Unknown hrefs are refused.
    pub fn open_link(&self, href: &str) -> bool {
        let known = lock(&self.rendered)
            .view
            .as_ref()
            .is_some_and(|view| view.items().iter().any(|item| item.href == href));
        if known {
            self.navigator.open(href);
        }
        known
    }

    /// Subscribe to store changes on a dedicated thread. Subscribe before
    /// [`initialize`](Self::initialize) so no write falls in between.
    pub fn spawn_listener(self: &Arc<Self>) -> PanelListener {
        let changes = self.sync.store().subscribe();
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let controller = Arc::clone(self);
        let handle = thread::spawn(move || {
            loop {
                select! {
                    recv(changes) -> msg => match msg {
                        Ok(change) => controller.on_store_change(&change),
                        Err(_) => break,
                    },
                    recv(stop_rx) -> _ => {
                        for change in changes.try_iter() {
                            controller.on_store_change(&change);
                        }
                        break;
                    }
                }
            }
        });
        PanelListener {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Running change listener. Stopping drains notifications already
/// delivered, so the last render reflects every write made before the stop.
pub struct PanelListener {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PanelListener {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("panel listener thread panicked");
            }
        }
    }
}

impl Drop for PanelListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkRecord;
    use crate::store::MemoryStore;

    struct WidthLog(Arc<Mutex<Vec<Option<u32>>>>);

    impl LayoutReservation for WidthLog {
        fn reserve(&self, width: u32) {
            lock(&self.0).push(Some(width));
        }
        fn release(&self) {
            lock(&self.0).push(None);
        }
    }

    fn controller(auto_show: bool) -> (PanelController, Arc<Mutex<Vec<Option<u32>>>>, StoreSynchronizer) {
        let cfg = crate::config::load_config(None).expect("config").config;
        let sync = StoreSynchronizer::new(Arc::new(MemoryStore::new()), cfg.store_key.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        let surface = SurfaceConfig {
            auto_show,
            ..SurfaceConfig::top_overlay(&cfg)
        };
        let controller = PanelController::new(
            surface,
            sync.clone(),
            Box::new(TextMount::new()),
            Box::new(WidthLog(log.clone())),
            Box::new(LogNavigator),
        );
        (controller, log, sync)
    }

    #[test]
    fn transition_table() {
        use PanelAction as A;
        use PanelState::*;
        assert_eq!(Closed.apply(A::Show), Some(Open));
        assert_eq!(Open.apply(A::Show), None);
        assert_eq!(Minimized.apply(A::Show), None);
        assert_eq!(Closed.apply(A::Minimize), None);
        assert_eq!(Closed.apply(A::Hide), None);
        assert_eq!(Open.apply(A::Minimize), Some(Minimized));
        assert_eq!(Open.apply(A::Expand), None);
        assert_eq!(Minimized.apply(A::Expand), Some(Open));
        assert_eq!(Minimized.apply(A::Hide), Some(Closed));
        assert_eq!(Open.apply(A::Toggle), Some(Minimized));
        assert_eq!(Minimized.apply(A::Toggle), Some(Closed));
    }

    #[test]
    fn reservations_follow_the_state_machine() {
        let (panel, log, _) = controller(false);
        assert_eq!(panel.show(), PanelState::Open);
        assert!(panel.resize(420));
        assert_eq!(panel.minimize(), PanelState::Minimized);
        assert!(!panel.resize(500));
        assert_eq!(panel.expand(), PanelState::Open);
        assert_eq!(panel.hide(), PanelState::Closed);
        assert_eq!(
            *lock(&log),
            vec![Some(300), Some(420), Some(40), Some(300), None]
        );
    }

    #[test]
    fn invalid_actions_leave_state_alone() {
        let (panel, log, _) = controller(false);
        assert_eq!(panel.minimize(), PanelState::Closed);
        assert_eq!(panel.expand(), PanelState::Closed);
        assert!(lock(&log).is_empty());
    }

    #[test]
    fn auto_show_only_with_stored_links() {
        let (panel, _, _) = controller(true);
        assert_eq!(panel.initialize().expect("init"), PanelState::Closed);

        let (panel, _, sync) = controller(true);
        sync.merge(vec![LinkRecord::new("https://a.test/", "A", false, 1)])
            .expect("merge");
        assert_eq!(panel.initialize().expect("init"), PanelState::Open);
    }

    #[test]
    fn open_link_only_for_rendered_entries() {
        let (panel, _, sync) = controller(false);
        sync.merge(vec![LinkRecord::new("https://a.test/", "A", false, 1)])
            .expect("merge");
        panel.initialize().expect("init");
        assert!(panel.open_link("https://a.test/"));
        assert!(!panel.open_link("https://elsewhere.test/"));
    }

    #[test]
    fn initial_load_yields_to_a_newer_notification() {
        let (panel, _, sync) = controller(false);
        let since = panel.notified();
        panel.on_store_change(&StoreChange {
            key: sync.key().to_string(),
            old_value: None,
            new_value: Some(serde_json::json!([
                {"href": "https://b.test/", "text": "B", "isAjax": false, "timestamp": 2}
            ])),
        });
        let stale = LinkCollection::new();
        assert!(!panel.render_snapshot(&stale, since).expect("render"));
        let view = panel.current_view().expect("view");
        assert_eq!(view.count_line, "1 unique link(s)");
        assert_eq!(panel.render_count(), 1);
    }

    #[test]
    fn ignores_changes_for_other_keys() {
        let (panel, _, _) = controller(false);
        panel.on_store_change(&StoreChange {
            key: "somethingElse".to_string(),
            old_value: None,
            new_value: Some(serde_json::json!([])),
        });
        assert_eq!(panel.render_count(), 0);
    }
}
