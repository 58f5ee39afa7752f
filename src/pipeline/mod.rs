//! # Multi-Frame Coordinator
//!
//! Wires extraction, watching and merging for a document and the frames it
//! can reach. Each frame gets an independent pipeline on its own worker
//! thread; pipelines share nothing but the store.

pub mod workers;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dom::{DomError, Document, FrameAccess};
use crate::extract::{ExtractOptions, LinkExtractor};
use crate::panel::{
    BodyMarginReservation, DomMount, LogNavigator, PanelController, PanelListener, SurfaceConfig,
};
use crate::store::{KeyValueStore, StoreError};
use crate::synchronizer::{MergeOutcome, StoreSynchronizer};
use crate::watcher::MutationWatcher;

use workers::{WorkerReport, spawn_frame_worker};

/// Extract-then-merge for one document.
#[derive(Clone)]
pub struct FrameHarvester {
    doc: Document,
    extractor: LinkExtractor,
    sync: StoreSynchronizer,
    label: String,
}

impl FrameHarvester {
    pub fn new(doc: &Document, extractor: LinkExtractor, sync: StoreSynchronizer) -> Self {
        Self {
            label: frame_label(doc),
            doc: doc.clone(),
            extractor,
            sync,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// One full pass: extract everything on the current snapshot and merge.
    pub fn harvest(&self) -> Result<MergeOutcome, StoreError> {
        let tree = self.doc.snapshot();
        let base = self.doc.base_url(&tree);
        self.sync.merge(self.extractor.extract(&tree, &base))
    }
}

fn frame_label(doc: &Document) -> String {
    match doc.frame_element_id() {
        _ if doc.is_top() => format!("top:{}", doc.url()),
        Some(id) => format!("frame#{id}:{}", doc.url()),
        None => format!("frame:{}", doc.url()),
    }
}

/// Shared across all workers of a session.
#[derive(Clone, Default)]
pub struct HarvestCounters {
    pub passes: Arc<AtomicU64>,
    pub batches: Arc<AtomicU64>,
    pub links_added: Arc<AtomicU64>,
    pub store_errors: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestStats {
    pub passes: u64,
    pub batches: u64,
    pub links_added: u64,
    pub store_errors: u64,
}

impl HarvestCounters {
    pub fn snapshot(&self) -> HarvestStats {
        HarvestStats {
            passes: self.passes.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            links_added: self.links_added.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

pub struct Coordinator {
    cfg: Config,
    sync: StoreSynchronizer,
    extractor: LinkExtractor,
    top_overlay: bool,
}

impl Coordinator {
    pub fn new(cfg: &Config, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sync: StoreSynchronizer::new(store, cfg.store_key.clone()),
            extractor: LinkExtractor::new(ExtractOptions::from_config(cfg)),
            cfg: cfg.clone(),
            top_overlay: false,
        }
    }

    /// Also mount the in-page overlay on the top-level document.
    pub fn with_top_overlay(mut self, enabled: bool) -> Self {
        self.top_overlay = enabled;
        self
    }

    pub fn synchronizer(&self) -> &StoreSynchronizer {
        &self.sync
    }

    /// Start pipelines for `doc`. A top-level document also gets one
    /// pipeline per accessible iframe (one level deep); cross-origin frames
    /// are skipped.
    pub fn init(&self, doc: &Document) -> Result<FrameSession, DomError> {
        let mut session = FrameSession::new();
        if !doc.is_top() {
            self.attach_document(doc, &mut session)?;
            return Ok(session);
        }

        self.start_pipeline(doc, &mut session)?;
        if self.top_overlay {
            self.mount_overlay(doc, SurfaceConfig::top_overlay(&self.cfg), &mut session);
        }

        for iframe in doc.iframes() {
            match doc.frame_access(iframe) {
                FrameAccess::Accessible(content) => {
                    if let Err(err) = self.attach_document(&content, &mut session) {
                        warn!("frame pipeline not started url={}: {err}", content.url());
                    }
                }
                FrameAccess::Inaccessible { url } => {
                    warn!("skipping cross-origin frame url={url}");
                }
                FrameAccess::Missing => {
                    debug!("iframe {iframe:?} has no content document");
                }
            }
        }
        info!(
            "coordinator started url={} pipelines={} panels={}",
            doc.url(),
            session.workers.len(),
            session.panels.len()
        );
        Ok(session)
    }

    fn attach_document(&self, doc: &Document, session: &mut FrameSession) -> Result<(), DomError> {
        self.start_pipeline(doc, session)?;
        if doc.frame_element_id() == Some(self.cfg.child_frame_id.as_str()) {
            info!("child frame detected id={} url={}", self.cfg.child_frame_id, doc.url());
            self.mount_overlay(doc, SurfaceConfig::frame_overlay(&self.cfg), session);
        }
        Ok(())
    }

    fn start_pipeline(&self, doc: &Document, session: &mut FrameSession) -> Result<(), DomError> {
        let watcher = MutationWatcher::attach(doc)?;
        let harvester = FrameHarvester::new(doc, self.extractor.clone(), self.sync.clone());
        debug!("starting frame pipeline frame={}", harvester.label());
        session.harvesters.push(harvester.clone());
        let handle = spawn_frame_worker(harvester, watcher, session.counters.clone());
        session.documents.push(doc.clone());
        session.workers.push(handle);
        Ok(())
    }

    fn mount_overlay(&self, doc: &Document, surface: SurfaceConfig, session: &mut FrameSession) {
        let mount = match DomMount::install(doc, &self.cfg.overlay_id, &surface.title) {
            Ok(mount) => mount,
            Err(err) => {
                warn!("overlay not mounted url={}: {err}", doc.url());
                return;
            }
        };
        let layout = BodyMarginReservation::new(doc);
        let controller = Arc::new(PanelController::new(
            surface,
            self.sync.clone(),
            Box::new(mount),
            Box::new(layout),
            Box::new(LogNavigator),
        ));
        let listener = controller.spawn_listener();
        if let Err(err) = controller.initialize() {
            warn!("overlay initial load failed url={}: {err}", doc.url());
        }
        session.panels.push((controller, listener));
    }
}

/// Running pipelines and panels started by [`Coordinator::init`].
pub struct FrameSession {
    documents: Vec<Document>,
    harvesters: Vec<FrameHarvester>,
    workers: Vec<thread::JoinHandle<WorkerReport>>,
    panels: Vec<(Arc<PanelController>, PanelListener)>,
    counters: HarvestCounters,
}

/// Final state of a finished session.
pub struct SessionReport {
    pub stats: HarvestStats,
    pub workers: Vec<WorkerReport>,
    /// Links recovered by the closing reconciliation pass.
    pub reconciled: usize,
    pub panels: Vec<Arc<PanelController>>,
}

impl FrameSession {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            harvesters: Vec::new(),
            workers: Vec::new(),
            panels: Vec::new(),
            counters: HarvestCounters::default(),
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn panels(&self) -> impl Iterator<Item = &Arc<PanelController>> {
        self.panels.iter().map(|(controller, _)| controller)
    }

    pub fn stats(&self) -> HarvestStats {
        self.counters.snapshot()
    }

    /// Drain every pipeline and listener, then unload the documents.
    /// Batches already observed are still harvested. One sequential pass per
    /// frame then re-merges anything a racing writer dropped, and every
    /// resulting store change is rendered before the panels stop.
    pub fn finish(self) -> SessionReport {
        let FrameSession {
            documents,
            harvesters,
            workers,
            panels,
            counters,
        } = self;

        for doc in &documents {
            doc.disconnect_observers();
        }
        let mut reports = Vec::with_capacity(workers.len());
        for handle in workers {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => warn!("frame worker panicked"),
            }
        }

        let mut reconciled = 0;
        for harvester in &harvesters {
            match harvester.harvest() {
                Ok(outcome) => reconciled += outcome.added,
                Err(err) => warn!("reconciliation failed frame={}: {err}", harvester.label()),
            }
        }
        if reconciled > 0 {
            info!("reconciliation recovered links={reconciled}");
        }

        let mut controllers = Vec::with_capacity(panels.len());
        for (controller, listener) in panels {
            listener.stop();
            controllers.push(controller);
        }
        for doc in &documents {
            doc.unload();
        }

        let stats = counters.snapshot();
        info!(
            "session_summary pipelines={} passes={} batches={} links_added={} store_errors={}",
            reports.len(),
            stats.passes,
            stats.batches,
            stats.links_added,
            stats.store_errors
        );
        SessionReport {
            stats,
            workers: reports,
            reconciled,
            panels: controllers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse::parse_document;
    use crate::store::MemoryStore;
    use url::Url;

    fn config() -> Config {
        crate::config::load_config(None).expect("config").config
    }

    #[test]
    fn harvest_resolves_against_base() {
        let doc = Document::top(
            Url::parse("https://a.test/dir/page").expect("url"),
            parse_document("<head><base href=\"https://cdn.test/\"></head><body><a href=\"x\">X</a></body>"),
        );
        let cfg = config();
        let sync = StoreSynchronizer::new(Arc::new(MemoryStore::new()), cfg.store_key.clone());
        let harvester = FrameHarvester::new(&doc, LinkExtractor::default(), sync.clone());
        assert_eq!(harvester.harvest().expect("harvest").added, 1);
        assert!(sync.load().expect("load").contains("https://cdn.test/x"));
    }

    #[test]
    fn labels_distinguish_frames() {
        let url = Url::parse("https://a.test/").expect("url");
        let top = Document::top(url.clone(), parse_document(""));
        let child = Document::frame(url, Some("RecScr"), parse_document(""));
        assert!(frame_label(&top).starts_with("top:"));
        assert!(frame_label(&child).starts_with("frame#RecScr:"));
    }

    #[test]
    fn session_finish_reports_initial_pass() {
        let cfg = config();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let doc = Document::top(
            Url::parse("https://a.test/").expect("url"),
            parse_document("<body><a href=\"/one\">one</a></body>"),
        );
        let session = Coordinator::new(&cfg, store).init(&doc).expect("init");
        let report = session.finish();
        assert_eq!(report.workers.len(), 1);
        assert_eq!(report.stats.links_added, 1);
        assert!(doc.is_unloaded());
    }
}
