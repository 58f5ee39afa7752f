//! # Utility Module
//!
//! Page loading and the command bodies used by the binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::dom::parse::parse_document;
use crate::dom::{Document, same_origin};
use crate::panel::{NoReservation, PanelController, SurfaceConfig, TextMount, render};
use crate::pipeline::Coordinator;
use crate::replay::MutationScript;
use crate::store::KeyValueStore;
use crate::synchronizer::StoreSynchronizer;

/// URL a page file is served under: `base_url` when given, otherwise its
/// `file:` URL.
pub fn page_url(path: &Path, base_url: Option<&str>) -> Result<Url> {
    if let Some(base) = base_url {
        return Url::parse(base).with_context(|| format!("invalid base url {base}"));
    }
    let absolute = std::fs::canonicalize(path)
        .with_context(|| format!("resolve page path {}", path.display()))?;
    Url::from_file_path(&absolute).map_err(|_| anyhow!("cannot form file url for {}", absolute.display()))
}

/// Parse a page and attach its iframe documents. Frames whose `src` is
/// same-origin and points at a local file are loaded from disk (relative to
/// the page) down to `cfg.max_frame_depth`; cross-origin frames get an
/// inaccessible placeholder; anything else an empty `about:blank` document.
pub fn load_page(path: &Path, base_url: Option<&str>, cfg: &Config) -> Result<Document> {
    let html = std::fs::read_to_string(path).with_context(|| format!("read page {}", path.display()))?;
    let url = page_url(path, base_url)?;
    let doc = Document::top(url, parse_document(&html));
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    load_frames(&doc, dir, cfg.max_frame_depth, 1)?;
    Ok(doc)
}

fn load_frames(doc: &Document, dir: &Path, max_depth: usize, depth: usize) -> Result<()> {
    let tree = doc.snapshot();
    for iframe in doc.iframes() {
        let Some(el) = tree.element(iframe) else {
            continue;
        };
        let frame_id = el.id().map(str::to_string);
        let src = el.attr("src").map(str::trim).unwrap_or("");

        let content = if src.is_empty() || depth > max_depth {
            blank_frame(frame_id.as_deref())?
        } else {
            match doc.url().join(src) {
                Ok(url) if !same_origin(doc.url(), &url) => {
                    debug!("cross-origin frame src={url}");
                    Document::frame(url, frame_id.as_deref(), parse_document(""))
                }
                Ok(url) => match read_frame_source(src, &url, dir) {
                    Some(html) => {
                        let frame = Document::frame(url, frame_id.as_deref(), parse_document(&html));
                        load_frames(&frame, dir, max_depth, depth + 1)?;
                        frame
                    }
                    None => blank_frame(frame_id.as_deref())?,
                },
                Err(err) => {
                    warn!("unresolvable iframe src={src}: {err}");
                    blank_frame(frame_id.as_deref())?
                }
            }
        };
        doc.attach_frame(iframe, content)
            .with_context(|| format!("attach frame in {}", doc.url()))?;
    }
    Ok(())
}

fn read_frame_source(src: &str, url: &Url, dir: &Path) -> Option<String> {
    let file = if Url::parse(src).is_err() {
        let relative = src.split(['?', '#']).next().unwrap_or(src);
        dir.join(relative)
    } else if url.scheme() == "file" {
        url.to_file_path().ok()?
    } else {
        debug!("not fetching remote frame url={url}");
        return None;
    };
    match std::fs::read_to_string(&file) {
        Ok(html) => Some(html),
        Err(err) => {
            warn!("frame source unavailable path={}: {err}", file.display());
            None
        }
    }
}

fn blank_frame(frame_id: Option<&str>) -> Result<Document> {
    let url = Url::parse("about:blank")?;
    Ok(Document::frame(url, frame_id, parse_document("")))
}

fn docked_panel(cfg: &Config, store: Arc<dyn KeyValueStore>) -> PanelController {
    PanelController::new(
        SurfaceConfig::docked(cfg),
        StoreSynchronizer::new(store, cfg.store_key.clone()),
        Box::new(TextMount::new()),
        Box::new(NoReservation),
        Box::new(crate::panel::LogNavigator),
    )
}

fn docked_text(panel: &PanelController) -> Result<String> {
    let view = panel
        .current_view()
        .ok_or_else(|| anyhow!("docked panel has not rendered"))?;
    Ok(render::render_text(&view))
}

/// Load a page, run the coordinator over it, replay scripted mutations and
/// return the docked panel rendering of the resulting collection.
pub fn run_collect(
    cfg: &Config,
    store: Arc<dyn KeyValueStore>,
    input: &Path,
    base_url: Option<&str>,
    mutations: Option<&Path>,
) -> Result<String> {
    let doc = load_page(input, base_url, cfg)?;
    info!("page loaded url={} frames={}", doc.url(), doc.iframes().len());

    let script = mutations.map(MutationScript::load).transpose()?;
    let session = Coordinator::new(cfg, store.clone())
        .init(&doc)
        .context("start frame pipelines")?;
    if let Some(script) = script {
        let inserted = script.apply(&doc)?;
        info!("mutations replayed steps={} nodes={inserted}", script.steps.len());
    }
    let report = session.finish();
    info!(
        "collect finished pipelines={} links_added={}",
        report.workers.len(),
        report.stats.links_added
    );
    run_show(cfg, store)
}

pub fn run_show(cfg: &Config, store: Arc<dyn KeyValueStore>) -> Result<String> {
    let panel = docked_panel(cfg, store);
    panel.initialize().context("load collected links")?;
    panel.show();
    docked_text(&panel)
}

pub fn run_clear(cfg: &Config, store: Arc<dyn KeyValueStore>) -> Result<String> {
    let panel = docked_panel(cfg, store);
    panel.clear().context("clear collected links")?;
    docked_text(&panel)
}
