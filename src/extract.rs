//! # Link Extraction
//!
//! Maps a document snapshot to candidate [`LinkRecord`]s. Extraction is a
//! lazy walk over an immutable tree: it never mutates the document, tolerates
//! detached or half-built subtrees, and can be restarted by cloning the
//! iterator or calling [`LinkExtractor::extract`] again.

use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::constants::ONCLICK_ATTRIBUTE;
use crate::dom::{Descendants, NodeId, Tree};
use crate::links::LinkRecord;

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Attribute that explicitly flags an anchor as ajax-driven.
    pub ajax_marker_attribute: String,
    /// Subtree (by element id) whose anchors are ignored, e.g. our own overlay.
    pub skip_subtree_id: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            ajax_marker_attribute: "data-ajax".to_string(),
            skip_subtree_id: None,
        }
    }
}

impl ExtractOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            ajax_marker_attribute: cfg.ajax_marker_attribute.clone(),
            skip_subtree_id: Some(cfg.overlay_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkExtractor {
    options: ExtractOptions,
}

impl LinkExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Candidate records for every qualifying anchor, stamped with the
    /// current wall-clock instant.
    pub fn extract<'a>(&'a self, tree: &'a Tree, base: &'a Url) -> Links<'a> {
        self.extract_at(tree, base, chrono::Utc::now().timestamp_millis())
    }

    pub fn extract_at<'a>(&'a self, tree: &'a Tree, base: &'a Url, timestamp: i64) -> Links<'a> {
        let skip_root = self
            .options
            .skip_subtree_id
            .as_deref()
            .and_then(|id| tree.element_by_id(id));
        Links {
            tree,
            base,
            options: &self.options,
            walker: tree.descendants(tree.root()),
            skip_root,
            timestamp,
        }
    }
}

/// Lazy sequence of link records over one snapshot.
#[derive(Clone)]
pub struct Links<'a> {
    tree: &'a Tree,
    base: &'a Url,
    options: &'a ExtractOptions,
    walker: Descendants<'a>,
    skip_root: Option<NodeId>,
    timestamp: i64,
}

impl Links<'_> {
    fn record_for(&self, id: NodeId) -> Option<LinkRecord> {
        let el = self.tree.element(id)?;
        if !el.is("a") {
            return None;
        }
        let raw = el.attr("href")?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(skip) = self.skip_root {
            if self.tree.is_inclusive_ancestor(skip, id) {
                return None;
            }
        }
        let href = match self.base.join(raw) {
            Ok(url) => url,
            Err(err) => {
                debug!("skipping unresolvable href={raw}: {err}");
                return None;
            }
        };
        if href.scheme() == "javascript" {
            return None;
        }
        let text = self.tree.text_content(id);
        let is_ajax = el.has_attr(&self.options.ajax_marker_attribute)
            || el.has_attr(ONCLICK_ATTRIBUTE)
            || el.click_handler;
        Some(LinkRecord::new(href.to_string(), text.trim(), is_ajax, self.timestamp))
    }
}

impl Iterator for Links<'_> {
    type Item = LinkRecord;

    fn next(&mut self) -> Option<LinkRecord> {
        loop {
            let id = self.walker.next()?;
            if let Some(record) = self.record_for(id) {
                return Some(record);
            }
        }
    }
}
