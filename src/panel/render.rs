//! View model for a panel surface and the mounts that draw it.

use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use crate::constants::{
    CLEAR_BUTTON_ID, DEFAULT_MARGIN, MARGIN_RIGHT, OVERLAY_COUNT_ID, OVERLAY_HEADER_ID,
    OVERLAY_LIST_ID, OVERLAY_TITLE_ID, TOGGLE_BUTTON_ID, TOGGLE_LABEL_CLOSE, TOGGLE_LABEL_EXPAND,
    TOGGLE_LABEL_OPEN,
};
use crate::dom::{DomError, Document};
use crate::links::LinkCollection;

use super::PanelState;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("panel element #{0} is missing")]
    MissingAnchor(String),
    #[error("dom error: {0}")]
    Dom(#[from] DomError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelItem {
    pub href: String,
    pub text: String,
    pub captured_at: String,
    pub is_ajax: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelBody {
    Empty(String),
    Links(Vec<PanelItem>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub title: String,
    pub count_line: String,
    pub body: PanelBody,
}

impl PanelView {
    pub fn items(&self) -> &[PanelItem] {
        match &self.body {
            PanelBody::Links(items) => items,
            PanelBody::Empty(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.body, PanelBody::Empty(_))
    }
}

/// Deduplicate by `href` (last occurrence wins), newest first.
pub fn build_view(title: &str, empty_message: &str, collection: &LinkCollection) -> PanelView {
    let mut unique = collection.unique_by_href();
    unique.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let count_line = format!("{} unique link(s)", unique.len());
    let body = if unique.is_empty() {
        PanelBody::Empty(empty_message.to_string())
    } else {
        PanelBody::Links(
            unique
                .into_iter()
                .map(|record| PanelItem {
                    captured_at: format_capture_time(record.timestamp),
                    text: if record.text.is_empty() {
                        "No text".to_string()
                    } else {
                        record.text
                    },
                    href: record.href,
                    is_ajax: record.is_ajax,
                    timestamp: record.timestamp,
                })
                .collect(),
        )
    };
    PanelView {
        title: title.to_string(),
        count_line,
        body,
    }
}

/// Local wall-clock time of a capture, `HH:MM:SS`.
pub fn format_capture_time(timestamp_ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(timestamp_ms) {
        Some(utc) => utc.with_timezone(&chrono::Local).format("%H:%M:%S").to_string(),
        None => "unknown time".to_string(),
    }
}

/// Plain-text rendering used by the docked panel.
pub fn render_text(view: &PanelView) -> String {
    let mut out = format!("{}\n{}\n", view.title, view.count_line);
    match &view.body {
        PanelBody::Empty(message) => {
            out.push('\n');
            out.push_str(message);
            out.push('\n');
        }
        PanelBody::Links(items) => {
            for item in items {
                out.push('\n');
                out.push_str(&item.href);
                out.push('\n');
                out.push_str(&format!("  {}\n", item.text));
                out.push_str(&format!("  Collected at {}", item.captured_at));
                if item.is_ajax {
                    out.push_str(" [ajax]");
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Where a surface draws itself.
pub trait RenderTarget: Send + Sync {
    fn render(&self, view: &PanelView) -> Result<(), RenderError>;

    /// Reflect a state change (labels, visibility classes).
    fn apply_state(&self, _state: PanelState) -> Result<(), RenderError> {
        Ok(())
    }

    /// Width the surface currently occupies, when it knows one.
    fn rendered_width(&self) -> Option<u32> {
        None
    }
}

/// Keeps the latest rendering as text.
#[derive(Default)]
pub struct TextMount {
    buffer: Mutex<String>,
}

impl TextMount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RenderTarget for TextMount {
    fn render(&self, view: &PanelView) -> Result<(), RenderError> {
        let text = render_text(view);
        *self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = text;
        Ok(())
    }
}

/// Overlay subtree living inside the host document's body.
pub struct DomMount {
    doc: Document,
    overlay_id: String,
    /// Serializes redraws coming from the listener and from host actions.
    redraw: Mutex<()>,
}

impl DomMount {
    /// Build the overlay, first removing one left behind by an earlier
    /// initialization (and the margin it reserved).
    pub fn install(doc: &Document, overlay_id: &str, title: &str) -> Result<Self, RenderError> {
        let tree = doc.snapshot();
        let body = tree
            .body()
            .ok_or_else(|| RenderError::MissingAnchor("body".to_string()))?;
        if let Some(stale) = tree.element_by_id(overlay_id) {
            warn!("removing stale overlay url={}", doc.url());
            doc.set_style_property(body, MARGIN_RIGHT, Some(DEFAULT_MARGIN))?;
            doc.remove_node(stale)?;
        }
        let markup = format!(
            "<div id=\"{overlay}\"><div id=\"{header}\"><span id=\"{title_id}\">{title}</span>\
             <span id=\"{count}\"></span><button id=\"{clear}\">Clear</button>\
             <button id=\"{toggle}\">{label}</button></div><div id=\"{list}\"></div></div>",
            overlay = escape_html(overlay_id),
            header = OVERLAY_HEADER_ID,
            title_id = OVERLAY_TITLE_ID,
            title = escape_html(title),
            count = OVERLAY_COUNT_ID,
            clear = CLEAR_BUTTON_ID,
            toggle = TOGGLE_BUTTON_ID,
            label = TOGGLE_LABEL_OPEN,
            list = OVERLAY_LIST_ID,
        );
        doc.batch(|d| d.insert_html(body, &markup))?;
        Ok(Self {
            doc: doc.clone(),
            overlay_id: overlay_id.to_string(),
            redraw: Mutex::new(()),
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn overlay_id(&self) -> &str {
        &self.overlay_id
    }
}

impl RenderTarget for DomMount {
    fn render(&self, view: &PanelView) -> Result<(), RenderError> {
        let _redraw = self.redraw.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tree = self.doc.snapshot();
        let list = tree
            .element_by_id(OVERLAY_LIST_ID)
            .ok_or_else(|| RenderError::MissingAnchor(OVERLAY_LIST_ID.to_string()))?;
        let count = tree.element_by_id(OVERLAY_COUNT_ID);
        let markup = match &view.body {
            PanelBody::Empty(message) => {
                format!("<div class=\"empty-state\">{}</div>", escape_html(message))
            }
            PanelBody::Links(items) => items.iter().map(item_markup).collect(),
        };
        self.doc.batch(|doc| {
            doc.remove_children(list)?;
            doc.insert_html(list, &markup)?;
            if let Some(count) = count {
                doc.set_text(count, &view.count_line)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn apply_state(&self, state: PanelState) -> Result<(), RenderError> {
        let _redraw = self.redraw.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tree = self.doc.snapshot();
        let overlay = tree
            .element_by_id(&self.overlay_id)
            .ok_or_else(|| RenderError::MissingAnchor(self.overlay_id.clone()))?;
        let toggle = tree.element_by_id(TOGGLE_BUTTON_ID);
        let (class, label) = match state {
            PanelState::Closed => ("", TOGGLE_LABEL_OPEN),
            PanelState::Open => ("active", TOGGLE_LABEL_CLOSE),
            PanelState::Minimized => ("active minimized", TOGGLE_LABEL_EXPAND),
        };
        self.doc.batch(|doc| {
            doc.set_attribute(overlay, "class", class)?;
            if let Some(toggle) = toggle {
                doc.set_text(toggle, label)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn rendered_width(&self) -> Option<u32> {
        let tree = self.doc.snapshot();
        let overlay = tree.element_by_id(&self.overlay_id)?;
        let width = tree.style_property(overlay, "width")?;
        width.trim().trim_end_matches("px").trim().parse::<f64>().ok().map(|w| w.round() as u32)
    }
}

fn item_markup(item: &PanelItem) -> String {
    let class = if item.is_ajax { "link-item ajax" } else { "link-item" };
    let badge = if item.is_ajax {
        "<span class=\"ajax-badge\">AJAX</span>"
    } else {
        ""
    };
    format!(
        "<div class=\"{class}\"><a href=\"{href}\">{href}</a>{badge}\
         <div class=\"link-text\">{text}</div>\
         <div class=\"link-meta\">Collected at {time}</div></div>",
        href = escape_html(&item.href),
        text = escape_html(&item.text),
        time = escape_html(&item.captured_at),
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
