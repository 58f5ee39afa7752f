use tracing::{debug, warn};

use crate::constants::{DEFAULT_MARGIN, MARGIN_RIGHT};
use crate::dom::Document;

/// How a surface keeps the host page from sliding under it.
pub trait LayoutReservation: Send + Sync {
    /// Reserve `width` pixels on the panel's side of the page.
    fn reserve(&self, width: u32);
    /// Give the page back its pre-panel layout.
    fn release(&self);
}

/// For surfaces the host lays out itself, such as a docked side panel.
pub struct NoReservation;

impl LayoutReservation for NoReservation {
    fn reserve(&self, _width: u32) {}
    fn release(&self) {}
}

/// Pushes page content aside by setting the body's right margin, restoring
/// whatever margin the body had when the reservation was created.
pub struct BodyMarginReservation {
    doc: Document,
    original: String,
}

impl BodyMarginReservation {
    pub fn new(doc: &Document) -> Self {
        let original = doc
            .body()
            .and_then(|body| doc.style_property(body, MARGIN_RIGHT))
            .unwrap_or_else(|| DEFAULT_MARGIN.to_string());
        Self {
            doc: doc.clone(),
            original,
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Margin currently applied to the body.
    pub fn current(&self) -> Option<String> {
        let body = self.doc.body()?;
        self.doc.style_property(body, MARGIN_RIGHT)
    }

    fn apply(&self, value: &str) {
        let Some(body) = self.doc.body() else {
            warn!("no body to reserve layout on url={}", self.doc.url());
            return;
        };
        match self.doc.set_style_property(body, MARGIN_RIGHT, Some(value)) {
            Ok(()) => debug!("body margin set to {value} url={}", self.doc.url()),
            Err(err) => warn!("failed to set body margin url={}: {err}", self.doc.url()),
        }
    }
}

impl LayoutReservation for BodyMarginReservation {
    fn reserve(&self, width: u32) {
        self.apply(&format!("{width}px"));
    }

    fn release(&self) {
        self.apply(&self.original);
    }
}
