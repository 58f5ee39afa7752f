//! Scripted DOM insertions, used to drive a loaded page the way a live page
//! would be driven by its own scripts.
//!
//! ```yaml
//! steps:
//!   - html: '<div><a href="https://b.test/">B</a></div>'
//!   - frame: RecScr
//!     parent: results
//!     html: '<a href="/next" data-ajax>Next</a>'
//! ```

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::debug;

use crate::dom::{Document, FrameAccess};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MutationStep {
    /// Frame element id of the target document; the top document when absent.
    #[serde(default)]
    pub frame: Option<String>,
    /// Element id to insert under; the body when absent.
    #[serde(default)]
    pub parent: Option<String>,
    pub html: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MutationScript {
    #[serde(default)]
    pub steps: Vec<MutationStep>,
}

impl MutationScript {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("invalid mutation script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read mutation script {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    /// Apply every step to `top` (or one of its frames); each step is
    /// delivered to observers as its own batch. Returns the number of nodes
    /// inserted.
    pub fn apply(&self, top: &Document) -> Result<usize> {
        let mut inserted = 0;
        for (index, step) in self.steps.iter().enumerate() {
            let target = match &step.frame {
                Some(frame_id) => find_frame(top, frame_id)
                    .ok_or_else(|| anyhow!("step {index}: no accessible frame #{frame_id}"))?,
                None => top.clone(),
            };
            let parent = match &step.parent {
                Some(id) => target
                    .element_by_id(id)
                    .ok_or_else(|| anyhow!("step {index}: no element #{id} in {}", target.url()))?,
                None => target
                    .body()
                    .ok_or_else(|| anyhow!("step {index}: {} has no body", target.url()))?,
            };
            let added = target
                .batch(|doc| doc.insert_html(parent, &step.html))
                .with_context(|| format!("step {index}: insert failed"))?;
            debug!("replayed step={index} url={} nodes={}", target.url(), added.len());
            inserted += added.len();
        }
        Ok(inserted)
    }
}

fn find_frame(top: &Document, frame_id: &str) -> Option<Document> {
    let tree = top.snapshot();
    let iframe = tree.element_by_id(frame_id)?;
    match top.frame_access(iframe) {
        FrameAccess::Accessible(doc) => Some(doc),
        FrameAccess::Inaccessible { .. } | FrameAccess::Missing => None,
    }
}
