//! # Mutation Watcher
//!
//! Turns a document's mutation stream into "anchors may have appeared"
//! signals. The check is cheap and errs toward re-extraction:
//! an inserted node that is an anchor, or that holds one, counts. Removals
//! never count.

use crossbeam_channel::Receiver;

use crate::dom::{DomError, Document, MutationBatch, MutationSubscription, Tree};

/// True when any node inserted by `batch` is an `<a>` or contains one.
pub fn batch_may_add_anchors(tree: &Tree, batch: &MutationBatch) -> bool {
    batch.added_nodes().any(|node| tree.contains_tag(node, "a"))
}

/// Subscription on a document's body (or its root when there is no body).
pub struct MutationWatcher {
    doc: Document,
    subscription: MutationSubscription,
}

impl MutationWatcher {
    pub fn attach(doc: &Document) -> Result<Self, DomError> {
        let tree = doc.snapshot();
        let root = tree.body().unwrap_or_else(|| tree.root());
        let subscription = doc.observe(root)?;
        Ok(Self {
            doc: doc.clone(),
            subscription,
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn batches(&self) -> &Receiver<MutationBatch> {
        self.subscription.receiver()
    }

    /// Blocking stream of the batches that passed the anchor check, in the
    /// order they were observed. Ends when the document unloads or the
    /// watcher is cancelled.
    pub fn relevant_batches(&self) -> impl Iterator<Item = MutationBatch> + '_ {
        self.batches()
            .iter()
            .filter(|batch| batch_may_add_anchors(&self.doc.snapshot(), batch))
    }

    pub fn cancel(self) {
        self.subscription.cancel();
    }
}
