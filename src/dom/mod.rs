//! # DOM Model
//!
//! Arena-backed document tree with copy-on-write snapshots and a
//! mutation-observer style notification channel. Nodes are never freed, so a
//! `NodeId` stays valid for the lifetime of its document even after the node
//! is detached.

pub mod parse;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum DomError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("cannot insert {child:?} under {parent:?}")]
    HierarchyRequest { parent: NodeId, child: NodeId },
    #[error("document {0} has been unloaded")]
    Unloaded(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    /// Click listener attached from script rather than through an attribute.
    pub click_handler: bool,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            click_handler: false,
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name, value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(el)) => Ok(el),
            Some(_) => Err(DomError::NotAnElement(id)),
            None => Err(DomError::UnknownNode(id)),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Pre-order walk below `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let stack = self.children(id).iter().rev().copied().collect();
        Descendants { tree: self, stack }
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root(), id)
    }

    /// Concatenated text of every text node at or below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(Node {
            kind: NodeKind::Text(text),
            ..
        }) = self.node(id)
        {
            return text.clone();
        }
        let mut out = String::new();
        for child in self.descendants(id) {
            if let Some(Node {
                kind: NodeKind::Text(text),
                ..
            }) = self.node(child)
            {
                out.push_str(text);
            }
        }
        out
    }

    pub fn elements_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(self.root())
            .filter(move |&id| self.element(id).is_some_and(|el| el.is(tag)))
    }

    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|&id| self.element(id).and_then(ElementData::id) == Some(element_id))
    }

    pub fn body(&self) -> Option<NodeId> {
        self.elements_by_tag("body").next()
    }

    /// True when `id` is a `tag` element or has one below it.
    pub fn contains_tag(&self, id: NodeId, tag: &str) -> bool {
        if self.element(id).is_some_and(|el| el.is(tag)) {
            return true;
        }
        if self.element(id).is_none() {
            return false;
        }
        self.descendants(id)
            .any(|child| self.element(child).is_some_and(|el| el.is(tag)))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Comment(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent_kind = &self.node(parent).ok_or(DomError::UnknownNode(parent))?.kind;
        let accepts_children = matches!(parent_kind, NodeKind::Document | NodeKind::Element(_));
        self.node(child).ok_or(DomError::UnknownNode(child))?;
        if !accepts_children || child == self.root() || self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        self.detach(child)?;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let old_parent = self.node(id).ok_or(DomError::UnknownNode(id))?.parent;
        if let Some(old) = old_parent {
            self.nodes[old.0].children.retain(|&c| c != id);
            self.nodes[id.0].parent = None;
        }
        Ok(())
    }

    pub fn remove_children(&mut self, id: NodeId) -> Result<Vec<NodeId>, DomError> {
        let node = self.nodes.get_mut(id.0).ok_or(DomError::UnknownNode(id))?;
        let removed = std::mem::take(&mut node.children);
        for child in &removed {
            self.nodes[child.0].parent = None;
        }
        Ok(removed)
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.element_mut(id)?.set_attr(name, value);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(id)?.remove_attr(name);
        Ok(())
    }

    pub fn set_click_handler(&mut self, id: NodeId, attached: bool) -> Result<(), DomError> {
        self.element_mut(id)?.click_handler = attached;
        Ok(())
    }

    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        let style = self.element(id)?.attr("style")?;
        parse_style(style)
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Set or clear (`None`) one inline style property, keeping the others.
    pub fn set_style_property(&mut self, id: NodeId, name: &str, value: Option<&str>) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        let mut props = element.attr("style").map(parse_style).unwrap_or_default();
        props.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        if let Some(value) = value {
            props.push((name.to_ascii_lowercase(), value.to_string()));
        }
        if props.is_empty() {
            element.remove_attr("style");
        } else {
            let style = props
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("; ");
            element.set_attr("style", &style);
        }
        Ok(())
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[derive(Clone)]
pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

/// One childList change: nodes inserted into or removed from `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

/// Records delivered to an observer in one notification.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    pub records: Vec<MutationRecord>,
}

impl MutationBatch {
    pub fn added_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.records.iter().flat_map(|r| r.added_nodes.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowsingContext {
    Top,
    /// Nested document; carries the `id` of the hosting iframe element, if any.
    Frame { frame_element_id: Option<String> },
}

/// Result of reaching into an iframe's content document.
#[derive(Debug, Clone)]
pub enum FrameAccess {
    Accessible(Document),
    /// Content belongs to another origin.
    Inaccessible { url: Url },
    /// Not an iframe, or nothing loaded into it.
    Missing,
}

/// Origin comparison on scheme, host and effective port. `file:` documents
/// share one origin so local pages can reach their local frames.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

struct Observer {
    id: u64,
    root: NodeId,
    tx: Sender<MutationBatch>,
}

struct DocumentInner {
    url: Url,
    context: BrowsingContext,
    tree: RwLock<Arc<Tree>>,
    frames: RwLock<HashMap<NodeId, Document>>,
    observers: Mutex<Vec<Observer>>,
    pending: Mutex<Vec<MutationRecord>>,
    next_observer: AtomicU64,
    unloaded: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A live document shared between its frame worker, its panel surface and
/// whatever host code mutates it. Cloning yields another handle to the same
/// document.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.inner.url.as_str())
            .field("context", &self.inner.context)
            .finish()
    }
}

impl Document {
    pub fn new(url: Url, context: BrowsingContext, tree: Tree) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                url,
                context,
                tree: RwLock::new(Arc::new(tree)),
                frames: RwLock::new(HashMap::new()),
                observers: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                unloaded: AtomicBool::new(false),
            }),
        }
    }

    pub fn top(url: Url, tree: Tree) -> Self {
        Self::new(url, BrowsingContext::Top, tree)
    }

    pub fn frame(url: Url, frame_element_id: Option<&str>, tree: Tree) -> Self {
        Self::new(
            url,
            BrowsingContext::Frame {
                frame_element_id: frame_element_id.map(str::to_string),
            },
            tree,
        )
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn context(&self) -> &BrowsingContext {
        &self.inner.context
    }

    pub fn is_top(&self) -> bool {
        self.inner.context == BrowsingContext::Top
    }

    pub fn frame_element_id(&self) -> Option<&str> {
        match &self.inner.context {
            BrowsingContext::Frame { frame_element_id } => frame_element_id.as_deref(),
            BrowsingContext::Top => None,
        }
    }

    pub fn is_unloaded(&self) -> bool {
        self.inner.unloaded.load(Ordering::Acquire)
    }

    /// Immutable view of the tree as of now.
    pub fn snapshot(&self) -> Arc<Tree> {
        self.inner
            .tree
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Base for resolving relative hrefs: the first `<base href>` or the
    /// document URL.
    pub fn base_url(&self, tree: &Tree) -> Url {
        tree.elements_by_tag("base")
            .filter_map(|id| tree.element(id)?.attr("href"))
            .find_map(|href| self.inner.url.join(href.trim()).ok())
            .unwrap_or_else(|| self.inner.url.clone())
    }

    pub fn body(&self) -> Option<NodeId> {
        self.snapshot().body()
    }

    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.snapshot().element_by_id(element_id)
    }

    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        self.snapshot().style_property(id, name)
    }

    /// Run `f` against a writable copy of the tree. Readers holding a
    /// snapshot keep seeing the old version.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Tree) -> Result<R, DomError>) -> Result<R, DomError> {
        if self.is_unloaded() {
            return Err(DomError::Unloaded(self.inner.url.to_string()));
        }
        let mut guard = self
            .inner
            .tree
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(Arc::make_mut(&mut guard))
    }

    pub fn create_element(&self, tag: &str) -> Result<NodeId, DomError> {
        self.mutate(|tree| Ok(tree.create_element(tag)))
    }

    pub fn create_text(&self, text: &str) -> Result<NodeId, DomError> {
        self.mutate(|tree| Ok(tree.create_text(text)))
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.mutate(|tree| tree.append_child(parent, child))?;
        self.queue(MutationRecord {
            target: parent,
            added_nodes: vec![child],
            removed_nodes: Vec::new(),
        });
        Ok(())
    }

    /// Parse `html` as a fragment and append its top-level nodes to `parent`
    /// as a single record.
    pub fn insert_html(&self, parent: NodeId, html: &str) -> Result<Vec<NodeId>, DomError> {
        let added = self.mutate(|tree| {
            let nodes = parse::parse_fragment(tree, html);
            for &node in &nodes {
                tree.append_child(parent, node)?;
            }
            Ok(nodes)
        })?;
        if !added.is_empty() {
            self.queue(MutationRecord {
                target: parent,
                added_nodes: added.clone(),
                removed_nodes: Vec::new(),
            });
        }
        Ok(added)
    }

    pub fn remove_node(&self, id: NodeId) -> Result<(), DomError> {
        let parent = self.mutate(|tree| {
            let parent = tree.parent(id);
            tree.detach(id)?;
            Ok(parent)
        })?;
        if let Some(parent) = parent {
            self.queue(MutationRecord {
                target: parent,
                added_nodes: Vec::new(),
                removed_nodes: vec![id],
            });
        }
        Ok(())
    }

    pub fn remove_children(&self, id: NodeId) -> Result<(), DomError> {
        let removed = self.mutate(|tree| tree.remove_children(id))?;
        if !removed.is_empty() {
            self.queue(MutationRecord {
                target: id,
                added_nodes: Vec::new(),
                removed_nodes: removed,
            });
        }
        Ok(())
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&self, id: NodeId, text: &str) -> Result<(), DomError> {
        self.remove_children(id)?;
        let node = self.create_text(text)?;
        self.append_child(id, node)
    }

    pub fn set_attribute(&self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.mutate(|tree| tree.set_attribute(id, name, value))
    }

    pub fn set_click_handler(&self, id: NodeId, attached: bool) -> Result<(), DomError> {
        self.mutate(|tree| tree.set_click_handler(id, attached))
    }

    pub fn set_style_property(&self, id: NodeId, name: &str, value: Option<&str>) -> Result<(), DomError> {
        self.mutate(|tree| tree.set_style_property(id, name, value))
    }

    fn queue(&self, record: MutationRecord) {
        lock(&self.inner.pending).push(record);
    }

    /// Deliver queued records to every observer whose root covers them, as
    /// one batch per observer. Returns how many records were pending.
    pub fn flush_mutations(&self) -> usize {
        let records = std::mem::take(&mut *lock(&self.inner.pending));
        if records.is_empty() {
            return 0;
        }
        let tree = self.snapshot();
        let mut observers = lock(&self.inner.observers);
        observers.retain(|observer| {
            let scoped: Vec<MutationRecord> = records
                .iter()
                .filter(|r| tree.is_inclusive_ancestor(observer.root, r.target))
                .cloned()
                .collect();
            if scoped.is_empty() {
                return true;
            }
            observer.tx.send(MutationBatch { records: scoped }).is_ok()
        });
        records.len()
    }

    /// Run `f` and deliver everything it changed as one batch.
    pub fn batch<R>(&self, f: impl FnOnce(&Document) -> Result<R, DomError>) -> Result<R, DomError> {
        let result = f(self);
        self.flush_mutations();
        result
    }

    /// Subscribe to childList changes anywhere under `root`.
    pub fn observe(&self, root: NodeId) -> Result<MutationSubscription, DomError> {
        if self.is_unloaded() {
            return Err(DomError::Unloaded(self.inner.url.to_string()));
        }
        if self.snapshot().node(root).is_none() {
            return Err(DomError::UnknownNode(root));
        }
        let (tx, rx) = unbounded();
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.observers).push(Observer { id, root, tx });
        Ok(MutationSubscription {
            id,
            root,
            rx,
            doc: Arc::downgrade(&self.inner),
        })
    }

    /// Connected iframe elements, in document order.
    pub fn iframes(&self) -> Vec<NodeId> {
        self.snapshot().elements_by_tag("iframe").collect()
    }

    pub fn attach_frame(&self, iframe: NodeId, content: Document) -> Result<(), DomError> {
        let tree = self.snapshot();
        match tree.element(iframe) {
            Some(el) if el.is("iframe") => {}
            Some(_) => return Err(DomError::NotAnElement(iframe)),
            None => return Err(DomError::UnknownNode(iframe)),
        }
        self.inner
            .frames
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(iframe, content);
        Ok(())
    }

    /// Reach into an iframe's content document, subject to the same-origin
    /// rule. `about:blank` content inherits this document's origin.
    pub fn frame_access(&self, iframe: NodeId) -> FrameAccess {
        let frames = self
            .inner
            .frames
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match frames.get(&iframe) {
            None => FrameAccess::Missing,
            Some(content) if content.url().scheme() == "about" || same_origin(self.url(), content.url()) => {
                FrameAccess::Accessible(content.clone())
            }
            Some(content) => FrameAccess::Inaccessible {
                url: content.url().clone(),
            },
        }
    }

    /// End every mutation stream without unloading; receivers still drain
    /// the batches already delivered.
    pub fn disconnect_observers(&self) {
        lock(&self.inner.observers).clear();
    }

    /// Tear the document down: observers are disconnected (their streams end
    /// after draining) and nested frame documents unload too.
    pub fn unload(&self) {
        if self.inner.unloaded.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("unloading document url={}", self.inner.url);
        lock(&self.inner.pending).clear();
        self.disconnect_observers();
        let frames: Vec<Document> = self
            .inner
            .frames
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        for frame in frames {
            frame.unload();
        }
    }
}

/// Live mutation stream for one observer. Dropping it unsubscribes.
pub struct MutationSubscription {
    id: u64,
    root: NodeId,
    rx: Receiver<MutationBatch>,
    doc: Weak<DocumentInner>,
}

impl MutationSubscription {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn receiver(&self) -> &Receiver<MutationBatch> {
        &self.rx
    }

    /// Stop receiving batches. The observer is removed when `self` drops.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for MutationSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.doc.upgrade() {
            lock(&inner.observers).retain(|o| o.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Document {
        let url = Url::parse("https://a.test/page").expect("url");
        Document::top(url, parse::parse_document(html))
    }

    #[test]
    fn append_rejects_cycles() {
        let mut tree = Tree::new();
        let outer = tree.create_element("div");
        let inner = tree.create_element("div");
        tree.append_child(outer, inner).expect("append");
        assert!(matches!(
            tree.append_child(inner, outer),
            Err(DomError::HierarchyRequest { .. })
        ));
    }

    #[test]
    fn style_properties_round_trip() {
        let mut tree = Tree::new();
        let body = tree.create_element("body");
        tree.set_attribute(body, "style", "color: red").expect("attr");
        tree.set_style_property(body, "margin-right", Some("300px")).expect("style");
        assert_eq!(tree.style_property(body, "margin-right").as_deref(), Some("300px"));
        assert_eq!(tree.style_property(body, "color").as_deref(), Some("red"));
        tree.set_style_property(body, "margin-right", None).expect("style");
        assert_eq!(tree.style_property(body, "margin-right"), None);
    }

    #[test]
    fn batches_are_scoped_to_observer_root() {
        let doc = doc("<body><div id=\"a\"></div></body>");
        let body = doc.body().expect("body");
        let sub = doc.observe(body).expect("observe");
        let div = doc.element_by_id("a").expect("div");
        doc.batch(|d| {
            d.insert_html(div, "<span>x</span>")?;
            d.insert_html(div, "<span>y</span>")
        })
        .expect("insert");
        let batch = sub.receiver().try_recv().expect("batch");
        assert_eq!(batch.len(), 2);
        assert!(sub.receiver().try_recv().is_err());
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let doc = doc("<body></body>");
        let before = doc.snapshot();
        let body = doc.body().expect("body");
        doc.insert_html(body, "<a href=\"/x\">x</a>").expect("insert");
        assert_eq!(before.elements_by_tag("a").count(), 0);
        assert_eq!(doc.snapshot().elements_by_tag("a").count(), 1);
    }

    #[test]
    fn unload_disconnects_observers() {
        let doc = doc("<body></body>");
        let sub = doc.observe(doc.body().expect("body")).expect("observe");
        doc.unload();
        assert!(sub.receiver().recv().is_err());
        assert!(doc.create_element("a").is_err());
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let doc = doc("<body></body>");
        let body = doc.body().expect("body");
        let sub = doc.observe(body).expect("observe");
        drop(sub);
        doc.insert_html(body, "<p>x</p>").expect("insert");
        doc.flush_mutations();
        assert!(lock(&doc.inner.observers).is_empty());
    }

    #[test]
    fn cross_origin_frames_are_inaccessible() {
        let top = doc("<body><iframe id=\"f\"></iframe><iframe id=\"g\"></iframe></body>");
        let frames = top.iframes();
        let foreign = Document::frame(Url::parse("https://other.test/").expect("url"), Some("f"), Tree::new());
        let local = Document::frame(Url::parse("https://a.test/inner").expect("url"), Some("g"), Tree::new());
        top.attach_frame(frames[0], foreign).expect("attach");
        top.attach_frame(frames[1], local).expect("attach");
        assert!(matches!(top.frame_access(frames[0]), FrameAccess::Inaccessible { .. }));
        assert!(matches!(top.frame_access(frames[1]), FrameAccess::Accessible(_)));
        assert!(matches!(top.frame_access(top.body().expect("body")), FrameAccess::Missing));
    }
}
