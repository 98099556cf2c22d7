#![forbid(unsafe_code)]

//! Arena-backed document tree with change notification.
//!
//! A [`Document`] owns every node in a generational arena. Handles
//! ([`NodeId`], [`NodeRef`]) carry the slot index *and* the generation the
//! slot had when the node was created; removing a node bumps the slot's
//! generation, so handles into removed subtrees go stale instead of
//! silently resolving to whatever node reuses the slot.
//!
//! Mutating operations ([`NodeRef::append_child`], [`NodeRef::remove`],
//! [`NodeRef::set_attribute`], [`NodeRef::remove_attribute`],
//! [`NodeRef::set_text`]) queue a [`MutationRecord`] on every observer
//! whose registration covers the change, synchronously, in the mutation
//! call itself. Callbacks never run during mutation; the host pumps
//! [`Document::deliver_pending`] when it wants batches flushed.
//!
//! # Invariants
//!
//! - A [`NodeId`] resolves only while its node is live; after removal it is
//!   stale forever, even if the slot is reused.
//! - Records are queued in mutation order per observer, and observers are
//!   delivered in first-registration order.
//! - One mutation queues at most one record per observer, even when that
//!   observer's registrations cover the change from several ancestors.
//! - `old_value` is populated per observer: the same mutation can queue a
//!   record with the prior value for one observer and without it for
//!   another.
//!
//! # Failure Modes
//!
//! | Misuse | Outcome |
//! |---|---|
//! | Mutation through a stale handle | Returns `false`/`None`, no record |
//! | Removing the root | Refused, returns `false` |
//! | Registering on a stale handle | `ObserveError::DeadNode` |
//! | Re-entrant mutation from a delivery callback | Allowed; records queue for the next pump |

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::observer::{ObserveError, ObserverCore};
use crate::options::ResolvedOptions;
use crate::record::MutationRecord;

/// Attribute consulted by [`Document::node_by_id`].
const ID_ATTRIBUTE: &str = "id";

/// Generation-tagged handle to a node slot.
///
/// `Copy` and cheap to pass around; resolving it re-checks the generation,
/// so a stale handle is harmless rather than dangerous.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index in the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// One observer's registration on one node.
struct Registration {
    observer: Weak<ObserverCore>,
    options: ResolvedOptions,
}

struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    label: String,
    attributes: FxHashMap<String, String>,
    text: Option<String>,
    /// Observers registered directly on this node. Pruned lazily.
    observers: Vec<Registration>,
}

impl NodeData {
    fn new(label: String) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            label,
            attributes: FxHashMap::default(),
            text: None,
            observers: Vec::new(),
        }
    }
}

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// The kind of change being routed to interested observers.
enum Change<'a> {
    ChildList,
    Attribute { name: &'a str },
    CharacterData,
}

pub(crate) struct DocInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
    /// Observers in first-registration order; delivery follows this.
    delivery_order: Vec<Weak<ObserverCore>>,
}

impl DocInner {
    fn get(&self, id: NodeId) -> Option<&NodeData> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.data.as_ref()
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.data.as_mut()
    }

    fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    fn alloc(&mut self, label: String, parent: Option<NodeId>) -> NodeId {
        let mut data = NodeData::new(label);
        data.parent = parent;
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.data = Some(data);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                data: Some(data),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Free one slot. The generation bump happens on the *next* alloc of
    /// the slot; staleness only needs `data` gone for `get` to fail, and
    /// bumping eagerly here would make the freed id resolve again if the
    /// counter wrapped.
    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.data.take().is_some() {
                self.live -= 1;
                self.free.push(id.index);
            }
        }
    }

    /// Ids of `id` and every descendant, depth-first.
    fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(data) = self.get(id) else { continue };
            out.push(id);
            stack.extend(data.children.iter().copied());
        }
        out
    }

    /// Observers whose registration covers `change` at `target`, walking
    /// the target and its ancestors. Each observer appears once with the
    /// OR of the `old_value` wishes of its matching registrations.
    fn interested(&self, target: NodeId, change: &Change<'_>) -> Vec<(Rc<ObserverCore>, bool)> {
        let mut out: Vec<(Rc<ObserverCore>, bool)> = Vec::new();
        let mut cursor = Some(target);
        let mut at_target = true;
        while let Some(id) = cursor {
            let Some(data) = self.get(id) else { break };
            for registration in &data.observers {
                let Some(core) = registration.observer.upgrade() else {
                    continue;
                };
                let options = &registration.options;
                if !at_target && !options.subtree {
                    continue;
                }
                let wants_old = match change {
                    Change::ChildList => {
                        if !options.child_list {
                            continue;
                        }
                        false
                    }
                    Change::Attribute { name } => {
                        if !options.wants_attribute(name) {
                            continue;
                        }
                        options.attribute_old_value
                    }
                    Change::CharacterData => {
                        if !options.character_data {
                            continue;
                        }
                        options.character_data_old_value
                    }
                };
                match out.iter_mut().find(|(seen, _)| Rc::ptr_eq(seen, &core)) {
                    Some((_, old)) => *old |= wants_old,
                    None => out.push((core, wants_old)),
                }
            }
            cursor = data.parent;
            at_target = false;
        }
        out
    }
}

/// A document tree. Cloning shares the same tree.
pub struct Document {
    inner: Rc<RefCell<DocInner>>,
}

impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// New document with a single live root labelled `"root"`.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = DocInner {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            live: 0,
            delivery_order: Vec::new(),
        };
        inner.root = inner.alloc("root".to_owned(), None);
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// Handle to the root node. The root is always live.
    #[must_use]
    pub fn root(&self) -> NodeRef {
        NodeRef {
            document: self.clone(),
            id: self.inner.borrow().root,
        }
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().live
    }

    /// `true` when only the root is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Whether `node` is a live node of *this* document.
    #[must_use]
    pub fn contains(&self, node: &NodeRef) -> bool {
        Rc::ptr_eq(&self.inner, &node.document.inner) && self.inner.borrow().is_live(node.id)
    }

    /// First node in document order whose `"id"` attribute equals `value`.
    #[must_use]
    pub fn node_by_id(&self, value: &str) -> Option<NodeRef> {
        let inner = self.inner.borrow();
        let mut stack = vec![inner.root];
        while let Some(id) = stack.pop() {
            let Some(data) = inner.get(id) else { continue };
            if data
                .attributes
                .get(ID_ATTRIBUTE)
                .is_some_and(|v| v == value)
            {
                return Some(NodeRef {
                    document: self.clone(),
                    id,
                });
            }
            // Reverse push keeps the pop order equal to document order.
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }

    /// Invoke every observer whose queue is non-empty, in first-registration
    /// order, each with its whole batch. Returns the number of records
    /// delivered.
    ///
    /// Callbacks run outside the document borrow, so they may mutate the
    /// tree or call back into observers; records queued that way wait for
    /// the next pump.
    pub fn deliver_pending(&self) -> usize {
        let observers: Vec<Rc<ObserverCore>> = {
            let mut inner = self.inner.borrow_mut();
            inner.delivery_order.retain(|w| w.strong_count() > 0);
            inner.delivery_order.iter().filter_map(Weak::upgrade).collect()
        };
        let mut delivered = 0;
        for core in observers {
            delivered += core.deliver();
        }
        if delivered > 0 {
            tracing::debug!(records = delivered, "delivered pending mutation records");
        }
        delivered
    }

    pub(crate) fn register(
        &self,
        core: &Rc<ObserverCore>,
        target: NodeId,
        options: ResolvedOptions,
    ) -> Result<(), ObserveError> {
        {
            let mut inner = self.inner.borrow_mut();
            let Some(data) = inner.get_mut(target) else {
                return Err(ObserveError::DeadNode { id: target });
            };
            data.observers.retain(|r| r.observer.strong_count() > 0);
            let existing = data
                .observers
                .iter_mut()
                .find(|r| r.observer.upgrade().is_some_and(|c| Rc::ptr_eq(&c, core)));
            match existing {
                // Re-observe replaces the stored options.
                Some(registration) => registration.options = options,
                None => data.observers.push(Registration {
                    observer: Rc::downgrade(core),
                    options,
                }),
            }
            let ordered = inner
                .delivery_order
                .iter()
                .any(|w| w.upgrade().is_some_and(|c| Rc::ptr_eq(&c, core)));
            if !ordered {
                inner.delivery_order.push(Rc::downgrade(core));
            }
        }
        core.note_registration(Rc::downgrade(&self.inner), target);
        tracing::debug!(node = %target, "observer registered");
        Ok(())
    }

    /// Remove every registration of `core` across the whole tree.
    pub(crate) fn deregister(&self, core: &Rc<ObserverCore>) {
        let mut inner = self.inner.borrow_mut();
        for slot in &mut inner.slots {
            if let Some(data) = slot.data.as_mut() {
                data.observers
                    .retain(|r| r.observer.upgrade().is_some_and(|c| !Rc::ptr_eq(&c, core)));
            }
        }
        inner
            .delivery_order
            .retain(|w| w.upgrade().is_some_and(|c| !Rc::ptr_eq(&c, core)));
        tracing::debug!("observer deregistered");
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<DocInner>>) -> Self {
        Self { inner }
    }

    fn queue_change(
        &self,
        target: NodeId,
        change: &Change<'_>,
        make: impl Fn(bool) -> MutationRecord,
    ) {
        let interested = self.inner.borrow().interested(target, change);
        if interested.is_empty() {
            return;
        }
        tracing::trace!(node = %target, observers = interested.len(), "queueing mutation record");
        for (core, wants_old) in interested {
            core.enqueue(make(wants_old));
        }
    }
}

/// Handle to one node of a [`Document`].
///
/// Holds the document alive; equality is same-document + same-id. A
/// `NodeRef` can outlive its node, in which case [`NodeRef::is_valid`]
/// turns `false` and every operation through it becomes a refused no-op.
#[derive(Clone)]
pub struct NodeRef {
    document: Document,
    id: NodeId,
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.document.inner, &other.document.inner) && self.id == other.id
    }
}

impl Eq for NodeRef {}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.label() {
            Some(label) => write!(f, "NodeRef({} {label:?})", self.id),
            None => write!(f, "NodeRef({} stale)", self.id),
        }
    }
}

impl NodeRef {
    /// The generation-tagged id of this handle.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The document this handle points into.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Whether the handle still resolves to a live node.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.document.inner.borrow().is_live(self.id)
    }

    /// Node label, or `None` for a stale handle.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.document
            .inner
            .borrow()
            .get(self.id)
            .map(|d| d.label.clone())
    }

    /// Attribute value, or `None` when absent or the handle is stale.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.document
            .inner
            .borrow()
            .get(self.id)
            .and_then(|d| d.attributes.get(name).cloned())
    }

    /// Text payload, or `None` when never set or the handle is stale.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.document
            .inner
            .borrow()
            .get(self.id)
            .and_then(|d| d.text.clone())
    }

    /// Parent handle, or `None` for the root and for stale handles.
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef> {
        let parent = self.document.inner.borrow().get(self.id)?.parent?;
        Some(NodeRef {
            document: self.document.clone(),
            id: parent,
        })
    }

    /// Child handles in order. Empty for leaves and stale handles.
    #[must_use]
    pub fn children(&self) -> Vec<NodeRef> {
        let inner = self.document.inner.borrow();
        let Some(data) = inner.get(self.id) else {
            return Vec::new();
        };
        data.children
            .iter()
            .map(|&id| NodeRef {
                document: self.document.clone(),
                id,
            })
            .collect()
    }

    /// Append a new child node. Returns `None` when this handle is stale.
    ///
    /// Queues a child-list record targeting this node.
    pub fn append_child(&self, label: impl Into<String>) -> Option<NodeRef> {
        let id = {
            let mut inner = self.document.inner.borrow_mut();
            if !inner.is_live(self.id) {
                return None;
            }
            let id = inner.alloc(label.into(), Some(self.id));
            if let Some(parent) = inner.get_mut(self.id) {
                parent.children.push(id);
            }
            id
        };
        self.document
            .queue_change(self.id, &Change::ChildList, |_| {
                MutationRecord::child_list(self.id, vec![id], Vec::new())
            });
        Some(NodeRef {
            document: self.document.clone(),
            id,
        })
    }

    /// Remove this node and its whole subtree. Refused (`false`) for the
    /// root and for stale handles.
    ///
    /// Every handle into the removed subtree goes stale. Queues a
    /// child-list record targeting the *parent*, listing this node as
    /// removed.
    pub fn remove(&self) -> bool {
        let parent = {
            let mut inner = self.document.inner.borrow_mut();
            let Some(parent) = inner.get(self.id).and_then(|data| data.parent) else {
                return false;
            };
            if let Some(data) = inner.get_mut(parent) {
                data.children.retain(|&c| c != self.id);
            }
            for id in inner.subtree_ids(self.id) {
                inner.release(id);
            }
            parent
        };
        self.document
            .queue_change(parent, &Change::ChildList, |_| {
                MutationRecord::child_list(parent, Vec::new(), vec![self.id])
            });
        true
    }

    /// Set an attribute. Returns `false` for a stale handle.
    ///
    /// Queues an attribute record even when the new value equals the old
    /// one; observers see writes, not diffs.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        let old = {
            let mut inner = self.document.inner.borrow_mut();
            let Some(data) = inner.get_mut(self.id) else {
                return false;
            };
            data.attributes.insert(name.clone(), value.into())
        };
        self.document
            .queue_change(self.id, &Change::Attribute { name: &name }, |wants_old| {
                MutationRecord::attributes(self.id, &name)
                    .with_old_value(if wants_old { old.clone() } else { None })
            });
        true
    }

    /// Remove an attribute. Returns `false` when the handle is stale or the
    /// attribute was absent; no record is queued for an absent attribute.
    pub fn remove_attribute(&self, name: &str) -> bool {
        let old = {
            let mut inner = self.document.inner.borrow_mut();
            let Some(data) = inner.get_mut(self.id) else {
                return false;
            };
            data.attributes.remove(name)
        };
        let Some(old) = old else { return false };
        self.document
            .queue_change(self.id, &Change::Attribute { name }, |wants_old| {
                MutationRecord::attributes(self.id, name)
                    .with_old_value(wants_old.then(|| old.clone()))
            });
        true
    }

    /// Replace the text payload. Returns `false` for a stale handle.
    pub fn set_text(&self, text: impl Into<String>) -> bool {
        let old = {
            let mut inner = self.document.inner.borrow_mut();
            let Some(data) = inner.get_mut(self.id) else {
                return false;
            };
            data.text.replace(text.into())
        };
        self.document
            .queue_change(self.id, &Change::CharacterData, |wants_old| {
                MutationRecord::character_data(self.id)
                    .with_old_value(if wants_old { old.clone() } else { None })
            });
        true
    }
}
