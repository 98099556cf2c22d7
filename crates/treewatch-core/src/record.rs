#![forbid(unsafe_code)]

//! Mutation record vocabulary.
//!
//! A [`MutationRecord`] describes one detected change to a document tree.
//! Records are produced only by the change-notification subsystem
//! ([`crate::observer::TreeObserver`]) and flow to callers two ways: batched
//! into the observer callback at delivery time, or drained explicitly via
//! `take_records`. Wrappers pass them through verbatim.
//!
//! Record targets are [`NodeId`]s rather than live handles: a record may
//! outlive the node it describes (removal frees the node's arena slot), and
//! the id stays printable and comparable even when it no longer resolves.

use serde::{Deserialize, Serialize};

use crate::document::NodeId;

/// Which kind of change a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// A child was added to or removed from the target node.
    ChildList,
    /// An attribute of the target node was set or removed.
    Attributes,
    /// The target node's text payload changed.
    CharacterData,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChildList => f.write_str("child_list"),
            Self::Attributes => f.write_str("attributes"),
            Self::CharacterData => f.write_str("character_data"),
        }
    }
}

/// One detected change, as reported to observer callbacks.
///
/// Field population depends on [`kind`](Self::kind):
///
/// | kind | `added`/`removed` | `attribute_name` | `old_value` |
/// |------|-------------------|------------------|-------------|
/// | `ChildList` | the changed children | `None` | `None` |
/// | `Attributes` | empty | the attribute | previous value, if requested |
/// | `CharacterData` | empty | `None` | previous text, if requested |
///
/// `old_value` is attached per registration: an observer only sees it when
/// its options asked for it (`attribute_old_value` /
/// `character_data_old_value`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// What changed.
    pub kind: MutationKind,
    /// The node the change happened on (for child-list changes, the parent).
    pub target: NodeId,
    /// Children added by this change.
    pub added: Vec<NodeId>,
    /// Children removed by this change.
    pub removed: Vec<NodeId>,
    /// For attribute changes, the attribute's name.
    pub attribute_name: Option<String>,
    /// Previous attribute value or text payload, when the registration
    /// requested old values. `None` also when there was no previous value.
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub(crate) fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
            attribute_name: None,
            old_value: None,
        }
    }

    pub(crate) fn attributes(target: NodeId, name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: Some(name.into()),
            old_value: None,
        }
    }

    pub(crate) fn character_data(target: NodeId) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: None,
            old_value: None,
        }
    }

    pub(crate) fn with_old_value(mut self, old: Option<String>) -> Self {
        self.old_value = old;
        self
    }
}
