use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::ast::{Attributes, NodeRef};
use crate::config::Config;
use crate::token::Location;

/// Result of a transform that may finish later.
///
/// The core never waits on `Pending`; combining deferred results across
/// subtrees is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeDeferred<T, H> {
    Ready(T),
    Pending(H),
}

impl<T, H> MaybeDeferred<T, H> {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The value, if it is already available.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending(_) => None,
        }
    }

    /// Map the ready value, leaving a pending handle untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MaybeDeferred<U, H> {
        match self {
            Self::Ready(value) => MaybeDeferred::Ready(f(value)),
            Self::Pending(handle) => MaybeDeferred::Pending(handle),
        }
    }
}

/// Schema lookup and rendering, supplied by the caller.
///
/// Nodes never validate or render themselves; the pass-through methods
/// on [`NodeRef`] forward here unchanged.
pub trait Transformer {
    type Schema;
    type Renderable;
    /// Handle for a transform that has not completed yet.
    type Handle;

    fn find_schema(&self, node: NodeRef<'_>, config: &Config) -> Option<Self::Schema>;

    fn attributes(&self, node: NodeRef<'_>, config: &Config) -> Attributes;

    fn children(&self, node: NodeRef<'_>, config: &Config) -> Vec<Self::Renderable>;

    fn node(
        &self,
        node: NodeRef<'_>,
        config: &Config,
    ) -> MaybeDeferred<Self::Renderable, Self::Handle>;
}

static NEXT_TAG: AtomicU64 = AtomicU64::new(0);

/// Rendered element produced by a [`Transformer`].
///
/// Every tag gets a process-wide `tag-N` id on creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<RenderableNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<usize>>,
    id: String,
}

impl Tag {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        attributes: Attributes,
        children: Vec<RenderableNode>,
    ) -> Self {
        let n = NEXT_TAG.fetch_add(1, Ordering::Relaxed);
        Self {
            name: name.into(),
            attributes,
            children,
            location: None,
            lines: None,
            id: format!("tag-{n}"),
        }
    }

    /// Tag carrying the source position of `node`.
    #[must_use]
    pub fn from_node(
        name: impl Into<String>,
        node: NodeRef<'_>,
        attributes: Attributes,
        children: Vec<RenderableNode>,
    ) -> Self {
        let mut tag = Self::new(name, attributes, children);
        tag.location = node.location;
        tag.lines = (!node.lines.is_empty()).then(|| node.lines.clone());
        tag
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new("div", Attributes::new(), Vec::new())
    }
}

/// A node of rendered output: text or a [`Tag`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderableNode {
    Text(String),
    Tag(Tag),
}

impl RenderableNode {
    #[must_use]
    pub const fn is_tag(&self) -> bool {
        matches!(self, Self::Tag(_))
    }

    #[must_use]
    pub const fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag(tag) => Some(tag),
            Self::Text(_) => None,
        }
    }
}

impl From<Tag> for RenderableNode {
    fn from(tag: Tag) -> Self {
        Self::Tag(tag)
    }
}

impl From<String> for RenderableNode {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
