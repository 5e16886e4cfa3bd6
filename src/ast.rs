use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::Config;
use crate::interpolate::interpolate_value_into;
use crate::token::{Attribute, Location};
use crate::transform::{MaybeDeferred, Transformer};
use crate::value::Value;

/// Ordered attribute mapping of a node.
pub type Attributes = IndexMap<String, Value>;

/// Index of a node in its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of document node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NodeType {
    Document,
    #[default]
    Node,
    Tag,
    Text,
    Error,
    /// Node types contributed by upstream markup parsing.
    Other(String),
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Node => f.write_str("node"),
            Self::Tag => f.write_str("tag"),
            Self::Text => f.write_str("text"),
            Self::Error => f.write_str("error"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Severity of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Problem attached to a node during parsing or validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub id: String,
    pub level: Level,
    pub message: String,
    pub location: Option<Location>,
}

/// Structural misuse of a [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("node {0} does not exist in this tree")]
    UnknownNode(NodeId),
    #[error("node {child} is already attached to {parent}")]
    AlreadyAttached { child: NodeId, parent: NodeId },
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },
}

/// A document node. Structure (children, slots, parent) is managed by
/// the owning [`Tree`]; everything else is freely editable.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: u64,
    pub node_type: NodeType,
    pub tag: Option<String>,
    pub attributes: Attributes,
    children: Vec<NodeId>,
    slots: IndexMap<String, NodeId>,
    parent: Option<NodeId>,
    pub annotations: Vec<Attribute>,
    pub errors: Vec<ValidationError>,
    pub lines: Vec<usize>,
    pub inline: bool,
    pub location: Option<Location>,
}

impl Node {
    /// Diagnostic identity, unique within one tree and its resolved copies.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// `node-N` label for logs and tooling.
    #[must_use]
    pub fn label(&self) -> String {
        format!("node-{}", self.id)
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub const fn slots(&self) -> &IndexMap<String, NodeId> {
        &self.slots
    }

    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Arena owning every node of a document.
///
/// A node has at most one owner, reached through `parent`; the parent
/// link is a lookup relation only.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    next_id: u64,
}

/// Where a copied node goes under its new parent.
enum Attach {
    Child,
    Slot(String),
}

/// A tree together with its root node. The root is always a node of
/// the tree.
#[derive(Debug, Clone)]
pub struct Ast {
    tree: Tree,
    root: NodeId,
}

impl Ast {
    /// Pair `tree` with `root`.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownNode` if `root` is not in `tree`.
    pub fn new(tree: Tree, root: NodeId) -> Result<Self, TreeError> {
        tree.get_node(root)?;
        Ok(Self { tree, root })
    }

    /// View of the root node.
    #[must_use]
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: &self.tree,
            id: self.root,
        }
    }

    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable access to the arena. Nodes are never removed, so the root
    /// stays valid.
    pub const fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    #[must_use]
    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// Resolve the whole document against `config`.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownNode` if `root` is not in `tree`.
    pub fn resolve(&self, config: &Config) -> Result<Self, TreeError> {
        self.tree.resolve(self.root, config)
    }
}

impl Tree {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            next_id: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a node owning `children`. Slots start empty.
    ///
    /// # Errors
    ///
    /// Fails without modifying the tree if a child is unknown, already
    /// owned, or listed twice.
    pub fn construct(
        &mut self,
        node_type: NodeType,
        attributes: Attributes,
        children: Vec<NodeId>,
        tag: Option<String>,
    ) -> Result<NodeId, TreeError> {
        let id = NodeId(self.nodes.len());
        let mut seen = HashSet::with_capacity(children.len());
        for &child in &children {
            let owner = self.get_node(child)?.parent;
            if let Some(parent) = owner {
                return Err(TreeError::AlreadyAttached { child, parent });
            }
            if !seen.insert(child) {
                return Err(TreeError::AlreadyAttached { child, parent: id });
            }
        }

        for &child in &children {
            self.nodes[child.0].parent = Some(id);
        }
        let uid = self.allocate_id();
        self.nodes.push(Node {
            id: uid,
            node_type,
            tag,
            attributes,
            children,
            slots: IndexMap::new(),
            parent: None,
            annotations: Vec::new(),
            errors: Vec::new(),
            lines: Vec::new(),
            inline: false,
            location: None,
        });
        Ok(id)
    }

    /// Append `child` to the children of `parent`.
    ///
    /// # Errors
    ///
    /// Fails if either node is unknown, `child` already has an owner, or
    /// `child` is `parent` or one of its ancestors.
    pub fn push(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check_attach(parent, child)?;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Place `child` in the slot `name` of `parent`. A node previously in
    /// that slot is detached.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Tree::push`].
    pub fn set_slot(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.check_attach(parent, child)?;
        self.nodes[child.0].parent = Some(parent);
        if let Some(previous) = self.nodes[parent.0].slots.insert(name.into(), child) {
            self.nodes[previous.0].parent = None;
        }
        Ok(())
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Read-only view of `id` that can navigate the tree.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.nodes.get(id.0).map(|_| NodeRef { tree: self, id })
    }

    /// Depth-first pre-order walk of the descendants of `id`: slots in
    /// insertion order, then children. `id` itself is not yielded.
    #[must_use]
    pub fn traverse(&self, id: NodeId) -> Traverse<'_> {
        let mut walk = Traverse {
            tree: self,
            stack: Vec::new(),
        };
        if let Some(node) = self.node(id) {
            walk.push_children(node);
        }
        walk
    }

    /// Copy the subtree at `root` into a new tree with every attribute
    /// interpolated against `config`'s variables. `self` is untouched.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownNode` if `root` is not in this tree.
    pub fn resolve(&self, root: NodeId, config: &Config) -> Result<Ast, TreeError> {
        self.get_node(root)?;
        Ok(self.resolve_node(root, config))
    }

    #[tracing::instrument(level = "debug", skip(self, config), fields(nodes = self.nodes.len()))]
    fn resolve_node(&self, root: NodeId, config: &Config) -> Ast {
        let mut tree = Self {
            nodes: Vec::new(),
            next_id: self.next_id,
        };
        let mut unresolved = Vec::new();
        let root = tree.copy_resolved(self, root, config, &mut unresolved);
        if !unresolved.is_empty() {
            debug!(?unresolved, "unresolved variables left in place");
        }
        Ast { tree, root }
    }

    /// Copy the subtree at `root` of `source` into `self`, pre-order,
    /// with an explicit work stack so nesting depth is unbounded.
    fn copy_resolved(
        &mut self,
        source: &Self,
        root: NodeId,
        config: &Config,
        unresolved: &mut Vec<String>,
    ) -> NodeId {
        let mut stack = vec![(root, None, Attach::Child)];
        let new_root = NodeId(self.nodes.len());

        while let Some((id, parent, attach)) = stack.pop() {
            let node = &source.nodes[id.0];
            let new_id = NodeId(self.nodes.len());
            let attributes = node
                .attributes
                .iter()
                .map(|(name, value)| {
                    let value = interpolate_value_into(value, config.bindings(), unresolved);
                    (name.clone(), value.into_owned())
                })
                .collect();

            self.nodes.push(Node {
                id: node.id,
                node_type: node.node_type.clone(),
                tag: node.tag.clone(),
                attributes,
                children: Vec::new(),
                slots: IndexMap::new(),
                parent,
                annotations: node.annotations.clone(),
                errors: node.errors.clone(),
                lines: node.lines.clone(),
                inline: node.inline,
                location: node.location,
            });

            match (parent, attach) {
                (Some(parent), Attach::Slot(name)) => {
                    self.nodes[parent.0].slots.insert(name, new_id);
                }
                (Some(parent), Attach::Child) => self.nodes[parent.0].children.push(new_id),
                (None, _) => {}
            }

            // Reversed so slots, then children, come off the stack in order.
            let start = stack.len();
            for (name, &slot) in &node.slots {
                stack.push((slot, Some(new_id), Attach::Slot(name.clone())));
            }
            for &child in &node.children {
                stack.push((child, Some(new_id), Attach::Child));
            }
            stack[start..].reverse();
        }

        new_root
    }

    const fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn get_node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(id.0).ok_or(TreeError::UnknownNode(id))
    }

    fn check_attach(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.get_node(parent)?;
        if let Some(owner) = self.get_node(child)?.parent {
            return Err(TreeError::AlreadyAttached {
                child,
                parent: owner,
            });
        }
        let leaf = &self.nodes[child.0];
        if leaf.children.is_empty() && leaf.slots.is_empty() && parent != child {
            return Ok(());
        }
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(TreeError::Cycle { child, parent });
            }
            ancestor = self.nodes[id.0].parent;
        }
        Ok(())
    }
}

/// Borrowed view of one node inside its tree.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub const fn tree(&self) -> &'a Tree {
        self.tree
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.parent.map(|id| Self {
            tree: self.tree,
            id,
        })
    }

    pub fn children(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        tree.nodes[self.id.0]
            .children
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }

    #[must_use]
    pub fn slot(&self, name: &str) -> Option<Self> {
        self.slots.get(name).map(|&id| Self {
            tree: self.tree,
            id,
        })
    }

    /// Descendants in pre-order. Restartable: every call walks afresh.
    #[must_use]
    pub fn walk(&self) -> Traverse<'a> {
        self.tree.traverse(self.id)
    }

    /// Schema lookup, delegated to `transformer`.
    pub fn find_schema<T: Transformer + ?Sized>(
        self,
        transformer: &T,
        config: &Config,
    ) -> Option<T::Schema> {
        transformer.find_schema(self, config)
    }

    /// Attribute transform, delegated to `transformer`.
    pub fn transform_attributes<T: Transformer + ?Sized>(
        self,
        transformer: &T,
        config: &Config,
    ) -> Attributes {
        transformer.attributes(self, config)
    }

    /// Children transform, delegated to `transformer`.
    pub fn transform_children<T: Transformer + ?Sized>(
        self,
        transformer: &T,
        config: &Config,
    ) -> Vec<T::Renderable> {
        transformer.children(self, config)
    }

    /// Full transform, delegated to `transformer`. May be deferred.
    pub fn transform<T: Transformer + ?Sized>(
        self,
        transformer: &T,
        config: &Config,
    ) -> MaybeDeferred<T::Renderable, T::Handle> {
        transformer.node(self, config)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("node", &**self)
            .finish()
    }
}

impl Deref for NodeRef<'_> {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.tree.nodes[self.id.0]
    }
}

/// Pre-order iterator returned by [`Tree::traverse`].
#[derive(Debug, Clone)]
pub struct Traverse<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Traverse<'_> {
    fn push_children(&mut self, node: &Node) {
        let start = self.stack.len();
        self.stack.extend(node.slots.values().copied());
        self.stack.extend(node.children.iter().copied());
        self.stack[start..].reverse();
    }
}

impl<'a> Iterator for Traverse<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let tree = self.tree;
        self.push_children(&tree.nodes[id.0]);
        Some(NodeRef { tree, id })
    }
}
