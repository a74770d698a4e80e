//! Node storage shared by the event and command trees.
//!
//! Both trees are arenas: a single growable table of nodes indexed by
//! [`NodeId`]. Parent/child relationships are index links rather than
//! pointers, so composition never fights the borrow checker and a detach or
//! reload path can be added later without lifetime surgery.
//!
//! A node is either a registry (a composite aggregating bindings for its
//! subtree) or a leaf (a terminal dispatch unit with a concrete handler),
//! expressed as the tagged [`NodeKind`] over one shared [`NodeAttrs`] struct.
//!
//! # Attribute inheritance
//!
//! Attaching a subtree with `inherit = true` copies the parent's attributes
//! onto the attached root once, at attach time. There is no live link: a
//! later change to the parent does not propagate to already-attached
//! children.

use std::collections::BTreeSet;

use crate::error::{DispatchError, DispatchResult};

/// Index of a node in its arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Get the raw index value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Attributes shared by every node, registry and leaf alike.
#[derive(Clone, Debug)]
pub struct NodeAttrs {
    /// Human-readable node name; signatures join these with dots.
    pub name: String,
    /// Disabled nodes never fire; a disabled registry suppresses its subtree.
    pub enabled: bool,
    /// Persistent leaves keep firing after a terminal leaf has fired.
    pub persistent: bool,
    /// A terminal leaf halts further non-persistent leaves for one fire call.
    pub terminal: bool,
    /// Higher priority fires first. Ties preserve insertion order.
    pub priority: i32,
    /// Ids this node is scoped to. Empty means global.
    pub target_ids: BTreeSet<u64>,
}

impl NodeAttrs {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            persistent: false,
            terminal: false,
            priority: 0,
            target_ids: BTreeSet::new(),
        }
    }

    /// Whether this node applies to every firing context.
    ///
    /// Derived from the id set, so `is_global() == target_ids.is_empty()`
    /// holds after every mutation.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.target_ids.is_empty()
    }

    /// One-time attribute copy from `parent`. The name is not inherited.
    pub(crate) fn inherit_from(&mut self, parent: &NodeAttrs) {
        self.enabled = parent.enabled;
        self.persistent = parent.persistent;
        self.terminal = parent.terminal;
        self.priority = parent.priority;
        self.target_ids = parent.target_ids.clone();
    }
}

/// Attribute overrides supplied when creating a registry or binding a leaf.
///
/// `target_id` and `target_ids` are mutually exclusive; supplying both fails
/// with [`DispatchError::InvalidAttribute`] when the spec is applied.
#[derive(Clone, Debug, Default)]
pub struct AttrSpec {
    /// Explicit node name; leaves fall back to their handler's name.
    pub name: Option<String>,
    /// Override for [`NodeAttrs::enabled`].
    pub enabled: Option<bool>,
    /// Override for [`NodeAttrs::persistent`].
    pub persistent: Option<bool>,
    /// Override for [`NodeAttrs::terminal`].
    pub terminal: Option<bool>,
    /// Override for [`NodeAttrs::priority`].
    pub priority: Option<i32>,
    /// Scope to a single target id.
    pub target_id: Option<u64>,
    /// Scope to a collection of target ids.
    pub target_ids: Option<Vec<u64>>,
    /// Human-readable description; only meaningful for command leaves.
    pub description: Option<String>,
}

impl AttrSpec {
    /// An empty spec: every attribute keeps its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set the persistent flag.
    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }

    /// Set the terminal flag.
    #[must_use]
    pub fn terminal(mut self, terminal: bool) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Scope to one target id. Exclusive with [`AttrSpec::target_ids`].
    #[must_use]
    pub fn target_id(mut self, id: u64) -> Self {
        self.target_id = Some(id);
        self
    }

    /// Scope to a set of target ids. Exclusive with [`AttrSpec::target_id`].
    #[must_use]
    pub fn target_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.target_ids = Some(ids.into_iter().collect());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Resolve the target-id inputs into one set, `None` when neither input
    /// was supplied.
    pub(crate) fn resolve_targets(&self) -> DispatchResult<Option<BTreeSet<u64>>> {
        match (self.target_id, &self.target_ids) {
            (Some(_), Some(_)) => Err(DispatchError::InvalidAttribute(
                "cannot supply both `target_id` and `target_ids`".to_string(),
            )),
            (Some(id), None) => Ok(Some(BTreeSet::from([id]))),
            (None, Some(ids)) => Ok(Some(ids.iter().copied().collect())),
            (None, None) => Ok(None),
        }
    }

    /// Overlay the supplied attributes onto `attrs`; unset fields keep the
    /// values already there (defaults or a bind-time inheritance copy).
    pub(crate) fn apply(&self, attrs: &mut NodeAttrs) -> DispatchResult<()> {
        if let Some(name) = &self.name {
            attrs.name = name.clone();
        }
        if let Some(enabled) = self.enabled {
            attrs.enabled = enabled;
        }
        if let Some(persistent) = self.persistent {
            attrs.persistent = persistent;
        }
        if let Some(terminal) = self.terminal {
            attrs.terminal = terminal;
        }
        if let Some(priority) = self.priority {
            attrs.priority = priority;
        }
        if let Some(target_ids) = self.resolve_targets()? {
            attrs.target_ids = target_ids;
        }
        Ok(())
    }

    /// Build node attributes from this spec on top of the defaults,
    /// optionally seeded with an inheritance copy from `inherit_from`.
    pub(crate) fn build_attrs(
        &self,
        fallback_name: &str,
        inherit_from: Option<&NodeAttrs>,
    ) -> DispatchResult<NodeAttrs> {
        let mut attrs = NodeAttrs::named(fallback_name);
        if let Some(parent) = inherit_from {
            attrs.inherit_from(parent);
        }
        self.apply(&mut attrs)?;
        Ok(attrs)
    }
}

/// A node is either a composite registry or a terminal leaf.
#[derive(Debug)]
pub(crate) enum NodeKind<R, L> {
    Registry(R),
    Leaf(L),
}

#[derive(Debug)]
pub(crate) struct Node<R, L> {
    pub attrs: NodeAttrs,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind<R, L>,
}

/// Arena of nodes. `R` is the registry payload, `L` the leaf payload.
#[derive(Debug, Default)]
pub(crate) struct Arena<R, L> {
    nodes: Vec<Node<R, L>>,
}

impl<R, L> Arena<R, L> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a node, linking it under `parent` when given.
    pub fn push(
        &mut self,
        attrs: NodeAttrs,
        parent: Option<NodeId>,
        kind: NodeKind<R, L>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            attrs,
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0 as usize].children.push(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node<R, L> {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<R, L> {
        &mut self.nodes[id.0 as usize]
    }

    /// Dotted path from the root, derived from parent links at query time.
    pub fn signature(&self, id: NodeId) -> String {
        let mut parts = vec![self.node(id).attrs.name.clone()];
        let mut cursor = self.node(id).parent;
        while let Some(up) = cursor {
            parts.push(self.node(up).attrs.name.clone());
            cursor = self.node(up).parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Link `child` under `parent`. Fails if `child` already has a parent.
    pub fn link(&mut self, child: NodeId, parent: NodeId) -> DispatchResult<()> {
        if self.node(child).parent.is_some() {
            return Err(DispatchError::AlreadyAttached(self.signature(child)));
        }
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
        Ok(())
    }

    /// One-time attribute copy from `parent` onto `child`.
    pub fn inherit(&mut self, child: NodeId, parent: NodeId) {
        let parent_attrs = self.node(parent).attrs.clone();
        self.node_mut(child).attrs.inherit_from(&parent_attrs);
    }

    /// Every leaf owned transitively by the subtree rooted at `id`,
    /// in depth-first registration order.
    pub fn subtree_leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            match node.kind {
                NodeKind::Leaf(_) => leaves.push(current),
                NodeKind::Registry(_) => {
                    // Reverse so the stack pops children in insertion order.
                    stack.extend(node.children.iter().rev().copied());
                }
            }
        }
        leaves
    }

    /// Whether every node from `id` up to and including `top` is enabled.
    pub fn chain_enabled(&self, id: NodeId, top: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !self.node(current).attrs.enabled {
                return false;
            }
            if current == top {
                break;
            }
            cursor = self.node(current).parent;
        }
        true
    }

    /// Replace the target-id set. `is_global` stays derived.
    pub fn set_target_ids(&mut self, id: NodeId, ids: impl IntoIterator<Item = u64>) {
        self.node_mut(id).attrs.target_ids = ids.into_iter().collect();
    }

    /// Add target ids to the set.
    pub fn add_target_ids(&mut self, id: NodeId, ids: impl IntoIterator<Item = u64>) {
        self.node_mut(id).attrs.target_ids.extend(ids);
    }

    /// Remove target ids from the set.
    pub fn remove_target_ids(&mut self, id: NodeId, ids: impl IntoIterator<Item = u64>) {
        for target in ids {
            self.node_mut(id).attrs.target_ids.remove(&target);
        }
    }

    /// Indented dump of the subtree rooted at `id`, for debugging.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, 0, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let marker = match node.kind {
            NodeKind::Registry(_) => "",
            NodeKind::Leaf(_) => "@ ",
        };
        out.push_str(&"    ".repeat(depth));
        out.push_str(marker);
        out.push_str(&self.signature(id));
        out.push('\n');
        for &child in &node.children {
            self.render_into(child, depth + 1, out);
        }
    }
}
