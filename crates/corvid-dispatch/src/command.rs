//! The command tree: global bindings with per-target overrides.
//!
//! Commands resolve to exactly one leaf per fire. A binding with target ids
//! only applies to contexts matching one of them; a binding with none is
//! global. At fire time an override for the context's target id takes
//! precedence over the global binding for the same name.
//!
//! Globals are last-write-wins by convention (a global command is expected
//! to be singular). Two *different* leaves claiming the same name for the
//! same target id is a conflict and fails fast at registration time, so a
//! bad configuration aborts startup instead of surfacing mid-conversation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::context::{FireContext, Payload};
use crate::error::{DispatchError, DispatchResult};
use crate::node::{Arena, AttrSpec, NodeAttrs, NodeId, NodeKind};

const DEFAULT_DESCRIPTION: &str = "(no description)";

/// An async command handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handler name, used as the leaf's node name when no explicit name was
    /// supplied at bind time.
    fn name(&self) -> &str {
        ""
    }

    /// Invoked when the command resolves to this leaf.
    async fn handle(&self, ctx: &FireContext, payload: &Payload) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`CommandHandler`].
pub struct FnCommandHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F>
where
    F: Fn(FireContext, Payload) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &FireContext, payload: &Payload) -> anyhow::Result<()> {
        (self.func)(ctx.clone(), payload.clone()).await
    }
}

/// Wrap an async closure as a named command handler.
pub fn command_handler_fn<F, Fut>(name: impl Into<String>, func: F) -> FnCommandHandler<F>
where
    F: Fn(FireContext, Payload) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    FnCommandHandler {
        name: name.into(),
        func,
    }
}

/// Registry payload: the global/override split.
#[derive(Debug, Default)]
struct CommandMaps {
    global: HashMap<String, NodeId>,
    overrides: HashMap<String, HashMap<u64, NodeId>>,
}

/// Leaf payload: the bound command name, description, and handler.
struct CommandLeaf {
    command_name: Option<String>,
    description: String,
    handler: Option<Arc<dyn CommandHandler>>,
}

impl std::fmt::Debug for CommandLeaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLeaf")
            .field("command_name", &self.command_name)
            .field("description", &self.description)
            .field("attached", &self.handler.is_some())
            .finish()
    }
}

/// Hierarchical registry of command handlers.
///
/// Mirrors [`crate::EventTree`] but keyed by command name, with the
/// global/override split instead of sorted leaf lists. There is no closed
/// name set; any name may be bound.
pub struct CommandTree {
    arena: Arena<CommandMaps, CommandLeaf>,
    root: NodeId,
    silenced: Mutex<HashSet<(NodeId, String)>>,
}

/// Handle returned by [`CommandTree::bind`]; supplying the handler finalizes
/// the binding and registers the leaf through the parent chain.
#[derive(Debug)]
pub struct CommandBinding<'t> {
    tree: &'t mut CommandTree,
    leaf: NodeId,
}

impl CommandBinding<'_> {
    /// Id of the leaf this binding will finalize.
    #[must_use]
    pub fn leaf_id(&self) -> NodeId {
        self.leaf
    }

    /// Attach the handler, completing the binding.
    ///
    /// The leaf needs a resolvable node name: the spec's name, else the
    /// handler's. Fails with [`DispatchError::UnnamedBinding`] when neither
    /// was supplied.
    pub fn attach<H: CommandHandler + 'static>(self, handler: H) -> DispatchResult<NodeId> {
        let handler: Arc<dyn CommandHandler> = Arc::new(handler);
        let handler_name = handler.name().to_string();
        {
            let signature = self.tree.arena.signature(self.leaf);
            let node = self.tree.arena.node_mut(self.leaf);
            let NodeKind::Leaf(leaf) = &mut node.kind else {
                return Err(DispatchError::InvalidAttribute(
                    "binding handle does not point at a leaf".to_string(),
                ));
            };
            if leaf.handler.is_some() {
                return Err(DispatchError::AlreadyBound {
                    name: leaf.command_name.clone().unwrap_or_default(),
                    signature,
                });
            }
            if node.attrs.name.is_empty() {
                if handler_name.is_empty() {
                    return Err(DispatchError::UnnamedBinding(signature));
                }
                node.attrs.name = handler_name;
            }
            leaf.handler = Some(handler);
        }
        self.tree.register_leaf(self.leaf, true)?;
        Ok(self.leaf)
    }
}

impl CommandTree {
    /// Create a tree with a root registry.
    pub fn new(name: impl Into<String>) -> Self {
        let mut arena = Arena::new();
        let root = arena.push(
            NodeAttrs::named(name),
            None,
            NodeKind::Registry(CommandMaps::default()),
        );
        Self {
            arena,
            root,
            silenced: Mutex::new(HashSet::new()),
        }
    }

    /// The synthetic root registry.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a registry node, optionally under a parent. Creation under a
    /// parent inherits the parent's attributes with the spec overriding.
    pub fn registry(&mut self, parent: Option<NodeId>, spec: AttrSpec) -> DispatchResult<NodeId> {
        let inherited = parent.map(|id| self.arena.node(id).attrs.clone());
        let attrs = spec.build_attrs("registry", inherited.as_ref())?;
        Ok(self.arena.push(
            attrs,
            parent,
            NodeKind::Registry(CommandMaps::default()),
        ))
    }

    /// Bind a new leaf under `registry` to `command_name`.
    ///
    /// The leaf inherits the registry's attributes (one-time copy), with the
    /// spec's values overriding.
    pub fn bind(
        &mut self,
        registry: NodeId,
        command_name: &str,
        spec: AttrSpec,
    ) -> DispatchResult<CommandBinding<'_>> {
        let description = spec
            .description
            .clone()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        let inherited = self.arena.node(registry).attrs.clone();
        let attrs = spec.build_attrs("", Some(&inherited))?;
        let leaf = self.arena.push(
            attrs,
            Some(registry),
            NodeKind::Leaf(CommandLeaf {
                command_name: Some(command_name.to_string()),
                description,
                handler: None,
            }),
        );
        Ok(CommandBinding { tree: self, leaf })
    }

    /// Register a bound leaf into the global/override maps of its parent
    /// registry and, if `recursive`, every registry above it.
    ///
    /// Re-registering the identical leaf is a no-op; a *different* leaf under
    /// an already-claimed (name, target id) pair fails with
    /// [`DispatchError::CommandConflict`].
    pub fn register_leaf(&mut self, leaf: NodeId, recursive: bool) -> DispatchResult<()> {
        let (command_name, target_ids, incoming_signature) = {
            let node = self.arena.node(leaf);
            let NodeKind::Leaf(payload) = &node.kind else {
                return Err(DispatchError::InvalidAttribute(format!(
                    "`{}` is not a leaf",
                    self.arena.signature(leaf)
                )));
            };
            let Some(name) = payload.command_name.clone() else {
                return Err(DispatchError::UnnamedBinding(self.arena.signature(leaf)));
            };
            (
                name,
                node.attrs.target_ids.clone(),
                self.arena.signature(leaf),
            )
        };
        let global = target_ids.is_empty();

        let mut cursor = self.arena.node(leaf).parent;
        while let Some(registry) = cursor {
            let next = self.arena.node(registry).parent;
            if let NodeKind::Registry(maps) = &self.arena.node(registry).kind {
                // Conflict scan before any mutation, so a failed registration
                // leaves the registry untouched.
                if let Some(existing_by_target) = maps.overrides.get(&command_name) {
                    for target_id in &target_ids {
                        if let Some(&existing) = existing_by_target.get(target_id) {
                            if existing != leaf {
                                return Err(DispatchError::CommandConflict {
                                    name: command_name,
                                    target_id: *target_id,
                                    existing: self.arena.signature(existing),
                                    incoming: incoming_signature,
                                });
                            }
                        }
                    }
                }
            }
            if let NodeKind::Registry(maps) = &mut self.arena.node_mut(registry).kind {
                if global {
                    // Last write wins; a global is singular by convention.
                    maps.global.insert(command_name.clone(), leaf);
                } else {
                    let by_target = maps.overrides.entry(command_name.clone()).or_default();
                    for target_id in &target_ids {
                        by_target.insert(*target_id, leaf);
                    }
                }
            }
            if !recursive {
                break;
            }
            cursor = next;
        }
        Ok(())
    }

    /// Attach `child_root` under `parent`, optionally inheriting attributes,
    /// then re-register the subtree's bound leaves up the chain.
    pub fn attach(&mut self, child_root: NodeId, parent: NodeId, inherit: bool) -> DispatchResult<()> {
        self.arena.link(child_root, parent)?;
        if inherit {
            self.arena.inherit(child_root, parent);
        }
        for leaf in self.arena.subtree_leaves(child_root) {
            let bound = match &self.arena.node(leaf).kind {
                NodeKind::Leaf(payload) => payload.handler.is_some(),
                NodeKind::Registry(_) => false,
            };
            if bound {
                self.register_leaf(leaf, true)?;
            }
        }
        Ok(())
    }

    /// Attach `child_root` under `parent`; mirror of [`CommandTree::attach`]
    /// phrased from the parent's side.
    pub fn adopt(&mut self, parent: NodeId, child_root: NodeId, inherit: bool) -> DispatchResult<()> {
        self.attach(child_root, parent, inherit)
    }

    /// Whether `registry` can resolve `command_name` globally or through any
    /// override.
    #[must_use]
    pub fn has(&self, registry: NodeId, command_name: &str) -> bool {
        self.has_global(registry, command_name) || self.has_override(registry, command_name, None)
    }

    /// Whether `registry` has a global binding for `command_name`.
    #[must_use]
    pub fn has_global(&self, registry: NodeId, command_name: &str) -> bool {
        match &self.arena.node(registry).kind {
            NodeKind::Registry(maps) => maps.global.contains_key(command_name),
            NodeKind::Leaf(_) => false,
        }
    }

    /// Whether `registry` has an override for `command_name`, for the given
    /// target id or for any id when `target_id` is `None`.
    #[must_use]
    pub fn has_override(
        &self,
        registry: NodeId,
        command_name: &str,
        target_id: Option<u64>,
    ) -> bool {
        let NodeKind::Registry(maps) = &self.arena.node(registry).kind else {
            return false;
        };
        match (maps.overrides.get(command_name), target_id) {
            (Some(by_target), Some(id)) => by_target.contains_key(&id),
            (Some(by_target), None) => !by_target.is_empty(),
            (None, _) => false,
        }
    }

    /// Fire `command_name` on `registry`.
    ///
    /// Resolution: an override for the context's target id wins over the
    /// global binding. A name resolving to neither fails once with
    /// [`DispatchError::UnboundCommand`], then is silenced for this registry.
    pub async fn fire(
        &self,
        registry: NodeId,
        command_name: &str,
        ctx: &FireContext,
        payload: &Payload,
    ) -> DispatchResult<()> {
        let NodeKind::Registry(maps) = &self.arena.node(registry).kind else {
            return Err(DispatchError::InvalidAttribute(format!(
                "`{}` is not a registry",
                self.arena.signature(registry)
            )));
        };
        let resolved = ctx
            .target_id
            .and_then(|target| {
                maps.overrides
                    .get(command_name)
                    .and_then(|by_target| by_target.get(&target))
                    .copied()
            })
            .or_else(|| maps.global.get(command_name).copied());
        let Some(leaf_id) = resolved else {
            let first = {
                let mut silenced = self
                    .silenced
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                silenced.insert((registry, command_name.to_string()))
            };
            if first {
                return Err(DispatchError::UnboundCommand {
                    name: command_name.to_string(),
                    signature: self.arena.signature(registry),
                });
            }
            tracing::trace!(command = command_name, "silenced command fired, skipping");
            return Ok(());
        };

        let node = self.arena.node(leaf_id);
        let NodeKind::Leaf(leaf) = &node.kind else {
            return Ok(());
        };
        if !node.attrs.enabled || !self.arena.chain_enabled(leaf_id, registry) {
            tracing::debug!(
                command = command_name,
                leaf = %self.arena.signature(leaf_id),
                "command leaf disabled, skipping"
            );
            return Ok(());
        }
        let Some(handler) = &leaf.handler else {
            tracing::debug!(
                leaf = %self.arena.signature(leaf_id),
                "leaf registered without handler, skipping"
            );
            return Ok(());
        };
        tracing::debug!(
            command = command_name,
            leaf = %self.arena.signature(leaf_id),
            "dispatching command leaf"
        );
        handler
            .handle(ctx, payload)
            .await
            .map_err(|source| DispatchError::Handler {
                signature: self.arena.signature(leaf_id),
                source,
            })
    }

    /// Every command leaf visible from `registry`: the union of globals and
    /// overrides, without duplicates, in a deterministic order.
    #[must_use]
    pub fn commands(&self, registry: NodeId) -> Vec<NodeId> {
        let NodeKind::Registry(maps) = &self.arena.node(registry).kind else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut global_names: Vec<&String> = maps.global.keys().collect();
        global_names.sort();
        for name in global_names {
            let id = maps.global[name];
            if seen.insert(id) {
                result.push(id);
            }
        }
        let mut override_names: Vec<&String> = maps.overrides.keys().collect();
        override_names.sort();
        for name in override_names {
            let by_target = &maps.overrides[name];
            let mut targets: Vec<&u64> = by_target.keys().collect();
            targets.sort();
            for target in targets {
                let id = by_target[target];
                if seen.insert(id) {
                    result.push(id);
                }
            }
        }
        result
    }

    /// The bound command name of a leaf, if any.
    #[must_use]
    pub fn command_name(&self, leaf: NodeId) -> Option<&str> {
        match &self.arena.node(leaf).kind {
            NodeKind::Leaf(payload) => payload.command_name.as_deref(),
            NodeKind::Registry(_) => None,
        }
    }

    /// The description of a command leaf.
    #[must_use]
    pub fn description(&self, leaf: NodeId) -> Option<&str> {
        match &self.arena.node(leaf).kind {
            NodeKind::Leaf(payload) => Some(payload.description.as_str()),
            NodeKind::Registry(_) => None,
        }
    }

    /// Dotted path of `node` from the root.
    #[must_use]
    pub fn signature(&self, node: NodeId) -> String {
        self.arena.signature(node)
    }

    /// Indented signature dump of the subtree at `node`, for debugging.
    #[must_use]
    pub fn render(&self, node: NodeId) -> String {
        self.arena.render(node)
    }

    /// Attributes of `node`.
    #[must_use]
    pub fn attrs(&self, node: NodeId) -> &NodeAttrs {
        &self.arena.node(node).attrs
    }

    /// Mutable attributes of `node`. Structural maps are only safe to mutate
    /// during the startup load phase.
    pub fn attrs_mut(&mut self, node: NodeId) -> &mut NodeAttrs {
        &mut self.arena.node_mut(node).attrs
    }

    /// Replace a node's target-id set.
    pub fn set_target_ids(&mut self, node: NodeId, ids: impl IntoIterator<Item = u64>) {
        self.arena.set_target_ids(node, ids);
    }

    /// Add to a node's target-id set.
    pub fn add_target_ids(&mut self, node: NodeId, ids: impl IntoIterator<Item = u64>) {
        self.arena.add_target_ids(node, ids);
    }

    /// Remove from a node's target-id set.
    pub fn remove_target_ids(&mut self, node: NodeId, ids: impl IntoIterator<Item = u64>) {
        self.arena.remove_target_ids(node, ids);
    }
}

impl std::fmt::Debug for CommandTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTree")
            .field("root", &self.root)
            .finish()
    }
}
