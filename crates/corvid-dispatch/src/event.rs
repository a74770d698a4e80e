//! The event tree: per-name sorted leaf lists with terminal/persistent
//! short-circuit firing.
//!
//! An [`EventTree`] is an arena of registries and leaves. Binding a leaf deep
//! in a subtree propagates it upward, so the root registry sees every leaf in
//! the forest and can fire a name with one sorted iteration.
//!
//! # Firing
//!
//! `fire` walks the pre-sorted list for a name in descending-priority order,
//! awaiting each handler before the next. A terminal leaf stops all further
//! non-persistent leaves for the remainder of that one call. Leaves scoped to
//! target ids only run when the firing context matches. Unknown names fail
//! once, then the name is silenced for that registry.
//!
//! # Example
//!
//! ```ignore
//! let mut tree = EventTree::new("main", ["on_ready"]);
//! let root = tree.root();
//! tree.bind(root, "on_ready", AttrSpec::new().priority(10))?
//!     .attach(event_handler_fn("greet", |_ctx, _payload| async { Ok(()) }))?;
//! tree.fire(root, "on_ready", &FireContext::global(), &Payload::Null).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::context::{FireContext, Payload};
use crate::error::{DispatchError, DispatchResult};
use crate::node::{Arena, AttrSpec, NodeAttrs, NodeId, NodeKind};

/// An async event handler.
///
/// Handlers return `anyhow::Result`; a failure propagates out of
/// [`EventTree::fire`] wrapped with the failing leaf's signature. The engine
/// performs no implicit recovery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, used as the leaf's node name when no explicit name was
    /// supplied at bind time.
    fn name(&self) -> &str {
        ""
    }

    /// Invoked once per matching fire, in priority order.
    async fn handle(&self, ctx: &FireContext, payload: &Payload) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnEventHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
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

/// Wrap an async closure as a named event handler.
pub fn event_handler_fn<F, Fut>(name: impl Into<String>, func: F) -> FnEventHandler<F>
where
    F: Fn(FireContext, Payload) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    FnEventHandler {
        name: name.into(),
        func,
    }
}

/// Registry payload: event name to leaves, sorted by descending priority
/// after every insertion (stable on insertion order for ties).
#[derive(Debug, Default)]
struct EventBindings {
    bindings: HashMap<String, Vec<NodeId>>,
}

/// Leaf payload: the bound name and handler. A leaf binds to exactly one
/// event name for its lifetime.
struct EventLeaf {
    event_name: Option<String>,
    handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for EventLeaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLeaf")
            .field("event_name", &self.event_name)
            .field("attached", &self.handler.is_some())
            .finish()
    }
}

/// Hierarchical registry of event handlers.
///
/// The recognized-event set is closed and host-supplied; binding a name
/// outside it fails with [`DispatchError::UnknownEvent`].
///
/// All structural mutation happens during the startup load phase. At runtime
/// the tree is read-only except for the silenced-name set, which is scoped
/// per registry node so independent trees never interfere.
pub struct EventTree {
    arena: Arena<EventBindings, EventLeaf>,
    root: NodeId,
    recognized: HashSet<String>,
    silenced: Mutex<HashSet<(NodeId, String)>>,
}

/// Handle returned by [`EventTree::bind`]; supplying the handler finalizes
/// the binding and registers the leaf through the parent chain.
#[derive(Debug)]
pub struct EventBinding<'t> {
    tree: &'t mut EventTree,
    leaf: NodeId,
}

impl EventBinding<'_> {
    /// Id of the leaf this binding will finalize.
    #[must_use]
    pub fn leaf_id(&self) -> NodeId {
        self.leaf
    }

    /// Attach the handler, completing the binding.
    pub fn attach<H: EventHandler + 'static>(self, handler: H) -> DispatchResult<NodeId> {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
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
                    name: leaf.event_name.clone().unwrap_or_default(),
                    signature,
                });
            }
            if node.attrs.name.is_empty() {
                node.attrs.name = if handler_name.is_empty() {
                    leaf.event_name.clone().unwrap_or_default()
                } else {
                    handler_name
                };
            }
            leaf.handler = Some(handler);
        }
        self.tree.register_leaf(self.leaf, true)?;
        Ok(self.leaf)
    }
}

impl EventTree {
    /// Create a tree with a root registry and the closed recognized-name set.
    pub fn new<I, S>(name: impl Into<String>, recognized: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut arena = Arena::new();
        let root = arena.push(
            NodeAttrs::named(name),
            None,
            NodeKind::Registry(EventBindings::default()),
        );
        Self {
            arena,
            root,
            recognized: recognized.into_iter().map(Into::into).collect(),
            silenced: Mutex::new(HashSet::new()),
        }
    }

    /// The synthetic root registry.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a registry node, optionally under a parent.
    ///
    /// Creation under a parent inherits the parent's attributes (one-time
    /// copy) with the spec's values overriding. Parentless registries are
    /// the roots that handler-source units declare; the loader grafts them
    /// onto the tree root at startup.
    pub fn registry(&mut self, parent: Option<NodeId>, spec: AttrSpec) -> DispatchResult<NodeId> {
        let inherited = parent.map(|id| self.arena.node(id).attrs.clone());
        let attrs = spec.build_attrs("registry", inherited.as_ref())?;
        Ok(self.arena.push(
            attrs,
            parent,
            NodeKind::Registry(EventBindings::default()),
        ))
    }

    /// Bind a new leaf under `registry` to `event_name`.
    ///
    /// The name must be in the recognized set. The leaf inherits the
    /// registry's attributes (one-time copy), with the spec's values
    /// overriding; this is how a unit root declared `persistent` or at a
    /// priority reaches its leaves. The returned handle completes the
    /// binding when the caller supplies the handler.
    pub fn bind(
        &mut self,
        registry: NodeId,
        event_name: &str,
        spec: AttrSpec,
    ) -> DispatchResult<EventBinding<'_>> {
        if !self.recognized.contains(event_name) {
            return Err(DispatchError::UnknownEvent {
                name: event_name.to_string(),
                signature: self.arena.signature(registry),
            });
        }
        let inherited = self.arena.node(registry).attrs.clone();
        let attrs = spec.build_attrs("", Some(&inherited))?;
        let leaf = self.arena.push(
            attrs,
            Some(registry),
            NodeKind::Leaf(EventLeaf {
                event_name: None,
                handler: None,
            }),
        );
        self.bind_leaf(leaf, event_name)
    }

    /// Bind an existing unbound leaf to `event_name`.
    ///
    /// Fails with [`DispatchError::AlreadyBound`] if the leaf is already
    /// bound; a leaf binds to exactly one event name for its lifetime.
    pub fn bind_leaf(&mut self, leaf: NodeId, event_name: &str) -> DispatchResult<EventBinding<'_>> {
        if !self.recognized.contains(event_name) {
            return Err(DispatchError::UnknownEvent {
                name: event_name.to_string(),
                signature: self.arena.signature(leaf),
            });
        }
        let signature = self.arena.signature(leaf);
        let NodeKind::Leaf(payload) = &mut self.arena.node_mut(leaf).kind else {
            return Err(DispatchError::InvalidAttribute(format!(
                "`{signature}` is not a leaf"
            )));
        };
        if let Some(existing) = &payload.event_name {
            return Err(DispatchError::AlreadyBound {
                name: existing.clone(),
                signature,
            });
        }
        payload.event_name = Some(event_name.to_string());
        Ok(EventBinding { tree: self, leaf })
    }

    /// Register a bound leaf into the sorted binding lists of its parent
    /// registry and, if `recursive`, every registry above it.
    ///
    /// Idempotent per leaf: a leaf never appears twice in the list for the
    /// same name.
    pub fn register_leaf(&mut self, leaf: NodeId, recursive: bool) -> DispatchResult<()> {
        let (event_name, priority) = {
            let node = self.arena.node(leaf);
            let NodeKind::Leaf(payload) = &node.kind else {
                return Err(DispatchError::InvalidAttribute(format!(
                    "`{}` is not a leaf",
                    self.arena.signature(leaf)
                )));
            };
            let Some(name) = payload.event_name.clone() else {
                return Err(DispatchError::UnnamedBinding(self.arena.signature(leaf)));
            };
            (name, node.attrs.priority)
        };

        let mut cursor = self.arena.node(leaf).parent;
        while let Some(registry) = cursor {
            let next = self.arena.node(registry).parent;
            // Sorted insert: after every leaf with priority >= ours, so ties
            // preserve insertion order.
            let position = match &self.arena.node(registry).kind {
                NodeKind::Registry(payload) => match payload.bindings.get(&event_name) {
                    Some(list) if list.contains(&leaf) => None,
                    Some(list) => Some(
                        list.iter()
                            .position(|id| self.arena.node(*id).attrs.priority < priority)
                            .unwrap_or(list.len()),
                    ),
                    None => Some(0),
                },
                NodeKind::Leaf(_) => None,
            };
            if let Some(position) = position {
                if let NodeKind::Registry(payload) = &mut self.arena.node_mut(registry).kind {
                    payload
                        .bindings
                        .entry(event_name.clone())
                        .or_default()
                        .insert(position, leaf);
                }
            }
            if !recursive {
                break;
            }
            cursor = next;
        }
        Ok(())
    }

    /// Attach `child_root` under `parent`, optionally inheriting the
    /// parent's attributes (one-time copy), then re-register every leaf the
    /// subtree already owns so it becomes visible up the chain.
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

    /// Attach `child_root` under `parent`; mirror of [`EventTree::attach`]
    /// phrased from the parent's side.
    pub fn adopt(&mut self, parent: NodeId, child_root: NodeId, inherit: bool) -> DispatchResult<()> {
        self.attach(child_root, parent, inherit)
    }

    /// Whether `node` can resolve `event_name`: a registry with a binding
    /// list for it, or a leaf bound to it.
    #[must_use]
    pub fn has(&self, node: NodeId, event_name: &str) -> bool {
        match &self.arena.node(node).kind {
            NodeKind::Registry(payload) => payload.bindings.contains_key(event_name),
            NodeKind::Leaf(payload) => payload.event_name.as_deref() == Some(event_name),
        }
    }

    /// Fire `event_name` on `registry`, awaiting every applicable leaf in
    /// descending-priority order.
    ///
    /// The first fire of a name with no binding fails with
    /// [`DispatchError::UnknownEvent`] and silences the name for this
    /// registry; later fires of it no-op. No two leaves for the same name
    /// ever run concurrently within one call.
    pub async fn fire(
        &self,
        registry: NodeId,
        event_name: &str,
        ctx: &FireContext,
        payload: &Payload,
    ) -> DispatchResult<()> {
        let NodeKind::Registry(bindings) = &self.arena.node(registry).kind else {
            return Err(DispatchError::InvalidAttribute(format!(
                "`{}` is not a registry",
                self.arena.signature(registry)
            )));
        };
        let Some(list) = bindings.bindings.get(event_name) else {
            let first = {
                let mut silenced = self
                    .silenced
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                silenced.insert((registry, event_name.to_string()))
            };
            if first {
                return Err(DispatchError::UnknownEvent {
                    name: event_name.to_string(),
                    signature: self.arena.signature(registry),
                });
            }
            tracing::trace!(event = event_name, "silenced event fired, skipping");
            return Ok(());
        };

        let mut terminal_reached = false;
        for &leaf_id in list {
            let node = self.arena.node(leaf_id);
            let NodeKind::Leaf(leaf) = &node.kind else {
                continue;
            };
            if !node.attrs.enabled || !self.arena.chain_enabled(leaf_id, registry) {
                continue;
            }
            if terminal_reached && !node.attrs.persistent {
                continue;
            }
            if !node.attrs.is_global() {
                match ctx.target_id {
                    Some(target) if node.attrs.target_ids.contains(&target) => {}
                    _ => continue,
                }
            }
            let Some(handler) = &leaf.handler else {
                tracing::debug!(
                    leaf = %self.arena.signature(leaf_id),
                    "leaf registered without handler, skipping"
                );
                continue;
            };
            tracing::debug!(
                event = event_name,
                leaf = %self.arena.signature(leaf_id),
                priority = node.attrs.priority,
                "dispatching event leaf"
            );
            handler
                .handle(ctx, payload)
                .await
                .map_err(|source| DispatchError::Handler {
                    signature: self.arena.signature(leaf_id),
                    source,
                })?;
            if node.attrs.terminal {
                terminal_reached = true;
            }
        }
        Ok(())
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

    /// The sorted leaf list for `event_name` on `registry`, if any.
    #[must_use]
    pub fn binding_order(&self, registry: NodeId, event_name: &str) -> Option<Vec<NodeId>> {
        match &self.arena.node(registry).kind {
            NodeKind::Registry(payload) => payload.bindings.get(event_name).cloned(),
            NodeKind::Leaf(_) => None,
        }
    }
}

impl std::fmt::Debug for EventTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTree")
            .field("root", &self.root)
            .field("recognized", &self.recognized.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _ctx: &FireContext, _payload: &Payload) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Recorder {
        Recorder { name, log }
    }

    fn tree() -> EventTree {
        EventTree::new("main", ["on_ready", "on_message", "on_error"])
    }

    #[test]
    fn test_bind_unrecognized_name_fails() {
        let mut tree = tree();
        let root = tree.root();
        let err = tree.bind(root, "on_bogus", AttrSpec::new()).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownEvent { .. }));
    }

    #[test]
    fn test_rebinding_a_leaf_fails() {
        let mut tree = tree();
        let root = tree.root();
        let leaf = tree
            .bind(root, "on_ready", AttrSpec::new().named("first"))
            .unwrap()
            .leaf_id();
        let err = tree.bind_leaf(leaf, "on_message").unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyBound { .. }));
    }

    #[tokio::test]
    async fn test_bindings_sorted_by_descending_priority_stable_ties() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let root = tree.root();
        for (name, priority) in [("low", 1), ("high", 10), ("mid_a", 5), ("mid_b", 5)] {
            tree.bind(root, "on_message", AttrSpec::new().priority(priority))
                .unwrap()
                .attach(recorder(name, log.clone()))
                .unwrap();
        }
        tree.fire(root, "on_message", &FireContext::global(), &Payload::Null)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["high", "mid_a", "mid_b", "low"]);
    }

    #[tokio::test]
    async fn test_terminal_skips_non_persistent_leaves() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let root = tree.root();
        tree.bind(root, "on_ready", AttrSpec::new().priority(10).terminal(true))
            .unwrap()
            .attach(recorder("a", log.clone()))
            .unwrap();
        tree.bind(root, "on_ready", AttrSpec::new().priority(5))
            .unwrap()
            .attach(recorder("b", log.clone()))
            .unwrap();
        tree.bind(root, "on_ready", AttrSpec::new().priority(1).persistent(true))
            .unwrap()
            .attach(recorder("c", log.clone()))
            .unwrap();
        tree.fire(root, "on_ready", &FireContext::global(), &Payload::Null)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_terminal_flag_does_not_persist_across_fires() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let root = tree.root();
        tree.bind(root, "on_ready", AttrSpec::new().priority(10).terminal(true))
            .unwrap()
            .attach(recorder("a", log.clone()))
            .unwrap();
        tree.bind(root, "on_ready", AttrSpec::new().priority(5))
            .unwrap()
            .attach(recorder("b", log.clone()))
            .unwrap();
        for _ in 0..2 {
            tree.fire(root, "on_ready", &FireContext::global(), &Payload::Null)
                .await
                .unwrap();
        }
        // The terminal leaf fires fresh each call; `b` is skipped each time.
        assert_eq!(*log.lock().unwrap(), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn test_unknown_fire_fails_once_then_silences() {
        let tree = tree();
        let root = tree.root();
        let err = tree
            .fire(root, "on_error", &FireContext::global(), &Payload::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownEvent { .. }));
        // Second fire of the same unresolved name is a silent no-op.
        tree.fire(root, "on_error", &FireContext::global(), &Payload::Null)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_target_filter_skips_non_matching_leaves() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let root = tree.root();
        tree.bind(root, "on_message", AttrSpec::new().target_id(42))
            .unwrap()
            .attach(recorder("scoped", log.clone()))
            .unwrap();
        tree.bind(root, "on_message", AttrSpec::new())
            .unwrap()
            .attach(recorder("global", log.clone()))
            .unwrap();

        tree.fire(root, "on_message", &FireContext::for_target(42), &Payload::Null)
            .await
            .unwrap();
        tree.fire(root, "on_message", &FireContext::for_target(99), &Payload::Null)
            .await
            .unwrap();
        tree.fire(root, "on_message", &FireContext::global(), &Payload::Null)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["scoped", "global", "global", "global"]);
    }

    #[tokio::test]
    async fn test_disabled_registry_suppresses_subtree() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let root = tree.root();
        let sub = tree
            .registry(None, AttrSpec::new().named("sub"))
            .unwrap();
        tree.bind(sub, "on_ready", AttrSpec::new())
            .unwrap()
            .attach(recorder("nested", log.clone()))
            .unwrap();
        tree.attach(sub, root, false).unwrap();
        tree.attrs_mut(sub).enabled = false;

        tree.fire(root, "on_ready", &FireContext::global(), &Payload::Null)
            .await
            .unwrap();
        assert!(log.lock().unwrap().is_empty());

        tree.attrs_mut(sub).enabled = true;
        tree.fire(root, "on_ready", &FireContext::global(), &Payload::Null)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["nested"]);
    }

    #[tokio::test]
    async fn test_attach_propagates_existing_leaves_idempotently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let root = tree.root();
        let sub = tree.registry(None, AttrSpec::new().named("sub")).unwrap();
        let leaf = tree
            .bind(sub, "on_ready", AttrSpec::new())
            .unwrap()
            .attach(recorder("nested", log.clone()))
            .unwrap();
        tree.attach(sub, root, false).unwrap();
        // Re-registering must not duplicate the leaf at any level.
        tree.register_leaf(leaf, true).unwrap();
        assert_eq!(tree.binding_order(root, "on_ready").unwrap(), vec![leaf]);
        assert_eq!(tree.binding_order(sub, "on_ready").unwrap(), vec![leaf]);
    }

    #[tokio::test]
    async fn test_handler_error_propagates_with_signature() {
        let mut tree = tree();
        let root = tree.root();
        tree.bind(root, "on_error", AttrSpec::new().named("bad"))
            .unwrap()
            .attach(event_handler_fn("bad", |_ctx, _payload| async {
                Err(anyhow::anyhow!("boom"))
            }))
            .unwrap();
        let err = tree
            .fire(root, "on_error", &FireContext::global(), &Payload::Null)
            .await
            .unwrap_err();
        match err {
            DispatchError::Handler { signature, .. } => assert_eq!(signature, "main.bad"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
