//! End-to-end contract tests for the dispatch engine: tree composition,
//! inheritance, priority ordering, override resolution, and the
//! terminal/persistent firing rules, exercised through the public API the
//! way a bot host uses it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use corvid_dispatch::{
    AttrSpec, CommandHandler, CommandTree, DispatchError, DispatchResult, EventHandler, EventTree,
    FireContext, HandlerUnit, Loader, Payload, UnitBuilder,
};

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: String,
    log: Log,
}

impl Recorder {
    fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl EventHandler for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &FireContext, _payload: &Payload) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &FireContext, _payload: &Payload) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}

fn event_tree() -> EventTree {
    EventTree::new("main", ["on_ready", "on_message", "on_guild_join"])
}

fn taken(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

#[tokio::test]
async fn fires_every_enabled_leaf_exactly_once_in_priority_order() {
    let log: Log = Default::default();
    let mut tree = event_tree();
    let root = tree.root();
    for (name, priority) in [("c", 1), ("a", 10), ("b", 5)] {
        tree.bind(root, "on_message", AttrSpec::new().priority(priority))
            .unwrap()
            .attach(Recorder::new(name, &log))
            .unwrap();
    }
    tree.fire(root, "on_message", &FireContext::global(), &Payload::Null)
        .await
        .unwrap();
    assert_eq!(taken(&log), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn terminal_skips_later_non_persistent_but_not_persistent_leaves() {
    let log: Log = Default::default();
    let mut tree = event_tree();
    let root = tree.root();
    tree.bind(root, "on_ready", AttrSpec::new().priority(10).terminal(true))
        .unwrap()
        .attach(Recorder::new("terminal", &log))
        .unwrap();
    tree.bind(root, "on_ready", AttrSpec::new().priority(5))
        .unwrap()
        .attach(Recorder::new("skipped", &log))
        .unwrap();
    tree.bind(root, "on_ready", AttrSpec::new().priority(1).persistent(true))
        .unwrap()
        .attach(Recorder::new("persistent", &log))
        .unwrap();

    tree.fire(root, "on_ready", &FireContext::global(), &Payload::Null)
        .await
        .unwrap();
    assert_eq!(taken(&log), vec!["terminal", "persistent"]);
}

#[tokio::test]
async fn leaves_bound_in_a_subtree_fire_from_the_root() {
    let log: Log = Default::default();
    let mut tree = event_tree();
    let root = tree.root();
    let sub = tree.registry(None, AttrSpec::new().named("unit")).unwrap();
    let nested = tree
        .registry(Some(sub), AttrSpec::new().named("nested"))
        .unwrap();
    tree.bind(nested, "on_guild_join", AttrSpec::new())
        .unwrap()
        .attach(Recorder::new("deep", &log))
        .unwrap();
    tree.attach(sub, root, false).unwrap();

    // Visible at every level of the chain.
    assert!(tree.has(root, "on_guild_join"));
    assert!(tree.has(sub, "on_guild_join"));
    assert!(tree.has(nested, "on_guild_join"));

    tree.fire(root, "on_guild_join", &FireContext::global(), &Payload::Null)
        .await
        .unwrap();
    assert_eq!(taken(&log), vec!["deep"]);
}

#[tokio::test]
async fn inherit_copies_attributes_once_at_attach_time() {
    let mut tree = event_tree();
    let root = tree.root();
    tree.attrs_mut(root).priority = 40;
    tree.attrs_mut(root).persistent = true;
    tree.attrs_mut(root).terminal = true;
    tree.set_target_ids(root, [7, 8]);

    let sub = tree.registry(None, AttrSpec::new().named("sub")).unwrap();
    tree.attach(sub, root, true).unwrap();

    assert_eq!(tree.attrs(sub).priority, 40);
    assert!(tree.attrs(sub).persistent);
    assert!(tree.attrs(sub).terminal);
    assert_eq!(
        tree.attrs(sub).target_ids.iter().copied().collect::<Vec<_>>(),
        vec![7, 8]
    );

    // Not a live link: later parent mutation leaves the child untouched.
    tree.attrs_mut(root).priority = 2;
    assert_eq!(tree.attrs(sub).priority, 40);
}

#[tokio::test]
async fn target_scoped_leaves_only_fire_for_matching_contexts() {
    let log: Log = Default::default();
    let mut tree = event_tree();
    let root = tree.root();
    tree.bind(root, "on_message", AttrSpec::new().target_ids([42, 43]))
        .unwrap()
        .attach(Recorder::new("scoped", &log))
        .unwrap();

    tree.fire(root, "on_message", &FireContext::for_target(43), &Payload::Null)
        .await
        .unwrap();
    assert_eq!(taken(&log), vec!["scoped"]);

    tree.fire(root, "on_message", &FireContext::for_target(99), &Payload::Null)
        .await
        .unwrap();
    tree.fire(root, "on_message", &FireContext::global(), &Payload::Null)
        .await
        .unwrap();
    assert!(taken(&log).is_empty());
}

#[tokio::test]
async fn unknown_event_binding_fails_loudly_and_firing_silences() {
    let mut tree = event_tree();
    let root = tree.root();
    let err = tree.bind(root, "on_bogus", AttrSpec::new()).unwrap_err();
    assert!(matches!(err, DispatchError::UnknownEvent { .. }));

    let err = tree
        .fire(root, "on_bogus", &FireContext::global(), &Payload::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownEvent { .. }));
    // Silenced: second fire no-ops instead of raising again.
    tree.fire(root, "on_bogus", &FireContext::global(), &Payload::Null)
        .await
        .unwrap();
}

#[tokio::test]
async fn silencing_is_scoped_per_registry() {
    let first = event_tree();
    let second = event_tree();
    let root = first.root();
    first
        .fire(root, "on_ready", &FireContext::global(), &Payload::Null)
        .await
        .unwrap_err();
    // A different tree instance reports its own first failure.
    second
        .fire(second.root(), "on_ready", &FireContext::global(), &Payload::Null)
        .await
        .unwrap_err();
}

#[tokio::test]
async fn command_override_beats_global_for_matching_target_only() {
    let log: Log = Default::default();
    let mut tree = CommandTree::new("main");
    let root = tree.root();
    tree.bind(root, "ping", AttrSpec::new())
        .unwrap()
        .attach(Recorder::new("global", &log))
        .unwrap();
    tree.bind(root, "ping", AttrSpec::new().target_id(42))
        .unwrap()
        .attach(Recorder::new("override", &log))
        .unwrap();

    tree.fire(root, "ping", &FireContext::for_target(42), &Payload::Null)
        .await
        .unwrap();
    tree.fire(root, "ping", &FireContext::for_target(99), &Payload::Null)
        .await
        .unwrap();
    assert_eq!(taken(&log), vec!["override", "global"]);
}

#[tokio::test]
async fn command_conflicts_fail_fast_at_startup() {
    let log: Log = Default::default();
    let mut tree = CommandTree::new("main");
    let root = tree.root();
    tree.bind(root, "ping", AttrSpec::new().target_id(42))
        .unwrap()
        .attach(Recorder::new("first", &log))
        .unwrap();
    let err = tree
        .bind(root, "ping", AttrSpec::new().target_id(42))
        .unwrap()
        .attach(Recorder::new("second", &log))
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::CommandConflict { target_id: 42, .. }
    ));
}

#[tokio::test]
async fn is_global_stays_consistent_with_target_ids() {
    let mut tree = event_tree();
    let root = tree.root();
    let leaf = tree
        .bind(root, "on_message", AttrSpec::new())
        .unwrap()
        .attach(Recorder::new("leaf", &Default::default()))
        .unwrap();
    assert!(tree.attrs(leaf).is_global());
    tree.set_target_ids(leaf, [5]);
    assert!(!tree.attrs(leaf).is_global());
    tree.add_target_ids(leaf, [6, 7]);
    assert!(!tree.attrs(leaf).is_global());
    tree.remove_target_ids(leaf, [5, 6, 7]);
    assert!(tree.attrs(leaf).is_global());
}

struct LoggingUnit {
    log: Log,
}

impl HandlerUnit for LoggingUnit {
    fn name(&self) -> &str {
        "logging"
    }

    fn install(&self, builder: &mut UnitBuilder<'_>) -> DispatchResult<()> {
        let root = builder.event_root(
            AttrSpec::new()
                .named("logging")
                .persistent(true)
                .priority(100),
        )?;
        builder
            .events
            .bind(root, "on_ready", AttrSpec::new())?
            .attach(Recorder::new("log_ready", &self.log))?;
        Ok(())
    }
}

struct DebugCommandsUnit {
    log: Log,
}

impl HandlerUnit for DebugCommandsUnit {
    fn name(&self) -> &str {
        "debug_commands"
    }

    fn install(&self, builder: &mut UnitBuilder<'_>) -> DispatchResult<()> {
        let root = builder.command_root(AttrSpec::new().named("debug_commands"))?;
        builder
            .commands
            .bind(root, "ping", AttrSpec::new().description("Pong!"))?
            .attach(Recorder::new("ping", &self.log))?;
        Ok(())
    }
}

#[tokio::test]
async fn full_load_then_fire_round_trip() {
    let log: Log = Default::default();
    let mut events = event_tree();
    let mut commands = CommandTree::new("main");
    let units: Vec<Box<dyn HandlerUnit>> = vec![
        Box::new(LoggingUnit { log: log.clone() }),
        Box::new(DebugCommandsUnit { log: log.clone() }),
    ];
    let report = Loader::load(&units, &mut events, &mut commands).unwrap();
    assert_eq!(report.installed, 2);

    events
        .fire(events.root(), "on_ready", &FireContext::global(), &Payload::Null)
        .await
        .unwrap();
    commands
        .fire(commands.root(), "ping", &FireContext::global(), &Payload::Null)
        .await
        .unwrap();
    assert_eq!(taken(&log), vec!["log_ready", "ping"]);

    // Signatures reflect the grafted hierarchy.
    let ping = commands.commands(commands.root())[0];
    assert_eq!(commands.signature(ping), "main.debug_commands.ping");
}
