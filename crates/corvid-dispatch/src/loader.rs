//! Startup scan: collect handler-source units and graft their trees onto
//! the root registries.
//!
//! Units register explicitly through a typed builder instead of being
//! discovered by inspecting loaded modules, so there is no reflection
//! anywhere in the load path. A unit declares its root registries with
//! [`UnitBuilder::event_root`] / [`UnitBuilder::command_root`] and binds
//! handlers under them; the loader then attaches every declared root to the
//! synthetic tree roots with `inherit = false` — a unit author's declared
//! defaults are authoritative, never overwritten by the root's.
//!
//! The scan runs exactly once at startup. Hot reload is not implemented.

use crate::command::CommandTree;
use crate::error::DispatchResult;
use crate::event::EventTree;
use crate::node::{AttrSpec, NodeId};

/// A handler-source unit: one installable bundle of event/command trees.
pub trait HandlerUnit {
    /// Unit name, used in logs.
    fn name(&self) -> &str;

    /// Opt-out marker; skipped units are never installed.
    fn skip(&self) -> bool {
        false
    }

    /// Make registration calls into the builder. Errors abort startup.
    fn install(&self, builder: &mut UnitBuilder<'_>) -> DispatchResult<()>;
}

/// Typed registration surface handed to each unit's `install`.
pub struct UnitBuilder<'a> {
    /// The event tree units bind into.
    pub events: &'a mut EventTree,
    /// The command tree units bind into.
    pub commands: &'a mut CommandTree,
    event_roots: Vec<NodeId>,
    command_roots: Vec<NodeId>,
}

impl<'a> UnitBuilder<'a> {
    fn new(events: &'a mut EventTree, commands: &'a mut CommandTree) -> Self {
        Self {
            events,
            commands,
            event_roots: Vec::new(),
            command_roots: Vec::new(),
        }
    }

    /// Declare a parentless event registry as one of this unit's roots.
    pub fn event_root(&mut self, spec: AttrSpec) -> DispatchResult<NodeId> {
        let id = self.events.registry(None, spec)?;
        self.event_roots.push(id);
        Ok(id)
    }

    /// Declare a parentless command registry as one of this unit's roots.
    pub fn command_root(&mut self, spec: AttrSpec) -> DispatchResult<NodeId> {
        let id = self.commands.registry(None, spec)?;
        self.command_roots.push(id);
        Ok(id)
    }

    fn is_empty(&self) -> bool {
        self.event_roots.is_empty() && self.command_roots.is_empty()
    }
}

/// Roots discovered by a scan, pending attachment.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Event registry roots declared by the scanned units.
    pub event_roots: Vec<NodeId>,
    /// Command registry roots declared by the scanned units.
    pub command_roots: Vec<NodeId>,
    /// Number of units installed.
    pub installed: usize,
    /// Number of units skipped via their opt-out marker.
    pub skipped: usize,
}

/// One-shot startup loader for handler-source units.
pub struct Loader;

impl Loader {
    /// Run every non-skipped unit's `install` and collect the declared
    /// roots. A unit declaring no roots is warned about, not failed.
    pub fn scan(
        units: &[Box<dyn HandlerUnit>],
        events: &mut EventTree,
        commands: &mut CommandTree,
    ) -> DispatchResult<ScanReport> {
        let mut report = ScanReport::default();
        for unit in units {
            if unit.skip() {
                tracing::debug!(unit = unit.name(), "unit opted out, skipping");
                report.skipped += 1;
                continue;
            }
            let mut builder = UnitBuilder::new(events, commands);
            unit.install(&mut builder)?;
            if builder.is_empty() {
                tracing::warn!(unit = unit.name(), "unit declares no registries");
            }
            report.event_roots.append(&mut builder.event_roots);
            report.command_roots.append(&mut builder.command_roots);
            report.installed += 1;
        }
        Ok(report)
    }

    /// Graft every discovered root onto the synthetic tree roots.
    ///
    /// Attaches with `inherit = false`: discovered roots keep their
    /// author-declared attributes.
    pub fn attach_all(
        report: &ScanReport,
        events: &mut EventTree,
        commands: &mut CommandTree,
    ) -> DispatchResult<()> {
        for &root in &report.event_roots {
            events.attach(root, events.root(), false)?;
        }
        for &root in &report.command_roots {
            commands.attach(root, commands.root(), false)?;
        }
        Ok(())
    }

    /// Scan and attach in one pass; the usual startup entry point.
    pub fn load(
        units: &[Box<dyn HandlerUnit>],
        events: &mut EventTree,
        commands: &mut CommandTree,
    ) -> DispatchResult<ScanReport> {
        let report = Self::scan(units, events, commands)?;
        Self::attach_all(&report, events, commands)?;
        Ok(report)
    }
}
