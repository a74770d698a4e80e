//! # Corvid dispatch engine
//!
//! The dispatch core of the Corvid bot framework: a hierarchical registry
//! binding named events (lifecycle/platform notifications) and commands
//! (user-invoked actions) to async handlers, fired in a deterministic,
//! override-aware, priority-ordered sequence.
//!
//! # Architecture
//!
//! ```text
//! Loader (startup, once)
//!    │  scans HandlerUnits → units declare roots into a typed builder
//!    ▼
//! EventTree / CommandTree (arena of nodes)
//!    │  registration propagates leaves upward to the root registry
//!    ▼
//! fire(name, ctx, payload)  ← driven by the platform client at runtime
//! ```
//!
//! - [`EventTree`]: per-name leaf lists sorted by descending priority, fired
//!   with terminal/persistent short-circuit rules.
//! - [`CommandTree`]: global bindings with per-target overrides; override
//!   wins for a matching target id, conflicts fail fast at startup.
//! - [`Loader`]: one-shot scan over [`HandlerUnit`]s, grafting each unit's
//!   roots onto the synthetic tree roots without inheriting their attributes.
//!
//! Trees are arenas: nodes are indexed by [`NodeId`], parent/child links are
//! indices, and the structural maps are mutated only during the load phase.
//! `fire` takes `&self` and awaits handlers strictly in sequence, so for one
//! name leaves never run concurrently with each other.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod loader;
pub mod node;

pub use command::{
    command_handler_fn, CommandBinding, CommandHandler, CommandTree, FnCommandHandler,
};
pub use context::{FireContext, Payload};
pub use error::{DispatchError, DispatchResult};
pub use event::{event_handler_fn, EventBinding, EventHandler, EventTree, FnEventHandler};
pub use loader::{HandlerUnit, Loader, ScanReport, UnitBuilder};
pub use node::{AttrSpec, NodeAttrs, NodeId};
