//! # Corvid bot host
//!
//! Thin wrapper around [`corvid_dispatch`]: configuration, the recognized
//! platform-event catalog, the stock handler units, and the [`Bot`] object
//! that maps the platform client's inbound surface onto the dispatch trees.
//!
//! The dispatch engine is where the design lives; everything here is
//! plumbing that a real gateway client would drive. The bundled binary
//! stands in for that client with a console loop.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod bot;
pub mod catalog;
pub mod config;
pub mod units;

pub use bot::Bot;
pub use catalog::{recognized_events, PLATFORM_EVENTS};
pub use config::BotConfig;
pub use units::{builtin_units, CommandSyncUnit, DebugCommandsUnit, LoggingUnit};
