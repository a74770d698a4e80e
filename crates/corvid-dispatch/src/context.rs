//! The context handed to every handler invocation.
//!
//! `FireContext` is the narrow slice of platform state the engine itself
//! reads: the ids that scope a binding to a server, channel, or user. The
//! payload travels alongside as a JSON value and is opaque to the engine.

use serde::{Deserialize, Serialize};

/// Opaque event/command payload delivered by the platform client.
pub type Payload = serde_json::Value;

/// Identifiers describing where a fire originated.
///
/// `target_id` is the id that override bindings are matched against (a
/// guild/server id on chat platforms). A context without a target id only
/// reaches global bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireContext {
    /// Id the firing context is scoped to, if any.
    pub target_id: Option<u64>,
    /// Channel the notification originated from, if any.
    pub channel_id: Option<u64>,
    /// User who triggered the notification, if any.
    pub user_id: Option<u64>,
}

impl FireContext {
    /// A context with no scoping ids; only global bindings apply.
    pub fn global() -> Self {
        Self::default()
    }

    /// A context scoped to a single target id.
    pub fn for_target(target_id: u64) -> Self {
        Self {
            target_id: Some(target_id),
            ..Self::default()
        }
    }

    /// Set the channel id.
    pub fn with_channel(mut self, channel_id: u64) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Set the user id.
    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}
