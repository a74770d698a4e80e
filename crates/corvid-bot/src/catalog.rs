//! The recognized platform event names.
//!
//! The dispatch engine validates event bindings against a closed set; this is
//! the host-supplied default for chat platforms. Make sure the matching
//! gateway intents are enabled before binding an event here.

/// Default recognized event names, grouped by source.
pub const PLATFORM_EVENTS: &[&str] = &[
    // Connection & debug
    "on_connect",
    "on_disconnect",
    "on_ready",
    "on_resumed",
    "on_error",
    // Guilds
    "on_guild_available",
    "on_guild_unavailable",
    "on_guild_join",
    "on_guild_remove",
    "on_guild_update",
    // Channels
    "on_guild_channel_create",
    "on_guild_channel_delete",
    "on_guild_channel_update",
    "on_typing",
    // Members
    "on_member_join",
    "on_member_remove",
    "on_member_update",
    "on_member_ban",
    "on_member_unban",
    // Interactions
    "on_interaction",
    "on_app_command_completion",
    // Messages
    "on_message",
    "on_message_edit",
    "on_message_delete",
    // Reactions
    "on_reaction_add",
    "on_reaction_remove",
    "on_reaction_clear",
    // Roles
    "on_guild_role_create",
    "on_guild_role_delete",
    "on_guild_role_update",
    // Threads
    "on_thread_create",
    "on_thread_join",
    "on_thread_update",
    "on_thread_delete",
];

/// The default set plus any extra names from configuration.
pub fn recognized_events(extra: &[String]) -> Vec<String> {
    PLATFORM_EVENTS
        .iter()
        .map(|name| name.to_string())
        .chain(extra.iter().cloned())
        .collect()
}
