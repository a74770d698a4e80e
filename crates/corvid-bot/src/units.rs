//! Built-in handler units.
//!
//! These are the stock units every Corvid bot starts with: lifecycle
//! logging, guild command sync, and the debug `ping` command. They also
//! serve as the reference for writing custom units.

use corvid_dispatch::{
    command_handler_fn, event_handler_fn, AttrSpec, DispatchResult, HandlerUnit, UnitBuilder,
};

/// Logs lifecycle events. Persistent at priority 100 so it observes every
/// fire, even after a terminal leaf.
pub struct LoggingUnit {
    bot_name: String,
}

impl LoggingUnit {
    /// Create the unit for the named bot.
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
        }
    }
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

        let name = self.bot_name.clone();
        builder
            .events
            .bind(root, "on_connect", AttrSpec::new())?
            .attach(event_handler_fn("log_connect", move |_ctx, _payload| {
                let name = name.clone();
                async move {
                    tracing::info!("{name} is connecting...");
                    Ok(())
                }
            }))?;

        let name = self.bot_name.clone();
        builder
            .events
            .bind(root, "on_ready", AttrSpec::new())?
            .attach(event_handler_fn("log_ready", move |_ctx, _payload| {
                let name = name.clone();
                async move {
                    tracing::info!("{name} is ready!");
                    Ok(())
                }
            }))?;

        let name = self.bot_name.clone();
        builder
            .events
            .bind(root, "on_disconnect", AttrSpec::new())?
            .attach(event_handler_fn("log_disconnect", move |_ctx, _payload| {
                let name = name.clone();
                async move {
                    tracing::info!("{name} disconnected.");
                    Ok(())
                }
            }))?;

        builder
            .events
            .bind(root, "on_error", AttrSpec::new())?
            .attach(event_handler_fn("log_error", |_ctx, payload| async move {
                tracing::error!(%payload, "platform error");
                Ok(())
            }))?;

        builder
            .events
            .bind(root, "on_guild_available", AttrSpec::new())?
            .attach(event_handler_fn(
                "log_guild_available",
                |ctx, _payload| async move {
                    tracing::info!(guild = ?ctx.target_id, "guild available");
                    Ok(())
                },
            ))?;

        Ok(())
    }
}

/// Re-syncs guild commands when a guild becomes available. Persistent at
/// priority 75 so it runs after logging but before ordinary handlers.
pub struct CommandSyncUnit;

impl HandlerUnit for CommandSyncUnit {
    fn name(&self) -> &str {
        "command_handling"
    }

    fn install(&self, builder: &mut UnitBuilder<'_>) -> DispatchResult<()> {
        let root = builder.event_root(
            AttrSpec::new()
                .named("command_handling")
                .persistent(true)
                .priority(75),
        )?;
        builder
            .events
            .bind(root, "on_guild_available", AttrSpec::new())?
            .attach(event_handler_fn(
                "sync_guild_commands",
                |ctx, _payload| async move {
                    // Actual sync talks to the platform client, which is not
                    // the engine's concern; the unit marks where it hooks in.
                    tracing::info!(guild = ?ctx.target_id, "syncing guild commands");
                    Ok(())
                },
            ))?;
        Ok(())
    }
}

/// Debug commands: `ping`.
pub struct DebugCommandsUnit;

impl HandlerUnit for DebugCommandsUnit {
    fn name(&self) -> &str {
        "debug_commands"
    }

    fn install(&self, builder: &mut UnitBuilder<'_>) -> DispatchResult<()> {
        let root = builder.command_root(AttrSpec::new().named("debug_commands"))?;
        builder
            .commands
            .bind(root, "ping", AttrSpec::new().description("Pong!"))?
            .attach(command_handler_fn("ping", |_ctx, _payload| async {
                tracing::info!("Pong!");
                Ok(())
            }))?;
        Ok(())
    }
}

/// The stock unit set for a bot with the given name.
pub fn builtin_units(bot_name: &str) -> Vec<Box<dyn HandlerUnit>> {
    vec![
        Box::new(LoggingUnit::new(bot_name)),
        Box::new(CommandSyncUnit),
        Box::new(DebugCommandsUnit),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Bot;
    use crate::config::BotConfig;
    use corvid_dispatch::{FireContext, Payload};

    #[tokio::test]
    async fn test_builtin_units_load_and_fire() {
        let config = BotConfig::default();
        let units = builtin_units(&config.name);
        let bot = Bot::new(&config, &units).unwrap();

        assert!(bot.events().has(bot.events().root(), "on_ready"));
        assert!(bot.commands().has(bot.commands().root(), "ping"));

        bot.handle_platform_event("on_ready", &FireContext::global(), &Payload::Null)
            .await;
        bot.handle_interaction("ping", &FireContext::global(), &Payload::Null)
            .await;
    }

    #[tokio::test]
    async fn test_logging_unit_leaves_are_persistent() {
        let config = BotConfig::default();
        let units = builtin_units(&config.name);
        let bot = Bot::new(&config, &units).unwrap();
        let root = bot.events().root();
        let order = bot.events().binding_order(root, "on_ready").unwrap();
        assert!(!order.is_empty());
        for leaf in order {
            // Inherited from the unit root at attach time.
            assert!(bot.events().attrs(leaf).persistent);
        }
    }
}
