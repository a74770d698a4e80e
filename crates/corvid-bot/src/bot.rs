//! The bot host object.
//!
//! `Bot` owns both dispatch trees and maps the platform client's inbound
//! surface onto them. It is the error boundary: a failing leaf handler is
//! logged and the surrounding loop keeps running, so one bad handler cannot
//! take down the process. Startup-time errors (conflicts, unnamed bindings)
//! are fatal and abort construction instead.

use corvid_dispatch::{
    CommandTree, DispatchResult, EventTree, FireContext, HandlerUnit, Loader, Payload,
};

use crate::catalog;
use crate::config::BotConfig;

/// The bot host: dispatch trees plus the narrow inbound interface the
/// platform client drives.
pub struct Bot {
    name: String,
    prefix: String,
    events: EventTree,
    commands: CommandTree,
}

impl Bot {
    /// Build the trees and run the one-time unit scan.
    pub fn new(config: &BotConfig, units: &[Box<dyn HandlerUnit>]) -> DispatchResult<Self> {
        let recognized = catalog::recognized_events(&config.extra_events);
        let mut events = EventTree::new("main", recognized);
        let mut commands = CommandTree::new("main");
        let report = Loader::load(units, &mut events, &mut commands)?;
        tracing::info!(
            bot = %config.name,
            installed = report.installed,
            skipped = report.skipped,
            event_roots = report.event_roots.len(),
            command_roots = report.command_roots.len(),
            "handler units loaded"
        );
        Ok(Self {
            name: config.name.clone(),
            prefix: config.prefix.clone(),
            events,
            commands,
        })
    }

    /// Bot display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command prefix for console/chat input.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The event tree. Read-only after startup.
    #[must_use]
    pub fn events(&self) -> &EventTree {
        &self.events
    }

    /// The command tree. Read-only after startup.
    #[must_use]
    pub fn commands(&self) -> &CommandTree {
        &self.commands
    }

    /// Inbound: a platform lifecycle notification.
    ///
    /// Dispatch failures are logged here, not propagated; the host loop must
    /// outlive any single bad handler.
    pub async fn handle_platform_event(&self, name: &str, ctx: &FireContext, payload: &Payload) {
        if let Err(error) = self.events.fire(self.events.root(), name, ctx, payload).await {
            tracing::error!(event = name, %error, "event dispatch failed");
        }
    }

    /// Inbound: a user-invoked command interaction.
    pub async fn handle_interaction(&self, command_name: &str, ctx: &FireContext, payload: &Payload) {
        if let Err(error) = self
            .commands
            .fire(self.commands.root(), command_name, ctx, payload)
            .await
        {
            tracing::error!(command = command_name, %error, "command dispatch failed");
        }
    }

    /// Signature dump of both trees, for debugging.
    #[must_use]
    pub fn render_trees(&self) -> String {
        format!(
            "events:\n{}commands:\n{}",
            self.events.render(self.events.root()),
            self.commands.render(self.commands.root())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_dispatch::{event_handler_fn, AttrSpec, UnitBuilder};

    struct FailingUnit;

    impl HandlerUnit for FailingUnit {
        fn name(&self) -> &str {
            "failing"
        }

        fn install(&self, builder: &mut UnitBuilder<'_>) -> DispatchResult<()> {
            let root = builder.event_root(AttrSpec::new().named("failing"))?;
            builder
                .events
                .bind(root, "on_ready", AttrSpec::new())?
                .attach(event_handler_fn("always_fails", |_ctx, _payload| async {
                    Err(anyhow::anyhow!("handler exploded"))
                }))?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_error_boundary_swallows_handler_failures() {
        let units: Vec<Box<dyn HandlerUnit>> = vec![Box::new(FailingUnit)];
        let bot = Bot::new(&BotConfig::default(), &units).unwrap();
        // Must log and return, not panic or propagate.
        bot.handle_platform_event("on_ready", &FireContext::global(), &Payload::Null)
            .await;
        bot.handle_interaction("missing", &FireContext::global(), &Payload::Null)
            .await;
    }

    #[tokio::test]
    async fn test_render_trees_includes_unit_signatures() {
        let units: Vec<Box<dyn HandlerUnit>> = vec![Box::new(FailingUnit)];
        let bot = Bot::new(&BotConfig::default(), &units).unwrap();
        let dump = bot.render_trees();
        assert!(dump.contains("main.failing.always_fails"));
    }
}
