//! Console host for a Corvid bot.
//!
//! Stands in for the platform client: synthesizes the startup lifecycle
//! events, then feeds prefixed console lines into command dispatch. A real
//! deployment replaces this loop with a gateway connection driving the same
//! two `Bot` entry points.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use corvid_bot::{builtin_units, Bot, BotConfig};
use corvid_dispatch::{FireContext, Payload};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("corvid_bot=info,corvid_dispatch=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "corvid.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        BotConfig::load(&config_path)?
    } else {
        info!(path = %config_path, "no config file, using defaults");
        BotConfig::default()
    };

    let units = builtin_units(&config.name);
    let bot = Bot::new(&config, &units)?;
    debug!("\n{}", bot.render_trees());

    bot.handle_platform_event("on_connect", &FireContext::global(), &Payload::Null)
        .await;
    bot.handle_platform_event("on_ready", &FireContext::global(), &Payload::Null)
        .await;

    info!(prefix = bot.prefix(), "console host ready; `quit` exits");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "quit" {
            break;
        }
        let Some(command) = line.strip_prefix(bot.prefix()) else {
            continue;
        };
        let mut parts = command.split_whitespace();
        let Some(name) = parts.next() else {
            continue;
        };
        let payload = Payload::String(parts.collect::<Vec<_>>().join(" "));
        bot.handle_interaction(name, &FireContext::global(), &payload)
            .await;
    }

    bot.handle_platform_event("on_disconnect", &FireContext::global(), &Payload::Null)
        .await;
    Ok(())
}
