//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use guildsync_discord::{parse_role_ids, DiscordClient, DiscordConfig};
use guildsync_ratelimit::{MemoryRateStore, SharedRateStore};
use serde_json::{json, Value};
use tracing::info;

use crate::{Cli, Commands};

/// Build the client from the global flags and run the subcommand.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or the call fails.
pub async fn run(cli: &Cli) -> Result<Value> {
    let config = load_config(cli)?;
    let guild_id = cli.guild.unwrap_or(config.guild_id);
    if guild_id == 0 {
        bail!("no guild configured, pass --guild or set DISCORD_GUILD_ID");
    }

    let store = open_store(cli.redis_url.as_deref()).await?;
    let client = DiscordClient::new(&config, store).context("failed to create Discord client")?;
    info!(guild_id, rate_limited = client.is_rate_limited(), "Running command");

    execute(&client, guild_id, &cli.command).await
}

/// Run one subcommand and shape its result as JSON.
///
/// # Errors
///
/// Returns an error if the API call fails or an argument is invalid.
pub async fn execute(client: &DiscordClient, guild_id: u64, command: &Commands) -> Result<Value> {
    let output = match command {
        Commands::GuildName { no_cache } => {
            let name = client.guild_name(guild_id, !no_cache).await;
            json!({ "guild_id": guild_id.to_string(), "name": name })
        }
        Commands::Roles { no_cache } => serde_json::to_value(client.guild_roles(guild_id, !no_cache).await?)?,
        Commands::Member { user } => serde_json::to_value(client.guild_member(guild_id, *user).await?)?,
        Commands::MemberRoles { user } => {
            serde_json::to_value(client.guild_member_roles(guild_id, *user).await?)?
        }
        Commands::SyncRoles {
            user,
            groups,
            reserved,
        } => {
            let outcome = client
                .sync_member_roles(guild_id, *user, groups.as_slice(), reserved.as_slice())
                .await?;
            json!({ "user_id": user.to_string(), "outcome": outcome })
        }
        Commands::SetNick { user, nick } => {
            let result = client
                .modify_guild_member(guild_id, *user, None, Some(nick.as_str()))
                .await?;
            json!({ "user_id": user.to_string(), "result": result })
        }
        Commands::AddRole { user, roles } => {
            let role_ids = parse_role_ids(roles.as_slice())?;
            let mut results = serde_json::Map::new();
            for role_id in role_ids {
                let result = client.add_guild_member_role(guild_id, *user, role_id).await?;
                results.insert(role_id.to_string(), json!(result));
            }
            json!({ "user_id": user.to_string(), "results": results })
        }
        Commands::Kick { user } => {
            let result = client.remove_guild_member(guild_id, *user).await?;
            json!({ "user_id": user.to_string(), "result": result })
        }
    };
    Ok(output)
}

fn load_config(cli: &Cli) -> Result<DiscordConfig> {
    let config = match &cli.config {
        Some(path) => read_config_file(path)?,
        None => DiscordConfig::default(),
    };
    let mut config = config.with_env().context("invalid DISCORD_* environment")?;
    if cli.no_rate_limit {
        config.is_rate_limited = false;
    }
    config.validate().context("set DISCORD_BOT_TOKEN or bot_token in --config")?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<DiscordConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

async fn open_store(redis_url: Option<&str>) -> Result<Arc<dyn SharedRateStore>> {
    match redis_url {
        Some(url) => {
            let store = guildsync_ratelimit::RedisRateStore::connect(url)
                .await
                .with_context(|| format!("failed to connect to {url}"))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryRateStore::new())),
    }
}
