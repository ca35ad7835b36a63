//! guildsync operator CLI entrypoint.
//!
//! Runs single Discord calls against the configured guild:
//! - `guildsync guild-name` / `guildsync roles` - cached guild lookups
//! - `guildsync member` / `guildsync member-roles` - member state
//! - `guildsync sync-roles` - reconcile a member's roles with group names
//! - `guildsync set-nick` / `guildsync kick` / `guildsync add-role` - member changes
//!
//! Results go to stdout as JSON, logs to stderr.

#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use guildsync_telemetry::{init_logging, TelemetryConfig};

/// guildsync operator CLI.
#[derive(Parser, Debug)]
#[command(name = "guildsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON file with the Discord configuration. `DISCORD_*` variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Guild to act on. Defaults to the configured guild.
    #[arg(long, global = true)]
    pub guild: Option<u64>,

    /// Skip the shared rate limiter. Only safe when nothing else uses the token.
    #[arg(long, global = true, default_value_t = false)]
    pub no_rate_limit: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    /// Log filter, e.g. `debug` or `guildsync_discord=trace`. `RUST_LOG` wins.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Redis URL of the shared store. Without it state is kept in memory.
    #[arg(long, global = true, env = "GUILDSYNC_REDIS_URL")]
    pub redis_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the guild name.
    GuildName {
        /// Bypass the cached name.
        #[arg(long)]
        no_cache: bool,
    },

    /// List the guild's roles.
    Roles {
        /// Bypass the cached role list.
        #[arg(long)]
        no_cache: bool,
    },

    /// Show a guild member.
    Member {
        /// Discord user id.
        user: u64,
    },

    /// Show the roles a member holds.
    MemberRoles {
        /// Discord user id.
        user: u64,
    },

    /// Give a member exactly the roles named by their groups.
    ///
    /// Missing roles are created unless role creation is disabled. Managed
    /// roles and reserved roles are kept.
    SyncRoles {
        /// Discord user id.
        user: u64,

        /// Group name the member should have a role for.
        #[arg(long = "group")]
        groups: Vec<String>,

        /// Role name never removed by the sync.
        #[arg(long = "reserved")]
        reserved: Vec<String>,
    },

    /// Set a member's nickname.
    SetNick {
        /// Discord user id.
        user: u64,

        /// New nickname, truncated to 32 characters.
        nick: String,
    },

    /// Add roles to a member by id.
    AddRole {
        /// Discord user id.
        user: u64,

        /// Role ids.
        #[arg(required = true)]
        roles: Vec<String>,
    },

    /// Remove a member from the guild.
    Kick {
        /// Discord user id.
        user: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(
        &TelemetryConfig::new("guildsync")
            .with_log_level(cli.log_level.as_str())
            .with_json_logs(cli.json_logs),
    )?;

    let output = commands::run(&cli).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
