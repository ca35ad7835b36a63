//! Guildsync Discord - rate-limited Discord client for guild role sync
//!
//! Keeps a guild's members and roles in line with locally managed groups while
//! many independent workers share one bot token:
//!
//! - **Requests**: [`ApiRequestExecutor`] gates every call on the shared
//!   rate limiter and turns a 429 into a fleet-wide backoff
//! - **Caching**: [`GuildRoleCache`] keeps role lists and guild names in the
//!   shared store
//! - **Reconciliation**: [`RoleReconciler`] matches group names to roles,
//!   creating the missing ones
//! - **Facade**: [`DiscordClient`] for guild, member and role calls
//! - **Integration**: [`DiscordService`] implements `ServiceIntegration`
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use guildsync_discord::{DiscordClient, DiscordConfig};
//! use guildsync_ratelimit::MemoryRateStore;
//!
//! let config = DiscordConfig::from_env()?;
//! let client = DiscordClient::new(&config, Arc::new(MemoryRateStore::new()))?;
//! let outcome = client
//!     .sync_member_roles(config.guild_id, 1234, &["Member", "Pilot"], &["Booster"])
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod api;
mod cache;
mod client;
mod config;
mod error;
mod reconcile;
mod roles;
mod service;
mod types;

pub use api::*;
pub use cache::*;
pub use client::*;
pub use config::*;
pub use error::*;
pub use reconcile::*;
pub use roles::*;
pub use service::*;
pub use types::*;
