//! Read-through cache of guild roles and names in the shared store.

use std::sync::Arc;
use std::time::Duration;

use guildsync_ratelimit::SharedRateStore;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::{ApiMethod, ApiRequestExecutor, Authorization};
use crate::error::{DiscordError, DiscordResult};
use crate::roles::RolesSet;
use crate::types::{sanitize_role_name, Guild, Role};

/// Guild roles and names cached across every worker.
///
/// The role list for a guild is dropped as soon as this client creates or
/// deletes one of its roles.
pub struct GuildRoleCache {
    api: Arc<ApiRequestExecutor>,
    store: Arc<dyn SharedRateStore>,
    key_prefix: String,
    roles_max_age: Duration,
    name_max_age: Duration,
}

impl std::fmt::Debug for GuildRoleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildRoleCache")
            .field("key_prefix", &self.key_prefix)
            .field("roles_max_age", &self.roles_max_age)
            .field("name_max_age", &self.name_max_age)
            .finish_non_exhaustive()
    }
}

impl GuildRoleCache {
    #[must_use]
    pub fn new(
        api: Arc<ApiRequestExecutor>,
        store: Arc<dyn SharedRateStore>,
        key_prefix: impl Into<String>,
        roles_max_age: Duration,
        name_max_age: Duration,
    ) -> Self {
        Self {
            api,
            store,
            key_prefix: key_prefix.into(),
            roles_max_age,
            name_max_age,
        }
    }

    #[must_use]
    pub fn roles_key(&self, guild_id: u64) -> String {
        format!("{}:guild:{guild_id}:roles", self.key_prefix)
    }

    #[must_use]
    pub fn name_key(&self, guild_id: u64) -> String {
        format!("{}:guild:{guild_id}:name", self.key_prefix)
    }

    /// All roles of a guild.
    ///
    /// With `use_cache` a cached list is returned without touching the API.
    /// Otherwise, or on a miss, the list is fetched and the cache refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::MalformedResponse`] if the API does not answer
    /// with a list of roles, and propagates API and store errors.
    pub async fn guild_roles(&self, guild_id: u64, use_cache: bool) -> DiscordResult<RolesSet> {
        let key = self.roles_key(guild_id);

        if use_cache {
            if let Some(raw) = self.store.get(&key).await? {
                match serde_json::from_str::<Vec<Role>>(&raw) {
                    Ok(roles) => {
                        debug!(guild_id, "Returning guild roles from cache");
                        return Ok(RolesSet::new(roles));
                    }
                    Err(e) => warn!(guild_id, error = %e, "Discarding unreadable roles cache"),
                }
            } else {
                debug!(guild_id, "No guild roles in cache");
            }
        }

        let route = format!("guilds/{guild_id}/roles");
        let body = self.api.execute(ApiMethod::Get, &route, None).await?;
        let roles = parse_role_list(body)?;

        self.store
            .set(&key, &serde_json::to_string(&roles)?, self.roles_max_age)
            .await?;
        Ok(RolesSet::new(roles))
    }

    /// Guild name, or `""` if it cannot be fetched.
    pub async fn guild_name(&self, guild_id: u64, use_cache: bool) -> String {
        let key = self.name_key(guild_id);

        if use_cache {
            match self.store.get(&key).await {
                Ok(Some(name)) if !name.is_empty() => return name,
                Ok(_) => {}
                Err(e) => warn!(guild_id, error = %e, "Failed to read guild name cache"),
            }
        }

        let guild = match self.guild_infos(guild_id).await {
            Ok(guild) => guild,
            Err(e) => {
                warn!(guild_id, error = %e, "Failed to fetch guild name");
                return String::new();
            }
        };

        if let Err(e) = self.store.set(&key, &guild.name, self.name_max_age).await {
            warn!(guild_id, error = %e, "Failed to cache guild name");
        }
        guild.name
    }

    /// Basic infos about a guild, uncached.
    ///
    /// # Errors
    ///
    /// Propagates API errors. An unknown guild is a [`DiscordError::Status`].
    pub async fn guild_infos(&self, guild_id: u64) -> DiscordResult<Guild> {
        self.api
            .send(
                ApiMethod::Get,
                &format!("guilds/{guild_id}"),
                None,
                Authorization::Bot,
            )
            .await?
            .error_for_status()?
            .json()
    }

    /// Create a role named after the sanitized `name`.
    ///
    /// Returns `None` if the API answered with an empty body. Any success
    /// drops the cached role list, whatever the body holds.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn create_role(&self, guild_id: u64, name: &str) -> DiscordResult<Option<Role>> {
        let route = format!("guilds/{guild_id}/roles");
        let body = json!({ "name": sanitize_role_name(name) });
        let response = self
            .api
            .send(ApiMethod::Post, &route, Some(&body), Authorization::Bot)
            .await?
            .error_for_status()?;
        self.invalidate_roles(guild_id).await?;

        let Some(created) = response.json_value()? else {
            warn!(guild_id, status = response.status.as_u16(), "Role created without a body");
            return Ok(None);
        };
        let role: Role = serde_json::from_value(created)
            .map_err(|e| DiscordError::MalformedResponse(format!("created role: {e}")))?;
        debug!(guild_id, role_id = role.id, role = %role.name, "Created role");
        Ok(Some(role))
    }

    /// Delete a role. `true` if the API confirmed with 204.
    ///
    /// Any success drops the cached role list, a 200 included.
    ///
    /// # Errors
    ///
    /// Propagates API errors other than "unknown role".
    pub async fn delete_role(&self, guild_id: u64, role_id: u64) -> DiscordResult<bool> {
        let route = format!("guilds/{guild_id}/roles/{role_id}");
        let response = self
            .api
            .send(ApiMethod::Delete, &route, None, Authorization::Bot)
            .await?;
        if response.is_unknown_target() {
            warn!(guild_id, role_id, "Role to delete does not exist");
            return Ok(false);
        }
        let response = response.error_for_status()?;
        self.invalidate_roles(guild_id).await?;
        Ok(response.status == reqwest::StatusCode::NO_CONTENT)
    }

    /// Drop the cached role list of a guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn invalidate_roles(&self, guild_id: u64) -> DiscordResult<()> {
        self.store.delete(&self.roles_key(guild_id)).await?;
        debug!(guild_id, "Guild roles cache invalidated");
        Ok(())
    }
}

fn parse_role_list(body: Option<Value>) -> DiscordResult<Vec<Role>> {
    match body {
        Some(Value::Array(items)) if !items.is_empty() => {
            serde_json::from_value(Value::Array(items)).map_err(|e| {
                DiscordError::MalformedResponse(format!("unexpected role object: {e}"))
            })
        }
        other => Err(DiscordError::MalformedResponse(format!(
            "unexpected response when fetching roles: {}",
            other.map_or_else(|| "<empty>".to_string(), |v| v.to_string())
        ))),
    }
}
