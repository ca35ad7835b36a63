//! Discord client for guild membership and role sync.

use std::collections::BTreeSet;
use std::sync::Arc;

use guildsync_core::SyncOutcome;
use guildsync_ratelimit::{SharedRateLimiter, SharedRateStore};
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::api::{ApiMethod, ApiRequestExecutor, ApiResponse, Authorization};
use crate::cache::GuildRoleCache;
use crate::config::DiscordConfig;
use crate::error::{DiscordError, DiscordResult};
use crate::reconcile::RoleReconciler;
use crate::roles::{MatchedRole, RoleDelta, RolesSet};
use crate::types::{sanitize_nick, Guild, GuildMember, Role, User};

/// Parse role ids given as strings.
///
/// # Errors
///
/// Returns [`DiscordError::InvalidArgument`] naming the first value that is not
/// an integer.
pub fn parse_role_ids<S: AsRef<str>>(values: &[S]) -> DiscordResult<Vec<u64>> {
    values
        .iter()
        .map(|value| {
            let value = value.as_ref();
            value.trim().parse().map_err(|_| {
                DiscordError::InvalidArgument(format!("role id must be an integer, got {value:?}"))
            })
        })
        .collect()
}

/// Parse role ids from a JSON list of integers or integer strings.
///
/// # Errors
///
/// Returns [`DiscordError::InvalidArgument`] if `value` is not a list or holds
/// a non-integer.
pub fn role_ids_from_json(value: &Value) -> DiscordResult<Vec<u64>> {
    let Value::Array(items) = value else {
        return Err(DiscordError::InvalidArgument(format!(
            "role ids must be a list, got {value}"
        )));
    };
    items
        .iter()
        .map(|item| {
            let id = match item {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            id.ok_or_else(|| {
                DiscordError::InvalidArgument(format!("role id must be an integer, got {item}"))
            })
        })
        .collect()
}

/// Unique role ids in ascending order.
fn sanitize_role_ids(role_ids: &[u64]) -> Vec<u64> {
    role_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Roles a member should end up with, and whether that differs from now.
#[derive(Debug)]
struct RolePlan {
    current: RolesSet,
    target: RolesSet,
    changed: bool,
}

/// Client for the Discord REST API.
///
/// Rate limits and caches live in the shared store, so any number of clients
/// in any number of processes can run side by side.
#[derive(Debug)]
pub struct DiscordClient {
    api: Arc<ApiRequestExecutor>,
    cache: Arc<GuildRoleCache>,
    reconciler: RoleReconciler,
}

impl DiscordClient {
    /// Create a client over the given shared store.
    ///
    /// # Errors
    ///
    /// Fails if the configuration has no token or the HTTP client cannot be built.
    pub fn new(config: &DiscordConfig, store: Arc<dyn SharedRateStore>) -> DiscordResult<Self> {
        let limiter = SharedRateLimiter::new(Arc::clone(&store), config.rate_limit.clone())
            .with_key_prefix(config.key_prefix.clone())
            .with_enabled(config.is_rate_limited);
        let api = Arc::new(ApiRequestExecutor::new(config, limiter)?);
        let cache = Arc::new(GuildRoleCache::new(
            Arc::clone(&api),
            store,
            config.key_prefix.clone(),
            config.roles_cache_max_age,
            config.guild_name_cache_max_age,
        ));
        let reconciler = RoleReconciler::new(Arc::clone(&cache), !config.disable_role_creation);

        Ok(Self {
            api,
            cache,
            reconciler,
        })
    }

    /// Whether calls are gated by the shared rate limiter.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.api.is_rate_limited()
    }

    /// Request executor, for calls the client does not wrap.
    #[must_use]
    pub fn api(&self) -> &ApiRequestExecutor {
        &self.api
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// User owning an OAuth `access_token`.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn current_user(&self, access_token: &str) -> DiscordResult<User> {
        self.api
            .send(ApiMethod::Get, "users/@me", None, Authorization::Bearer(access_token))
            .await?
            .error_for_status()?
            .json()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Guild
    // ─────────────────────────────────────────────────────────────────────────

    /// Basic infos about a guild.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn guild_infos(&self, guild_id: u64) -> DiscordResult<Guild> {
        self.cache.guild_infos(guild_id).await
    }

    /// Guild name (cached), or `""` if it cannot be fetched.
    pub async fn guild_name(&self, guild_id: u64, use_cache: bool) -> String {
        self.cache.guild_name(guild_id, use_cache).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Guild roles
    // ─────────────────────────────────────────────────────────────────────────

    /// All roles of a guild.
    ///
    /// # Errors
    ///
    /// See [`GuildRoleCache::guild_roles`].
    pub async fn guild_roles(&self, guild_id: u64, use_cache: bool) -> DiscordResult<RolesSet> {
        self.cache.guild_roles(guild_id, use_cache).await
    }

    /// Create a role. Duplicate names are allowed by the API, so match first.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn create_guild_role(&self, guild_id: u64, name: &str) -> DiscordResult<Option<Role>> {
        self.cache.create_role(guild_id, name).await
    }

    /// Delete a role.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn delete_guild_role(&self, guild_id: u64, role_id: u64) -> DiscordResult<bool> {
        self.cache.delete_role(guild_id, role_id).await
    }

    /// Existing role matching `name`.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn match_role_from_name(&self, guild_id: u64, name: &str) -> DiscordResult<Option<Role>> {
        self.reconciler.match_role_from_name(guild_id, name).await
    }

    /// Match one name, creating the role if needed.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn match_or_create_role_from_name(
        &self,
        guild_id: u64,
        name: &str,
        known_roles: Option<&RolesSet>,
    ) -> DiscordResult<Option<MatchedRole>> {
        self.reconciler
            .match_or_create_role_from_name(guild_id, name, known_roles)
            .await
    }

    /// Match many names, creating missing roles.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn match_or_create_roles_from_names<S: AsRef<str>>(
        &self,
        guild_id: u64,
        names: &[S],
    ) -> DiscordResult<Vec<MatchedRole>> {
        self.reconciler
            .match_or_create_roles_from_names(guild_id, names)
            .await
    }

    /// Match many names and return the roles as a set.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn match_or_create_roles_from_names_2<S: AsRef<str>>(
        &self,
        guild_id: u64,
        names: &[S],
    ) -> DiscordResult<RolesSet> {
        self.reconciler
            .match_or_create_roles_from_names_2(guild_id, names)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Guild members
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a user to a guild with their OAuth `access_token`.
    ///
    /// Returns `Some(true)` if added, `None` if already a member and
    /// `Some(false)` for any other success status.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn add_guild_member(
        &self,
        guild_id: u64,
        user_id: u64,
        access_token: &str,
        role_ids: Option<&[u64]>,
        nick: Option<&str>,
    ) -> DiscordResult<Option<bool>> {
        let mut body = Map::new();
        body.insert("access_token".into(), json!(access_token));
        if let Some(ids) = role_ids.filter(|ids| !ids.is_empty()) {
            body.insert("roles".into(), role_ids_json(ids));
        }
        if let Some(nick) = nick.map(sanitize_nick).filter(|n| !n.is_empty()) {
            body.insert("nick".into(), json!(nick));
        }

        let route = format!("guilds/{guild_id}/members/{user_id}");
        let response = self
            .api
            .send(ApiMethod::Put, &route, Some(&Value::Object(body)), Authorization::Bot)
            .await?
            .error_for_status()?;

        Ok(match response.status {
            StatusCode::CREATED => Some(true),
            StatusCode::NO_CONTENT => None,
            status => {
                warn!(guild_id, user_id, status = status.as_u16(), "Unexpected status adding member");
                Some(false)
            }
        })
    }

    /// A guild member, or `None` if the user is not in the guild.
    ///
    /// # Errors
    ///
    /// Propagates API errors other than "unknown member".
    pub async fn guild_member(&self, guild_id: u64, user_id: u64) -> DiscordResult<Option<GuildMember>> {
        let route = format!("guilds/{guild_id}/members/{user_id}");
        let response = self
            .api
            .send(ApiMethod::Get, &route, None, Authorization::Bot)
            .await?;
        if response.is_unknown_member() {
            warn!(guild_id, user_id, "User could not be found on server");
            return Ok(None);
        }
        response.error_for_status()?.json().map(Some)
    }

    /// Set roles and/or nickname of a member.
    ///
    /// `Some(&[])` clears all roles. Empty nicknames are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidArgument`] if neither roles nor a nickname
    /// are given, and propagates API errors.
    pub async fn modify_guild_member(
        &self,
        guild_id: u64,
        user_id: u64,
        role_ids: Option<&[u64]>,
        nick: Option<&str>,
    ) -> DiscordResult<Option<bool>> {
        let nick = nick.map(sanitize_nick).filter(|n| !n.is_empty());
        if role_ids.is_none() && nick.is_none() {
            return Err(DiscordError::InvalidArgument(
                "must specify role ids or nick".into(),
            ));
        }

        let mut body = Map::new();
        if let Some(ids) = role_ids {
            body.insert("roles".into(), role_ids_json(ids));
        }
        if let Some(nick) = nick {
            body.insert("nick".into(), json!(nick));
        }

        let route = format!("guilds/{guild_id}/members/{user_id}");
        self.member_call(ApiMethod::Patch, &route, Some(&Value::Object(body)), user_id)
            .await
    }

    /// Kick a member from a guild.
    ///
    /// # Errors
    ///
    /// Propagates API errors other than "unknown member".
    pub async fn remove_guild_member(&self, guild_id: u64, user_id: u64) -> DiscordResult<Option<bool>> {
        let route = format!("guilds/{guild_id}/members/{user_id}");
        self.member_call(ApiMethod::Delete, &route, None, user_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Guild member roles
    // ─────────────────────────────────────────────────────────────────────────

    /// Add one role to a member.
    ///
    /// `None` if the user is not in the guild. An unknown role is not folded
    /// into `None`: it surfaces as a 404 [`DiscordError::Status`] with code
    /// [`UNKNOWN_ROLE`](crate::api::UNKNOWN_ROLE).
    ///
    /// # Errors
    ///
    /// Propagates API errors other than "unknown member".
    pub async fn add_guild_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> DiscordResult<Option<bool>> {
        let route = format!("guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.member_call(ApiMethod::Put, &route, None, user_id).await
    }

    /// Remove one role from a member.
    ///
    /// `None` if the user is not in the guild. An unknown role is not folded
    /// into `None`: it surfaces as a 404 [`DiscordError::Status`] with code
    /// [`UNKNOWN_ROLE`](crate::api::UNKNOWN_ROLE).
    ///
    /// # Errors
    ///
    /// Propagates API errors other than "unknown member".
    pub async fn remove_guild_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> DiscordResult<Option<bool>> {
        let route = format!("guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.member_call(ApiMethod::Delete, &route, None, user_id).await
    }

    /// Current roles of a member, or `None` if the user is not in the guild.
    ///
    /// If the member holds roles the cached list does not know, the list is
    /// refetched once. Roles still unknown after that are dropped.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn guild_member_roles(&self, guild_id: u64, user_id: u64) -> DiscordResult<Option<RolesSet>> {
        let Some(member) = self.guild_member(guild_id, user_id).await? else {
            return Ok(None);
        };

        let mut guild_roles = self.cache.guild_roles(guild_id, true).await?;
        debug!(guild_id, role_ids = ?guild_roles.ids(), "Current guild roles");
        if !guild_roles.has_roles(&member.roles) {
            guild_roles = self.cache.guild_roles(guild_id, false).await?;
            let unknown: BTreeSet<u64> = member
                .roles
                .difference(&guild_roles.ids())
                .copied()
                .collect();
            if !unknown.is_empty() {
                warn!(guild_id, user_id, unknown_roles = ?unknown, "Member has unknown roles");
            }
        }
        Ok(Some(guild_roles.subset(&member.roles)))
    }

    /// Roles a member should have.
    ///
    /// Roles are matched (or created) from `desired_names`. Managed roles and
    /// roles named in `reserved_names` are kept. The flag is `Some(true)` if the
    /// result differs from what the member has, `Some(false)` if not and `None`
    /// if the user is not in the guild, in which case only the matched roles
    /// are returned.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn calculate_roles_for_member<S: AsRef<str>, R: AsRef<str>>(
        &self,
        guild_id: u64,
        user_id: u64,
        desired_names: &[S],
        reserved_names: &[R],
    ) -> DiscordResult<(RolesSet, Option<bool>)> {
        let (matched, plan) = self
            .plan_member_roles(guild_id, user_id, desired_names, reserved_names)
            .await?;
        Ok(match plan {
            Some(plan) => (plan.target, Some(plan.changed)),
            None => (matched, None),
        })
    }

    /// Bring a member's roles in line with `desired_names` using at most one
    /// modify call.
    ///
    /// # Errors
    ///
    /// Propagates API errors.
    pub async fn sync_member_roles<S: AsRef<str>, R: AsRef<str>>(
        &self,
        guild_id: u64,
        user_id: u64,
        desired_names: &[S],
        reserved_names: &[R],
    ) -> DiscordResult<SyncOutcome> {
        let (_, plan) = self
            .plan_member_roles(guild_id, user_id, desired_names, reserved_names)
            .await?;
        let Some(plan) = plan else {
            debug!(guild_id, user_id, "User is not a member of this guild");
            return Ok(SyncOutcome::AccountGone);
        };
        if !plan.changed {
            info!(guild_id, user_id, "No need to update roles");
            return Ok(SyncOutcome::Unchanged);
        }

        let delta = RoleDelta::between(&plan.current, &plan.target);
        debug!(
            guild_id,
            user_id,
            to_add = ?delta.to_add.ids(),
            to_remove = ?delta.to_remove.ids(),
            "Need to update roles"
        );
        let ids: Vec<u64> = plan.target.ids().into_iter().collect();
        let result = self
            .modify_guild_member(guild_id, user_id, Some(&ids), None)
            .await?;
        let outcome = SyncOutcome::from_tristate(result);
        if outcome.is_success() {
            info!(guild_id, user_id, "Roles have been updated");
        } else {
            warn!(guild_id, user_id, ?outcome, "Failed to update roles");
        }
        Ok(outcome)
    }

    async fn plan_member_roles<S: AsRef<str>, R: AsRef<str>>(
        &self,
        guild_id: u64,
        user_id: u64,
        desired_names: &[S],
        reserved_names: &[R],
    ) -> DiscordResult<(RolesSet, Option<RolePlan>)> {
        let matched = self
            .match_or_create_roles_from_names_2(guild_id, desired_names)
            .await?;
        debug!(guild_id, user_id, role_ids = ?matched.ids(), "Calculated roles");

        let Some(current) = self.guild_member_roles(guild_id, user_id).await? else {
            return Ok((matched, None));
        };
        debug!(guild_id, user_id, role_ids = ?current.ids(), "Current roles");

        let persistent = current
            .managed_only()
            .union(&current.subset_by_names(reserved_names));
        let changed = matched != current.difference(&persistent);
        let target = if changed {
            matched.union(&persistent)
        } else {
            matched.clone()
        };
        Ok((
            matched,
            Some(RolePlan {
                current,
                target,
                changed,
            }),
        ))
    }

    /// Mutating member call: `None` for an unknown member, `Some(true)` for
    /// 200/204, `Some(false)` for any other success status.
    async fn member_call(
        &self,
        method: ApiMethod,
        route: &str,
        body: Option<&Value>,
        user_id: u64,
    ) -> DiscordResult<Option<bool>> {
        let response = self.api.send(method, route, body, Authorization::Bot).await?;
        if response.is_unknown_member() {
            warn!(user_id, route, "User is not a member of this guild");
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(is_member_call_success(&response, route)))
    }
}

fn is_member_call_success(response: &ApiResponse, route: &str) -> bool {
    match response.status {
        StatusCode::OK | StatusCode::NO_CONTENT => true,
        status => {
            warn!(route, status = status.as_u16(), "Unexpected status from member call");
            false
        }
    }
}

fn role_ids_json(role_ids: &[u64]) -> Value {
    Value::Array(
        sanitize_role_ids(role_ids)
            .into_iter()
            .map(|id| Value::String(id.to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_ids() {
        assert_eq!(parse_role_ids(&["1", " 22 "]).unwrap(), vec![1, 22]);
        assert!(matches!(
            parse_role_ids(&["1", "two"]),
            Err(DiscordError::InvalidArgument(_))
        ));
        assert!(parse_role_ids::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_role_ids_from_json() {
        assert_eq!(role_ids_from_json(&json!([1, "2"])).unwrap(), vec![1, 2]);
        assert!(matches!(
            role_ids_from_json(&json!([1, 2.5])),
            Err(DiscordError::InvalidArgument(_))
        ));
        assert!(matches!(
            role_ids_from_json(&json!("1,2")),
            Err(DiscordError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_role_ids_json_dedups() {
        assert_eq!(role_ids_json(&[3, 1, 3]), json!(["1", "3"]));
    }
}
