//! Matching desired role names against a guild's roles.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::cache::GuildRoleCache;
use crate::error::DiscordResult;
use crate::roles::{MatchedRole, RolesSet};
use crate::types::{sanitize_role_name, Role};

/// Sanitized role names, first occurrence kept, in input order.
#[must_use]
pub fn wanted_role_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| sanitize_role_name(name.as_ref()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Resolves role names to roles, creating missing ones unless disabled.
#[derive(Debug)]
pub struct RoleReconciler {
    cache: Arc<GuildRoleCache>,
    role_creation: bool,
}

impl RoleReconciler {
    #[must_use]
    pub const fn new(cache: Arc<GuildRoleCache>, role_creation: bool) -> Self {
        Self {
            cache,
            role_creation,
        }
    }

    /// Whether missing roles are created.
    #[must_use]
    pub const fn role_creation(&self) -> bool {
        self.role_creation
    }

    /// Existing role matching `name`, from cached roles.
    ///
    /// # Errors
    ///
    /// Propagates errors from fetching the role list.
    pub async fn match_role_from_name(&self, guild_id: u64, name: &str) -> DiscordResult<Option<Role>> {
        let roles = self.cache.guild_roles(guild_id, true).await?;
        Ok(roles.role_by_name(name).cloned())
    }

    /// Match one name, creating the role if it is missing.
    ///
    /// `known_roles` saves a lookup when matching many names. Returns `None`
    /// when the role is missing and creation is disabled or yields nothing.
    ///
    /// # Errors
    ///
    /// Propagates API and store errors.
    pub async fn match_or_create_role_from_name(
        &self,
        guild_id: u64,
        name: &str,
        known_roles: Option<&RolesSet>,
    ) -> DiscordResult<Option<MatchedRole>> {
        let fetched;
        let known = if let Some(roles) = known_roles {
            roles
        } else {
            fetched = self.cache.guild_roles(guild_id, true).await?;
            &fetched
        };

        if let Some(role) = known.role_by_name(name) {
            return Ok(Some(MatchedRole {
                role: role.clone(),
                created: false,
            }));
        }

        if !self.role_creation {
            debug!(guild_id, role = name, "Role missing and creation disabled");
            return Ok(None);
        }

        debug!(guild_id, role = name, "Need to create missing role");
        Ok(self
            .cache
            .create_role(guild_id, name)
            .await?
            .map(|role| MatchedRole {
                role,
                created: true,
            }))
    }

    /// Match many names, creating missing roles.
    ///
    /// Names are sanitized and deduplicated first, so each distinct sanitized
    /// name causes at most one creation. An empty list costs no API call.
    ///
    /// # Errors
    ///
    /// Propagates API and store errors.
    pub async fn match_or_create_roles_from_names<S: AsRef<str>>(
        &self,
        guild_id: u64,
        names: &[S],
    ) -> DiscordResult<Vec<MatchedRole>> {
        let wanted = wanted_role_names(names);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut known = self.cache.guild_roles(guild_id, true).await?;
        let mut matched = Vec::with_capacity(wanted.len());
        for name in &wanted {
            let Some(found) = self
                .match_or_create_role_from_name(guild_id, name, Some(&known))
                .await?
            else {
                continue;
            };
            if found.created {
                known = known.union(&RolesSet::new([found.role.clone()]));
            }
            matched.push(found);
        }
        Ok(matched)
    }

    /// Like [`match_or_create_roles_from_names`](Self::match_or_create_roles_from_names)
    /// but returns just the roles.
    ///
    /// # Errors
    ///
    /// Propagates API and store errors.
    pub async fn match_or_create_roles_from_names_2<S: AsRef<str>>(
        &self,
        guild_id: u64,
        names: &[S],
    ) -> DiscordResult<RolesSet> {
        let matched = self.match_or_create_roles_from_names(guild_id, names).await?;
        Ok(RolesSet::from_matched_roles(&matched))
    }
}
