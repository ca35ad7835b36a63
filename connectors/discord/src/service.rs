//! `ServiceIntegration` for a single Discord guild.

use std::sync::Arc;

use async_trait::async_trait;
use guildsync_core::{ServiceAccount, ServiceIntegration, ServiceResult, SyncOutcome};
use tracing::{debug, info};

use crate::client::DiscordClient;
use crate::error::{DiscordError, DiscordResult};

/// Registry name of the Discord integration.
pub const SERVICE_NAME: &str = "discord";

/// Keeps accounts of one guild in line with their local groups.
///
/// Roles named in `reserved_names` are never removed from a member, nor are
/// roles managed by integrations.
#[derive(Debug, Clone)]
pub struct DiscordService {
    client: Arc<DiscordClient>,
    guild_id: u64,
    reserved_names: Vec<String>,
}

impl DiscordService {
    /// Create a service for `guild_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidArgument`] if `guild_id` is zero.
    pub fn new(client: Arc<DiscordClient>, guild_id: u64) -> DiscordResult<Self> {
        if guild_id == 0 {
            return Err(DiscordError::InvalidArgument("guild id must be set".into()));
        }
        Ok(Self {
            client,
            guild_id,
            reserved_names: Vec::new(),
        })
    }

    /// Role names that survive every sync.
    #[must_use]
    pub fn with_reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn guild_id(&self) -> u64 {
        self.guild_id
    }

    #[must_use]
    pub fn reserved_names(&self) -> &[String] {
        &self.reserved_names
    }

    #[must_use]
    pub fn client(&self) -> &DiscordClient {
        &self.client
    }
}

#[async_trait]
impl ServiceIntegration for DiscordService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn update_groups(
        &self,
        account: &ServiceAccount,
        group_names: &[String],
    ) -> ServiceResult<SyncOutcome> {
        debug!(
            owner = %account.owner,
            user_id = account.external_id,
            groups = ?group_names,
            "Updating Discord roles"
        );
        let outcome = self
            .client
            .sync_member_roles(
                self.guild_id,
                account.external_id,
                group_names,
                &self.reserved_names,
            )
            .await?;
        Ok(outcome)
    }

    async fn sync_nickname(&self, account: &ServiceAccount, nick: &str) -> ServiceResult<SyncOutcome> {
        let result = self
            .client
            .modify_guild_member(self.guild_id, account.external_id, None, Some(nick))
            .await?;
        let outcome = SyncOutcome::from_tristate(result);
        info!(owner = %account.owner, ?outcome, "Synced Discord nickname");
        Ok(outcome)
    }

    async fn delete_account(&self, account: &ServiceAccount) -> ServiceResult<SyncOutcome> {
        let result = self
            .client
            .remove_guild_member(self.guild_id, account.external_id)
            .await?;
        let outcome = SyncOutcome::from_tristate(result);
        info!(owner = %account.owner, ?outcome, "Removed Discord member");
        Ok(outcome)
    }

    async fn validate_account(&self, account: &ServiceAccount) -> ServiceResult<bool> {
        let member = self
            .client
            .guild_member(self.guild_id, account.external_id)
            .await?;
        Ok(member.is_some())
    }
}
