//! Service integration trait and account model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ServiceResult;

/// A local user's account on an external service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// Local owner (username in the community backend).
    pub owner: String,

    /// Identifier of the account on the external service.
    pub external_id: u64,

    /// Display name last pushed to the service.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ServiceAccount {
    /// Create an account with no display name.
    #[must_use]
    pub fn new(owner: impl Into<String>, external_id: u64) -> Self {
        Self {
            owner: owner.into(),
            external_id,
            display_name: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Outcome of a mutating call against a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Remote state was changed.
    Updated,
    /// Remote state already matched.
    Unchanged,
    /// The account no longer exists remotely. Routine, not an error.
    AccountGone,
    /// The service answered with an unexpected non-success status.
    Rejected,
}

impl SyncOutcome {
    /// Map the tri-state result used by client calls:
    /// `Some(true)` updated, `Some(false)` rejected, `None` gone.
    #[must_use]
    pub const fn from_tristate(result: Option<bool>) -> Self {
        match result {
            Some(true) => Self::Updated,
            Some(false) => Self::Rejected,
            None => Self::AccountGone,
        }
    }

    /// Whether the call left the remote side in the requested state.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Updated | Self::Unchanged)
    }
}

/// Capability interface implemented by every third-party service.
#[async_trait]
pub trait ServiceIntegration: Send + Sync {
    /// Registry name, e.g. `"discord"`.
    fn name(&self) -> &str;

    /// Make the account's remote groups match `group_names`.
    async fn update_groups(
        &self,
        account: &ServiceAccount,
        group_names: &[String],
    ) -> ServiceResult<SyncOutcome>;

    /// Push a display name.
    async fn sync_nickname(&self, account: &ServiceAccount, nick: &str)
        -> ServiceResult<SyncOutcome>;

    /// Remove the account from the service.
    async fn delete_account(&self, account: &ServiceAccount) -> ServiceResult<SyncOutcome>;

    /// Whether the account still exists remotely.
    async fn validate_account(&self, account: &ServiceAccount) -> ServiceResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_tristate() {
        assert_eq!(SyncOutcome::from_tristate(Some(true)), SyncOutcome::Updated);
        assert_eq!(SyncOutcome::from_tristate(Some(false)), SyncOutcome::Rejected);
        assert_eq!(SyncOutcome::from_tristate(None), SyncOutcome::AccountGone);
        assert!(SyncOutcome::Unchanged.is_success());
        assert!(!SyncOutcome::AccountGone.is_success());
    }

    #[test]
    fn test_account_serde() {
        let account = ServiceAccount::new("bruce", 42).with_display_name("Bruce Wayne");
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["external_id"], 42);

        let back: ServiceAccount =
            serde_json::from_str(r#"{"owner":"bruce","external_id":42}"#).unwrap();
        assert_eq!(back.display_name, None);
        assert_eq!(back.external_id, account.external_id);
    }
}
