//! Discord client configuration.

use std::time::Duration;

use guildsync_ratelimit::RateLimitPolicy;
use guildsync_telemetry::{default_redact_fields, mask_secret};
use serde::{Deserialize, Serialize};

use crate::error::{DiscordError, DiscordResult};

/// Configuration for the Discord client.
#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from the Discord Developer Portal
    pub bot_token: String,

    /// Guild the service integration manages
    #[serde(default)]
    pub guild_id: u64,

    /// Base URL for the Discord API (default: https://discord.com/api/v10)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Connect timeout
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Total request timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// How long a guild's role list stays cached
    #[serde(default = "default_roles_cache_max_age", with = "duration_secs")]
    pub roles_cache_max_age: Duration,

    /// How long a guild's name stays cached
    #[serde(default = "default_guild_name_cache_max_age", with = "duration_secs")]
    pub guild_name_cache_max_age: Duration,

    /// Never create missing roles when matching names
    #[serde(default)]
    pub disable_role_creation: bool,

    /// Gate calls through the shared rate limiter. Turn off only for callers
    /// that cannot race with anyone else.
    #[serde(default = "default_true")]
    pub is_rate_limited: bool,

    /// Namespace for all keys in the shared store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Rate limit tunables
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,

    /// Application name sent in the user agent
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Homepage sent in the user agent
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// Body fields scrubbed before a request body is logged
    #[serde(default = "default_redact_fields")]
    pub redact_fields: Vec<String>,
}

fn default_api_url() -> String {
    "https://discord.com/api/v10".into()
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_roles_cache_max_age() -> Duration {
    Duration::from_secs(3600)
}

const fn default_guild_name_cache_max_age() -> Duration {
    Duration::from_secs(86_400)
}

const fn default_true() -> bool {
    true
}

fn default_key_prefix() -> String {
    "discord".into()
}

fn default_app_name() -> String {
    "guildsync".into()
}

fn default_app_url() -> String {
    "https://github.com/guildsync/guildsync".into()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            guild_id: 0,
            api_url: default_api_url(),
            connect_timeout: default_connect_timeout(),
            timeout: default_timeout(),
            roles_cache_max_age: default_roles_cache_max_age(),
            guild_name_cache_max_age: default_guild_name_cache_max_age(),
            disable_role_creation: false,
            is_rate_limited: true,
            key_prefix: default_key_prefix(),
            rate_limit: RateLimitPolicy::default(),
            app_name: default_app_name(),
            app_url: default_app_url(),
            redact_fields: default_redact_fields(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &mask_secret(&self.bot_token))
            .field("guild_id", &self.guild_id)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("disable_role_creation", &self.disable_role_creation)
            .field("is_rate_limited", &self.is_rate_limited)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl DiscordConfig {
    /// Configuration with the given token and defaults for everything else.
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            ..Self::default()
        }
    }

    /// Overlay `DISCORD_*` environment variables on `self`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidArgument`] for a variable that does not parse.
    pub fn with_env(self) -> DiscordResult<Self> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with `DISCORD_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidArgument`] for a variable that does not parse.
    pub fn from_env() -> DiscordResult<Self> {
        Self::default().with_env()
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> DiscordResult<Self> {
        if let Some(token) = var("DISCORD_BOT_TOKEN") {
            self.bot_token = token;
        }
        if let Some(value) = var("DISCORD_GUILD_ID") {
            self.guild_id = parse_var("DISCORD_GUILD_ID", &value)?;
        }
        if let Some(url) = var("DISCORD_API_BASE_URL") {
            self.api_url = url;
        }
        if let Some(value) = var("DISCORD_DISABLE_ROLE_CREATION") {
            self.disable_role_creation = parse_bool("DISCORD_DISABLE_ROLE_CREATION", &value)?;
        }
        if let Some(value) = var("DISCORD_ROLES_CACHE_MAX_AGE") {
            self.roles_cache_max_age =
                Duration::from_secs(parse_var("DISCORD_ROLES_CACHE_MAX_AGE", &value)?);
        }
        if let Some(value) = var("DISCORD_GUILD_NAME_CACHE_MAX_AGE") {
            self.guild_name_cache_max_age =
                Duration::from_secs(parse_var("DISCORD_GUILD_NAME_CACHE_MAX_AGE", &value)?);
        }
        Ok(self)
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::MissingToken`] if no bot token is set.
    pub fn validate(&self) -> DiscordResult<()> {
        if self.bot_token.trim().is_empty() {
            return Err(DiscordError::MissingToken);
        }
        Ok(())
    }

    /// Token without any `Bot ` prefix.
    #[must_use]
    pub fn normalized_token(&self) -> &str {
        let token = self.bot_token.trim();
        token.strip_prefix("Bot ").unwrap_or(token)
    }

    /// User agent in the form the API asks bots to send.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!(
            "{} ({}, {})",
            self.app_name,
            self.app_url,
            env!("CARGO_PKG_VERSION")
        )
    }
}

fn parse_var(name: &str, value: &str) -> DiscordResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| DiscordError::InvalidArgument(format!("{name} must be an integer, got {value:?}")))
}

fn parse_bool(name: &str, value: &str) -> DiscordResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(DiscordError::InvalidArgument(format!(
            "{name} must be a boolean, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: DiscordConfig = serde_json::from_str(r#"{"bot_token": "abc"}"#).unwrap();

        assert_eq!(config.api_url, "https://discord.com/api/v10");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.roles_cache_max_age, Duration::from_secs(3600));
        assert_eq!(config.guild_name_cache_max_age, Duration::from_secs(86_400));
        assert!(config.is_rate_limited);
        assert!(!config.disable_role_creation);
        assert_eq!(config.key_prefix, "discord");
        assert_eq!(config.rate_limit, RateLimitPolicy::default());
        assert_eq!(config.redact_fields, default_redact_fields());
    }

    #[test]
    fn test_rate_limit_overrides_from_json() {
        let config: DiscordConfig = serde_json::from_str(
            r#"{
                "bot_token": "abc",
                "api_url": "https://discord.com/api/v6",
                "rate_limit": {"retry_after_unit": "milliseconds", "max_requests": 10},
                "redact_fields": ["nick"]
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.rate_limit.retry_after_unit,
            guildsync_ratelimit::RetryAfterUnit::Milliseconds
        );
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.resets_after_ms, 5000);
        assert_eq!(config.redact_fields, vec!["nick".to_string()]);
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DISCORD_BOT_TOKEN", "token-12345"),
            ("DISCORD_GUILD_ID", "42"),
            ("DISCORD_DISABLE_ROLE_CREATION", "True"),
            ("DISCORD_ROLES_CACHE_MAX_AGE", "60"),
        ]);
        let config = DiscordConfig::default()
            .with_vars(|name| vars.get(name).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.bot_token, "token-12345");
        assert_eq!(config.guild_id, 42);
        assert!(config.disable_role_creation);
        assert_eq!(config.roles_cache_max_age, Duration::from_secs(60));
        assert_eq!(config.guild_name_cache_max_age, Duration::from_secs(86_400));
    }

    #[test]
    fn test_env_overlay_rejects_garbage() {
        let result = DiscordConfig::default().with_vars(|name| {
            (name == "DISCORD_GUILD_ID").then(|| "forty-two".to_string())
        });
        assert!(matches!(result, Err(DiscordError::InvalidArgument(_))));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            DiscordConfig::default().validate(),
            Err(DiscordError::MissingToken)
        ));
        assert!(DiscordConfig::new("abc").validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = DiscordConfig::new("MTIzNDU2Nzg5.secret-part.XyZ12");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-part"));
        assert!(debug.contains("...XyZ12"));
    }

    #[test]
    fn test_normalized_token_and_user_agent() {
        let config = DiscordConfig::new("Bot abc");
        assert_eq!(config.normalized_token(), "abc");
        assert!(config
            .user_agent()
            .starts_with("guildsync (https://github.com/guildsync/guildsync, "));
    }
}
