//! Discord API types.
//!
//! Only the objects and fields the sync client needs. Snowflake ids are
//! integers here and strings on the wire.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize};

/// Longest role name the API accepts.
pub const ROLE_NAME_MAX_CHARS: usize = 100;

/// Longest nickname the API accepts.
pub const NICK_MAX_CHARS: usize = 32;

/// Trim and cut to at most `max_chars` characters.
///
/// Idempotent: a sanitized value sanitizes to itself.
fn truncate_trimmed(value: &str, max_chars: usize) -> String {
    let truncated: String = value.trim().chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

/// Normalize a role name before comparing it with or sending it to the API.
#[must_use]
pub fn sanitize_role_name(name: &str) -> String {
    truncate_trimmed(name, ROLE_NAME_MAX_CHARS)
}

/// Normalize a nickname before sending it to the API.
#[must_use]
pub fn sanitize_nick(nick: &str) -> String {
    truncate_trimmed(nick, NICK_MAX_CHARS)
}

/// Serde helpers for snowflake ids.
pub(crate) mod snowflake {
    use std::collections::BTreeSet;

    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    impl Raw {
        fn into_id<E: de::Error>(self) -> Result<u64, E> {
            match self {
                Self::Num(id) => Ok(id),
                Self::Str(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| E::custom(format!("invalid snowflake: {s:?}"))),
            }
        }
    }

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Raw::deserialize(deserializer)?.into_id()
    }

    pub mod set {
        use super::{BTreeSet, Deserialize, Deserializer, Raw, Serializer};

        pub fn serialize<S: Serializer>(
            ids: &BTreeSet<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(ids.iter().map(ToString::to_string))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<BTreeSet<u64>, D::Error> {
            Vec::<Raw>::deserialize(deserializer)?
                .into_iter()
                .map(Raw::into_id)
                .collect()
        }
    }
}

fn deserialize_role_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    String::deserialize(deserializer).map(|name| sanitize_role_name(&name))
}

fn deserialize_nick<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|nick| sanitize_nick(&nick))
        .filter(|nick| !nick.is_empty()))
}

/// Discord user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    #[serde(with = "snowflake")]
    pub id: u64,

    /// Username
    pub username: String,

    /// Discriminator (legacy, `"0"` for migrated users)
    #[serde(default)]
    pub discriminator: String,
}

/// Discord role. Equality and hashing use the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Role ID
    #[serde(with = "snowflake")]
    pub id: u64,

    /// Sanitized role name
    #[serde(deserialize_with = "deserialize_role_name")]
    pub name: String,

    /// Whether the role is owned by an integration (bots, boosts)
    #[serde(default)]
    pub managed: bool,
}

impl Role {
    /// Create an unmanaged role, sanitizing the name.
    #[must_use]
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: sanitize_role_name(name),
            managed: false,
        }
    }

    /// Mark the role as managed.
    #[must_use]
    pub const fn managed(mut self) -> Self {
        self.managed = true;
        self
    }
}

impl PartialEq for Role {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Role {}

impl Hash for Role {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Discord guild (server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guild {
    /// Guild ID
    #[serde(with = "snowflake")]
    pub id: u64,

    /// Guild name
    pub name: String,

    /// All roles of the guild
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Member of a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    /// Ids of the roles assigned to the member
    #[serde(with = "snowflake::set")]
    pub roles: BTreeSet<u64>,

    /// Guild-specific nickname
    #[serde(default, deserialize_with = "deserialize_nick")]
    pub nick: Option<String>,

    /// The user behind the membership
    #[serde(default)]
    pub user: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_role_name() {
        assert_eq!(sanitize_role_name("  Pilots "), "Pilots");
        assert_eq!(sanitize_role_name(&"x".repeat(150)).chars().count(), 100);
        assert_eq!(sanitize_role_name(""), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "plain".to_string(),
            "  padded  ".to_string(),
            format!("{} tail", "a".repeat(98)),
            format!("{}   ", "b".repeat(99)),
            "é".repeat(120),
            " \t ".to_string(),
        ];
        for sample in &samples {
            let once = sanitize_role_name(sample);
            assert_eq!(sanitize_role_name(&once), once, "role name {sample:?}");
            let once = sanitize_nick(sample);
            assert_eq!(sanitize_nick(&once), once, "nick {sample:?}");
        }
    }

    #[test]
    fn test_sanitize_counts_chars_not_bytes() {
        let name = "ü".repeat(101);
        assert_eq!(sanitize_role_name(&name), "ü".repeat(100));
        assert_eq!(sanitize_nick(&"ß".repeat(40)), "ß".repeat(32));
    }

    #[test]
    fn test_role_from_api() {
        let role: Role = serde_json::from_value(json!({
            "id": "123456789012345678",
            "name": format!("  {}", "r".repeat(120)),
            "managed": true,
            "color": 0
        }))
        .unwrap();

        assert_eq!(role.id, 123_456_789_012_345_678);
        assert_eq!(role.name.len(), 100);
        assert!(role.managed);

        let back = serde_json::to_value(&role).unwrap();
        assert_eq!(back["id"], "123456789012345678");
    }

    #[test]
    fn test_role_equality_by_id() {
        assert_eq!(Role::new(1, "a"), Role::new(1, "b"));
        assert_ne!(Role::new(1, "a"), Role::new(2, "a"));
    }

    #[test]
    fn test_member_from_api() {
        let member: GuildMember = serde_json::from_value(json!({
            "user": {"id": "7", "username": "bruce", "discriminator": "0"},
            "nick": "Bruce Wayne of the Very Long Corporation Name",
            "roles": ["3", "1", "3"]
        }))
        .unwrap();

        assert_eq!(member.roles, BTreeSet::from([1, 3]));
        assert_eq!(member.nick.as_deref().map(str::len), Some(32));
        assert_eq!(member.user.unwrap().id, 7);
    }

    #[test]
    fn test_member_without_nick() {
        let member: GuildMember =
            serde_json::from_value(json!({"roles": [], "nick": null})).unwrap();
        assert!(member.roles.is_empty());
        assert_eq!(member.nick, None);
        assert_eq!(member.user, None);
    }

    #[test]
    fn test_invalid_snowflake_rejected() {
        let result: Result<Role, _> =
            serde_json::from_value(json!({"id": "abc", "name": "x", "managed": false}));
        assert!(result.is_err());
    }
}
