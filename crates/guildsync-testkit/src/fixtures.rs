//! JSON fixtures shaped like chat API payloads.
//!
//! Ids are serialised as strings, as the API does.

use serde_json::{json, Value};

/// A role object.
#[must_use]
pub fn role(id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "managed": false,
        "color": 0,
        "hoist": false,
        "position": 1,
        "permissions": "0",
        "mentionable": false
    })
}

/// A role owned by an integration (bot roles, boosts).
#[must_use]
pub fn managed_role(id: u64, name: &str) -> Value {
    let mut value = role(id, name);
    value["managed"] = Value::Bool(true);
    value
}

/// A role list from `(id, name)` pairs.
#[must_use]
pub fn roles(pairs: &[(u64, &str)]) -> Value {
    Value::Array(pairs.iter().map(|(id, name)| role(*id, name)).collect())
}

/// A guild member.
#[must_use]
pub fn member(user_id: u64, role_ids: &[u64], nick: Option<&str>) -> Value {
    json!({
        "user": {
            "id": user_id.to_string(),
            "username": format!("user{user_id}"),
            "discriminator": "0"
        },
        "nick": nick,
        "roles": role_ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "joined_at": "2024-01-01T00:00:00.000000+00:00",
        "deaf": false,
        "mute": false
    })
}

/// A guild with its roles.
#[must_use]
pub fn guild(id: u64, name: &str, guild_roles: &[(u64, &str)]) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "roles": roles(guild_roles)
    })
}

/// The user object returned for `users/@me`.
#[must_use]
pub fn user(id: u64, username: &str) -> Value {
    json!({
        "id": id.to_string(),
        "username": username,
        "discriminator": "0",
        "avatar": null
    })
}
