//! Role collections.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Serializer};

use crate::types::{sanitize_role_name, Role};

/// A role matched by name, and whether it had to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRole {
    pub role: Role,
    pub created: bool,
}

/// Immutable, deduplicated set of roles keyed by id.
///
/// Two sets are equal when they hold the same role ids.
#[derive(Debug, Clone, Default)]
pub struct RolesSet {
    roles: BTreeMap<u64, Role>,
}

impl RolesSet {
    /// Build from roles. A later role replaces an earlier one with the same id.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().map(|role| (role.id, role)).collect(),
        }
    }

    /// Build from the result of a match-or-create pass.
    #[must_use]
    pub fn from_matched_roles(matched: &[MatchedRole]) -> Self {
        Self::new(matched.iter().map(|m| m.role.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Roles in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    #[must_use]
    pub fn contains(&self, role_id: u64) -> bool {
        self.roles.contains_key(&role_id)
    }

    /// All role ids.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<u64> {
        self.roles.keys().copied().collect()
    }

    /// Whether every id in `role_ids` is part of this set, managed roles included.
    pub fn has_roles<'a>(&self, role_ids: impl IntoIterator<Item = &'a u64>) -> bool {
        role_ids.into_iter().all(|id| self.roles.contains_key(id))
    }

    /// Roles whose ids are in `role_ids`.
    #[must_use]
    pub fn subset(&self, role_ids: &BTreeSet<u64>) -> Self {
        self.filtered(|role| role_ids.contains(&role.id))
    }

    /// Roles owned by an integration.
    #[must_use]
    pub fn managed_only(&self) -> Self {
        self.filtered(|role| role.managed)
    }

    /// Roles whose names match one of `names`, ignoring case.
    /// Names are sanitized before comparing.
    #[must_use]
    pub fn subset_by_names<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let wanted: BTreeSet<String> = names
            .iter()
            .map(|name| sanitize_role_name(name.as_ref()).to_lowercase())
            .collect();
        self.filtered(|role| wanted.contains(&role.name.to_lowercase()))
    }

    /// Roles in either set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.iter().chain(other.iter()).cloned())
    }

    /// Roles in this set but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.filtered(|role| !other.contains(role.id))
    }

    /// Role whose name equals the sanitized `name` exactly.
    #[must_use]
    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        let name = sanitize_role_name(name);
        self.iter().find(|role| role.name == name)
    }

    fn filtered(&self, keep: impl Fn(&Role) -> bool) -> Self {
        Self::new(self.iter().filter(|role| keep(role)).cloned())
    }
}

impl PartialEq for RolesSet {
    fn eq(&self, other: &Self) -> bool {
        self.roles.keys().eq(other.roles.keys())
    }
}

impl Eq for RolesSet {}

impl FromIterator<Role> for RolesSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a RolesSet {
    type Item = &'a Role;
    type IntoIter = std::collections::btree_map::Values<'a, u64, Role>;

    fn into_iter(self) -> Self::IntoIter {
        self.roles.values()
    }
}

impl Serialize for RolesSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Changes needed to move a member from one role set to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDelta {
    pub to_add: RolesSet,
    pub to_remove: RolesSet,
}

impl RoleDelta {
    #[must_use]
    pub fn between(current: &RolesSet, target: &RolesSet) -> Self {
        Self {
            to_add: target.difference(current),
            to_remove: current.difference(target),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}
