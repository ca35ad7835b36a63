//! Property tests for name sanitizing and role name de-duplication.

use std::collections::HashSet;

use guildsync_discord::{
    sanitize_nick, sanitize_role_name, wanted_role_names, NICK_MAX_CHARS, ROLE_NAME_MAX_CHARS,
};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Names with surrounding and inner whitespace, multi-byte characters and
/// lengths on both sides of the API limits.
fn raw_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ \t\n]{0,3}[a-zA-Z0-9 _-]{0,140}[ \t\n]{0,3}",
        "[ ]{0,2}[éßø漢字🦀 ]{0,120}",
        any::<String>(),
    ]
}

/// Group lists that often repeat a name up to whitespace.
fn group_names() -> impl Strategy<Value = Vec<String>> {
    let base = prop::collection::vec("[A-Za-z ]{0,6}", 1..5);
    (base, prop::collection::vec((0usize..5, "[ ]{0,2}", "[ ]{0,2}"), 0..12)).prop_map(
        |(base, picks)| {
            picks
                .into_iter()
                .map(|(i, pre, post)| format!("{pre}{}{post}", base[i % base.len()]))
                .collect()
        },
    )
}

fn is_trimmed(value: &str) -> bool {
    value.trim() == value
}

// ─────────────────────────────────────────────────────────────────────────────
// Sanitizing
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_role_name_sanitize_is_idempotent(name in raw_name()) {
        let once = sanitize_role_name(&name);
        prop_assert_eq!(sanitize_role_name(&once), once.clone());
        prop_assert!(once.chars().count() <= ROLE_NAME_MAX_CHARS);
        prop_assert!(is_trimmed(&once));
    }

    #[test]
    fn prop_nick_sanitize_is_idempotent(nick in raw_name()) {
        let once = sanitize_nick(&nick);
        prop_assert_eq!(sanitize_nick(&once), once.clone());
        prop_assert!(once.chars().count() <= NICK_MAX_CHARS);
        prop_assert!(is_trimmed(&once));
    }

    #[test]
    fn prop_short_trimmed_names_are_untouched(name in "[a-zA-Z0-9]([a-zA-Z0-9 ]{0,30}[a-zA-Z0-9])?") {
        prop_assert_eq!(sanitize_role_name(&name), name.clone());
        prop_assert_eq!(sanitize_nick(&name), name);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// De-duplication
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_wanted_names_are_the_distinct_sanitized_names(names in group_names()) {
        let wanted = wanted_role_names(&names);

        let distinct: HashSet<String> = names.iter().map(|n| sanitize_role_name(n)).collect();
        prop_assert_eq!(wanted.len(), distinct.len());

        let unique: HashSet<&String> = wanted.iter().collect();
        prop_assert_eq!(unique.len(), wanted.len());
        prop_assert!(wanted.iter().all(|n| distinct.contains(n)));
    }

    #[test]
    fn prop_wanted_names_keep_first_occurrence_order(names in group_names()) {
        let wanted = wanted_role_names(&names);

        let mut expected: Vec<String> = Vec::new();
        for name in &names {
            let clean = sanitize_role_name(name);
            if !expected.contains(&clean) {
                expected.push(clean);
            }
        }
        prop_assert_eq!(wanted, expected);
    }
}
