//! Reconcile one key/value snapshot against another.
//!
//! [`sync`] is pure: every decision comes from the callbacks, so prompting
//! lives with the caller.

use std::collections::BTreeMap;

/// Merge `source` into `destination`.
///
/// `decide(key, source_value, destination_value, is_new)` picks the value
/// stored for each source key; `destination_value` is `""` when the key is
/// new. `decide_removal(key, destination_value)` is asked about every
/// destination key missing from `source` and drops it when it returns
/// `true`. Both callbacks see keys in lexicographic order.
pub fn sync<D, R>(
    source: &BTreeMap<String, String>,
    destination: &BTreeMap<String, String>,
    mut decide: D,
    mut decide_removal: R,
) -> BTreeMap<String, String>
where
    D: FnMut(&str, &str, &str, bool) -> String,
    R: FnMut(&str, &str) -> bool,
{
    let mut result = BTreeMap::new();

    for (key, source_value) in source {
        let existing = destination.get(key);
        let value = decide(
            key,
            source_value,
            existing.map(String::as_str).unwrap_or(""),
            existing.is_none(),
        );
        result.insert(key.clone(), value);
    }

    for (key, destination_value) in destination {
        if source.contains_key(key) {
            continue;
        }
        if !decide_removal(key, destination_value) {
            result.insert(key.clone(), destination_value.clone());
        }
    }

    result
}

/// The value `decide` would fall back to: the source value for new keys,
/// the current destination value otherwise.
pub fn default_value<'a>(source_value: &'a str, destination_value: &'a str, is_new: bool) -> &'a str {
    if is_new {
        source_value
    } else {
        destination_value
    }
}

/// Whether a destination key missing from the source is dropped when no
/// one is asked.
pub const REMOVE_MISSING_BY_DEFAULT: bool = true;

/// [`sync`] with every decision taken by default: existing destination
/// values are kept, new keys take the source value, and destination keys
/// missing from the source are removed.
pub fn sync_defaults(
    source: &BTreeMap<String, String>,
    destination: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    sync(
        source,
        destination,
        |_, src, dest, is_new| default_value(src, dest, is_new).to_string(),
        |_, _| REMOVE_MISSING_BY_DEFAULT,
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Write { key: String, value: String },
    Delete { key: String },
}

impl Change {
    pub fn key(&self) -> &str {
        match self {
            Change::Write { key, .. } | Change::Delete { key } => key,
        }
    }
}

/// What has to be written or deleted to turn `before` into `after`.
pub fn changes(before: &BTreeMap<String, String>, after: &BTreeMap<String, String>) -> Vec<Change> {
    let mut out = Vec::new();
    for (key, value) in after {
        if before.get(key) != Some(value) {
            out.push(Change::Write {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            out.push(Change::Delete { key: key.clone() });
        }
    }
    out.sort_by(|a, b| a.key().cmp(b.key()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn keep_existing(_: &str, src: &str, dest: &str, is_new: bool) -> String {
        default_value(src, dest, is_new).to_string()
    }

    #[test]
    fn keeps_destination_values_and_adds_new_keys() {
        let source = map(&[("db_host", "s.db"), ("db_port", "5432")]);
        let destination = map(&[("db_host", "p.db")]);
        let result = sync(&source, &destination, keep_existing, |_, _| false);
        assert_eq!(result, map(&[("db_host", "p.db"), ("db_port", "5432")]));
    }

    #[test]
    fn removal_callback_drops_extra_keys() {
        let source = map(&[("db_host", "s.db")]);
        let destination = map(&[("db_host", "p.db"), ("legacy_flag", "1")]);
        let result = sync(&source, &destination, keep_existing, |_, _| true);
        assert!(!result.contains_key("legacy_flag"));
        assert_eq!(result["db_host"], "p.db");

        let kept = sync(&source, &destination, keep_existing, |_, _| false);
        assert_eq!(kept["legacy_flag"], "1");
    }

    #[test]
    fn every_key_is_decided_exactly_once_in_order() {
        let source = map(&[("b", "1"), ("a", "2"), ("shared", "s")]);
        let destination = map(&[("shared", "d"), ("z", "9"), ("c", "3")]);

        let mut decided = Vec::new();
        let mut removals = Vec::new();
        let result = sync(
            &source,
            &destination,
            |k, s, _, _| {
                decided.push(k.to_string());
                s.to_string()
            },
            |k, _| {
                removals.push(k.to_string());
                false
            },
        );

        assert_eq!(decided, vec!["a", "b", "shared"]);
        assert_eq!(removals, vec!["c", "z"]);

        let decided: BTreeSet<_> = decided.into_iter().collect();
        let removals: BTreeSet<_> = removals.into_iter().collect();
        assert!(decided.is_disjoint(&removals));
        let all: BTreeSet<String> = source.keys().chain(destination.keys()).cloned().collect();
        let union: BTreeSet<String> = decided.union(&removals).cloned().collect();
        assert_eq!(union, all);
        assert!(result.keys().all(|k| all.contains(k)));
    }

    #[test]
    fn decide_sees_empty_destination_value_for_new_keys() {
        let source = map(&[("new", "v")]);
        let mut seen = None;
        sync(
            &source,
            &BTreeMap::new(),
            |k, s, d, is_new| {
                seen = Some((k.to_string(), s.to_string(), d.to_string(), is_new));
                s.to_string()
            },
            |_, _| panic!("nothing to remove"),
        );
        assert_eq!(seen, Some(("new".into(), "v".into(), "".into(), true)));
    }

    #[test]
    fn empty_source_only_filters_destination() {
        let destination = map(&[("a", "1"), ("b", "2")]);
        let result = sync(
            &BTreeMap::new(),
            &destination,
            |_, _, _, _| panic!("no source keys"),
            |k, _| k == "a",
        );
        assert_eq!(result, map(&[("b", "2")]));
    }

    #[test]
    fn second_pass_changes_nothing() {
        let source = map(&[("a", "1"), ("b", "2")]);
        let destination = map(&[("b", "old"), ("c", "3")]);
        let take_source = |_: &str, s: &str, _: &str, _: bool| s.to_string();

        let first = sync(&source, &destination, take_source, |_, _| true);
        let second = sync(&source, &first, take_source, |_, _| true);
        assert_eq!(first, second);
        assert!(changes(&first, &second).is_empty());
    }

    #[test]
    fn defaults_drop_keys_missing_from_source() {
        let source = map(&[("db_host", "s.db"), ("db_port", "5432")]);
        let destination = map(&[("db_host", "p.db"), ("legacy_flag", "1")]);
        let merged = sync_defaults(&source, &destination);
        assert_eq!(merged, map(&[("db_host", "p.db"), ("db_port", "5432")]));
        assert_eq!(
            changes(&destination, &merged),
            vec![
                Change::Write {
                    key: "db_port".to_string(),
                    value: "5432".to_string()
                },
                Change::Delete {
                    key: "legacy_flag".to_string()
                },
            ]
        );
    }

    #[test]
    fn changes_lists_writes_and_deletes_by_key() {
        let before = map(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let after = map(&[("a", "1"), ("b", "20"), ("d", "4")]);
        assert_eq!(
            changes(&before, &after),
            vec![
                Change::Write {
                    key: "b".into(),
                    value: "20".into()
                },
                Change::Delete { key: "c".into() },
                Change::Write {
                    key: "d".into(),
                    value: "4".into()
                },
            ]
        );
    }
}
