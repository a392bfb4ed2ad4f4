//! Change tracking against the last persisted state.
//!
//! All functions here are pure. A field is *changed* when the snapshot
//! has no entry for it or holds a different value under strict equality.

use crate::value::{Row, Value};

/// Returns true if `field` differs between `fields` and `snapshot`.
///
/// A field missing from `fields` reads as [`Value::Null`]. A missing
/// snapshot means nothing has been persisted yet, so everything is changed.
pub fn field_changed(field: &str, fields: &Row, snapshot: Option<&Row>) -> bool {
    let Some(snapshot) = snapshot else {
        return true;
    };
    match snapshot.get(field) {
        None => true,
        Some(old) => fields.get(field).unwrap_or(&Value::Null) != old,
    }
}

/// Returns the names in `declared` whose values changed, in declaration order.
pub fn diff<'a, I>(declared: I, fields: &Row, snapshot: Option<&Row>) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    declared
        .into_iter()
        .filter(|field| field_changed(field, fields, snapshot))
        .cloned()
        .collect()
}

/// Returns true if any of `names` changed.
pub fn any_changed<'a, I>(names: I, fields: &Row, snapshot: Option<&Row>) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .any(|field| field_changed(field, fields, snapshot))
}

/// Builds the write delta for an update.
///
/// Includes every field of `declared` that is not in `primary_key`, is
/// currently set (non-null) and changed. A field that became null since the
/// snapshot is left out, so an update never writes an explicit null.
pub fn update_delta(
    declared: &[String],
    primary_key: &[String],
    fields: &Row,
    snapshot: Option<&Row>,
) -> Row {
    declared
        .iter()
        .filter(|field| !primary_key.contains(*field))
        .filter_map(|field| {
            let value = fields.get(field).filter(|v| v.is_set())?;
            field_changed(field, fields, snapshot).then(|| (field.clone(), value.clone()))
        })
        .collect()
}

/// Returns true if every primary-key field is set and equal to its snapshot value.
///
/// An empty key or a missing snapshot never match.
pub fn keys_match(primary_key: &[String], fields: &Row, snapshot: Option<&Row>) -> bool {
    let Some(snapshot) = snapshot else {
        return false;
    };
    !primary_key.is_empty()
        && primary_key.iter().all(|field| match fields.get(field) {
            Some(value) if value.is_set() => snapshot.get(field) == Some(value),
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn no_snapshot_means_everything_changed() {
        let declared = names(&["id", "name"]);
        let fields = row! { "id" => 1 };
        assert_eq!(diff(&declared, &fields, None), declared);
    }

    #[test]
    fn strict_comparison() {
        let declared = names(&["a", "b"]);
        let fields = row! { "a" => 1, "b" => "x" };
        let snapshot = row! { "a" => "1", "b" => "x" };
        assert_eq!(diff(&declared, &fields, Some(&snapshot)), names(&["a"]));
    }

    #[test]
    fn missing_snapshot_key_is_changed() {
        let fields = row! { "a" => 1 };
        let snapshot = row! {};
        assert!(field_changed("a", &fields, Some(&snapshot)));
        assert!(any_changed(["a"], &fields, Some(&snapshot)));
        assert!(!any_changed(std::iter::empty::<&str>(), &fields, Some(&snapshot)));
    }

    #[test]
    fn delta_skips_keys_and_unset_fields() {
        let declared = names(&["id", "name", "email", "age"]);
        let pk = names(&["id"]);
        let fields = row! { "id" => 9, "name" => "new", "email" => (), "age" => 30 };
        let snapshot = row! { "id" => 1, "name" => "old", "email" => "a@b", "age" => 30 };

        let delta = update_delta(&declared, &pk, &fields, Some(&snapshot));
        assert_eq!(delta, row! { "name" => "new" });
    }

    #[test]
    fn key_match_requires_set_values() {
        let pk = names(&["id"]);
        let snapshot = row! { "id" => 5 };
        assert!(keys_match(&pk, &row! { "id" => 5 }, Some(&snapshot)));
        assert!(!keys_match(&pk, &row! { "id" => 6 }, Some(&snapshot)));
        assert!(!keys_match(&pk, &row! { "id" => () }, Some(&row! { "id" => () })));
        assert!(!keys_match(&pk, &row! { "id" => 5 }, None));
        assert!(!keys_match(&[], &row! { "id" => 5 }, Some(&snapshot)));
    }
}
