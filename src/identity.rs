//! Matching a primary record to its counterparts in other legacy sets.
//!
//! Resolution is first-match by input order: for each set the key priority
//! is walked top-down and the first key that matches anything decides the
//! result. There is no scoring; when several records share a key value the
//! earliest one in the set wins, so callers must hand in sets in a stable
//! order (the reader orders by document id).

use serde::Serialize;

use crate::source::SourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityKey {
    /// The store-assigned document id.
    Id,
    UserId,
    EmployeeId,
    Email,
}

impl IdentityKey {
    /// Field on the primary record that supplies this key's value.
    pub fn primary_field(self) -> &'static str {
        match self {
            IdentityKey::Id => "id",
            IdentityKey::UserId => "userId",
            IdentityKey::EmployeeId => "employeeId",
            IdentityKey::Email => "email",
        }
    }
}

/// Which fields of a secondary set are compared against each identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMapping {
    entries: Vec<(IdentityKey, Vec<&'static str>)>,
}

impl KeyMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, key: IdentityKey, fields: &[&'static str]) -> Self {
        self.entries.push((key, fields.to_vec()));
        self
    }

    pub fn fields_for(&self, key: IdentityKey) -> &[&'static str] {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, fields)| fields.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SecondarySet<'r> {
    pub records: &'r [SourceRecord],
    pub keys: &'r KeyMapping,
}

impl<'r> SecondarySet<'r> {
    pub fn new(records: &'r [SourceRecord], keys: &'r KeyMapping) -> Self {
        Self { records, keys }
    }
}

/// One optional match per secondary set, in the order the sets were given.
pub fn resolve<'r>(
    primary: &SourceRecord,
    sets: &[SecondarySet<'r>],
    priority: &[IdentityKey],
) -> Vec<Option<&'r SourceRecord>> {
    sets.iter()
        .map(|set| resolve_in_set(primary, set, priority))
        .collect()
}

fn resolve_in_set<'r>(
    primary: &SourceRecord,
    set: &SecondarySet<'r>,
    priority: &[IdentityKey],
) -> Option<&'r SourceRecord> {
    for key in priority {
        let Some(wanted) = primary.identity_value(key.primary_field()) else {
            continue;
        };
        let fields = set.keys.fields_for(*key);
        if fields.is_empty() {
            continue;
        }
        let hit = set.records.iter().find(|candidate| {
            fields
                .iter()
                .any(|field| candidate.identity_value(field).as_deref() == Some(wanted.as_str()))
        });
        if hit.is_some() {
            return hit;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;
    use serde_json::{json, Value};

    fn record(collection: &str, id: &str, kind: SourceKind, body: Value) -> SourceRecord {
        SourceRecord::decode(collection, id, kind, body).expect("decode fixture")
    }

    fn employee_keys() -> KeyMapping {
        KeyMapping::new()
            .map(IdentityKey::Id, &["userId"])
            .map(IdentityKey::Email, &["email"])
    }

    #[test]
    fn one_match_per_set_using_highest_key() {
        let primary = record("users", "u1", SourceKind::User, json!({ "email": "a@x.com" }));
        let by_user_id = vec![record("employees", "e1", SourceKind::Employee, json!({ "userId": "u1" }))];
        let by_email = vec![record("profiles", "p1", SourceKind::Profile, json!({ "email": "a@x.com" }))];
        let keys = employee_keys();

        let matches = resolve(
            &primary,
            &[SecondarySet::new(&by_user_id, &keys), SecondarySet::new(&by_email, &keys)],
            &[IdentityKey::Id, IdentityKey::Email],
        );
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].map(SourceRecord::id), Some("e1"));
        assert_eq!(matches[1].map(SourceRecord::id), Some("p1"));
    }

    #[test]
    fn higher_priority_key_wins_over_earlier_lower_priority_match() {
        let primary = record("users", "u1", SourceKind::User, json!({ "email": "a@x.com" }));
        let set = vec![
            record("employees", "e-email", SourceKind::Employee, json!({ "email": "a@x.com", "userId": "other" })),
            record("employees", "e-id", SourceKind::Employee, json!({ "userId": "u1" })),
        ];
        let keys = employee_keys();
        let matches = resolve(
            &primary,
            &[SecondarySet::new(&set, &keys)],
            &[IdentityKey::Id, IdentityKey::Email],
        );
        assert_eq!(matches[0].map(SourceRecord::id), Some("e-id"));
    }

    #[test]
    fn first_record_in_input_order_wins_ties() {
        let primary = record("users", "u1", SourceKind::User, json!({}));
        let set = vec![
            record("employees", "e2", SourceKind::Employee, json!({ "userId": "u1" })),
            record("employees", "e1", SourceKind::Employee, json!({ "userId": "u1" })),
        ];
        let keys = employee_keys();
        let matches = resolve(&primary, &[SecondarySet::new(&set, &keys)], &[IdentityKey::Id]);
        assert_eq!(matches[0].map(SourceRecord::id), Some("e2"));
    }

    #[test]
    fn empty_primary_value_and_unmapped_keys_are_skipped() {
        let primary = record("users", "u1", SourceKind::User, json!({ "email": "" }));
        let set = vec![record("balances", "b1", SourceKind::Balance, json!({ "email": "" }))];
        let keys = KeyMapping::new().map(IdentityKey::Email, &["email"]);
        let matches = resolve(
            &primary,
            &[SecondarySet::new(&set, &keys)],
            &[IdentityKey::Id, IdentityKey::Email],
        );
        assert_eq!(matches, vec![None]);
    }

    #[test]
    fn any_mapped_field_can_match() {
        let primary = record("users", "u7", SourceKind::User, json!({}));
        let set = vec![record("employees", "u7", SourceKind::Employee, json!({}))];
        let keys = KeyMapping::new().map(IdentityKey::Id, &["userId", "id"]);
        let matches = resolve(&primary, &[SecondarySet::new(&set, &keys)], &[IdentityKey::Id]);
        assert_eq!(matches[0].map(SourceRecord::id), Some("u7"));
    }
}
