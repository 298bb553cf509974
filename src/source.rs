use std::collections::BTreeMap;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

/// Which legacy shape a collection is decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    User,
    Employee,
    Profile,
    Balance,
    LeaveRequest,
    Settings,
    Department,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSource {
    pub email: Option<String>,
    #[serde(alias = "display_name")]
    pub display_name: Option<String>,
    #[serde(alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(alias = "last_name")]
    pub last_name: Option<String>,
    pub role: Option<String>,
    #[serde(alias = "phone_number")]
    pub phone_number: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
    pub status: Option<String>,
    #[serde(alias = "employee_id")]
    pub employee_id: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: Option<Value>,
    pub profile: Option<Map<String, Value>>,
    #[serde(alias = "leave_balance")]
    pub leave_balance: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSource {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(alias = "employee_id")]
    pub employee_id: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(alias = "last_name")]
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    #[serde(alias = "job_title")]
    pub job_title: Option<String>,
    #[serde(alias = "hourly_rate", default, deserialize_with = "lenient_number")]
    pub hourly_rate: Option<Number>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rate: Option<Number>,
    pub phone: Option<String>,
    #[serde(alias = "phone_number")]
    pub phone_number: Option<String>,
    pub address: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub skills: Option<Vec<String>>,
    #[serde(alias = "emergency_contact")]
    pub emergency_contact: Option<Map<String, Value>>,
    pub status: Option<String>,
    #[serde(alias = "hire_date")]
    pub hire_date: Option<Value>,
    pub role: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: Option<Value>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSource {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(alias = "employee_id")]
    pub employee_id: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(alias = "last_name")]
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    #[serde(alias = "hourly_rate", default, deserialize_with = "lenient_number")]
    pub hourly_rate: Option<Number>,
    pub phone: Option<String>,
    pub address: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub skills: Option<Vec<String>>,
    #[serde(alias = "emergency_contact")]
    pub emergency_contact: Option<Map<String, Value>>,
    pub status: Option<String>,
    pub bio: Option<String>,
    #[serde(alias = "hire_date")]
    pub hire_date: Option<Value>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSource {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(alias = "employee_id")]
    pub employee_id: Option<String>,
    pub email: Option<String>,
    pub vacation_total: Option<Number>,
    pub vacation_days: Option<Number>,
    pub vacation_used: Option<Number>,
    pub vacation_available: Option<Number>,
    pub sick_total: Option<Number>,
    pub sick_days: Option<Number>,
    pub sick_used: Option<Number>,
    pub sick_available: Option<Number>,
    pub personal_total: Option<Number>,
    pub personal_days: Option<Number>,
    pub personal_used: Option<Number>,
    pub personal_available: Option<Number>,
    pub vacation: Option<Map<String, Value>>,
    pub sick: Option<Map<String, Value>>,
    pub personal: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequestSource {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(alias = "employee_id")]
    pub employee_id: Option<String>,
    #[serde(alias = "user_name")]
    pub user_name: Option<String>,
    #[serde(alias = "employee_name")]
    pub employee_name: Option<String>,
    #[serde(alias = "leave_type")]
    pub leave_type: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(alias = "start_date")]
    pub start_date: Option<Value>,
    #[serde(alias = "end_date")]
    pub end_date: Option<Value>,
    pub days: Option<Number>,
    pub number_of_days: Option<Number>,
    pub total_days: Option<Number>,
    pub reason: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "approved_by")]
    pub approved_by: Option<String>,
    #[serde(alias = "approved_at")]
    pub approved_at: Option<Value>,
    #[serde(alias = "rejection_reason")]
    pub rejection_reason: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: Option<Value>,
    #[serde(alias = "updated_at")]
    pub updated_at: Option<Value>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

/// Settings documents are free-form sections; only the leave policy knobs
/// are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSource {
    pub annual_vacation_days: Option<Number>,
    pub vacation_days: Option<Number>,
    pub sick_days: Option<Number>,
    pub personal_days: Option<Number>,
    pub carry_over_days: Option<Number>,
    pub require_approval: Option<bool>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSource {
    pub name: Option<String>,
    pub description: Option<String>,
    pub manager: Option<String>,
    #[serde(alias = "manager_id")]
    pub manager_id: Option<String>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherSource {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceBody {
    User(UserSource),
    Employee(EmployeeSource),
    Profile(ProfileSource),
    Balance(BalanceSource),
    LeaveRequest(LeaveRequestSource),
    Settings(SettingsSource),
    Department(DepartmentSource),
    Other(OtherSource),
}

impl SourceBody {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceBody::User(_) => SourceKind::User,
            SourceBody::Employee(_) => SourceKind::Employee,
            SourceBody::Profile(_) => SourceKind::Profile,
            SourceBody::Balance(_) => SourceKind::Balance,
            SourceBody::LeaveRequest(_) => SourceKind::LeaveRequest,
            SourceBody::Settings(_) => SourceKind::Settings,
            SourceBody::Department(_) => SourceKind::Department,
            SourceBody::Other(_) => SourceKind::Other,
        }
    }

    fn decode(kind: SourceKind, body: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            SourceKind::User => SourceBody::User(decode_as(body)?),
            SourceKind::Employee => SourceBody::Employee(decode_as(body)?),
            SourceKind::Profile => SourceBody::Profile(decode_as(body)?),
            SourceKind::Balance => SourceBody::Balance(decode_as(body)?),
            SourceKind::LeaveRequest => SourceBody::LeaveRequest(decode_as(body)?),
            SourceKind::Settings => SourceBody::Settings(decode_as(body)?),
            SourceKind::Department => SourceBody::Department(decode_as(body)?),
            SourceKind::Other => SourceBody::Other(decode_as(body)?),
        })
    }

    fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            SourceBody::User(row) => serde_json::to_value(row)?,
            SourceBody::Employee(row) => serde_json::to_value(row)?,
            SourceBody::Profile(row) => serde_json::to_value(row)?,
            SourceBody::Balance(row) => serde_json::to_value(row)?,
            SourceBody::LeaveRequest(row) => serde_json::to_value(row)?,
            SourceBody::Settings(row) => serde_json::to_value(row)?,
            SourceBody::Department(row) => serde_json::to_value(row)?,
            SourceBody::Other(row) => serde_json::to_value(row)?,
        };
        let mut fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        // Typed fields serialize absent values as null; drop them so lookups
        // see the same thing as a missing key.
        fields.retain(|_, v| !v.is_null());
        Ok(fields)
    }
}

fn decode_as<T: DeserializeOwned>(body: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(body)
}

/// Legacy HR exports hold skills either as a list or as one comma-separated
/// string.
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::List(items)) => Some(items),
        Some(Raw::Joined(joined)) => Some(
            joined
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        ),
    })
}

/// A number, or a string holding one. A blank string counts as absent.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<Number>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(Number),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(number)) => Ok(Some(number)),
        Some(Raw::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<Number>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("expected a number, found {text:?}")))
        }
    }
}

/// One legacy document, decoded into its typed shape.
///
/// The store-assigned id is authoritative: an `id` key inside the stored body
/// is discarded in favour of it. `fields` is the normalized view of `body`
/// used for field-path lookups during merging.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    id: String,
    collection: String,
    body: SourceBody,
    fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn decode(
        collection: impl Into<String>,
        id: impl Into<String>,
        kind: SourceKind,
        body: Value,
    ) -> Result<Self, serde_json::Error> {
        let body = match body {
            Value::Object(mut map) => {
                map.remove("id");
                Value::Object(map)
            }
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let body = SourceBody::decode(kind, body)?;
        Self::from_body(collection, id, body)
    }

    pub fn from_body(
        collection: impl Into<String>,
        id: impl Into<String>,
        body: SourceBody,
    ) -> Result<Self, serde_json::Error> {
        let fields = body.to_fields()?;
        Ok(Self {
            id: id.into(),
            collection: collection.into(),
            body,
            fields,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn kind(&self) -> SourceKind {
        self.body.kind()
    }

    pub fn body(&self) -> &SourceBody {
        &self.body
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Resolves a dotted field path. `id` always yields the store id and the
    /// empty path yields the whole body as an object.
    pub fn get(&self, path: &str) -> Option<Value> {
        if path.is_empty() {
            return Some(Value::Object(self.fields.clone()));
        }
        if path == "id" {
            return Some(Value::String(self.id.clone()));
        }
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }

    /// Field value rendered for identity comparisons. Empty strings and
    /// non-scalar values never take part in matching.
    pub fn identity_value(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_id_overrides_body_id() {
        let record = SourceRecord::decode(
            "users",
            "u1",
            SourceKind::User,
            json!({ "id": "stale", "email": "a@x.com" }),
        )
        .expect("decode user");
        assert_eq!(record.id(), "u1");
        assert_eq!(record.get("id"), Some(json!("u1")));
        assert!(!record.fields().contains_key("id"));
    }

    #[test]
    fn snake_case_aliases_normalize_to_camel_case() {
        let record = SourceRecord::decode(
            "employees",
            "e1",
            SourceKind::Employee,
            json!({ "user_id": "u1", "hourly_rate": 21.5, "first_name": "Ada" }),
        )
        .expect("decode employee");
        assert_eq!(record.get("userId"), Some(json!("u1")));
        assert_eq!(record.get("hourlyRate"), Some(json!(21.5)));
        assert_eq!(record.get("firstName"), Some(json!("Ada")));
    }

    #[test]
    fn unknown_fields_are_kept_and_nested_paths_resolve() {
        let record = SourceRecord::decode(
            "employees",
            "e1",
            SourceKind::Employee,
            json!({
                "emergencyContact": { "name": "Bo", "phone": "555" },
                "badge": { "number": 7 }
            }),
        )
        .expect("decode employee");
        assert_eq!(record.get("emergencyContact.name"), Some(json!("Bo")));
        assert_eq!(record.get("badge.number"), Some(json!(7)));
        assert_eq!(record.get("badge.missing"), None);
        assert_eq!(record.get("emergencyContact.name.deeper"), None);
    }

    #[test]
    fn null_fields_are_absent() {
        let record = SourceRecord::decode(
            "users",
            "u1",
            SourceKind::User,
            json!({ "email": null, "role": "admin" }),
        )
        .expect("decode user");
        assert_eq!(record.get("email"), None);
        assert_eq!(record.identity_value("email"), None);
        assert_eq!(record.get("role"), Some(json!("admin")));
    }

    #[test]
    fn wrongly_typed_field_is_rejected() {
        let err = SourceRecord::decode(
            "leaveBalances",
            "b1",
            SourceKind::Balance,
            json!({ "vacationTotal": "twenty" }),
        )
        .expect_err("string where number expected");
        assert!(err.is_data());
    }

    #[test]
    fn loosely_typed_skills_and_rates_are_coerced() {
        let record = SourceRecord::decode(
            "employees",
            "e1",
            SourceKind::Employee,
            json!({ "skills": "welding, first aid,", "hourlyRate": " 25.5 ", "rate": "" }),
        )
        .expect("decode employee");
        assert_eq!(record.get("skills"), Some(json!(["welding", "first aid"])));
        assert_eq!(record.get("hourlyRate"), Some(json!(25.5)));
        assert_eq!(record.get("rate"), None);
    }

    #[test]
    fn unparseable_rate_is_still_rejected() {
        let err = SourceRecord::decode(
            "employeeProfiles",
            "p1",
            SourceKind::Profile,
            json!({ "hourlyRate": "twenty" }),
        )
        .expect_err("rate must be numeric");
        assert!(err.is_data());
    }

    #[test]
    fn identity_value_trims_and_skips_blank() {
        let record = SourceRecord::decode(
            "employees",
            "e1",
            SourceKind::Employee,
            json!({ "email": "  ", "userId": " u1 " }),
        )
        .expect("decode employee");
        assert_eq!(record.identity_value("email"), None);
        assert_eq!(record.identity_value("userId").as_deref(), Some("u1"));
    }
}
