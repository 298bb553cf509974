//! Canonical documents written by the consolidation steps.
//!
//! The merge engine produces untyped JSON objects; each step decodes the
//! merged object into one of the typed shapes here before writing, so a
//! [`FieldSpec`](crate::merge::FieldSpec) that forgets a required field fails
//! loudly instead of writing a half-formed document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// One document as handed to the store: a fixed id, its body, and the
/// top-level fields the store fills with its own commit time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDocument {
    pub id: String,
    pub body: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub server_timestamps: Vec<String>,
}

impl CanonicalDocument {
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            body,
            server_timestamps: Vec::new(),
        }
    }

    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamps.push(field.into());
        self
    }

    /// Decode the body into a typed canonical shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.body.clone()))
    }

    /// Re-encode the body from a typed canonical shape, keeping id and
    /// server timestamp declarations.
    pub fn normalized<T: Serialize>(mut self, typed: &T) -> Result<Self, serde_json::Error> {
        self.body = match serde_json::to_value(typed)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Ok(self)
    }

    /// Canonical byte encoding of the body; server timestamps are never part
    /// of it.
    pub fn body_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.body).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveAllowance {
    pub total: Number,
    pub used: Number,
    pub available: Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveBalance {
    pub vacation: LeaveAllowance,
    pub sick: LeaveAllowance,
    pub personal: LeaveAllowance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub position: String,
    pub hourly_rate: Number,
    pub phone: String,
    pub address: Value,
    pub skills: Vec<String>,
    pub emergency_contact: Map<String, Value>,
    pub status: String,
    pub hire_date: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub phone_number: String,
    pub department: String,
    pub is_active: bool,
    pub created_at: Value,
    /// Which legacy path produced the document: `user` or `employee`.
    pub source: String,
    /// Legacy employee record the user was merged with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    pub profile: UserProfile,
    pub leave_balance: LeaveBalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalLeaveRequest {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub leave_type: String,
    pub start_date: Value,
    pub end_date: Value,
    pub days: Number,
    pub reason: String,
    pub status: String,
    pub approved_by: Value,
    pub approved_at: Value,
    pub rejection_reason: Value,
    pub created_at: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveSettings {
    pub annual_vacation_days: Number,
    pub sick_days: Number,
    pub personal_days: Number,
    pub carry_over_days: Number,
    pub require_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub manager: Value,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSettings {
    pub id: String,
    pub general: Map<String, Value>,
    pub leave: LeaveSettings,
    pub department: Map<String, Value>,
    pub system: Map<String, Value>,
    pub departments: Vec<DepartmentEntry>,
}
