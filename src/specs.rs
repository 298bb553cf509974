//! Collection names, identity mappings and field precedence for each
//! consolidation path.
//!
//! The existing-user path and the employee-only path deliberately do not
//! share precedence for `profile.department`, `profile.position` and the
//! other profile leaves: historical records were written that way and
//! unifying the orders would change which value wins for real data. A user
//! built on the employee-only path keeps that order on later runs.

use serde_json::json;

use crate::identity::{IdentityKey, KeyMapping};
use crate::merge::{FieldDefault, FieldRule, FieldSpec, SourceRef};

pub const USERS: &str = "users";
pub const EMPLOYEES: &str = "employees";
pub const EMPLOYEE_PROFILES: &str = "employeeProfiles";
pub const LEAVE_BALANCES: &str = "leaveBalances";
/// Legacy request collections, highest precedence first.
pub const LEGACY_LEAVE_REQUESTS: &[&str] = &["leaveRequests", "leave_requests"];
pub const LEAVE_REQUESTS: &str = "leaveRequests";
pub const SETTINGS: &str = "settings";
pub const DEPARTMENTS: &str = "departments";
/// Collections only counted, never rewritten.
pub const VERIFY_ONLY: &[&str] = &["timesheets", "payroll", "notifications"];

pub const SETTINGS_DOCUMENT_ID: &str = "global";
/// Accepted document ids for each settings section, in precedence order.
pub const GENERAL_SECTION_IDS: &[&str] = &["general", "company"];
pub const LEAVE_SECTION_IDS: &[&str] = &["leave", "leaveSettings", "leavePolicy"];
pub const DEPARTMENT_SECTION_IDS: &[&str] = &["departments", "department"];
pub const SYSTEM_SECTION_IDS: &[&str] = &["system"];

pub const MIGRATED_AT: &str = "migratedAt";
/// `source` value of users built from an employee with no account.
pub const EMPLOYEE_SOURCE: &str = "employee";

pub const DEFAULT_VACATION_DAYS: i64 = 22;
pub const DEFAULT_SICK_DAYS: i64 = 10;
pub const DEFAULT_PERSONAL_DAYS: i64 = 5;

/// Secondary slots on the existing-user path.
pub mod user_slots {
    pub const EMPLOYEE: usize = 0;
    pub const PROFILE: usize = 1;
    pub const BALANCE: usize = 2;
}

/// Secondary slots on the employee-only path.
pub mod employee_slots {
    pub const PROFILE: usize = 0;
    pub const BALANCE: usize = 1;
}

/// Secondary slots on the settings path.
pub mod settings_slots {
    pub const GENERAL: usize = 0;
    pub const LEAVE: usize = 1;
    pub const DEPARTMENT: usize = 2;
    pub const SYSTEM: usize = 3;
}

pub fn user_key_priority() -> Vec<IdentityKey> {
    vec![IdentityKey::Id, IdentityKey::EmployeeId, IdentityKey::Email]
}

pub fn employee_key_priority() -> Vec<IdentityKey> {
    vec![IdentityKey::Id, IdentityKey::UserId, IdentityKey::Email]
}

/// How employees are matched to a user.
pub fn employee_keys_for_user() -> KeyMapping {
    KeyMapping::new()
        .map(IdentityKey::Id, &["userId", "id"])
        .map(IdentityKey::EmployeeId, &["id", "employeeId"])
        .map(IdentityKey::Email, &["email"])
}

/// How profiles and balances are matched to a user.
pub fn detail_keys_for_user() -> KeyMapping {
    KeyMapping::new()
        .map(IdentityKey::Id, &["userId", "id"])
        .map(IdentityKey::EmployeeId, &["employeeId"])
        .map(IdentityKey::Email, &["email"])
}

/// How profiles and balances are matched to an employee with no user.
pub fn detail_keys_for_employee() -> KeyMapping {
    KeyMapping::new()
        .map(IdentityKey::Id, &["employeeId", "userId", "id"])
        .map(IdentityKey::UserId, &["userId"])
        .map(IdentityKey::Email, &["email"])
}

fn leave_type_rules(
    kind: &'static str,
    balance: SourceRef,
    canonical: Option<SourceRef>,
    default_total: i64,
) -> Vec<FieldRule> {
    let paths: [(&'static str, [&'static str; 3]); 3] = match kind {
        "vacation" => [
            ("leaveBalance.vacation.total", ["vacationTotal", "vacationDays", "vacation.total"]),
            ("leaveBalance.vacation.used", ["vacationUsed", "vacation.used", ""]),
            ("leaveBalance.vacation.available", ["vacationAvailable", "vacation.available", ""]),
        ],
        "sick" => [
            ("leaveBalance.sick.total", ["sickTotal", "sickDays", "sick.total"]),
            ("leaveBalance.sick.used", ["sickUsed", "sick.used", ""]),
            ("leaveBalance.sick.available", ["sickAvailable", "sick.available", ""]),
        ],
        _ => [
            ("leaveBalance.personal.total", ["personalTotal", "personalDays", "personal.total"]),
            ("leaveBalance.personal.used", ["personalUsed", "personal.used", ""]),
            ("leaveBalance.personal.available", ["personalAvailable", "personal.available", ""]),
        ],
    };
    let [(total, total_src), (used, used_src), (available, available_src)] = paths;

    let with_sources = |target: &'static str, fields: [&'static str; 3]| {
        let mut rule = FieldRule::new(target);
        for field in fields.into_iter().filter(|f| !f.is_empty()) {
            rule = rule.from(balance, field);
        }
        if let Some(canonical) = canonical {
            rule = rule.from(canonical, target);
        }
        rule
    };

    vec![
        with_sources(total, total_src).or(json!(default_total)),
        with_sources(used, used_src).or(json!(0)),
        with_sources(available, available_src).or_default(FieldDefault::Difference {
            minuend: total,
            subtrahend: used,
        }),
    ]
}

fn leave_balance_rules(balance: SourceRef, canonical: Option<SourceRef>) -> Vec<FieldRule> {
    let mut rules = leave_type_rules("vacation", balance, canonical, DEFAULT_VACATION_DAYS);
    rules.extend(leave_type_rules("sick", balance, canonical, DEFAULT_SICK_DAYS));
    rules.extend(leave_type_rules("personal", balance, canonical, DEFAULT_PERSONAL_DAYS));
    rules
}

fn profile_leaf(
    target: &'static str,
    employee: &[&'static str],
    profile: &[&'static str],
    own: &[&'static str],
    profile_first: bool,
) -> FieldRule {
    const P: SourceRef = SourceRef::Primary;
    const E: SourceRef = SourceRef::Secondary(user_slots::EMPLOYEE);
    const PR: SourceRef = SourceRef::Secondary(user_slots::PROFILE);

    let employee = employee.iter().map(|field| (E, *field));
    let profile = profile.iter().map(|field| (PR, *field));
    let secondaries: Vec<(SourceRef, &'static str)> = if profile_first {
        profile.chain(employee).collect()
    } else {
        employee.chain(profile).collect()
    };
    secondaries
        .into_iter()
        .chain(own.iter().map(|field| (P, *field)))
        .fold(FieldRule::new(target), |rule, (source, field)| rule.from(source, field))
}

/// Existing user accounts merged with their employee, profile and balance
/// records. The user's own canonical fields are the last resort, so a
/// re-run over already-migrated users reproduces the same document.
pub fn user_spec() -> FieldSpec {
    existing_user_spec("users", false)
}

/// Users an earlier run built from an unclaimed employee (`source` is
/// `"employee"`). On a re-run they come back as primaries matched to their
/// own employee, so the profile leaves keep the employee-only order where
/// the profile outranks the employee.
pub fn migrated_employee_spec() -> FieldSpec {
    existing_user_spec("migrated employee users", true)
}

fn existing_user_spec(name: &'static str, profile_first: bool) -> FieldSpec {
    use user_slots::*;
    const P: SourceRef = SourceRef::Primary;
    const E: SourceRef = SourceRef::Secondary(EMPLOYEE);
    const PR: SourceRef = SourceRef::Secondary(PROFILE);
    const B: SourceRef = SourceRef::Secondary(BALANCE);

    FieldSpec::new(name)
        .rule(FieldRule::new("id").from(P, "id"))
        .rule(
            FieldRule::new("profile.firstName")
                .from(P, "firstName")
                .from(P, "profile.firstName")
                .from(E, "firstName")
                .from(PR, "firstName")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("profile.lastName")
                .from(P, "lastName")
                .from(P, "profile.lastName")
                .from(E, "lastName")
                .from(PR, "lastName")
                .or(json!("")),
        )
        .rule(
            profile_leaf(
                "profile.department",
                &["department"],
                &["department"],
                &["department", "profile.department"],
                profile_first,
            )
            .or(json!("")),
        )
        .rule(
            profile_leaf(
                "profile.position",
                &["position", "jobTitle"],
                &["position"],
                &["position", "profile.position"],
                profile_first,
            )
            .or(json!("")),
        )
        .rule(
            profile_leaf(
                "profile.hourlyRate",
                &["hourlyRate", "rate"],
                &["hourlyRate"],
                &["profile.hourlyRate"],
                profile_first,
            )
            .or(json!(0)),
        )
        .rule(
            profile_leaf(
                "profile.phone",
                &["phone", "phoneNumber"],
                &["phone"],
                &["phoneNumber", "profile.phone"],
                profile_first,
            )
            .or(json!("")),
        )
        .rule(
            profile_leaf(
                "profile.address",
                &["address"],
                &["address"],
                &["profile.address"],
                profile_first,
            )
            .or(json!("")),
        )
        .rule(
            profile_leaf(
                "profile.skills",
                &["skills"],
                &["skills"],
                &["profile.skills"],
                true,
            )
            .or(json!([])),
        )
        .rule(
            profile_leaf(
                "profile.emergencyContact",
                &["emergencyContact"],
                &["emergencyContact"],
                &["profile.emergencyContact"],
                true,
            )
            .or(json!({})),
        )
        .rule(
            profile_leaf(
                "profile.status",
                &["status"],
                &["status"],
                &["status", "profile.status"],
                profile_first,
            )
            .or(json!("active")),
        )
        .rule(
            profile_leaf(
                "profile.hireDate",
                &["hireDate"],
                &["hireDate"],
                &["profile.hireDate"],
                profile_first,
            )
            .or(json!(null)),
        )
        .rule(
            FieldRule::new("email")
                .from(P, "email")
                .from(E, "email")
                .from(PR, "email")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("displayName")
                .from(P, "displayName")
                .from(E, "name")
                .or_default(FieldDefault::Join(vec!["profile.firstName", "profile.lastName"])),
        )
        .rule(FieldRule::new("role").from(P, "role").from(E, "role").or(json!("employee")))
        .rule(
            FieldRule::new("phoneNumber")
                .from(P, "phoneNumber")
                .from(P, "phone")
                .from(E, "phone")
                .from(E, "phoneNumber")
                .from(PR, "phone")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("department")
                .from(P, "department")
                .from(E, "department")
                .from(PR, "department")
                .from(P, "profile.department")
                .or(json!("")),
        )
        .rule(FieldRule::new("isActive").from(P, "isActive").or(json!(true)))
        .rule(
            FieldRule::new("createdAt")
                .from(P, "createdAt")
                .from(E, "createdAt")
                .or(json!(null)),
        )
        .rule(FieldRule::new("source").from(P, "source").or(json!("user")))
        .rule(FieldRule::new("employeeId").from(P, "employeeId").from(E, "id"))
        .rules(leave_balance_rules(B, Some(P)))
        .server_timestamp(MIGRATED_AT)
}

/// Legacy employees with no user account. The employee is the primary and
/// an email is synthesized when no source has one.
pub fn employee_only_spec(synthetic_email_domain: &str) -> FieldSpec {
    use employee_slots::*;
    const P: SourceRef = SourceRef::Primary;
    const PR: SourceRef = SourceRef::Secondary(PROFILE);
    const B: SourceRef = SourceRef::Secondary(BALANCE);

    FieldSpec::new("employee-only users")
        .rule(FieldRule::new("id").from(P, "id"))
        .rule(
            FieldRule::new("profile.firstName")
                .from(PR, "firstName")
                .from(P, "firstName")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("profile.lastName")
                .from(PR, "lastName")
                .from(P, "lastName")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("profile.department")
                .from(PR, "department")
                .from(P, "department")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("profile.position")
                .from(PR, "position")
                .from(P, "position")
                .from(P, "jobTitle")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("profile.hourlyRate")
                .from(PR, "hourlyRate")
                .from(P, "hourlyRate")
                .from(P, "rate")
                .or(json!(0)),
        )
        .rule(
            FieldRule::new("profile.phone")
                .from(PR, "phone")
                .from(P, "phone")
                .from(P, "phoneNumber")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("profile.address")
                .from(PR, "address")
                .from(P, "address")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("profile.skills")
                .from(PR, "skills")
                .from(P, "skills")
                .or(json!([])),
        )
        .rule(
            FieldRule::new("profile.emergencyContact")
                .from(PR, "emergencyContact")
                .from(P, "emergencyContact")
                .or(json!({})),
        )
        .rule(
            FieldRule::new("profile.status")
                .from(PR, "status")
                .from(P, "status")
                .or(json!("active")),
        )
        .rule(
            FieldRule::new("profile.hireDate")
                .from(PR, "hireDate")
                .from(P, "hireDate")
                .or(json!(null)),
        )
        .rule(
            FieldRule::new("email")
                .from(P, "email")
                .from(PR, "email")
                .or_default(FieldDefault::SyntheticEmail {
                    domain: synthetic_email_domain.to_string(),
                }),
        )
        .rule(
            FieldRule::new("displayName")
                .from(P, "name")
                .or_default(FieldDefault::Join(vec!["profile.firstName", "profile.lastName"])),
        )
        .rule(FieldRule::new("role").from(P, "role").or(json!("employee")))
        .rule(
            FieldRule::new("phoneNumber")
                .from(P, "phone")
                .from(P, "phoneNumber")
                .from(PR, "phone")
                .or(json!("")),
        )
        .rule(
            FieldRule::new("department")
                .from(P, "department")
                .from(PR, "department")
                .or(json!("")),
        )
        .rule(FieldRule::new("isActive").or(json!(true)))
        .rule(FieldRule::new("createdAt").from(P, "createdAt").or(json!(null)))
        .rule(FieldRule::new("source").or(json!(EMPLOYEE_SOURCE)))
        .rule(FieldRule::new("employeeId").from(P, "id"))
        .rules(leave_balance_rules(B, None))
        .server_timestamp(MIGRATED_AT)
}

/// Leave requests. The primary is the first occurrence of an id across the
/// legacy collections; each later duplicate only fills gaps.
pub fn leave_request_spec(duplicates: usize) -> FieldSpec {
    const P: SourceRef = SourceRef::Primary;

    let merged = |target: &'static str, fields: &[&'static str]| {
        let mut rule = FieldRule::new(target);
        for field in fields {
            rule = rule.from(P, *field);
        }
        for slot in 0..duplicates {
            for field in fields {
                rule = rule.from(SourceRef::Secondary(slot), *field);
            }
        }
        rule
    };

    FieldSpec::new("leave requests")
        .rule(FieldRule::new("id").from(P, "id"))
        .rule(merged("userId", &["userId", "employeeId"]).or(json!("")))
        .rule(merged("userName", &["userName", "employeeName"]).or(json!("")))
        .rule(merged("leaveType", &["leaveType", "type"]).or(json!("vacation")))
        .rule(merged("startDate", &["startDate"]).or(json!(null)))
        .rule(merged("endDate", &["endDate"]).or(json!(null)))
        .rule(merged("days", &["days", "numberOfDays", "totalDays"]).or(json!(0)))
        .rule(merged("reason", &["reason"]).or(json!("")))
        .rule(merged("status", &["status"]).or(json!("pending")))
        .rule(merged("approvedBy", &["approvedBy"]).or(json!(null)))
        .rule(merged("approvedAt", &["approvedAt"]).or(json!(null)))
        .rule(merged("rejectionReason", &["rejectionReason"]).or(json!(null)))
        .rule(merged("createdAt", &["createdAt"]).or(json!(null)))
        .server_timestamp(MIGRATED_AT)
}

/// The settings singleton. Each section comes from at most one legacy
/// document; the previously written `global` document is the fallback.
pub fn settings_spec() -> FieldSpec {
    use settings_slots::*;
    const P: SourceRef = SourceRef::Primary;
    const G: SourceRef = SourceRef::Secondary(GENERAL);
    const L: SourceRef = SourceRef::Secondary(LEAVE);
    const D: SourceRef = SourceRef::Secondary(DEPARTMENT);
    const S: SourceRef = SourceRef::Secondary(SYSTEM);

    FieldSpec::new("settings")
        .rule(FieldRule::new("id").from(P, "id"))
        .rule(FieldRule::new("general").from(G, "").from(P, "general").or(json!({})))
        .rule(FieldRule::new("department").from(D, "").from(P, "department").or(json!({})))
        .rule(FieldRule::new("system").from(S, "").from(P, "system").or(json!({})))
        .rule(
            FieldRule::new("leave.annualVacationDays")
                .from(L, "annualVacationDays")
                .from(L, "vacationDays")
                .from(P, "leave.annualVacationDays")
                .or(json!(DEFAULT_VACATION_DAYS)),
        )
        .rule(
            FieldRule::new("leave.sickDays")
                .from(L, "sickDays")
                .from(P, "leave.sickDays")
                .or(json!(DEFAULT_SICK_DAYS)),
        )
        .rule(
            FieldRule::new("leave.personalDays")
                .from(L, "personalDays")
                .from(P, "leave.personalDays")
                .or(json!(DEFAULT_PERSONAL_DAYS)),
        )
        .rule(
            FieldRule::new("leave.carryOverDays")
                .from(L, "carryOverDays")
                .from(P, "leave.carryOverDays")
                .or(json!(0)),
        )
        .rule(
            FieldRule::new("leave.requireApproval")
                .from(L, "requireApproval")
                .from(P, "leave.requireApproval")
                .or(json!(true)),
        )
        .server_timestamp(MIGRATED_AT)
}
