// Unit tests for wire shapes and error classification

use crate::common::*;
use crimewatch_access::core::errors::{AccessError, AuthError, FetchError, WriteError};
use crimewatch_access::core::models::*;

#[test]
fn test_role_rows_deserialize() {
    let rows: Vec<RoleAssignment> =
        serde_json::from_str(r#"[{"user_id":"u1","role":"admin"},{"user_id":"u1","role":"user"}]"#).unwrap();
    let roles: RoleSet = rows.into_iter().map(|r| r.role).collect();
    assert_eq!(roles, RoleSet::from([Role::Admin, Role::User]));
}

#[test]
fn test_new_crime_record_flattens() {
    let record = NewCrimeRecord {
        crime_type: "Theft".to_string(),
        record: crime_record("TH-2024-001"),
    };
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["crime_type"], "Theft");
    assert_eq!(value["case_number"], "TH-2024-001");
    assert!(value.get("references").is_none());
}

#[test]
fn test_user_messages_hide_infrastructure() {
    let fetch = AccessError::Fetch(transient("dns error: supabase.internal"));
    assert_eq!(fetch.user_message(), "Service unavailable");

    let unauthorized = AccessError::Write(WriteError::Unauthorized("requires admin".to_string()));
    assert_eq!(unauthorized.user_message(), "You are not allowed to perform this action");

    let unconfigured = AccessError::Write(WriteError::NotConfigured("user directory".to_string()));
    assert_eq!(unconfigured.user_message(), "Not available in this deployment");

    let auth = AccessError::Auth(AuthError::Provider(transient("connection refused")));
    assert_eq!(auth.user_message(), "Service unavailable, please try again.");
}

#[test]
fn test_fetch_error_accessors() {
    let upstream = FetchError::Upstream {
        status: 409,
        code: Some("23505".to_string()),
        message: "duplicate key".to_string(),
    };
    assert_eq!(upstream.status(), Some(409));
    assert_eq!(upstream.code(), Some("23505"));
    assert!(!upstream.is_transient());

    assert!(stale_subject().is_invalid_session());
    assert_eq!(stale_subject().status(), None);
}
