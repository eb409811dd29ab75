//! Validator messages, checked against real entities

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{MemoryBackend, record};
use serde_json::json;
use strata::validators::{
    AfterColumn, BeforeColumn, InTheFuture, InTheFutureAtLeast, InTheFutureAtMost, InThePast, InThePastAtLeast,
    InThePastAtMost, MaximumLength, MaximumValue, MinimumLength, MinimumValue, Required, Unique, Validator,
};
use strata::{Column, Entity, ModelSchema, Registry, RegistryConfig};

fn registry() -> Arc<Registry> {
    let event = ModelSchema::new("Event")
        .column(Column::integer("id"))
        .column(Column::string("name"))
        .column(Column::string("code").validator(Unique))
        .column(Column::datetime("starts_at"))
        .column(Column::datetime("ends_at"));
    Registry::builder(RegistryConfig::default())
        .model(event, MemoryBackend::new())
        .build()
        .unwrap()
}

fn check(validator: &dyn Validator, entity: &Entity, column: &str, data: serde_json::Value) -> String {
    validator.check(entity, column, &record(data)).unwrap()
}

fn days_from_now(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339()
}

// ============================================================================
// Presence and uniqueness
// ============================================================================

#[test]
fn test_required() {
    let registry = registry();
    let new = registry.empty("Event").unwrap();

    assert_eq!(check(&Required, &new, "name", json!({})), "'name' is required.");
    assert_eq!(check(&Required, &new, "name", json!({ "name": "   " })), "'name' is required.");
    assert_eq!(check(&Required, &new, "name", json!({ "name": null })), "'name' is required.");
    assert_eq!(check(&Required, &new, "name", json!({ "name": "Launch" })), "");

    let saved = registry
        .models("Event")
        .unwrap()
        .create(record(json!({ "name": "Launch" })))
        .unwrap();
    assert_eq!(check(&Required, &saved, "name", json!({})), "");
    assert_eq!(check(&Required, &saved, "name", json!({ "name": "" })), "'name' is required.");
}

#[test]
fn test_unique() {
    let registry = registry();
    let events = registry.models("Event").unwrap();
    let launch = events.create(record(json!({ "name": "Launch", "code": "L1" }))).unwrap();
    let other = events.create(record(json!({ "name": "Party", "code": "P1" }))).unwrap();

    let taken = "Invalid value for 'code': the given value already exists, and must be unique.";
    assert_eq!(check(&Unique, &other, "code", json!({ "code": "L1" })), taken);
    assert_eq!(check(&Unique, &launch, "code", json!({ "code": "L1" })), "");
    assert_eq!(check(&Unique, &other, "code", json!({ "code": "Z9" })), "");
    assert_eq!(check(&Unique, &other, "code", json!({})), "");
    assert!(Unique.is_unique());
    assert!(!Required.is_unique());
}

// ============================================================================
// Length and value bounds
// ============================================================================

#[test]
fn test_length_bounds() {
    let registry = registry();
    let event = registry.empty("Event").unwrap();

    assert_eq!(
        check(&MinimumLength(3), &event, "name", json!({ "name": "ab" })),
        "'name' must be at least 3 characters long."
    );
    assert_eq!(check(&MinimumLength(3), &event, "name", json!({ "name": "abc" })), "");
    assert_eq!(check(&MinimumLength(3), &event, "name", json!({})), "");
    assert_eq!(
        check(&MaximumLength(3), &event, "name", json!({ "name": "abcd" })),
        "'name' must be at most 3 characters long."
    );
    assert_eq!(check(&MaximumLength(3), &event, "name", json!({ "name": "äöü" })), "");
}

#[test]
fn test_value_bounds() {
    let registry = registry();
    let event = registry.empty("Event").unwrap();

    assert_eq!(
        check(&MinimumValue(1.5), &event, "seats", json!({ "seats": 1 })),
        "'seats' must be at least 1.5."
    );
    assert_eq!(check(&MinimumValue(1.5), &event, "seats", json!({ "seats": "2" })), "");
    assert_eq!(
        check(&MaximumValue(10.0), &event, "seats", json!({ "seats": 11 })),
        "'seats' must be at most 10."
    );
    assert_eq!(
        check(&MaximumValue(10.0), &event, "seats", json!({ "seats": "many" })),
        "seats must be an integer or float"
    );
    assert_eq!(check(&MaximumValue(10.0), &event, "seats", json!({})), "");
}

// ============================================================================
// Date comparisons
// ============================================================================

#[test]
fn test_after_and_before_column() {
    let registry = registry();
    let event = registry.empty("Event").unwrap();
    let after = AfterColumn::new("starts_at", false);
    let before = BeforeColumn::new("ends_at", true);

    let ordered = json!({ "starts_at": "2024-01-01 10:00:00", "ends_at": "2024-01-01 12:00:00" });
    assert_eq!(check(&after, &event, "ends_at", ordered.clone()), "");
    assert_eq!(check(&before, &event, "starts_at", ordered), "");

    let same = json!({ "starts_at": "2024-01-01 10:00:00", "ends_at": "2024-01-01 10:00:00" });
    assert_eq!(check(&after, &event, "ends_at", same.clone()), "'ends_at' must be after 'starts_at'");
    assert_eq!(check(&before, &event, "starts_at", same), "");

    let reversed = json!({ "starts_at": "2024-01-02", "ends_at": "2024-01-01" });
    assert_eq!(check(&before, &event, "starts_at", reversed), "'starts_at' must be before 'ends_at'");

    let broken = json!({ "starts_at": "2024-01-01", "ends_at": "soon" });
    assert_eq!(check(&after, &event, "ends_at", broken), "'ends_at' was not a valid date.");

    assert_eq!(check(&after, &event, "ends_at", json!({ "ends_at": "2024-01-01" })), "");
}

#[test]
fn test_after_column_falls_back_to_stored_value() {
    let registry = registry();
    let event = registry
        .models("Event")
        .unwrap()
        .create(record(json!({ "starts_at": "2024-01-01 10:00:00" })))
        .unwrap();

    assert_eq!(
        check(&AfterColumn::new("starts_at", false), &event, "ends_at", json!({ "ends_at": "2023-12-31" })),
        "'ends_at' must be after 'starts_at'"
    );
}

#[test]
fn test_past_and_future() {
    let registry = registry();
    let event = registry.empty("Event").unwrap();
    let past = json!({ "starts_at": days_from_now(-2) });
    let future = json!({ "starts_at": days_from_now(2) });

    assert_eq!(check(&InThePast, &event, "starts_at", past.clone()), "");
    assert_eq!(check(&InThePast, &event, "starts_at", future.clone()), "'starts_at' must be in the past");
    assert_eq!(check(&InTheFuture, &event, "starts_at", future), "");
    assert_eq!(check(&InTheFuture, &event, "starts_at", past), "'starts_at' must be in the future");
    assert_eq!(
        check(&InTheFuture, &event, "starts_at", json!({ "starts_at": "whenever" })),
        "'starts_at' was not a valid date"
    );
}

#[test]
fn test_relative_windows() {
    let registry = registry();
    let event = registry.empty("Event").unwrap();
    let two_days_ago = json!({ "starts_at": days_from_now(-2) });
    let in_two_days = json!({ "starts_at": days_from_now(2) });

    let at_least_week_ago = InThePastAtLeast(Duration::days(7));
    assert_eq!(
        check(&at_least_week_ago, &event, "starts_at", two_days_ago.clone()),
        "'starts_at' must be at least 7 days in the past."
    );
    assert_eq!(check(&InThePastAtLeast(Duration::days(1)), &event, "starts_at", two_days_ago.clone()), "");

    assert_eq!(
        check(&InThePastAtMost(Duration::days(1)), &event, "starts_at", two_days_ago.clone()),
        "'starts_at' must be at most 1 day in the past."
    );
    assert_eq!(check(&InThePastAtMost(Duration::days(7)), &event, "starts_at", two_days_ago), "");

    assert_eq!(
        check(&InTheFutureAtLeast(Duration::hours(72)), &event, "starts_at", in_two_days.clone()),
        "'starts_at' must be at least 3 days in the future."
    );
    assert_eq!(
        check(&InTheFutureAtMost(Duration::hours(25)), &event, "starts_at", in_two_days.clone()),
        "'starts_at' must be at most 1 day, 1 hour in the future."
    );
    assert_eq!(check(&InTheFutureAtMost(Duration::days(3)), &event, "starts_at", in_two_days), "");
}
