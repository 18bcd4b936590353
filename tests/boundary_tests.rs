mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rust_decimal_macros::dec;
use std::process::Command;
use std::sync::Arc;
use subledger::application::engine::BillingEngine;
use subledger::domain::ids::Principal;
use subledger::error::BillingError;
use subledger::infrastructure::clock::ManualClock;
use subledger::infrastructure::in_memory::InMemoryStore;
use subledger::infrastructure::ledger::InMemoryLedger;

#[test]
fn test_boundary_numerical_values() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("boundary_test.csv");
    common::write_commands(
        &output_path,
        &[
            ["register", "bob", "1", "", "", "", "", "video", "", ""],
            ["subscribe", "alice", "", "1", "1000000.0000", "1", "bob", "", "", ""],
            // u64::MAX period overflows the first due date
            ["subscribe", "alice", "", "1", "1", "18446744073709551615", "bob", "", "", ""],
            ["subscribe", "alice", "", "1", "0", "30", "bob", "", "", ""],
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("subledger"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,1,alice,bob,1000000,1,2,0,active"))
        .stdout(predicate::str::contains("2,1,").not());
}

#[test]
fn test_extreme_decimal_precision() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("precision_test.csv");
    common::write_commands(
        &output_path,
        &[
            ["register", "bob", "", "", "", "", "", "video", "", ""],
            ["fund", "alice", "", "", "0.0002", "", "", "", "", ""],
            ["autopay", "alice", "", "", "0.0001", "", "", "", "true", "true"],
            ["subscribe", "alice", "", "1", "0.0001", "3", "bob", "", "", ""],
            ["settle", "bob", "3", "1", "", "", "", "", "", ""],
            ["settle", "bob", "6", "1", "", "", "", "", "", ""],
            // Out of funds on the third cycle
            ["settle", "bob", "9", "1", "", "", "", "", "", ""],
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("subledger"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,1,alice,bob,0.0001,3,9,2,active"));
}

#[tokio::test]
async fn test_due_date_overflow_blocks_settlement() {
    let clock = Arc::new(ManualClock::new(100));
    let ledger = InMemoryLedger::new();
    let engine = BillingEngine::new(
        Box::new(InMemoryStore::new()),
        Arc::new(ledger.clone()),
        clock.clone(),
    );
    let alice = Principal::new("alice");
    let bob = Principal::new("bob");
    engine
        .configure_auto_pay(&alice, true, dec!(10), true)
        .await
        .unwrap();
    let service = engine.register_service(&bob, "video").await.unwrap();
    let id = engine
        .create_subscription(&alice, service, bob, dec!(1), u64::MAX - 100, None)
        .await
        .unwrap();

    clock.advance_to(u64::MAX).unwrap();
    let result = engine.settle(&alice, id).await;
    assert!(matches!(result, Err(BillingError::InvalidParameter(_))));

    let sub = engine.get_subscription(id).await.unwrap().unwrap();
    assert_eq!(sub.next_payment_due, u64::MAX);
    assert_eq!(sub.payment_count, 0);
}
