//! Shared test utilities for the card ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test records with sensible defaults.
#![allow(clippy::unwrap_used)]

use crate::{
    core::{
        areas::{self, NewArea},
        budget_lines::{self, BudgetLineInput, PlanningCeiling},
        cards::{self, NewCard},
        deposits::{self, AllocationInput, DepositInput, DepositWithAllocations},
        expenses::{self, ExpenseInput},
    },
    entities,
    errors::Result,
    money::Money,
};
use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, prelude::Uuid};

/// Routes `tracing` output through the test harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database in a fresh temporary directory.
///
/// Unlike `sqlite::memory:` the pool can hand out several connections, so concurrent
/// writers really race each other. Keep the returned directory alive for the whole test.
pub async fn setup_file_test_db() -> Result<(tempfile::TempDir, DatabaseConnection)> {
    let dir = tempfile::tempdir()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("card_ledger.sqlite").display()
    );
    let db = sea_orm::Database::connect(url).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((dir, db))
}

/// Parses a decimal amount such as `"600.00"`.
pub fn money(amount: &str) -> Money {
    amount.parse().unwrap()
}

/// First day of the given month.
pub fn month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

/// Creates a test card with sensible defaults.
///
/// # Defaults
/// * `last_four_digits`: "4242"
/// * `bank`: "Test Bank"
pub async fn create_test_card(db: &DatabaseConnection, name: &str) -> Result<entities::card::Model> {
    cards::create_card(
        db,
        NewCard {
            name: name.to_string(),
            last_four_digits: "4242".to_string(),
            bank: "Test Bank".to_string(),
        },
    )
    .await
}

/// Creates a test area with a fixed color and no description.
pub async fn create_test_area(db: &DatabaseConnection, name: &str) -> Result<entities::area::Model> {
    areas::create_area(
        db,
        NewArea {
            name: name.to_string(),
            description: None,
            color: "#123456".to_string(),
        },
    )
    .await
}

/// Creates a January 2024 deposit split as given.
pub async fn create_test_deposit(
    db: &DatabaseConnection,
    card_id: Uuid,
    amount: Money,
    allocations: &[(Uuid, Money)],
) -> Result<DepositWithAllocations> {
    deposits::create_deposit(
        db,
        DepositInput {
            card_id,
            amount,
            reference_month: month(2024, 1),
            description: None,
            allocations: allocations
                .iter()
                .map(|(area_id, amount)| AllocationInput {
                    area_id: *area_id,
                    amount: *amount,
                })
                .collect(),
        },
    )
    .await
}

/// Records a test expense dated 2024-01-15 against January 2024.
///
/// # Defaults
/// * `description`: "Test expense"
/// * `created_by`: "test_user"
pub async fn create_test_expense(
    db: &DatabaseConnection,
    card_id: Uuid,
    area_id: Uuid,
    budget_line_id: Option<Uuid>,
    amount: Money,
) -> Result<entities::expense::Model> {
    expenses::create_expense(
        db,
        ExpenseInput {
            card_id,
            area_id,
            budget_line_id,
            amount,
            description: "Test expense".to_string(),
            expense_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            reference_month: month(2024, 1),
        },
        "test_user",
    )
    .await
}

/// Creates a budget line, only warning if it exceeds the area's allocation.
pub async fn create_test_budget_line(
    db: &DatabaseConnection,
    area_id: Uuid,
    name: &str,
    planned: Money,
    reference_month: NaiveDate,
) -> Result<entities::budget_line::Model> {
    budget_lines::create_budget_line(
        db,
        BudgetLineInput {
            area_id,
            name: name.to_string(),
            planned_amount: planned,
            reference_month,
            description: None,
        },
        PlanningCeiling::Warn,
    )
    .await
}

/// Sets up a test environment with one card.
/// Returns (db, card) for common test scenarios.
pub async fn setup_with_card() -> Result<(DatabaseConnection, entities::card::Model)> {
    let db = setup_test_db().await?;
    let card = create_test_card(&db, "Corporate Visa").await?;
    Ok((db, card))
}

/// Sets up a test environment with a card and an area named "Marketing".
/// Returns (db, card, area).
pub async fn setup_with_card_and_area() -> Result<(
    DatabaseConnection,
    entities::card::Model,
    entities::area::Model,
)> {
    let (db, card) = setup_with_card().await?;
    let area = create_test_area(&db, "Marketing").await?;
    Ok((db, card, area))
}
