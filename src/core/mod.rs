//! Core ledger logic, independent of any presentation layer.
//!
//! Write operations open one database transaction each and claim the write lock through
//! [`claim_card`] before reading any balance, so the read-check-write sequence runs on a
//! consistent snapshot. Read operations are generic over [`ConnectionTrait`] and can be
//! called with a plain connection or from inside a write transaction.

/// Area catalog maintenance
pub mod areas;
/// Derived balances at every granularity
pub mod balances;
/// Budget line maintenance and the planning ceiling
pub mod budget_lines;
/// Card catalog maintenance and card/area links
pub mod cards;
/// Deposits and their area allocations
pub mod deposits;
/// Expense authorization
pub mod expenses;
/// Catalog seeding from configuration
pub mod seed;

use crate::{
    entities::{Card, card},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate};
use sea_orm::{ConnectionTrait, prelude::*, sea_query::Expr};

/// Touches the card row so the surrounding transaction holds the write lock.
///
/// On `SQLite` the first write of a transaction takes the database write lock; doing it
/// before any balance read serializes concurrent writers on the whole read-check-write
/// sequence. Returns [`Error::NotFound`] when the card does not exist.
pub(crate) async fn claim_card<C>(txn: &C, card_id: Uuid) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Card::update_many()
        .col_expr(card::Column::IsActive, Expr::col(card::Column::IsActive).into())
        .filter(card::Column::Id.eq(card_id))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::not_found("card", card_id));
    }
    Ok(())
}

/// Normalizes any date to the first day of its month.
#[must_use]
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Trims a required text field, rejecting blank input.
pub(crate) fn required_text(
    value: &str,
    field: &'static str,
) -> std::result::Result<String, crate::errors::ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::errors::ValidationError::MissingRequiredField { field });
    }
    Ok(trimmed.to_string())
}

/// Trims optional text, mapping blank input to `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
