//! Expense authorization - Validates and records money spent with a card.
//!
//! An expense is accepted only if the (card, area) pair still has enough allocated
//! money to cover it and, when a budget line is named, that line's accumulated balance
//! covers it too. The checks run inside the same transaction as the insert, after the
//! card row has been claimed, so two concurrent submissions cannot both spend the
//! same money.

use crate::{
    core::{balances, cards, claim_card, month_start, required_text},
    entities::{BudgetLine, Expense, budget_line, expense},
    errors::{Error, Result, ValidationError},
    money::Money,
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

/// An expense as submitted by a user.
#[derive(Clone, Debug, Deserialize)]
pub struct ExpenseInput {
    pub card_id: Uuid,
    pub area_id: Uuid,
    #[serde(default)]
    pub budget_line_id: Option<Uuid>,
    pub amount: Money,
    pub description: String,
    pub expense_date: NaiveDate,
    /// Any day of the month; stored as the first day
    pub reference_month: NaiveDate,
}

/// Optional filters for [`list_expenses`].
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct ExpenseFilter {
    #[serde(default)]
    pub card_id: Option<Uuid>,
    #[serde(default)]
    pub area_id: Option<Uuid>,
    #[serde(default)]
    pub reference_month: Option<NaiveDate>,
}

fn validate_expense_input(input: &ExpenseInput) -> std::result::Result<String, ValidationError> {
    input.amount.within_limit()?;
    if !input.amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount {
            field: "amount",
            amount: input.amount,
        });
    }
    required_text(&input.description, "description")
}

/// Runs every store-backed check for `input`, ignoring `exclude_expense` in the spent
/// figures.
async fn authorize<C: ConnectionTrait>(
    txn: &C,
    input: &ExpenseInput,
    exclude_expense: Option<Uuid>,
) -> Result<()> {
    cards::check_areas_for_card(txn, input.card_id, &[input.area_id]).await?;

    let line = match input.budget_line_id {
        Some(line_id) => {
            let line = BudgetLine::find_by_id(line_id)
                .one(txn)
                .await?
                .ok_or_else(|| Error::not_found("budget line", line_id))?;
            if line.area_id != input.area_id {
                return Err(ValidationError::BudgetLineAreaMismatch {
                    budget_line_id: line_id,
                    area_id: input.area_id,
                }
                .into());
            }
            Some(line)
        }
        None => None,
    };

    let pair =
        balances::area_card_balance_excluding(txn, input.area_id, input.card_id, exclude_expense)
            .await?;
    if input.amount > pair.balance {
        return Err(Error::InsufficientBalance {
            available: pair.balance,
            requested: input.amount,
        });
    }

    if let Some(line) = line {
        let balance = balances::budget_line_balance_excluding(txn, line.id, exclude_expense).await?;
        if input.amount > balance.accumulated_balance {
            return Err(Error::InsufficientBudgetLine {
                budget_line_id: line.id,
                available: balance.accumulated_balance,
                requested: input.amount,
            });
        }
        warn_on_later_months(txn, &line, input.amount, exclude_expense).await?;
    }

    debug!(available = %pair.balance, requested = %input.amount, "Expense authorized");
    Ok(())
}

/// Logs every later month of `line`'s series whose accumulated balance `amount` would
/// push below zero. Those months are not re-checked; only the named line is enforced.
async fn warn_on_later_months<C: ConnectionTrait>(
    txn: &C,
    line: &budget_line::Model,
    amount: Money,
    exclude_expense: Option<Uuid>,
) -> Result<()> {
    let later = BudgetLine::find()
        .filter(budget_line::Column::AreaId.eq(line.area_id))
        .filter(budget_line::Column::Name.eq(line.name.as_str()))
        .filter(budget_line::Column::ReferenceMonth.gt(line.reference_month))
        .order_by_asc(budget_line::Column::ReferenceMonth)
        .all(txn)
        .await?;

    for next in later {
        let balance = balances::budget_line_balance_excluding(txn, next.id, exclude_expense).await?;
        if amount > balance.accumulated_balance {
            warn!(
                budget_line_id = %next.id,
                reference_month = %next.reference_month,
                available = %balance.accumulated_balance,
                requested = %amount,
                "Expense overdraws a later month of the budget line series"
            );
        }
    }
    Ok(())
}

/// Authorizes and records a new expense on behalf of `created_by`.
///
/// After claiming the card row the expense is checked, in order, against the card's
/// area links, the budget line's area, the (card, area) available balance and finally
/// the budget line's accumulated balance. All checks read through the same
/// transaction that inserts the row, so concurrent submissions against one card are
/// authorized one after another.
///
/// # Arguments
/// * `db` - Database connection
/// * `input` - The expense as submitted
/// * `created_by` - Identifier of the submitting user, stored with the expense
///
/// # Errors
/// * `InsufficientBalance` - the amount exceeds the (card, area) balance
/// * `InsufficientBudgetLine` - the amount exceeds the line's accumulated balance
/// * `NotFound` - the card, area or budget line does not exist
/// * Validation errors for bad input, a mismatched budget line or an unlinked area
#[instrument(skip(db, input), fields(card_id = %input.card_id, area_id = %input.area_id, amount = %input.amount))]
pub async fn create_expense(
    db: &DatabaseConnection,
    input: ExpenseInput,
    created_by: &str,
) -> Result<expense::Model> {
    let description = validate_expense_input(&input)?;
    let created_by = required_text(created_by, "created_by")?;

    let txn = db.begin().await?;
    claim_card(&txn, input.card_id).await?;
    authorize(&txn, &input, None).await?;

    let now = chrono::Utc::now();
    let expense = expense::ActiveModel {
        id: Set(Uuid::new_v4()),
        card_id: Set(input.card_id),
        area_id: Set(input.area_id),
        budget_line_id: Set(input.budget_line_id),
        amount_cents: Set(input.amount.cents()),
        description: Set(description),
        expense_date: Set(input.expense_date),
        reference_month: Set(month_start(input.reference_month)),
        created_by: Set(created_by),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(expense_id = %expense.id, "Recorded expense");
    Ok(expense)
}

/// Re-authorizes and rewrites an expense. The creator and creation time are kept.
///
/// The expense's own stored amount is left out of every spent figure while the new
/// values are checked, so resubmitting an unchanged expense always succeeds.
///
/// # Errors
/// Same as [`create_expense`], plus `NotFound` if the expense does not exist.
#[instrument(skip(db, input), fields(card_id = %input.card_id, area_id = %input.area_id, amount = %input.amount))]
pub async fn update_expense(
    db: &DatabaseConnection,
    expense_id: Uuid,
    input: ExpenseInput,
) -> Result<expense::Model> {
    let description = validate_expense_input(&input)?;

    let txn = db.begin().await?;
    claim_card(&txn, input.card_id).await?;

    let existing = Expense::find_by_id(expense_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("expense", expense_id))?;
    if existing.card_id != input.card_id {
        claim_card(&txn, existing.card_id).await?;
    }

    authorize(&txn, &input, Some(expense_id)).await?;

    let mut expense: expense::ActiveModel = existing.into();
    expense.card_id = Set(input.card_id);
    expense.area_id = Set(input.area_id);
    expense.budget_line_id = Set(input.budget_line_id);
    expense.amount_cents = Set(input.amount.cents());
    expense.description = Set(description);
    expense.expense_date = Set(input.expense_date);
    expense.reference_month = Set(month_start(input.reference_month));
    expense.updated_at = Set(chrono::Utc::now());
    let expense = expense.update(&txn).await?;

    txn.commit().await?;
    info!("Updated expense");
    Ok(expense)
}

/// Deletes an expense, releasing its amount back to the balances it was drawn from.
#[instrument(skip(db))]
pub async fn delete_expense(db: &DatabaseConnection, expense_id: Uuid) -> Result<()> {
    let result = Expense::delete_by_id(expense_id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("expense", expense_id));
    }
    info!("Deleted expense");
    Ok(())
}

/// Finds an expense by its id.
pub async fn get_expense<C: ConnectionTrait>(
    db: &C,
    expense_id: Uuid,
) -> Result<Option<expense::Model>> {
    Expense::find_by_id(expense_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists expenses matching `filter`, most recent expense date first.
pub async fn list_expenses<C: ConnectionTrait>(
    db: &C,
    filter: ExpenseFilter,
) -> Result<Vec<expense::Model>> {
    let mut query = Expense::find()
        .order_by_desc(expense::Column::ExpenseDate)
        .order_by_desc(expense::Column::CreatedAt);
    if let Some(card_id) = filter.card_id {
        query = query.filter(expense::Column::CardId.eq(card_id));
    }
    if let Some(area_id) = filter.area_id {
        query = query.filter(expense::Column::AreaId.eq(area_id));
    }
    if let Some(month) = filter.reference_month {
        query = query.filter(expense::Column::ReferenceMonth.eq(month_start(month)));
    }
    query.all(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::balances::{area_card_balance, budget_line_balance};
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn input(card_id: Uuid, area_id: Uuid, amount: &str) -> ExpenseInput {
        ExpenseInput {
            card_id,
            area_id,
            budget_line_id: None,
            amount: money(amount),
            description: "Team lunch".to_string(),
            expense_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            reference_month: month(2024, 1),
        }
    }

    #[tokio::test]
    async fn test_create_expense_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let (card, area) = (Uuid::new_v4(), Uuid::new_v4());

        let result = create_expense(&db, input(card, area, "0"), "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::Validation(ValidationError::NonPositiveAmount { .. })
        ));

        let result = create_expense(&db, input(card, area, "-5"), "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::Validation(ValidationError::NonPositiveAmount { .. })
        ));

        let mut blank = input(card, area, "5");
        blank.description = "   ".to_string();
        let result = create_expense(&db, blank, "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::Validation(ValidationError::MissingRequiredField {
                field: "description"
            })
        ));

        let result = create_expense(&db, input(card, area, "5"), "").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::Validation(ValidationError::MissingRequiredField {
                field: "created_by"
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_overdraw_is_blocked() -> Result<()> {
        let (db, card, area) = setup_with_card_and_area().await?;
        create_test_deposit(&db, card.id, money("600.00"), &[(area.id, money("600.00"))]).await?;

        let result = create_expense(&db, input(card.id, area.id, "650.00"), "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBalance { available, requested }
                if available == money("600.00") && requested == money("650.00")
        ));

        let pair = area_card_balance(&db, area.id, card.id).await?;
        assert_eq!(pair.balance, money("600.00"));
        assert!(list_expenses(&db, ExpenseFilter::default()).await?.is_empty());

        // Spending the exact balance is allowed and leaves zero
        create_expense(&db, input(card.id, area.id, "600.00"), "user1").await?;
        assert_eq!(
            area_card_balance(&db, area.id, card.id).await?.balance,
            Money::ZERO
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_create_expense_stamps_creator_and_month() -> Result<()> {
        let (db, card, area) = setup_with_card_and_area().await?;
        create_test_deposit(&db, card.id, money("100.00"), &[(area.id, money("100.00"))]).await?;

        let mut request = input(card.id, area.id, "12.50");
        request.reference_month = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let expense = create_expense(&db, request, " alice ").await?;

        assert_eq!(expense.created_by, "alice");
        assert_eq!(expense.reference_month, month(2024, 1));
        assert_eq!(expense.amount(), money("12.50"));
        assert_eq!(get_expense(&db, expense.id).await?, Some(expense));
        Ok(())
    }

    #[tokio::test]
    async fn test_expense_respects_card_area_links() -> Result<()> {
        let (db, card, marketing) = setup_with_card_and_area().await?;
        let engineering = create_test_area(&db, "Engineering").await?;
        create_test_deposit(
            &db,
            card.id,
            money("100.00"),
            &[(marketing.id, money("50.00")), (engineering.id, money("50.00"))],
        )
        .await?;
        cards::set_card_areas(&db, card.id, &[marketing.id]).await?;

        let result = create_expense(&db, input(card.id, engineering.id, "10"), "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::Validation(ValidationError::AreaNotLinkedToCard { .. })
        ));
        create_expense(&db, input(card.id, marketing.id, "10"), "user1").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_budget_line_checks() -> Result<()> {
        let (db, card, marketing) = setup_with_card_and_area().await?;
        let engineering = create_test_area(&db, "Engineering").await?;
        create_test_deposit(
            &db,
            card.id,
            money("1000.00"),
            &[(marketing.id, money("900.00")), (engineering.id, money("100.00"))],
        )
        .await?;
        let ads =
            create_test_budget_line(&db, marketing.id, "Ads", money("300.00"), month(2024, 1))
                .await?;

        // Line of another area
        let mut request = input(card.id, engineering.id, "10");
        request.budget_line_id = Some(ads.id);
        let result = create_expense(&db, request, "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::Validation(ValidationError::BudgetLineAreaMismatch { .. })
        ));

        // Area has money but the line does not
        let mut request = input(card.id, marketing.id, "350");
        request.budget_line_id = Some(ads.id);
        let result = create_expense(&db, request, "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBudgetLine { budget_line_id, available, requested }
                if budget_line_id == ads.id
                    && available == money("300.00")
                    && requested == money("350.00")
        ));

        let mut request = input(card.id, marketing.id, "250");
        request.budget_line_id = Some(ads.id);
        create_expense(&db, request, "user1").await?;
        assert_eq!(
            budget_line_balance(&db, ads.id).await?.accumulated_balance,
            money("50.00")
        );

        let mut request = input(card.id, marketing.id, "1");
        request.budget_line_id = Some(Uuid::new_v4());
        let result = create_expense(&db, request, "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::NotFound { record: "budget line", .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_expense_with_same_values_succeeds() -> Result<()> {
        let (db, card, area) = setup_with_card_and_area().await?;
        create_test_deposit(&db, card.id, money("100.00"), &[(area.id, money("100.00"))]).await?;
        let line =
            create_test_budget_line(&db, area.id, "Ads", money("100.00"), month(2024, 1)).await?;

        // Spend everything so that double counting would reject the edit
        let mut request = input(card.id, area.id, "100.00");
        request.budget_line_id = Some(line.id);
        let expense = create_expense(&db, request.clone(), "user1").await?;

        let updated = update_expense(&db, expense.id, request).await?;
        assert_eq!(updated.amount(), expense.amount());
        assert_eq!(updated.created_by, "user1");
        assert_eq!(updated.created_at, expense.created_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_expense_rechecks_balance() -> Result<()> {
        let (db, card, area) = setup_with_card_and_area().await?;
        create_test_deposit(&db, card.id, money("100.00"), &[(area.id, money("100.00"))]).await?;
        let expense = create_expense(&db, input(card.id, area.id, "40"), "user1").await?;

        // Own 40.00 is released before checking, so up to 100.00 fits
        let updated = update_expense(&db, expense.id, input(card.id, area.id, "100")).await?;
        assert_eq!(updated.amount(), money("100.00"));

        let result = update_expense(&db, expense.id, input(card.id, area.id, "100.01")).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBalance { available, .. } if available == money("100.00")
        ));
        assert_eq!(
            get_expense(&db, expense.id).await?.unwrap().amount(),
            money("100.00")
        );

        let missing = update_expense(&db, Uuid::new_v4(), input(card.id, area.id, "1")).await;
        assert!(matches!(
            missing.unwrap_err(),
            Error::NotFound { record: "expense", .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_expense() -> Result<()> {
        let (db, card, area) = setup_with_card_and_area().await?;
        create_test_deposit(&db, card.id, money("10.00"), &[(area.id, money("10.00"))]).await?;
        let expense = create_expense(&db, input(card.id, area.id, "10"), "user1").await?;

        delete_expense(&db, expense.id).await?;
        assert!(get_expense(&db, expense.id).await?.is_none());

        let again = delete_expense(&db, expense.id).await;
        assert!(matches!(again.unwrap_err(), Error::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_expenses_filters() -> Result<()> {
        let (db, card, marketing) = setup_with_card_and_area().await?;
        let engineering = create_test_area(&db, "Engineering").await?;
        create_test_deposit(
            &db,
            card.id,
            money("100.00"),
            &[(marketing.id, money("50.00")), (engineering.id, money("50.00"))],
        )
        .await?;

        let mut older = input(card.id, marketing.id, "1");
        older.expense_date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        create_expense(&db, older, "user1").await?;
        let newer = create_expense(&db, input(card.id, marketing.id, "2"), "user1").await?;
        let mut february = input(card.id, engineering.id, "3");
        february.reference_month = month(2024, 2);
        create_expense(&db, february, "user1").await?;

        let marketing_only = list_expenses(
            &db,
            ExpenseFilter {
                area_id: Some(marketing.id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(marketing_only.len(), 2);
        assert_eq!(marketing_only[0].id, newer.id);

        let feb = list_expenses(
            &db,
            ExpenseFilter {
                reference_month: Some(month(2024, 2)),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(feb.len(), 1);
        assert_eq!(feb[0].area_id, engineering.id);

        let all_for_card = list_expenses(
            &db,
            ExpenseFilter {
                card_id: Some(card.id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(all_for_card.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_later_month_of_series_may_be_overdrawn() -> Result<()> {
        init_test_tracing();
        let (db, card, area) = setup_with_card_and_area().await?;
        create_test_deposit(&db, card.id, money("500.00"), &[(area.id, money("500.00"))]).await?;
        let january =
            create_test_budget_line(&db, area.id, "Ads", money("100.00"), month(2024, 1)).await?;
        let february =
            create_test_budget_line(&db, area.id, "Ads", money("100.00"), month(2024, 2)).await?;

        // February draws on January's rollover
        let mut request = input(card.id, area.id, "150.00");
        request.budget_line_id = Some(february.id);
        request.reference_month = month(2024, 2);
        create_expense(&db, request, "user1").await?;

        // January still has its full 100.00, so this passes, but February goes negative
        let mut request = input(card.id, area.id, "60.00");
        request.budget_line_id = Some(january.id);
        create_expense(&db, request, "user1").await?;

        let jan = budget_line_balance(&db, january.id).await?;
        assert_eq!(jan.accumulated_balance, money("40.00"));
        let feb = budget_line_balance(&db, february.id).await?;
        assert_eq!(feb.accumulated_balance, money("-10.00"));

        // The named line is still enforced
        let mut request = input(card.id, area.id, "40.01");
        request.budget_line_id = Some(january.id);
        let result = create_expense(&db, request, "user1").await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBudgetLine { budget_line_id, .. } if budget_line_id == january.id
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_update_leaves_expense_and_card_usable() -> Result<()> {
        let (db, card, area) = setup_with_card_and_area().await?;
        create_test_deposit(&db, card.id, money("100.00"), &[(area.id, money("100.00"))]).await?;
        let expense = create_expense(&db, input(card.id, area.id, "10.00"), "user1").await?;

        db.execute_unprepared(
            "CREATE TRIGGER reject_expense_update BEFORE UPDATE ON expenses \
             WHEN NEW.amount_cents = 4200 \
             BEGIN SELECT RAISE(ABORT, 'expense rejected'); END;",
        )
        .await?;

        // Fails after the card row was claimed
        let result = update_expense(&db, expense.id, input(card.id, area.id, "42.00")).await;
        assert!(matches!(result.unwrap_err(), Error::Database(_)));
        assert_eq!(get_expense(&db, expense.id).await?, Some(expense));

        create_expense(&db, input(card.id, area.id, "90.00"), "user1").await?;
        assert_eq!(
            area_card_balance(&db, area.id, card.id).await?.balance,
            Money::ZERO
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expenses_cannot_both_spend_the_same_money() -> Result<()> {
        // A file database so the pool hands out separate connections
        let (_dir, db) = setup_file_test_db().await?;
        let card = create_test_card(&db, "Corporate Visa").await?;
        let area = create_test_area(&db, "Marketing").await?;
        create_test_deposit(&db, card.id, money("100.00"), &[(area.id, money("100.00"))]).await?;

        let shared = std::sync::Arc::new(db);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = std::sync::Arc::clone(&shared);
                let request = input(card.id, area.id, "30.00");
                let created_by = format!("user{i}");
                tokio::spawn(async move { create_expense(&db, request, &created_by).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::InsufficientBalance { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 3);

        let db = std::sync::Arc::try_unwrap(shared).expect("all tasks finished");
        let pair = area_card_balance(&db, area.id, card.id).await?;
        assert_eq!(pair.spent, money("90.00"));
        assert_eq!(pair.balance, money("10.00"));
        assert_eq!(list_expenses(&db, ExpenseFilter::default()).await?.len(), 3);
        Ok(())
    }
}
