//! Deposit business logic - The allocation engine.
//!
//! A deposit and its allocations are always written together: either the deposit row
//! and every allocation commit, or nothing does. Before anything is written the input
//! is checked for a positive amount, non-negative allocations, no repeated area, and
//! allocations summing to the deposit amount within one cent.

use crate::{
    core::{balances, cards, claim_card, month_start, optional_text},
    entities::{Allocation, Deposit, allocation, deposit},
    errors::{Error, Result, ValidationError},
    money::Money,
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{info, instrument, warn};

/// One area's share of a deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct AllocationInput {
    pub area_id: Uuid,
    pub amount: Money,
}

/// A deposit with its full allocation list, as submitted by a user.
#[derive(Clone, Debug, Deserialize)]
pub struct DepositInput {
    pub card_id: Uuid,
    pub amount: Money,
    /// Any day of the month; stored as the first day
    pub reference_month: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    pub allocations: Vec<AllocationInput>,
}

/// A deposit together with its allocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DepositWithAllocations {
    pub deposit: deposit::Model,
    pub allocations: Vec<allocation::Model>,
}

/// Checks the rules that need no database access.
///
/// The deposit amount must be positive and every allocation non-negative, each within
/// [`Money::MAX`]. No area may appear twice, and the allocations must add up to the
/// deposit amount within [`Money::TOLERANCE`].
///
/// # Errors
/// Returns the first [`ValidationError`] found.
pub fn validate_deposit_input(input: &DepositInput) -> std::result::Result<(), ValidationError> {
    input.amount.within_limit()?;
    if !input.amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount {
            field: "amount",
            amount: input.amount,
        });
    }

    let mut seen = HashSet::new();
    for allocation in &input.allocations {
        allocation.amount.within_limit()?;
        if allocation.amount.is_negative() {
            return Err(ValidationError::NegativeAmount {
                field: "allocation",
                amount: allocation.amount,
            });
        }
        if !seen.insert(allocation.area_id) {
            return Err(ValidationError::DuplicateAllocationArea {
                area_id: allocation.area_id,
            });
        }
    }

    let allocated = Money::checked_sum(input.allocations.iter().map(|a| a.amount)).ok_or_else(
        || ValidationError::InvalidAmount {
            input: format!("{} allocation(s)", input.allocations.len()),
            reason: "allocation total too large",
        },
    )?;
    if !allocated.approx_eq(input.amount) {
        return Err(ValidationError::AllocationMismatch {
            allocated,
            amount: input.amount,
        });
    }
    Ok(())
}

/// Splits `total` into `parts` shares at cent precision.
///
/// Every share is the floor of `total / parts`; the first share also takes the
/// remainder so the shares always add up to exactly `total`.
pub fn distribute_evenly(total: Money, parts: usize) -> std::result::Result<Vec<Money>, ValidationError> {
    let count = i64::try_from(parts).map_err(|_| ValidationError::NothingToDistribute)?;
    if count == 0 {
        return Err(ValidationError::NothingToDistribute);
    }

    let base = total.cents().div_euclid(count);
    let remainder = total.cents() - base * count;

    let mut shares = vec![Money::new(base); parts];
    shares[0] += Money::new(remainder);
    Ok(shares)
}

/// Builds a ready-to-submit allocation list spreading `total` evenly over `area_ids`.
pub fn distribute_evenly_across(
    total: Money,
    area_ids: &[Uuid],
) -> std::result::Result<Vec<AllocationInput>, ValidationError> {
    let shares = distribute_evenly(total, area_ids.len())?;
    Ok(area_ids
        .iter()
        .zip(shares)
        .map(|(area_id, amount)| AllocationInput {
            area_id: *area_id,
            amount,
        })
        .collect())
}

async fn insert_allocations<C: ConnectionTrait>(
    txn: &C,
    deposit_id: Uuid,
    allocations: &[AllocationInput],
) -> Result<Vec<allocation::Model>> {
    let mut inserted = Vec::with_capacity(allocations.len());
    for input in allocations {
        let row = allocation::ActiveModel {
            id: Set(Uuid::new_v4()),
            deposit_id: Set(deposit_id),
            area_id: Set(input.area_id),
            amount_cents: Set(input.amount.cents()),
        }
        .insert(txn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

/// Logs every (card, area) pair left with a negative balance by a deposit change.
async fn warn_overdrawn<C: ConnectionTrait>(
    txn: &C,
    card_ids: &BTreeSet<Uuid>,
    area_ids: &BTreeSet<Uuid>,
) -> Result<()> {
    for card_id in card_ids {
        for area_id in area_ids {
            let pair = balances::area_card_balance(txn, *area_id, *card_id).await?;
            if pair.balance.is_negative() {
                warn!(
                    card_id = %card_id,
                    area_id = %area_id,
                    allocated = %pair.allocated,
                    spent = %pair.spent,
                    "Deposit change leaves card/area pair overdrawn by existing expenses"
                );
            }
        }
    }
    Ok(())
}

/// Creates a deposit and its allocations in one transaction.
///
/// The input is validated before anything is written (see [`validate_deposit_input`]).
/// Inside the transaction the card row is claimed first, then every allocated area
/// must exist and be allowed by the card's link set. The deposit row and all of its
/// allocations are committed together; any failure leaves neither behind.
///
/// # Arguments
/// * `db` - Database connection
/// * `input` - The deposit with its complete allocation list
///
/// # Errors
/// Returns a validation error for bad input, `NotFound` for an unknown card or area,
/// `AreaNotLinkedToCard` for an area outside the card's links, or a database error.
#[instrument(skip(db, input), fields(card_id = %input.card_id, amount = %input.amount))]
pub async fn create_deposit(db: &DatabaseConnection, input: DepositInput) -> Result<DepositWithAllocations> {
    validate_deposit_input(&input)?;

    let txn = db.begin().await?;
    claim_card(&txn, input.card_id).await?;

    let area_ids: Vec<Uuid> = input.allocations.iter().map(|a| a.area_id).collect();
    cards::check_areas_for_card(&txn, input.card_id, &area_ids).await?;

    let now = chrono::Utc::now();
    let deposit = deposit::ActiveModel {
        id: Set(Uuid::new_v4()),
        card_id: Set(input.card_id),
        amount_cents: Set(input.amount.cents()),
        reference_month: Set(month_start(input.reference_month)),
        description: Set(optional_text(input.description)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let allocations = insert_allocations(&txn, deposit.id, &input.allocations).await?;

    txn.commit().await?;
    info!(deposit_id = %deposit.id, "Created deposit with {} allocation(s)", allocations.len());

    Ok(DepositWithAllocations {
        deposit,
        allocations,
    })
}

/// Replaces a deposit's fields and its whole allocation set in one transaction.
///
/// The submitted allocations replace the stored ones entirely. Both the old and the
/// new card are claimed when the deposit moves between cards. Lowering a deposit may
/// leave a (card, area) pair below what its expenses already spent; that is allowed
/// and logged as a warning for each affected pair.
///
/// # Arguments
/// * `db` - Database connection
/// * `deposit_id` - The deposit to rewrite
/// * `input` - The new deposit fields with the complete new allocation list
///
/// # Errors
/// Same as [`create_deposit`], plus `NotFound` if the deposit does not exist. On any
/// error the stored deposit and allocations are unchanged.
#[instrument(skip(db, input), fields(card_id = %input.card_id, amount = %input.amount))]
pub async fn update_deposit(
    db: &DatabaseConnection,
    deposit_id: Uuid,
    input: DepositInput,
) -> Result<DepositWithAllocations> {
    validate_deposit_input(&input)?;

    let txn = db.begin().await?;
    claim_card(&txn, input.card_id).await?;

    let existing = Deposit::find_by_id(deposit_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("deposit", deposit_id))?;
    if existing.card_id != input.card_id {
        claim_card(&txn, existing.card_id).await?;
    }

    let new_area_ids: Vec<Uuid> = input.allocations.iter().map(|a| a.area_id).collect();
    cards::check_areas_for_card(&txn, input.card_id, &new_area_ids).await?;

    let old_allocations = Allocation::find()
        .filter(allocation::Column::DepositId.eq(deposit_id))
        .all(&txn)
        .await?;

    let mut deposit: deposit::ActiveModel = existing.clone().into();
    deposit.card_id = Set(input.card_id);
    deposit.amount_cents = Set(input.amount.cents());
    deposit.reference_month = Set(month_start(input.reference_month));
    deposit.description = Set(optional_text(input.description));
    deposit.updated_at = Set(chrono::Utc::now());
    let deposit = deposit.update(&txn).await?;

    Allocation::delete_many()
        .filter(allocation::Column::DepositId.eq(deposit_id))
        .exec(&txn)
        .await?;
    let allocations = insert_allocations(&txn, deposit_id, &input.allocations).await?;

    let card_ids: BTreeSet<Uuid> = [existing.card_id, input.card_id].into_iter().collect();
    let area_ids: BTreeSet<Uuid> = old_allocations
        .iter()
        .map(|a| a.area_id)
        .chain(new_area_ids)
        .collect();
    warn_overdrawn(&txn, &card_ids, &area_ids).await?;

    txn.commit().await?;
    info!(deposit_id = %deposit_id, "Updated deposit with {} allocation(s)", allocations.len());

    Ok(DepositWithAllocations {
        deposit,
        allocations,
    })
}

/// Deletes a deposit and all of its allocations in one transaction.
///
/// Expenses are never touched, so removing a deposit can leave (card, area) pairs
/// overdrawn; each one is logged as a warning.
#[instrument(skip(db))]
pub async fn delete_deposit(db: &DatabaseConnection, deposit_id: Uuid) -> Result<()> {
    let txn = db.begin().await?;

    let existing = Deposit::find_by_id(deposit_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("deposit", deposit_id))?;
    claim_card(&txn, existing.card_id).await?;

    let allocations = Allocation::find()
        .filter(allocation::Column::DepositId.eq(deposit_id))
        .all(&txn)
        .await?;

    Allocation::delete_many()
        .filter(allocation::Column::DepositId.eq(deposit_id))
        .exec(&txn)
        .await?;
    Deposit::delete_by_id(deposit_id).exec(&txn).await?;

    let card_ids = BTreeSet::from([existing.card_id]);
    let area_ids: BTreeSet<Uuid> = allocations.iter().map(|a| a.area_id).collect();
    warn_overdrawn(&txn, &card_ids, &area_ids).await?;

    txn.commit().await?;
    info!("Deleted deposit and {} allocation(s)", allocations.len());
    Ok(())
}

/// Finds a deposit with its allocations.
pub async fn get_deposit<C: ConnectionTrait>(
    db: &C,
    deposit_id: Uuid,
) -> Result<Option<DepositWithAllocations>> {
    let Some(deposit) = Deposit::find_by_id(deposit_id).one(db).await? else {
        return Ok(None);
    };
    let allocations = Allocation::find()
        .filter(allocation::Column::DepositId.eq(deposit_id))
        .all(db)
        .await?;
    Ok(Some(DepositWithAllocations {
        deposit,
        allocations,
    }))
}

/// Lists deposits newest first, optionally only those of one card.
pub async fn list_deposits<C: ConnectionTrait>(
    db: &C,
    card_id: Option<Uuid>,
) -> Result<Vec<deposit::Model>> {
    let mut query = Deposit::find()
        .order_by_desc(deposit::Column::ReferenceMonth)
        .order_by_desc(deposit::Column::CreatedAt);
    if let Some(card_id) = card_id {
        query = query.filter(deposit::Column::CardId.eq(card_id));
    }
    query.all(db).await.map_err(Into::into)
}
