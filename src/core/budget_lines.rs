//! Budget line business logic - Planned spending per area and month.
//!
//! The planning ceiling compares an area's planned total with the money allocated to
//! it. With [`PlanningCeiling::Warn`] an excess is only logged; with
//! [`PlanningCeiling::Enforce`] it is rejected.

use crate::{
    core::{balances, month_start, optional_text, required_text},
    entities::{Area, BudgetLine, Expense, area, budget_line, expense},
    errors::{Error, Result, ValidationError},
    money::Money,
};
use chrono::NaiveDate;
use sea_orm::{PaginatorTrait, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// How the area planning ceiling is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanningCeiling {
    /// Log planned totals above the allocated total and accept them
    #[default]
    Warn,
    /// Reject planned totals above the allocated total
    Enforce,
}

/// Room left for planning in an area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlanningRoom {
    /// Everything ever allocated to the area
    pub allocated: Money,
    /// Planned total of the other active lines of the area
    pub already_planned: Money,
    /// `allocated - already_planned`
    pub available: Money,
    /// Whether the requested plan is larger than `available`
    pub exceeds: bool,
}

/// A budget line as entered by a user.
#[derive(Clone, Debug, Deserialize)]
pub struct BudgetLineInput {
    pub area_id: Uuid,
    pub name: String,
    pub planned_amount: Money,
    /// Any day of the month; stored as the first day
    pub reference_month: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
}

fn validate_budget_line(input: &BudgetLineInput) -> std::result::Result<String, ValidationError> {
    let name = required_text(&input.name, "name")?;
    input.planned_amount.within_limit()?;
    if !input.planned_amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount {
            field: "planned_amount",
            amount: input.planned_amount,
        });
    }
    Ok(name)
}

/// Computes how much of an area's allocation is still free for planning.
pub async fn planning_room<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    planned: Money,
    exclude_line_id: Option<Uuid>,
) -> Result<PlanningRoom> {
    let allocated = balances::area_balance(db, area_id).await?.allocated;
    let already_planned = balances::total_planned_for_area(db, area_id, exclude_line_id).await?;
    let available = allocated - already_planned;
    Ok(PlanningRoom {
        allocated,
        already_planned,
        available,
        exceeds: planned > available,
    })
}

/// Active areas whose active budget lines plan more than was ever allocated to them,
/// ordered by area name.
pub async fn overplanned_areas<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<(area::Model, PlanningRoom)>> {
    let areas = Area::find()
        .filter(area::Column::IsActive.eq(true))
        .order_by_asc(area::Column::Name)
        .all(db)
        .await?;

    let mut overplanned = Vec::new();
    for area in areas {
        let room = planning_room(db, area.id, Money::ZERO, None).await?;
        if room.available.is_negative() {
            overplanned.push((area, room));
        }
    }
    Ok(overplanned)
}

async fn apply_ceiling<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    planned: Money,
    exclude_line_id: Option<Uuid>,
    ceiling: PlanningCeiling,
) -> Result<()> {
    let room = planning_room(db, area_id, planned, exclude_line_id).await?;
    if !room.exceeds {
        return Ok(());
    }
    match ceiling {
        PlanningCeiling::Warn => {
            warn!(
                area_id = %area_id,
                allocated = %room.allocated,
                planned = %(room.already_planned + planned),
                "Planned budget lines exceed the area allocation"
            );
            Ok(())
        }
        PlanningCeiling::Enforce => Err(ValidationError::PlanningCeilingExceeded {
            area_id,
            allocated: room.allocated,
            planned: room.already_planned + planned,
        }
        .into()),
    }
}

async fn warn_on_duplicate_name<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    name: &str,
    reference_month: NaiveDate,
    exclude_line_id: Option<Uuid>,
) -> Result<()> {
    let mut query = BudgetLine::find()
        .filter(budget_line::Column::AreaId.eq(area_id))
        .filter(budget_line::Column::Name.eq(name))
        .filter(budget_line::Column::ReferenceMonth.eq(reference_month));
    if let Some(line_id) = exclude_line_id {
        query = query.filter(budget_line::Column::Id.ne(line_id));
    }
    if query.count(db).await? > 0 {
        warn!(
            area_id = %area_id,
            line_name = name,
            %reference_month,
            "Another budget line with this name exists in the same month; both share one series"
        );
    }
    Ok(())
}

async fn expense_count<C: ConnectionTrait>(db: &C, line_id: Uuid) -> Result<u64> {
    Expense::find()
        .filter(expense::Column::BudgetLineId.eq(line_id))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Creates an active budget line.
///
/// The reference month is stored as the first day of its month. The line joins the
/// accumulation series of every line in the same area with the same name; a second
/// line with that name in the same month is accepted but logged.
///
/// # Arguments
/// * `db` - Database connection
/// * `input` - The budget line as entered
/// * `ceiling` - Whether exceeding the area's allocations only warns or is rejected
///
/// # Errors
/// Returns a validation error for bad input, `NotFound` for an unknown area, or
/// `PlanningCeilingExceeded` under [`PlanningCeiling::Enforce`].
#[instrument(skip(db, input), fields(area_id = %input.area_id, name = %input.name))]
pub async fn create_budget_line(
    db: &DatabaseConnection,
    input: BudgetLineInput,
    ceiling: PlanningCeiling,
) -> Result<budget_line::Model> {
    let name = validate_budget_line(&input)?;
    let reference_month = month_start(input.reference_month);

    let txn = db.begin().await?;
    Area::find_by_id(input.area_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("area", input.area_id))?;

    apply_ceiling(&txn, input.area_id, input.planned_amount, None, ceiling).await?;
    warn_on_duplicate_name(&txn, input.area_id, &name, reference_month, None).await?;

    let now = chrono::Utc::now();
    let line = budget_line::ActiveModel {
        id: Set(Uuid::new_v4()),
        area_id: Set(input.area_id),
        name: Set(name),
        planned_amount_cents: Set(input.planned_amount.cents()),
        reference_month: Set(reference_month),
        description: Set(optional_text(input.description)),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(budget_line_id = %line.id, "Created budget line");
    Ok(line)
}

/// Rewrites a budget line. Moving it to another area is refused while expenses use it.
#[instrument(skip(db, input), fields(area_id = %input.area_id, name = %input.name))]
pub async fn update_budget_line(
    db: &DatabaseConnection,
    budget_line_id: Uuid,
    input: BudgetLineInput,
    ceiling: PlanningCeiling,
) -> Result<budget_line::Model> {
    let name = validate_budget_line(&input)?;
    let reference_month = month_start(input.reference_month);

    let txn = db.begin().await?;
    let existing = BudgetLine::find_by_id(budget_line_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("budget line", budget_line_id))?;

    if existing.area_id != input.area_id {
        Area::find_by_id(input.area_id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::not_found("area", input.area_id))?;
        let expenses = expense_count(&txn, budget_line_id).await?;
        if expenses > 0 {
            return Err(ValidationError::BudgetLineInUse {
                budget_line_id,
                expenses,
            }
            .into());
        }
    }

    apply_ceiling(
        &txn,
        input.area_id,
        input.planned_amount,
        Some(budget_line_id),
        ceiling,
    )
    .await?;
    warn_on_duplicate_name(
        &txn,
        input.area_id,
        &name,
        reference_month,
        Some(budget_line_id),
    )
    .await?;

    let mut line: budget_line::ActiveModel = existing.into();
    line.area_id = Set(input.area_id);
    line.name = Set(name);
    line.planned_amount_cents = Set(input.planned_amount.cents());
    line.reference_month = Set(reference_month);
    line.description = Set(optional_text(input.description));
    line.updated_at = Set(chrono::Utc::now());
    let line = line.update(&txn).await?;

    txn.commit().await?;
    info!("Updated budget line");
    Ok(line)
}

/// Activates or deactivates a budget line.
#[instrument(skip(db))]
pub async fn set_budget_line_active(
    db: &DatabaseConnection,
    budget_line_id: Uuid,
    active: bool,
) -> Result<budget_line::Model> {
    let existing = BudgetLine::find_by_id(budget_line_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("budget line", budget_line_id))?;

    let mut line: budget_line::ActiveModel = existing.into();
    line.is_active = Set(active);
    line.updated_at = Set(chrono::Utc::now());
    let result = line.update(db).await?;
    info!("Budget line active flag set to {}", active);
    Ok(result)
}

/// Deletes a budget line that no expense refers to.
#[instrument(skip(db))]
pub async fn delete_budget_line(db: &DatabaseConnection, budget_line_id: Uuid) -> Result<()> {
    let txn = db.begin().await?;
    BudgetLine::find_by_id(budget_line_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("budget line", budget_line_id))?;

    let expenses = expense_count(&txn, budget_line_id).await?;
    if expenses > 0 {
        return Err(ValidationError::BudgetLineInUse {
            budget_line_id,
            expenses,
        }
        .into());
    }

    BudgetLine::delete_by_id(budget_line_id).exec(&txn).await?;
    txn.commit().await?;
    info!("Deleted budget line");
    Ok(())
}

/// Finds a budget line by its id.
pub async fn get_budget_line<C: ConnectionTrait>(
    db: &C,
    budget_line_id: Uuid,
) -> Result<Option<budget_line::Model>> {
    BudgetLine::find_by_id(budget_line_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists the active budget lines of an area by name, optionally for one month only.
pub async fn list_budget_lines<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    month: Option<NaiveDate>,
) -> Result<Vec<budget_line::Model>> {
    let mut query = BudgetLine::find()
        .filter(budget_line::Column::AreaId.eq(area_id))
        .filter(budget_line::Column::IsActive.eq(true))
        .order_by_asc(budget_line::Column::Name)
        .order_by_asc(budget_line::Column::ReferenceMonth);
    if let Some(month) = month {
        query = query.filter(budget_line::Column::ReferenceMonth.eq(month_start(month)));
    }
    query.all(db).await.map_err(Into::into)
}
