//! Balance aggregation - Derives every balance from the ledger rows on each read.
//!
//! Nothing here is cached or stored. Each function loads the relevant deposits,
//! allocations, budget lines and expenses and folds them with exact cent arithmetic, so
//! a balance can never drift from the rows it is computed from. All loaders are generic
//! over [`ConnectionTrait`]; write paths call them with their open transaction to check
//! a balance and commit against the same snapshot.

use crate::{
    core::month_start,
    entities::{
        Allocation, Area, BudgetLine, Card, Deposit, Expense, allocation, budget_line, card,
        deposit, expense,
    },
    errors::{Error, Result},
    money::Money,
};
use chrono::NaiveDate;
use sea_orm::{JoinType, QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Funds loaded onto a card minus what the card has paid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CardBalance {
    pub card_id: Uuid,
    pub deposited: Money,
    pub spent: Money,
    pub balance: Money,
}

/// Funds allocated to an area minus what was charged to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AreaBalance {
    pub area_id: Uuid,
    pub allocated: Money,
    pub spent: Money,
    pub balance: Money,
}

/// Funds allocated to an area from one card's deposits minus what that card paid for
/// the area. This is the figure expenses are authorized against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AreaCardBalance {
    pub area_id: Uuid,
    pub card_id: Uuid,
    pub allocated: Money,
    pub spent: Money,
    pub balance: Money,
}

/// Month-only and accumulated figures of one budget line.
///
/// The accumulated figures cover every line of the same area and name whose reference
/// month is not later than this line's month.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BudgetLineBalance {
    pub budget_line_id: Uuid,
    pub area_id: Uuid,
    pub name: String,
    pub reference_month: NaiveDate,
    pub month_planned: Money,
    pub month_spent: Money,
    pub month_balance: Money,
    pub accumulated_planned: Money,
    pub accumulated_spent: Money,
    pub accumulated_balance: Money,
}

/// Expense totals for one (reference month, card, area) triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub reference_month: NaiveDate,
    pub card_id: Uuid,
    pub area_id: Uuid,
    pub total: Money,
    pub expense_count: u64,
}

/// Folds one budget line against its series and the expenses drawn from it.
///
/// `series` may contain unrelated lines; only those sharing the area and name with a
/// reference month up to `line`'s month are counted. Expenses whose id equals
/// `exclude_expense` are ignored.
fn fold_budget_line(
    line: &budget_line::Model,
    series: &[budget_line::Model],
    expenses: &[expense::Model],
    exclude_expense: Option<Uuid>,
) -> BudgetLineBalance {
    let members: Vec<&budget_line::Model> = series
        .iter()
        .filter(|other| {
            other.area_id == line.area_id
                && other.name == line.name
                && other.reference_month <= line.reference_month
        })
        .collect();
    let member_ids: HashSet<Uuid> = members.iter().map(|other| other.id).collect();

    let counted = || {
        expenses
            .iter()
            .filter(move |e| Some(e.id) != exclude_expense)
    };

    let month_planned = line.planned_amount();
    let month_spent: Money = counted()
        .filter(|e| e.budget_line_id == Some(line.id))
        .map(expense::Model::amount)
        .sum();
    let accumulated_planned: Money = members.iter().map(|m| m.planned_amount()).sum();
    let accumulated_spent: Money = counted()
        .filter(|e| e.budget_line_id.is_some_and(|id| member_ids.contains(&id)))
        .map(expense::Model::amount)
        .sum();

    BudgetLineBalance {
        budget_line_id: line.id,
        area_id: line.area_id,
        name: line.name.clone(),
        reference_month: line.reference_month,
        month_planned,
        month_spent,
        month_balance: month_planned - month_spent,
        accumulated_planned,
        accumulated_spent,
        accumulated_balance: accumulated_planned - accumulated_spent,
    }
}

async fn require_card<C: ConnectionTrait>(db: &C, card_id: Uuid) -> Result<card::Model> {
    Card::find_by_id(card_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("card", card_id))
}

async fn require_area<C: ConnectionTrait>(db: &C, area_id: Uuid) -> Result<()> {
    Area::find_by_id(area_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("area", area_id))?;
    Ok(())
}

/// Deposited, spent and available totals of one card.
pub async fn card_balance<C: ConnectionTrait>(db: &C, card_id: Uuid) -> Result<CardBalance> {
    require_card(db, card_id).await?;

    let deposited: Money = Deposit::find()
        .filter(deposit::Column::CardId.eq(card_id))
        .all(db)
        .await?
        .iter()
        .map(deposit::Model::amount)
        .sum();
    let spent: Money = Expense::find()
        .filter(expense::Column::CardId.eq(card_id))
        .all(db)
        .await?
        .iter()
        .map(expense::Model::amount)
        .sum();

    let balance = CardBalance {
        card_id,
        deposited,
        spent,
        balance: deposited - spent,
    };
    debug!(?balance, "Computed card balance");
    Ok(balance)
}

/// Allocated, spent and available totals of one area across all cards.
pub async fn area_balance<C: ConnectionTrait>(db: &C, area_id: Uuid) -> Result<AreaBalance> {
    require_area(db, area_id).await?;

    let allocated: Money = Allocation::find()
        .filter(allocation::Column::AreaId.eq(area_id))
        .all(db)
        .await?
        .iter()
        .map(allocation::Model::amount)
        .sum();
    let spent: Money = Expense::find()
        .filter(expense::Column::AreaId.eq(area_id))
        .all(db)
        .await?
        .iter()
        .map(expense::Model::amount)
        .sum();

    let balance = AreaBalance {
        area_id,
        allocated,
        spent,
        balance: allocated - spent,
    };
    debug!(?balance, "Computed area balance");
    Ok(balance)
}

/// Allocated, spent and available totals of one area funded by one card.
pub async fn area_card_balance<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    card_id: Uuid,
) -> Result<AreaCardBalance> {
    area_card_balance_excluding(db, area_id, card_id, None).await
}

pub(crate) async fn area_card_balance_excluding<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    card_id: Uuid,
    exclude_expense: Option<Uuid>,
) -> Result<AreaCardBalance> {
    require_area(db, area_id).await?;
    require_card(db, card_id).await?;

    let allocated: Money = Allocation::find()
        .join(JoinType::InnerJoin, allocation::Relation::Deposit.def())
        .filter(allocation::Column::AreaId.eq(area_id))
        .filter(deposit::Column::CardId.eq(card_id))
        .all(db)
        .await?
        .iter()
        .map(allocation::Model::amount)
        .sum();

    let mut expenses = Expense::find()
        .filter(expense::Column::AreaId.eq(area_id))
        .filter(expense::Column::CardId.eq(card_id));
    if let Some(expense_id) = exclude_expense {
        expenses = expenses.filter(expense::Column::Id.ne(expense_id));
    }
    let spent: Money = expenses
        .all(db)
        .await?
        .iter()
        .map(expense::Model::amount)
        .sum();

    let balance = AreaCardBalance {
        area_id,
        card_id,
        allocated,
        spent,
        balance: allocated - spent,
    };
    debug!(?balance, "Computed area/card balance");
    Ok(balance)
}

/// Month-only and accumulated balance of one budget line.
pub async fn budget_line_balance<C: ConnectionTrait>(
    db: &C,
    budget_line_id: Uuid,
) -> Result<BudgetLineBalance> {
    budget_line_balance_excluding(db, budget_line_id, None).await
}

pub(crate) async fn budget_line_balance_excluding<C: ConnectionTrait>(
    db: &C,
    budget_line_id: Uuid,
    exclude_expense: Option<Uuid>,
) -> Result<BudgetLineBalance> {
    let line = BudgetLine::find_by_id(budget_line_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("budget line", budget_line_id))?;

    let series = BudgetLine::find()
        .filter(budget_line::Column::AreaId.eq(line.area_id))
        .filter(budget_line::Column::Name.eq(line.name.as_str()))
        .filter(budget_line::Column::ReferenceMonth.lte(line.reference_month))
        .all(db)
        .await?;
    let series_ids: Vec<Uuid> = series.iter().map(|l| l.id).collect();

    let expenses = Expense::find()
        .filter(expense::Column::BudgetLineId.is_in(series_ids))
        .all(db)
        .await?;

    let balance = fold_budget_line(&line, &series, &expenses, exclude_expense);
    debug!(?balance, "Computed budget line balance");
    Ok(balance)
}

/// Sum of the planned amounts of the active budget lines of an area, optionally
/// leaving one line out (the one being edited).
pub async fn total_planned_for_area<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    exclude_line_id: Option<Uuid>,
) -> Result<Money> {
    let mut query = BudgetLine::find()
        .filter(budget_line::Column::AreaId.eq(area_id))
        .filter(budget_line::Column::IsActive.eq(true));
    if let Some(line_id) = exclude_line_id {
        query = query.filter(budget_line::Column::Id.ne(line_id));
    }
    Ok(query
        .all(db)
        .await?
        .iter()
        .map(budget_line::Model::planned_amount)
        .sum())
}

/// Balances of every card, ordered by card name.
pub async fn card_balances<C: ConnectionTrait>(db: &C) -> Result<Vec<CardBalance>> {
    let cards = Card::find().order_by_asc(card::Column::Name).all(db).await?;

    let mut deposited: HashMap<Uuid, Money> = HashMap::new();
    for row in Deposit::find().all(db).await? {
        *deposited.entry(row.card_id).or_default() += row.amount();
    }
    let mut spent: HashMap<Uuid, Money> = HashMap::new();
    for row in Expense::find().all(db).await? {
        *spent.entry(row.card_id).or_default() += row.amount();
    }

    Ok(cards
        .into_iter()
        .map(|card| {
            let deposited = deposited.get(&card.id).copied().unwrap_or_default();
            let spent = spent.get(&card.id).copied().unwrap_or_default();
            CardBalance {
                card_id: card.id,
                deposited,
                spent,
                balance: deposited - spent,
            }
        })
        .collect())
}

/// Balances of every area, ordered by area name.
pub async fn area_balances<C: ConnectionTrait>(db: &C) -> Result<Vec<AreaBalance>> {
    let areas = Area::find()
        .order_by_asc(crate::entities::area::Column::Name)
        .all(db)
        .await?;

    let mut allocated: HashMap<Uuid, Money> = HashMap::new();
    for row in Allocation::find().all(db).await? {
        *allocated.entry(row.area_id).or_default() += row.amount();
    }
    let mut spent: HashMap<Uuid, Money> = HashMap::new();
    for row in Expense::find().all(db).await? {
        *spent.entry(row.area_id).or_default() += row.amount();
    }

    Ok(areas
        .into_iter()
        .map(|area| {
            let allocated = allocated.get(&area.id).copied().unwrap_or_default();
            let spent = spent.get(&area.id).copied().unwrap_or_default();
            AreaBalance {
                area_id: area.id,
                allocated,
                spent,
                balance: allocated - spent,
            }
        })
        .collect())
}

/// Per-card balances of one area, for every card that funded or paid for it, ordered
/// by card name.
pub async fn area_card_balances<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
) -> Result<Vec<AreaCardBalance>> {
    require_area(db, area_id).await?;

    let mut allocated: HashMap<Uuid, Money> = HashMap::new();
    let rows = Allocation::find()
        .filter(allocation::Column::AreaId.eq(area_id))
        .find_also_related(Deposit)
        .all(db)
        .await?;
    for (row, parent) in rows {
        if let Some(parent) = parent {
            *allocated.entry(parent.card_id).or_default() += row.amount();
        }
    }

    let mut spent: HashMap<Uuid, Money> = HashMap::new();
    for row in Expense::find()
        .filter(expense::Column::AreaId.eq(area_id))
        .all(db)
        .await?
    {
        *spent.entry(row.card_id).or_default() += row.amount();
    }

    let cards = Card::find().order_by_asc(card::Column::Name).all(db).await?;
    Ok(cards
        .into_iter()
        .filter(|card| allocated.contains_key(&card.id) || spent.contains_key(&card.id))
        .map(|card| {
            let allocated = allocated.get(&card.id).copied().unwrap_or_default();
            let spent = spent.get(&card.id).copied().unwrap_or_default();
            AreaCardBalance {
                area_id,
                card_id: card.id,
                allocated,
                spent,
                balance: allocated - spent,
            }
        })
        .collect())
}

/// Balances of the active budget lines of an area, optionally restricted to one
/// reference month, ordered by name then month.
pub async fn budget_line_balances<C: ConnectionTrait>(
    db: &C,
    area_id: Uuid,
    month: Option<NaiveDate>,
) -> Result<Vec<BudgetLineBalance>> {
    require_area(db, area_id).await?;

    let lines = BudgetLine::find()
        .filter(budget_line::Column::AreaId.eq(area_id))
        .order_by_asc(budget_line::Column::Name)
        .order_by_asc(budget_line::Column::ReferenceMonth)
        .all(db)
        .await?;
    let line_ids: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
    let expenses = Expense::find()
        .filter(expense::Column::BudgetLineId.is_in(line_ids))
        .all(db)
        .await?;

    let month = month.map(month_start);
    Ok(lines
        .iter()
        .filter(|line| line.is_active)
        .filter(|line| month.is_none_or(|m| line.reference_month == m))
        .map(|line| fold_budget_line(line, &lines, &expenses, None))
        .collect())
}

/// Expense totals grouped by reference month, card and area, in that order.
pub async fn monthly_summary<C: ConnectionTrait>(
    db: &C,
    month: Option<NaiveDate>,
) -> Result<Vec<MonthlySummary>> {
    let mut query = Expense::find();
    if let Some(month) = month {
        query = query.filter(expense::Column::ReferenceMonth.eq(month_start(month)));
    }

    let mut groups: BTreeMap<(NaiveDate, Uuid, Uuid), (Money, u64)> = BTreeMap::new();
    for row in query.all(db).await? {
        let entry = groups
            .entry((row.reference_month, row.card_id, row.area_id))
            .or_default();
        entry.0 += row.amount();
        entry.1 += 1;
    }

    Ok(groups
        .into_iter()
        .map(
            |((reference_month, card_id, area_id), (total, expense_count))| MonthlySummary {
                reference_month,
                card_id,
                area_id,
                total,
                expense_count,
            },
        )
        .collect())
}
