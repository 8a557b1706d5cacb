//! Expense entity - Money spent with a card on behalf of an area.
//!
//! Each expense has a `card_id`, an `area_id`, an optional `budget_line_id`, the amount,
//! a description, the date it happened, the reference month it counts against and the
//! id of whoever recorded it.

use crate::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Expense database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    /// Unique identifier for the expense
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Card that paid
    pub card_id: Uuid,
    /// Area the cost is charged to
    pub area_id: Uuid,
    /// Budget line the cost is drawn from, if any
    pub budget_line_id: Option<Uuid>,
    /// Spent amount in cents, always positive
    pub amount_cents: i64,
    /// Human-readable description of the expense
    pub description: String,
    /// Day the purchase happened
    pub expense_date: Date,
    /// First day of the month the expense counts against
    pub reference_month: Date,
    /// Id of the user who recorded the expense
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Spent amount.
    #[must_use]
    pub const fn amount(&self) -> Money {
        Money::new(self.amount_cents)
    }
}

/// Defines relationships between Expense and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::card::Entity",
        from = "Column::CardId",
        to = "super::card::Column::Id"
    )]
    Card,
    #[sea_orm(
        belongs_to = "super::area::Entity",
        from = "Column::AreaId",
        to = "super::area::Column::Id"
    )]
    Area,
    #[sea_orm(
        belongs_to = "super::budget_line::Entity",
        from = "Column::BudgetLineId",
        to = "super::budget_line::Column::Id"
    )]
    BudgetLine,
}

impl Related<super::card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Card.def()
    }
}

impl Related<super::area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Area.def()
    }
}

impl Related<super::budget_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BudgetLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
