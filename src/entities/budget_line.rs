//! Budget line entity - A planned amount for a named purpose within an area and month.
//!
//! Lines that share an area and a name across months form one accumulation series:
//! unspent planned money of earlier months stays available to later ones.

use crate::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget line database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budget_lines")]
pub struct Model {
    /// Unique identifier for the budget line
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Area the plan belongs to
    pub area_id: Uuid,
    /// Name shared by every month of the series (e.g., "Ads")
    pub name: String,
    /// Planned amount in cents, always positive
    pub planned_amount_cents: i64,
    /// First day of the planned month
    pub reference_month: Date,
    pub description: Option<String>,
    /// Inactive lines are hidden from listings and from the planning total
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Planned amount.
    #[must_use]
    pub const fn planned_amount(&self) -> Money {
        Money::new(self.planned_amount_cents)
    }
}

/// Defines relationships between BudgetLine and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::area::Entity",
        from = "Column::AreaId",
        to = "super::area::Column::Id"
    )]
    Area,
    #[sea_orm(has_many = "super::expense::Entity")]
    Expenses,
}

impl Related<super::area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Area.def()
    }
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
