//! Area entity - A cost center that receives allocations and incurs expenses.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Area database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "areas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-readable name (e.g., "Marketing")
    pub name: String,
    pub description: Option<String>,
    /// Display color, not interpreted by the ledger
    pub color: String,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Area and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::allocation::Entity")]
    Allocations,
    #[sea_orm(has_many = "super::expense::Entity")]
    Expenses,
    #[sea_orm(has_many = "super::budget_line::Entity")]
    BudgetLines,
    #[sea_orm(has_many = "super::card_area::Entity")]
    CardAreas,
}

impl Related<super::allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<super::budget_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BudgetLines.def()
    }
}

impl Related<super::card_area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CardAreas.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
