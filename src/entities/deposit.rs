//! Deposit entity - Money loaded onto a card for a reference month.
//!
//! A deposit is always split across areas by its [`super::allocation`] rows, and
//! the allocation amounts sum to the deposit amount (within one cent).

use crate::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Deposit database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deposits")]
pub struct Model {
    /// Unique identifier for the deposit
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Card the money was loaded onto
    pub card_id: Uuid,
    /// Deposited amount in cents, always positive
    pub amount_cents: i64,
    /// First day of the month the deposit belongs to
    pub reference_month: Date,
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Deposited amount.
    #[must_use]
    pub const fn amount(&self) -> Money {
        Money::new(self.amount_cents)
    }
}

/// Defines relationships between Deposit and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each deposit belongs to one card
    #[sea_orm(
        belongs_to = "super::card::Entity",
        from = "Column::CardId",
        to = "super::card::Column::Id"
    )]
    Card,
    /// One deposit is split into many allocations
    #[sea_orm(has_many = "super::allocation::Entity")]
    Allocations,
}

impl Related<super::card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Card.def()
    }
}

impl Related<super::allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
