//! Card entity - A corporate card that receives deposits and pays for expenses.
//!
//! A card may be restricted to a set of areas through [`super::card_area`]. An
//! empty link set means the card may be used for any area.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Card database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cards")]
pub struct Model {
    /// Unique identifier for the card
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Display name (e.g., "Corporate Visa")
    pub name: String,
    /// Last four digits printed on the card
    pub last_four_digits: String,
    /// Issuing bank
    pub bank: String,
    /// Soft activation flag; inactive cards keep their history
    pub is_active: bool,
    /// When the card was registered
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Card and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One card has many deposits
    #[sea_orm(has_many = "super::deposit::Entity")]
    Deposits,
    /// One card pays for many expenses
    #[sea_orm(has_many = "super::expense::Entity")]
    Expenses,
    /// Areas this card is restricted to
    #[sea_orm(has_many = "super::card_area::Entity")]
    CardAreas,
}

impl Related<super::deposit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deposits.def()
    }
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<super::card_area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CardAreas.def()
    }
}

impl Related<super::area::Entity> for Entity {
    fn to() -> RelationDef {
        super::card_area::Relation::Area.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::card_area::Relation::Card.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
