//! Card business logic - Card catalog maintenance and card/area links.
//!
//! Cards are created, edited and soft-deactivated; they are never deleted because
//! deposits and expenses keep referring to them. A card's link set restricts which
//! areas its deposits may fund and its expenses may be charged to. An empty link set
//! leaves the card unrestricted.

use crate::{
    entities::{Area, Card, CardArea, card, card_area},
    errors::{Error, Result, ValidationError},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Fields of a card as entered by a user.
#[derive(Clone, Debug, Deserialize)]
pub struct NewCard {
    pub name: String,
    pub last_four_digits: String,
    pub bank: String,
}

/// Validated and trimmed card fields.
struct CardFields {
    name: String,
    last_four_digits: String,
    bank: String,
}

fn validate_card(input: &NewCard) -> std::result::Result<CardFields, ValidationError> {
    let name = super::required_text(&input.name, "name")?;
    let bank = super::required_text(&input.bank, "bank")?;
    let digits = input.last_four_digits.trim();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidLastFourDigits {
            value: input.last_four_digits.clone(),
        });
    }
    Ok(CardFields {
        name,
        last_four_digits: digits.to_string(),
        bank,
    })
}

async fn insert_card<C: ConnectionTrait>(db: &C, fields: CardFields) -> Result<card::Model> {
    let card = card::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(fields.name),
        last_four_digits: Set(fields.last_four_digits),
        bank: Set(fields.bank),
        is_active: Set(true),
        created_at: Set(chrono::Utc::now()),
    };
    Ok(card.insert(db).await?)
}

/// Registers a new, active card.
///
/// The name and bank are trimmed and must not be blank; the last four digits must be
/// exactly four ASCII digits. The card starts with no area links, which leaves it
/// unrestricted.
///
/// # Arguments
/// * `db` - Database connection
/// * `input` - Card fields as entered by a user
///
/// # Errors
/// Returns a validation error for bad fields or a database error if the insert fails.
#[instrument(skip(db, input), fields(name = %input.name))]
pub async fn create_card(db: &DatabaseConnection, input: NewCard) -> Result<card::Model> {
    let fields = validate_card(&input)?;
    let result = insert_card(db, fields).await?;
    info!(card_id = %result.id, "Created card");
    Ok(result)
}

/// Registers a new card already restricted to `area_ids`, in one transaction.
///
/// Either the card and every link are stored or nothing is. An empty `area_ids`
/// behaves like [`create_card`].
///
/// # Errors
/// Returns `NotFound` if any area does not exist, in which case no card is created.
#[instrument(skip(db, input), fields(name = %input.name))]
pub async fn create_card_with_areas(
    db: &DatabaseConnection,
    input: NewCard,
    area_ids: &[Uuid],
) -> Result<card::Model> {
    let fields = validate_card(&input)?;
    let unique: BTreeSet<Uuid> = area_ids.iter().copied().collect();

    let txn = db.begin().await?;
    let card = insert_card(&txn, fields).await?;
    replace_card_areas(&txn, card.id, &unique).await?;
    txn.commit().await?;

    info!(card_id = %card.id, "Created card linked to {} area(s)", unique.len());
    Ok(card)
}

/// Replaces the editable fields of a card.
#[instrument(skip(db, input))]
pub async fn update_card(
    db: &DatabaseConnection,
    card_id: Uuid,
    input: NewCard,
) -> Result<card::Model> {
    let fields = validate_card(&input)?;

    let existing = Card::find_by_id(card_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("card", card_id))?;

    let mut card: card::ActiveModel = existing.into();
    card.name = Set(fields.name);
    card.last_four_digits = Set(fields.last_four_digits);
    card.bank = Set(fields.bank);

    let result = card.update(db).await?;
    info!("Updated card");
    Ok(result)
}

/// Activates or deactivates a card. History is untouched either way.
#[instrument(skip(db))]
pub async fn set_card_active(
    db: &DatabaseConnection,
    card_id: Uuid,
    active: bool,
) -> Result<card::Model> {
    let existing = Card::find_by_id(card_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("card", card_id))?;

    let mut card: card::ActiveModel = existing.into();
    card.is_active = Set(active);
    let result = card.update(db).await?;
    info!("Card active flag set to {}", active);
    Ok(result)
}

/// Finds a card by its id.
pub async fn get_card<C: ConnectionTrait>(db: &C, card_id: Uuid) -> Result<Option<card::Model>> {
    Card::find_by_id(card_id).one(db).await.map_err(Into::into)
}

/// Lists cards alphabetically, optionally only the active ones.
pub async fn list_cards<C: ConnectionTrait>(db: &C, active_only: bool) -> Result<Vec<card::Model>> {
    let mut query = Card::find().order_by_asc(card::Column::Name);
    if active_only {
        query = query.filter(card::Column::IsActive.eq(true));
    }
    query.all(db).await.map_err(Into::into)
}

/// Returns the ids of the areas a card is restricted to.
pub async fn card_area_ids<C: ConnectionTrait>(db: &C, card_id: Uuid) -> Result<Vec<Uuid>> {
    let links = CardArea::find()
        .filter(card_area::Column::CardId.eq(card_id))
        .all(db)
        .await?;
    Ok(links.into_iter().map(|link| link.area_id).collect())
}

/// Writes exactly `area_ids` as the link set of `card_id`, checking each area exists.
async fn replace_card_areas<C: ConnectionTrait>(
    txn: &C,
    card_id: Uuid,
    area_ids: &BTreeSet<Uuid>,
) -> Result<()> {
    for area_id in area_ids {
        Area::find_by_id(*area_id)
            .one(txn)
            .await?
            .ok_or_else(|| Error::not_found("area", area_id))?;
    }

    CardArea::delete_many()
        .filter(card_area::Column::CardId.eq(card_id))
        .exec(txn)
        .await?;

    for area_id in area_ids {
        card_area::ActiveModel {
            card_id: Set(card_id),
            area_id: Set(*area_id),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

/// Atomically replaces the link set of a card.
///
/// Repeated ids are collapsed. An empty slice removes every restriction, after which
/// the card may fund and pay for any area. Existing deposits and expenses are not
/// re-checked against the new links.
///
/// # Arguments
/// * `db` - Database connection
/// * `card_id` - The card whose links are replaced
/// * `area_ids` - The complete new link set
///
/// # Errors
/// Returns `NotFound` if the card or any area does not exist; the old links are kept.
#[instrument(skip(db))]
pub async fn set_card_areas(db: &DatabaseConnection, card_id: Uuid, area_ids: &[Uuid]) -> Result<()> {
    let unique: BTreeSet<Uuid> = area_ids.iter().copied().collect();

    let txn = db.begin().await?;
    super::claim_card(&txn, card_id).await?;
    replace_card_areas(&txn, card_id, &unique).await?;
    txn.commit().await?;

    info!("Card linked to {} area(s)", unique.len());
    Ok(())
}

/// Ensures every area exists and is usable with the card's link set.
pub(crate) async fn check_areas_for_card<C>(db: &C, card_id: Uuid, area_ids: &[Uuid]) -> Result<()>
where
    C: ConnectionTrait,
{
    for area_id in area_ids {
        Area::find_by_id(*area_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("area", area_id))?;
    }

    let linked = card_area_ids(db, card_id).await?;
    if linked.is_empty() {
        return Ok(());
    }
    if let Some(area_id) = area_ids.iter().find(|id| !linked.contains(*id)) {
        return Err(ValidationError::AreaNotLinkedToCard {
            card_id,
            area_id: *area_id,
        }
        .into());
    }
    Ok(())
}
