//! Area business logic - Cost centers that receive allocations and incur expenses.

use crate::{
    entities::{Area, area},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;
use tracing::{info, instrument};

/// Fields of an area as entered by a user.
#[derive(Clone, Debug, Deserialize)]
pub struct NewArea {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: String,
}

/// Creates a new, active area.
#[instrument(skip(db, input), fields(name = %input.name))]
pub async fn create_area(db: &DatabaseConnection, input: NewArea) -> Result<area::Model> {
    let name = super::required_text(&input.name, "name")?;
    let color = super::required_text(&input.color, "color")?;

    let area = area::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(super::optional_text(input.description)),
        color: Set(color),
        is_active: Set(true),
        created_at: Set(chrono::Utc::now()),
    };

    let result = area.insert(db).await?;
    info!(area_id = %result.id, "Created area");
    Ok(result)
}

/// Replaces the editable fields of an area.
#[instrument(skip(db, input))]
pub async fn update_area(
    db: &DatabaseConnection,
    area_id: Uuid,
    input: NewArea,
) -> Result<area::Model> {
    let name = super::required_text(&input.name, "name")?;
    let color = super::required_text(&input.color, "color")?;

    let existing = Area::find_by_id(area_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("area", area_id))?;

    let mut area: area::ActiveModel = existing.into();
    area.name = Set(name);
    area.description = Set(super::optional_text(input.description));
    area.color = Set(color);

    let result = area.update(db).await?;
    info!("Updated area");
    Ok(result)
}

/// Activates or deactivates an area.
#[instrument(skip(db))]
pub async fn set_area_active(
    db: &DatabaseConnection,
    area_id: Uuid,
    active: bool,
) -> Result<area::Model> {
    let existing = Area::find_by_id(area_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("area", area_id))?;

    let mut area: area::ActiveModel = existing.into();
    area.is_active = Set(active);
    let result = area.update(db).await?;
    info!("Area active flag set to {}", active);
    Ok(result)
}

/// Finds an area by its id.
pub async fn get_area<C: ConnectionTrait>(db: &C, area_id: Uuid) -> Result<Option<area::Model>> {
    Area::find_by_id(area_id).one(db).await.map_err(Into::into)
}

/// Lists areas alphabetically, optionally only the active ones.
pub async fn list_areas<C: ConnectionTrait>(db: &C, active_only: bool) -> Result<Vec<area::Model>> {
    let mut query = Area::find().order_by_asc(area::Column::Name);
    if active_only {
        query = query.filter(area::Column::IsActive.eq(true));
    }
    query.all(db).await.map_err(Into::into)
}
