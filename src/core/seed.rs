//! Catalog seeding from config.toml.
//!
//! Seeding only ever adds records. Areas are matched by name, cards by name and last
//! four digits, budget lines by area, name and month; anything already present is
//! skipped with a warning, so running the seed on every start is harmless.

use crate::{
    config::catalog::Config,
    core::{
        areas::{self, NewArea},
        budget_lines::{self, BudgetLineInput, PlanningCeiling},
        cards::{self, NewCard},
        month_start,
    },
    entities::{Area, BudgetLine, Card, budget_line, card},
    errors::{Error, Result},
};
use sea_orm::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Counts of what a seeding run created and skipped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub areas_created: usize,
    pub cards_created: usize,
    pub budget_lines_created: usize,
    pub skipped: usize,
}

fn unknown_area(owner: &str, area: &str) -> Error {
    Error::Config {
        message: format!("{owner} refers to unknown area '{area}'"),
    }
}

/// Creates the configured areas, cards and budget lines that do not exist yet.
///
/// Each new card is stored together with its area links in one transaction. Links are
/// only written for newly created cards so that links edited later are never
/// overwritten. Budget lines are seeded without enforcing the planning ceiling since
/// plans are usually entered before the money arrives.
///
/// # Arguments
/// * `db` - Database connection
/// * `config` - Parsed configuration whose catalog sections are seeded
///
/// # Errors
/// Returns [`Error::Config`] when a card or budget line names an unknown area, or any
/// validation or database error raised while creating a record.
#[instrument(skip(db, config))]
pub async fn seed_catalog(db: &DatabaseConnection, config: &Config) -> Result<SeedReport> {
    info!(
        "Seeding catalog: {} area(s), {} card(s), {} budget line(s) in config",
        config.areas.len(),
        config.cards.len(),
        config.budget_lines.len()
    );
    let mut report = SeedReport::default();

    let mut area_ids: HashMap<String, Uuid> = Area::find()
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.name, a.id))
        .collect();

    for cfg_area in &config.areas {
        let name = cfg_area.name.trim();
        if area_ids.contains_key(name) {
            warn!("Area '{}' already exists. Skipping.", name);
            report.skipped += 1;
            continue;
        }
        let created = areas::create_area(
            db,
            NewArea {
                name: cfg_area.name.clone(),
                description: cfg_area.description.clone(),
                color: cfg_area.color.clone(),
            },
        )
        .await?;
        area_ids.insert(created.name.clone(), created.id);
        report.areas_created += 1;
    }

    for cfg_card in &config.cards {
        let existing = Card::find()
            .filter(card::Column::Name.eq(cfg_card.name.trim()))
            .filter(card::Column::LastFourDigits.eq(cfg_card.last_four_digits.trim()))
            .one(db)
            .await?;
        if existing.is_some() {
            warn!(
                "Card '{}' ending in {} already exists. Skipping.",
                cfg_card.name, cfg_card.last_four_digits
            );
            report.skipped += 1;
            continue;
        }

        let links = cfg_card
            .areas
            .iter()
            .map(|name| {
                area_ids
                    .get(name.trim())
                    .copied()
                    .ok_or_else(|| unknown_area(&format!("Card '{}'", cfg_card.name), name))
            })
            .collect::<Result<Vec<Uuid>>>()?;

        cards::create_card_with_areas(
            db,
            NewCard {
                name: cfg_card.name.clone(),
                last_four_digits: cfg_card.last_four_digits.clone(),
                bank: cfg_card.bank.clone(),
            },
            &links,
        )
        .await?;
        report.cards_created += 1;
    }

    for cfg_line in &config.budget_lines {
        let area_id = area_ids
            .get(cfg_line.area.trim())
            .copied()
            .ok_or_else(|| {
                unknown_area(&format!("Budget line '{}'", cfg_line.name), &cfg_line.area)
            })?;
        let reference_month = month_start(cfg_line.reference_month);

        let existing = BudgetLine::find()
            .filter(budget_line::Column::AreaId.eq(area_id))
            .filter(budget_line::Column::Name.eq(cfg_line.name.trim()))
            .filter(budget_line::Column::ReferenceMonth.eq(reference_month))
            .one(db)
            .await?;
        if existing.is_some() {
            warn!(
                "Budget line '{}' for {} already exists. Skipping.",
                cfg_line.name, reference_month
            );
            report.skipped += 1;
            continue;
        }

        budget_lines::create_budget_line(
            db,
            BudgetLineInput {
                area_id,
                name: cfg_line.name.clone(),
                planned_amount: cfg_line.planned_amount,
                reference_month,
                description: cfg_line.description.clone(),
            },
            PlanningCeiling::Warn,
        )
        .await?;
        report.budget_lines_created += 1;
    }

    debug!(?report, "Seeding finished");
    info!(
        "Seeded {} area(s), {} card(s), {} budget line(s); skipped {}",
        report.areas_created, report.cards_created, report.budget_lines_created, report.skipped
    );
    Ok(report)
}
