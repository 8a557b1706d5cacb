use card_ledger::{
    config::{catalog, database},
    core::{
        areas, balances,
        budget_lines::{self, PlanningCeiling},
        cards, seed,
    },
    errors::Result,
};
use dotenvy::dotenv;
use std::collections::HashMap;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also come from the environment
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load ledger configuration; a missing file means an empty catalog
    let config_path = catalog::config_path();
    let config = if std::path::Path::new(&config_path).exists() {
        catalog::load_config(&config_path)
            .inspect_err(|e| error!("Failed to load {}: {}", config_path, e))?
    } else {
        warn!("{} not found, starting with an empty catalog", config_path);
        catalog::Config::default()
    };
    info!(
        "Planning ceiling policy: {:?}",
        config.ledger.planning_ceiling
    );

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Seed the catalog from config
    seed::seed_catalog(&db, &config)
        .await
        .inspect_err(|e| error!("Failed to seed catalog: {}", e))?;

    // 6. Report current balances
    let card_names: HashMap<_, _> = cards::list_cards(&db, false)
        .await?
        .into_iter()
        .map(|c| (c.id, format!("{} *{}", c.name, c.last_four_digits)))
        .collect();
    for balance in balances::card_balances(&db).await? {
        let name = card_names.get(&balance.card_id).map_or("?", String::as_str);
        info!(
            "Card {}: deposited {}, spent {}, available {}",
            name, balance.deposited, balance.spent, balance.balance
        );
    }

    let area_list = areas::list_areas(&db, false).await?;
    let area_names: HashMap<_, _> = area_list.iter().map(|a| (a.id, a.name.as_str())).collect();
    for balance in balances::area_balances(&db).await? {
        let name = area_names.get(&balance.area_id).copied().unwrap_or("?");
        info!(
            "Area {}: allocated {}, spent {}, available {}",
            name, balance.allocated, balance.spent, balance.balance
        );
    }

    for area in area_list.iter().filter(|a| a.is_active) {
        for line in balances::budget_line_balances(&db, area.id, None).await? {
            info!(
                "Budget line {} / {} ({}): month {} of {}, accumulated {} of {}",
                area.name,
                line.name,
                line.reference_month.format("%Y-%m"),
                line.month_spent,
                line.month_planned,
                line.accumulated_spent,
                line.accumulated_planned
            );
        }
    }

    // 7. Report over-planned areas at the severity of the configured ceiling
    for (area, room) in budget_lines::overplanned_areas(&db).await? {
        match config.ledger.planning_ceiling {
            PlanningCeiling::Warn => warn!(
                "Area {} has {} planned against {} allocated",
                area.name, room.already_planned, room.allocated
            ),
            PlanningCeiling::Enforce => error!(
                "Area {} breaks the enforced planning ceiling: {} planned against {} allocated",
                area.name, room.already_planned, room.allocated
            ),
        }
    }

    Ok(())
}
