//! Ledger configuration loading from config.toml
//!
//! The file carries the ledger settings (currently the planning ceiling policy) and the
//! catalog used to seed the database: areas, cards with their area links and budget lines.
//! Seeding itself lives in [`crate::core::seed`].

use crate::core::budget_lines::PlanningCeiling;
use crate::errors::{Error, Result};
use crate::money::Money;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

/// Default config file location when `LEDGER_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Ledger-wide rules
    #[serde(default)]
    pub ledger: LedgerSettings,
    /// Areas to create
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
    /// Cards to create, each optionally restricted to named areas
    #[serde(default)]
    pub cards: Vec<CardConfig>,
    /// Budget lines to create
    #[serde(default)]
    pub budget_lines: Vec<BudgetLineConfig>,
}

/// Ledger-wide rules
#[derive(Debug, Default, Deserialize, Clone, Copy)]
pub struct LedgerSettings {
    /// What happens when planned budget lines exceed an area's allocations.
    ///
    /// Passed by callers to `create_budget_line` and `update_budget_line`. Seeding
    /// always warns; the startup report logs over-planned areas as errors under
    /// `enforce`.
    #[serde(default)]
    pub planning_ceiling: PlanningCeiling,
}

/// Configuration for a single area
#[derive(Debug, Deserialize, Clone)]
pub struct AreaConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
}

/// Configuration for a single card
#[derive(Debug, Deserialize, Clone)]
pub struct CardConfig {
    pub name: String,
    pub last_four_digits: String,
    pub bank: String,
    /// Names of the areas this card is restricted to; empty means unrestricted
    #[serde(default)]
    pub areas: Vec<String>,
}

/// Configuration for a single budget line
#[derive(Debug, Deserialize, Clone)]
pub struct BudgetLineConfig {
    /// Name of the owning area
    pub area: String,
    pub name: String,
    /// Decimal string such as `"500.00"`
    pub planned_amount: Money,
    /// Any day of the planned month, as `"YYYY-MM-DD"`
    pub reference_month: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_color() -> String {
    "#6b7280".to_string()
}

/// Loads ledger configuration from a TOML file
///
/// # Errors
/// Returns [`Error::Config`] if the file cannot be read or its contents are not a
/// valid configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!(
            "Failed to read config file {}: {e}",
            path.as_ref().display()
        ),
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Path of the configuration file: `LEDGER_CONFIG` or `./config.toml`.
#[must_use]
pub fn config_path() -> String {
    std::env::var("LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Loads configuration from [`config_path`].
pub fn load_default_config() -> Result<Config> {
    load_config(config_path())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r##"
            [ledger]
            planning_ceiling = "enforce"

            [[areas]]
            name = "Marketing"
            color = "#ff8800"

            [[areas]]
            name = "Engineering"
            description = "Cloud and tooling"

            [[cards]]
            name = "Corporate Visa"
            last_four_digits = "4242"
            bank = "First Bank"
            areas = ["Marketing"]

            [[budget_lines]]
            area = "Marketing"
            name = "Ads"
            planned_amount = "500.00"
            reference_month = "2024-01-15"
        "##;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.ledger.planning_ceiling, PlanningCeiling::Enforce);
        assert_eq!(config.areas.len(), 2);
        assert_eq!(config.areas[0].color, "#ff8800");
        assert_eq!(config.areas[1].color, default_color());
        assert_eq!(
            config.areas[1].description.as_deref(),
            Some("Cloud and tooling")
        );
        assert_eq!(config.cards[0].areas, vec!["Marketing".to_string()]);
        assert_eq!(config.budget_lines[0].planned_amount, Money::new(500_00));
        assert_eq!(
            config.budget_lines[0].reference_month,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.ledger.planning_ceiling, PlanningCeiling::Warn);
        assert!(config.areas.is_empty());
        assert!(config.cards.is_empty());
        assert!(config.budget_lines.is_empty());
    }

    #[test]
    fn test_invalid_amount_is_config_error() {
        let toml_str = r#"
            [[budget_lines]]
            area = "Marketing"
            name = "Ads"
            planned_amount = "12.345"
            reference_month = "2024-01-01"
        "#;

        let err = parse_config(toml_str).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_config("definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
