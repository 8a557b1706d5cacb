/// Database configuration and connection management
pub mod database;

/// Ledger settings and catalog seed data loaded from config.toml
pub mod catalog;
