//! Unified error types for the card ledger.
//!
//! Every operation returns [`Result`]. Callers that render errors for people
//! (a web layer, a report) should use [`Error::kind`] or [`Error::report`]
//! rather than matching on message text.

use crate::money::Money;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Rule violations detected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Allocations total {allocated} but the deposit is {amount}")]
    AllocationMismatch { allocated: Money, amount: Money },

    #[error("{field} must be greater than zero (got {amount})")]
    NonPositiveAmount { field: &'static str, amount: Money },

    #[error("{field} cannot be negative (got {amount})")]
    NegativeAmount { field: &'static str, amount: Money },

    #[error("{field} is required")]
    MissingRequiredField { field: &'static str },

    #[error("Last four digits must be exactly 4 digits (got {value:?})")]
    InvalidLastFourDigits { value: String },

    #[error("Area {area_id} appears more than once in the allocation list")]
    DuplicateAllocationArea { area_id: Uuid },

    #[error("Area {area_id} is not linked to card {card_id}")]
    AreaNotLinkedToCard { card_id: Uuid, area_id: Uuid },

    #[error("Budget line {budget_line_id} does not belong to area {area_id}")]
    BudgetLineAreaMismatch { budget_line_id: Uuid, area_id: Uuid },

    #[error("Planned total {planned} would exceed the {allocated} allocated to area {area_id}")]
    PlanningCeilingExceeded {
        area_id: Uuid,
        allocated: Money,
        planned: Money,
    },

    #[error("Budget line {budget_line_id} is referenced by {expenses} expense(s)")]
    BudgetLineInUse { budget_line_id: Uuid, expenses: u64 },

    #[error("Invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: &'static str },

    #[error("Cannot distribute an amount across zero areas")]
    NothingToDistribute,
}

impl ValidationError {
    /// Stable machine-readable code for this violation.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AllocationMismatch { .. } => "allocation_mismatch",
            Self::NonPositiveAmount { .. } => "non_positive_amount",
            Self::NegativeAmount { .. } => "negative_amount",
            Self::MissingRequiredField { .. } => "missing_required_field",
            Self::InvalidLastFourDigits { .. } => "invalid_last_four_digits",
            Self::DuplicateAllocationArea { .. } => "duplicate_allocation_area",
            Self::AreaNotLinkedToCard { .. } => "area_not_linked_to_card",
            Self::BudgetLineAreaMismatch { .. } => "budget_line_area_mismatch",
            Self::PlanningCeilingExceeded { .. } => "planning_ceiling_exceeded",
            Self::BudgetLineInUse { .. } => "budget_line_in_use",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::NothingToDistribute => "nothing_to_distribute",
        }
    }
}

/// Errors returned by ledger operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{record} not found: {id}")]
    NotFound { record: &'static str, id: String },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Money, requested: Money },

    #[error(
        "Insufficient budget line balance on {budget_line_id}: available {available}, requested {requested}"
    )]
    InsufficientBudgetLine {
        budget_line_id: Uuid,
        available: Money,
        requested: Money,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Shorthand for a missing record.
    pub(crate) fn not_found(record: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            record,
            id: id.to_string(),
        }
    }

    /// Coarse category of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::InsufficientBudgetLine { .. } => ErrorKind::InsufficientBudgetLine,
            Self::Database(_) | Self::Io(_) => ErrorKind::StoreFailure,
            Self::Config { .. } => ErrorKind::Configuration,
        }
    }

    /// Serializable summary suitable for handing to a presentation layer.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        let code = match self {
            Self::Validation(inner) => inner.code(),
            Self::NotFound { .. } => "not_found",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientBudgetLine { .. } => "insufficient_budget_line",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Config { .. } => "config",
        };
        ErrorReport {
            kind: self.kind(),
            code,
            message: self.to_string(),
        }
    }
}

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientBalance,
    InsufficientBudgetLine,
    StoreFailure,
    Configuration,
}

/// What a caller needs to show an error to a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
