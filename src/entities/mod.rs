//! Entity module - Contains all SeaORM entity definitions for the ledger store.
//! These entities represent the database tables and their relationships.
//! Amounts are stored as integer cents; each model exposes them as [`crate::Money`].

pub mod allocation;
pub mod area;
pub mod budget_line;
pub mod card;
pub mod card_area;
pub mod deposit;
pub mod expense;

// Re-export specific types to avoid conflicts
pub use allocation::{Column as AllocationColumn, Entity as Allocation, Model as AllocationModel};
pub use area::{Column as AreaColumn, Entity as Area, Model as AreaModel};
pub use budget_line::{
    Column as BudgetLineColumn, Entity as BudgetLine, Model as BudgetLineModel,
};
pub use card::{Column as CardColumn, Entity as Card, Model as CardModel};
pub use card_area::{Column as CardAreaColumn, Entity as CardArea, Model as CardAreaModel};
pub use deposit::{Column as DepositColumn, Entity as Deposit, Model as DepositModel};
pub use expense::{Column as ExpenseColumn, Entity as Expense, Model as ExpenseModel};
