//! Budget ledger: per-scope consumable quotas with lazy period resets.

pub mod ledger;
pub mod types;

pub use ledger::BudgetLedger;
pub use types::{
    AlertLevel, Budget, BudgetAlert, BudgetCheck, BudgetPeriod, BudgetSpec, BudgetStatus,
    BudgetType, BudgetUpdate,
};
