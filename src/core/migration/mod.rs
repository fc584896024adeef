// Migration module - moves balances and bank relationships from one economy
// provider to another.

mod migration_models;
mod migration_service;

pub use migration_models::{CurrencyCorrespondence, CurrencyPair, MigrationSummary};
pub use migration_service::{MigrationError, MigrationService};
