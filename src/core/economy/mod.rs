// Economy module - the provider-agnostic economy API.
//
// Providers (in-memory, SQLite, anything else) implement these traits and the
// migration engine only ever talks to them through this module.

mod account;
mod economy_error;
pub mod money;
mod provider;

pub use account::{Account, BankAccount, Identity};
pub use economy_error::{EconomyError, EconomyFeature};
pub use money::{clamp_non_negative, Amount, Currency};
pub use provider::EconomyProvider;
