use super::economy_error::EconomyError;
use super::money::{Amount, Currency};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

/// Stable external identity of an account holder (a player, or a bank).
pub type Identity = Uuid;

/// A balance holder owned by a provider.
///
/// Every mutation is persisted by the owning provider before the call returns,
/// so a balance read right after a successful deposit/withdraw sees the new value.
#[async_trait]
pub trait Account: Send + Sync {
    fn identity(&self) -> Identity;

    /// Current balance for a currency, as reported by the provider.
    ///
    /// Providers must not report negative balances, but callers moving money
    /// still run the value through `clamp_non_negative` first.
    async fn balance(&self, currency: &Currency) -> Result<Decimal, EconomyError>;

    /// Credit the account. Returns the new balance.
    async fn deposit(&self, amount: Decimal, currency: &Currency) -> Result<Amount, EconomyError>;

    /// Debit the account. Returns the new balance.
    ///
    /// Fails with `InsufficientFunds` when `amount` exceeds the current balance.
    async fn withdraw(&self, amount: Decimal, currency: &Currency)
        -> Result<Amount, EconomyError>;
}

/// A shared account with owner and member identity sets.
#[async_trait]
pub trait BankAccount: Account {
    async fn owners(&self) -> Result<HashSet<Identity>, EconomyError>;

    async fn members(&self) -> Result<HashSet<Identity>, EconomyError>;

    /// Adding an identity that is already an owner is a no-op.
    async fn add_owner(&self, identity: Identity) -> Result<(), EconomyError>;

    /// Adding an identity that is already a member is a no-op.
    async fn add_member(&self, identity: Identity) -> Result<(), EconomyError>;

    async fn is_owner(&self, identity: Identity) -> Result<bool, EconomyError> {
        Ok(self.owners().await?.contains(&identity))
    }

    async fn is_member(&self, identity: Identity) -> Result<bool, EconomyError> {
        Ok(self.members().await?.contains(&identity))
    }
}
