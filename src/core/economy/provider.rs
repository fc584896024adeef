use super::account::{Account, BankAccount, Identity};
use super::economy_error::{EconomyError, EconomyFeature};
use super::money::Currency;
use async_trait::async_trait;

/// A named economy store exposing currencies and accounts.
///
/// This abstraction allows different implementations (in-memory for testing,
/// SQLite for production) and is the only thing the migration engine sees.
#[async_trait]
pub trait EconomyProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether an optional capability is available.
    fn supports(&self, feature: EconomyFeature) -> bool;

    fn supports_bank_accounts(&self) -> bool {
        self.supports(EconomyFeature::BankAccounts)
    }

    /// Every currency this provider knows about.
    async fn currencies(&self) -> Result<Vec<Currency>, EconomyError>;

    /// Look up a currency by identifier (case-insensitive).
    async fn resolve_currency(&self, identifier: &str) -> Result<Currency, EconomyError> {
        self.currencies()
            .await?
            .into_iter()
            .find(|currency| currency.matches(identifier))
            .ok_or_else(|| EconomyError::UnknownCurrency(identifier.to_string()))
    }

    /// Identities of all individual accounts.
    async fn account_ids(&self) -> Result<Vec<Identity>, EconomyError>;

    /// Identities of all bank accounts. Fails with `UnsupportedFeature`
    /// when the provider has no bank support.
    async fn bank_account_ids(&self) -> Result<Vec<Identity>, EconomyError>;

    async fn account(&self, identity: Identity) -> Result<Option<Box<dyn Account>>, EconomyError>;

    async fn bank_account(
        &self,
        identity: Identity,
    ) -> Result<Option<Box<dyn BankAccount>>, EconomyError>;

    /// Create an individual account. Fails with `AccountAlreadyExists` if one
    /// is already there; callers should check `has_account` first.
    async fn create_account(&self, identity: Identity) -> Result<Box<dyn Account>, EconomyError>;

    /// Create a bank account. Fails with `AccountAlreadyExists` if one is
    /// already there, `UnsupportedFeature` without bank support.
    async fn create_bank_account(
        &self,
        identity: Identity,
    ) -> Result<Box<dyn BankAccount>, EconomyError>;

    async fn has_account(&self, identity: Identity) -> Result<bool, EconomyError> {
        Ok(self.account(identity).await?.is_some())
    }

    async fn has_bank_account(&self, identity: Identity) -> Result<bool, EconomyError> {
        Ok(self.bank_account(identity).await?.is_some())
    }

    /// Fetch the account, creating it if it doesn't exist.
    ///
    /// If another writer creates it between the lookup and the insert, the
    /// provider's `AccountAlreadyExists` is passed through.
    async fn get_or_create_account(
        &self,
        identity: Identity,
    ) -> Result<Box<dyn Account>, EconomyError> {
        match self.account(identity).await? {
            Some(account) => Ok(account),
            None => self.create_account(identity).await,
        }
    }

    async fn get_or_create_bank_account(
        &self,
        identity: Identity,
    ) -> Result<Box<dyn BankAccount>, EconomyError> {
        match self.bank_account(identity).await? {
            Some(account) => Ok(account),
            None => self.create_bank_account(identity).await,
        }
    }
}
