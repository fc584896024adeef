// In-memory implementation of EconomyProvider.
//
// Used by tests and as a scratch provider. Follows the same contract as the
// SQLite provider; the core doesn't know or care which one it is talking to.

#[cfg(test)]
use super::AccountKind;
use crate::core::economy::{
    Account, Amount, BankAccount, Currency, EconomyError, EconomyFeature, EconomyProvider,
    Identity,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Balances keyed by normalized currency identifier.
#[derive(Clone, Debug, Default)]
struct StoredBalances {
    balances: HashMap<String, Decimal>,
}

impl StoredBalances {
    fn get(&self, key: &str) -> Decimal {
        self.balances.get(key).copied().unwrap_or(Decimal::ZERO)
    }

    fn deposit(&mut self, key: String, amount: Amount) -> Result<Amount, EconomyError> {
        let new_balance = Amount::clamped(self.get(&key)).checked_add(amount)?;
        self.balances.insert(key, new_balance.value());
        Ok(new_balance)
    }

    fn withdraw(&mut self, key: String, amount: Amount) -> Result<Amount, EconomyError> {
        let available = Amount::clamped(self.get(&key));
        if amount > available {
            return Err(EconomyError::InsufficientFunds {
                required: amount.value(),
                available: available.value(),
            });
        }
        let new_balance = available.checked_sub(amount)?;
        self.balances.insert(key, new_balance.value());
        Ok(new_balance)
    }
}

#[derive(Clone, Debug, Default)]
struct StoredBank {
    balances: StoredBalances,
    owners: HashSet<Identity>,
    members: HashSet<Identity>,
}

/// Anything stored in the maps that carries balances.
trait HoldsBalances: Send + Sync + 'static {
    fn balances(&self) -> &StoredBalances;
    fn balances_mut(&mut self) -> &mut StoredBalances;
}

impl HoldsBalances for StoredBalances {
    fn balances(&self) -> &StoredBalances {
        self
    }

    fn balances_mut(&mut self) -> &mut StoredBalances {
        self
    }
}

impl HoldsBalances for StoredBank {
    fn balances(&self) -> &StoredBalances {
        &self.balances
    }

    fn balances_mut(&mut self) -> &mut StoredBalances {
        &mut self.balances
    }
}

/// In-memory implementation of EconomyProvider.
///
/// **DashMap:**
/// Every mutation of an account happens while holding that entry's guard, so
/// writes for one identity never overlap even when callers run concurrently.
pub struct InMemoryProvider {
    name: String,
    bank_support: bool,
    currencies: Arc<Vec<Currency>>,
    players: Arc<DashMap<Identity, StoredBalances>>,
    banks: Arc<DashMap<Identity, StoredBank>>,
}

impl InMemoryProvider {
    /// Create an empty provider with bank support and no currencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bank_support: true,
            currencies: Arc::new(Vec::new()),
            players: Arc::new(DashMap::new()),
            banks: Arc::new(DashMap::new()),
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        let currencies = Arc::make_mut(&mut self.currencies);
        if !currencies.iter().any(|c| c.matches(currency.identifier())) {
            currencies.push(currency);
        }
        self
    }

    pub fn with_bank_support(mut self, enabled: bool) -> Self {
        self.bank_support = enabled;
        self
    }

    fn ensure_bank_support(&self) -> Result<(), EconomyError> {
        if self.bank_support {
            Ok(())
        } else {
            Err(EconomyError::UnsupportedFeature(EconomyFeature::BankAccounts))
        }
    }

    fn player_handle(&self, identity: Identity) -> InMemoryAccount<StoredBalances> {
        InMemoryAccount {
            identity,
            currencies: Arc::clone(&self.currencies),
            map: Arc::clone(&self.players),
        }
    }

    fn bank_handle(&self, identity: Identity) -> InMemoryAccount<StoredBank> {
        InMemoryAccount {
            identity,
            currencies: Arc::clone(&self.currencies),
            map: Arc::clone(&self.banks),
        }
    }

    /// Overwrite a stored balance without any validation, to simulate a
    /// provider that reports rounding noise.
    #[cfg(test)]
    pub(crate) fn force_balance(
        &self,
        kind: AccountKind,
        identity: Identity,
        currency: &str,
        value: Decimal,
    ) {
        let key = currency.to_ascii_lowercase();
        match kind {
            AccountKind::Player => {
                self.players
                    .entry(identity)
                    .or_default()
                    .balances
                    .insert(key, value);
            }
            AccountKind::Bank => {
                self.banks
                    .entry(identity)
                    .or_default()
                    .balances
                    .balances
                    .insert(key, value);
            }
        }
    }
}

fn sorted_keys<V>(map: &DashMap<Identity, V>) -> Vec<Identity> {
    let mut ids: Vec<Identity> = map.iter().map(|entry| *entry.key()).collect();
    ids.sort();
    ids
}

#[async_trait]
impl EconomyProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, feature: EconomyFeature) -> bool {
        match feature {
            EconomyFeature::BankAccounts => self.bank_support,
        }
    }

    async fn currencies(&self) -> Result<Vec<Currency>, EconomyError> {
        Ok(self.currencies.as_ref().clone())
    }

    async fn account_ids(&self) -> Result<Vec<Identity>, EconomyError> {
        Ok(sorted_keys(&self.players))
    }

    async fn bank_account_ids(&self) -> Result<Vec<Identity>, EconomyError> {
        self.ensure_bank_support()?;
        Ok(sorted_keys(&self.banks))
    }

    async fn account(&self, identity: Identity) -> Result<Option<Box<dyn Account>>, EconomyError> {
        if self.players.contains_key(&identity) {
            Ok(Some(Box::new(self.player_handle(identity))))
        } else {
            Ok(None)
        }
    }

    async fn bank_account(
        &self,
        identity: Identity,
    ) -> Result<Option<Box<dyn BankAccount>>, EconomyError> {
        self.ensure_bank_support()?;
        if self.banks.contains_key(&identity) {
            Ok(Some(Box::new(self.bank_handle(identity))))
        } else {
            Ok(None)
        }
    }

    async fn create_account(&self, identity: Identity) -> Result<Box<dyn Account>, EconomyError> {
        // entry() makes check-and-insert atomic
        match self.players.entry(identity) {
            Entry::Occupied(_) => Err(EconomyError::AccountAlreadyExists(identity)),
            Entry::Vacant(slot) => {
                slot.insert(StoredBalances::default());
                Ok(Box::new(self.player_handle(identity)))
            }
        }
    }

    async fn create_bank_account(
        &self,
        identity: Identity,
    ) -> Result<Box<dyn BankAccount>, EconomyError> {
        self.ensure_bank_support()?;
        match self.banks.entry(identity) {
            Entry::Occupied(_) => Err(EconomyError::AccountAlreadyExists(identity)),
            Entry::Vacant(slot) => {
                slot.insert(StoredBank::default());
                Ok(Box::new(self.bank_handle(identity)))
            }
        }
    }
}

/// Handle to one account inside an `InMemoryProvider`.
struct InMemoryAccount<T> {
    identity: Identity,
    currencies: Arc<Vec<Currency>>,
    map: Arc<DashMap<Identity, T>>,
}

impl<T: HoldsBalances> InMemoryAccount<T> {
    fn currency_key(&self, currency: &Currency) -> Result<String, EconomyError> {
        self.currencies
            .iter()
            .find(|known| known.matches(currency.identifier()))
            .map(Currency::key)
            .ok_or_else(|| EconomyError::UnknownCurrency(currency.identifier().to_string()))
    }

    fn missing(&self) -> EconomyError {
        EconomyError::StoreError(format!("account '{}' no longer exists", self.identity))
    }
}

#[async_trait]
impl<T: HoldsBalances> Account for InMemoryAccount<T> {
    fn identity(&self) -> Identity {
        self.identity
    }

    async fn balance(&self, currency: &Currency) -> Result<Decimal, EconomyError> {
        let key = self.currency_key(currency)?;
        let entry = self.map.get(&self.identity).ok_or_else(|| self.missing())?;
        Ok(entry.balances().get(&key))
    }

    async fn deposit(&self, amount: Decimal, currency: &Currency) -> Result<Amount, EconomyError> {
        let amount = Amount::new(amount)?;
        let key = self.currency_key(currency)?;
        let mut entry = self
            .map
            .get_mut(&self.identity)
            .ok_or_else(|| self.missing())?;
        entry.balances_mut().deposit(key, amount)
    }

    async fn withdraw(
        &self,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<Amount, EconomyError> {
        let amount = Amount::new(amount)?;
        let key = self.currency_key(currency)?;
        let mut entry = self
            .map
            .get_mut(&self.identity)
            .ok_or_else(|| self.missing())?;
        entry.balances_mut().withdraw(key, amount)
    }
}

#[async_trait]
impl BankAccount for InMemoryAccount<StoredBank> {
    async fn owners(&self) -> Result<HashSet<Identity>, EconomyError> {
        let entry = self.map.get(&self.identity).ok_or_else(|| self.missing())?;
        Ok(entry.owners.clone())
    }

    async fn members(&self) -> Result<HashSet<Identity>, EconomyError> {
        let entry = self.map.get(&self.identity).ok_or_else(|| self.missing())?;
        Ok(entry.members.clone())
    }

    async fn add_owner(&self, identity: Identity) -> Result<(), EconomyError> {
        let mut entry = self
            .map
            .get_mut(&self.identity)
            .ok_or_else(|| self.missing())?;
        entry.owners.insert(identity);
        Ok(())
    }

    async fn add_member(&self, identity: Identity) -> Result<(), EconomyError> {
        let mut entry = self
            .map
            .get_mut(&self.identity)
            .ok_or_else(|| self.missing())?;
        entry.members.insert(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn store() -> InMemoryProvider {
        InMemoryProvider::new("Memory")
            .with_currency(Currency::new("USD").with_symbol("$"))
            .with_currency(Currency::new("coins").with_decimal_digits(0))
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = store();
        let id = Uuid::new_v4();
        let usd = store.resolve_currency("usd").await.unwrap();

        let first = store.get_or_create_account(id).await.unwrap();
        first.deposit(dec("12.5"), &usd).await.unwrap();

        let second = store.get_or_create_account(id).await.unwrap();
        assert_eq!(second.balance(&usd).await.unwrap(), dec("12.5"));
        assert_eq!(store.account_ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = store();
        let id = Uuid::new_v4();

        store.create_account(id).await.unwrap();
        let again = store.create_account(id).await;

        assert!(matches!(again, Err(EconomyError::AccountAlreadyExists(i)) if i == id));
    }

    #[tokio::test]
    async fn test_withdraw_guards() {
        let store = store();
        let usd = store.resolve_currency("USD").await.unwrap();
        let account = store.create_account(Uuid::new_v4()).await.unwrap();
        account.deposit(dec("10"), &usd).await.unwrap();

        assert!(matches!(
            account.withdraw(dec("-1"), &usd).await,
            Err(EconomyError::InvalidAmount(_))
        ));
        assert!(matches!(
            account.deposit(dec("-1"), &usd).await,
            Err(EconomyError::InvalidAmount(_))
        ));
        assert_eq!(
            account.withdraw(dec("10.01"), &usd).await,
            Err(EconomyError::InsufficientFunds {
                required: dec("10.01"),
                available: dec("10"),
            })
        );

        let remaining = account.withdraw(dec("4"), &usd).await.unwrap();
        assert_eq!(remaining.value(), dec("6"));
        assert_eq!(account.balance(&usd).await.unwrap(), dec("6"));
    }

    #[tokio::test]
    async fn test_unknown_currency() {
        let store = store();
        let account = store.create_account(Uuid::new_v4()).await.unwrap();
        let gems = Currency::new("gems");

        assert_eq!(
            account.deposit(dec("1"), &gems).await,
            Err(EconomyError::UnknownCurrency("gems".to_string()))
        );
        assert!(matches!(
            store.resolve_currency("gems").await,
            Err(EconomyError::UnknownCurrency(_))
        ));
    }

    #[tokio::test]
    async fn test_bank_owners_and_members_are_idempotent() {
        let store = store();
        let bank = store.create_bank_account(Uuid::new_v4()).await.unwrap();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();

        bank.add_owner(owner).await.unwrap();
        bank.add_owner(owner).await.unwrap();
        bank.add_member(member).await.unwrap();
        bank.add_member(member).await.unwrap();

        assert_eq!(bank.owners().await.unwrap(), HashSet::from([owner]));
        assert_eq!(bank.members().await.unwrap(), HashSet::from([member]));
        assert!(bank.is_owner(owner).await.unwrap());
        assert!(!bank.is_member(owner).await.unwrap());
    }

    #[tokio::test]
    async fn test_bank_operations_without_support() {
        let store = store().with_bank_support(false);

        assert!(!store.supports_bank_accounts());
        assert!(matches!(
            store.get_or_create_bank_account(Uuid::new_v4()).await,
            Err(EconomyError::UnsupportedFeature(EconomyFeature::BankAccounts))
        ));
        assert!(matches!(
            store.bank_account_ids().await,
            Err(EconomyError::UnsupportedFeature(_))
        ));
    }
}
