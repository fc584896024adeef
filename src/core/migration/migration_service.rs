// Migration engine - transfers accounts from one economy provider to another.
//
// The pass is sequential and holds no state beyond a single run:
// 1. Build the currency correspondence (once).
// 2. Visit every individual account in the source.
// 3. Visit every bank account, if both providers support them.
//
// Money always leaves the source before it lands in the destination, so the
// source can never show value the destination hasn't been credited with yet.
// Any error while accounts are being processed aborts the whole run; transfers
// already applied to earlier accounts stay applied.

use super::migration_models::{CurrencyCorrespondence, CurrencyPair, MigrationSummary, MigrationTally};
use crate::core::economy::{Account, Amount, EconomyError, EconomyProvider};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MigrationError {
    #[error("Cannot migrate provider '{0}' into itself")]
    ProvidersIdentical(String),

    #[error("Migration aborted: {0}")]
    Aborted(#[from] EconomyError),
}

/// Runs one migration over a fixed (source, destination) pair.
pub struct MigrationService<'a> {
    source: &'a dyn EconomyProvider,
    destination: &'a dyn EconomyProvider,
}

impl<'a> MigrationService<'a> {
    pub fn new(source: &'a dyn EconomyProvider, destination: &'a dyn EconomyProvider) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Execute the migration.
    ///
    /// Returns the summary on success. No partial summary is produced on abort.
    pub async fn run(&self) -> Result<MigrationSummary, MigrationError> {
        self.ensure_distinct()?;

        tracing::info!(
            "Migrating from '{}' to '{}'.",
            self.source.name(),
            self.destination.name()
        );

        let mut tally = MigrationTally::start();
        let correspondence = CurrencyCorrespondence::build(self.source, self.destination).await?;

        self.migrate_player_accounts(&correspondence.migratable, &mut tally)
            .await?;

        if self.source.supports_bank_accounts() && self.destination.supports_bank_accounts() {
            self.migrate_bank_accounts(&correspondence.migratable, &mut tally)
                .await?;
            tally.bank_accounts_migrated = true;
        } else {
            tracing::debug!("Bank accounts not supported by both providers, skipping them.");
        }

        let summary = tally.finish(self.source, self.destination, correspondence);
        tracing::info!(
            "Migration finished in {:?}: {} player accounts, {} bank accounts.",
            summary.elapsed,
            summary.player_accounts_processed,
            summary.bank_accounts_processed
        );
        Ok(summary)
    }

    /// Reject a store being migrated into itself, before anything is touched.
    fn ensure_distinct(&self) -> Result<(), MigrationError> {
        let same_instance = std::ptr::addr_eq(
            self.source as *const dyn EconomyProvider,
            self.destination as *const dyn EconomyProvider,
        );

        if same_instance || self.source.name().eq_ignore_ascii_case(self.destination.name()) {
            return Err(MigrationError::ProvidersIdentical(
                self.source.name().to_string(),
            ));
        }
        Ok(())
    }

    async fn migrate_player_accounts(
        &self,
        currencies: &[CurrencyPair],
        tally: &mut MigrationTally,
    ) -> Result<(), EconomyError> {
        for identity in self.source.account_ids().await? {
            tracing::debug!("Migrating player account of identity '{}'.", identity);

            let origin = self
                .source
                .account(identity)
                .await?
                .ok_or(EconomyError::AccountNotFound(identity))?;
            let target = if self.destination.has_account(identity).await? {
                self.destination.get_or_create_account(identity).await?
            } else {
                self.destination.create_account(identity).await?
            };

            transfer_balances(&*origin, &*target, currencies, tally).await?;
            tally.player_accounts_processed += 1;
        }

        Ok(())
    }

    async fn migrate_bank_accounts(
        &self,
        currencies: &[CurrencyPair],
        tally: &mut MigrationTally,
    ) -> Result<(), EconomyError> {
        for identity in self.source.bank_account_ids().await? {
            tracing::debug!("Migrating bank account of identity '{}'.", identity);

            let origin = self
                .source
                .bank_account(identity)
                .await?
                .ok_or(EconomyError::AccountNotFound(identity))?;

            let target = if self.destination.has_bank_account(identity).await? {
                // Relationships of an existing destination bank are left alone.
                self.destination.get_or_create_bank_account(identity).await?
            } else {
                let created = self.destination.create_bank_account(identity).await?;
                for owner in origin.owners().await? {
                    created.add_owner(owner).await?;
                }
                for member in origin.members().await? {
                    created.add_member(member).await?;
                }
                created
            };

            transfer_balances(&*origin, &*target, currencies, tally).await?;
            tally.bank_accounts_processed += 1;
        }

        Ok(())
    }
}

/// Move every correlated currency's balance from `origin` to `target`.
async fn transfer_balances<O, T>(
    origin: &O,
    target: &T,
    currencies: &[CurrencyPair],
    tally: &mut MigrationTally,
) -> Result<(), EconomyError>
where
    O: Account + ?Sized,
    T: Account + ?Sized,
{
    for pair in currencies {
        let balance = Amount::clamped(origin.balance(&pair.source).await?);

        origin.withdraw(balance.value(), &pair.source).await?;
        target.deposit(balance.value(), &pair.destination).await?;

        tally.record_transfer(&pair.source, balance)?;
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::economy::{BankAccount, Currency, EconomyFeature, Identity};
    use crate::infra::economy::{AccountKind, InMemoryProvider};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn provider(name: &str, currencies: &[&str]) -> InMemoryProvider {
        currencies
            .iter()
            .fold(InMemoryProvider::new(name), |p, id| {
                p.with_currency(Currency::new(*id))
            })
    }

    async fn fund(p: &InMemoryProvider, identity: Identity, currency: &str, amount: &str) {
        let currency = p.resolve_currency(currency).await.unwrap();
        p.get_or_create_account(identity)
            .await
            .unwrap()
            .deposit(dec(amount), &currency)
            .await
            .unwrap();
    }

    async fn fund_bank(p: &InMemoryProvider, identity: Identity, currency: &str, amount: &str) {
        let currency = p.resolve_currency(currency).await.unwrap();
        p.get_or_create_bank_account(identity)
            .await
            .unwrap()
            .deposit(dec(amount), &currency)
            .await
            .unwrap();
    }

    async fn balance_of(p: &InMemoryProvider, identity: Identity, currency: &str) -> Decimal {
        let currency = p.resolve_currency(currency).await.unwrap();
        p.account(identity)
            .await
            .unwrap()
            .expect("account should exist")
            .balance(&currency)
            .await
            .unwrap()
    }

    async fn bank_balance_of(p: &InMemoryProvider, identity: Identity, currency: &str) -> Decimal {
        let currency = p.resolve_currency(currency).await.unwrap();
        p.bank_account(identity)
            .await
            .unwrap()
            .expect("bank should exist")
            .balance(&currency)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_currency_correspondence_splits_migratable_and_skipped() {
        let from = provider("Alpha", &["USD", "EUR"]);
        let to = provider("Beta", &["usd", "GBP"]);

        let summary = MigrationService::new(&from, &to).run().await.unwrap();

        assert_eq!(
            summary.migrated_currencies.into_iter().collect::<Vec<_>>(),
            vec!["USD".to_string()]
        );
        assert_eq!(
            summary.skipped_currencies.into_iter().collect::<Vec<_>>(),
            vec!["EUR".to_string()]
        );
    }

    #[tokio::test]
    async fn test_player_balance_moves_to_new_account() {
        let from = provider("Alpha", &["USD"]);
        let to = provider("Beta", &["USD"]);
        let p1 = Uuid::new_v4();
        fund(&from, p1, "USD", "100.0").await;

        let summary = MigrationService::new(&from, &to).run().await.unwrap();

        assert_eq!(summary.player_accounts_processed, 1);
        assert_eq!(balance_of(&to, p1, "USD").await, dec("100.0"));
        assert_eq!(balance_of(&from, p1, "USD").await, Decimal::ZERO);
        assert_eq!(summary.transferred["USD"].value(), dec("100.0"));
    }

    #[tokio::test]
    async fn test_same_provider_is_rejected() {
        let shared = provider("Alpha", &["USD"]);
        let p1 = Uuid::new_v4();
        fund(&shared, p1, "USD", "5").await;

        let result = MigrationService::new(&shared, &shared).run().await;

        assert_eq!(
            result.unwrap_err(),
            MigrationError::ProvidersIdentical("Alpha".to_string())
        );
        assert_eq!(balance_of(&shared, p1, "USD").await, dec("5"));
    }

    #[tokio::test]
    async fn test_providers_with_matching_names_are_rejected() {
        let from = provider("Alpha", &["USD"]);
        let to = provider("ALPHA", &["USD"]);

        let result = MigrationService::new(&from, &to).run().await;

        assert!(matches!(result, Err(MigrationError::ProvidersIdentical(_))));
    }

    #[tokio::test]
    async fn test_new_bank_gets_owners_and_members() {
        let from = provider("Alpha", &["USD"]);
        let to = provider("Beta", &["USD"]);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let b1 = Uuid::new_v4();

        let bank = from.create_bank_account(b1).await.unwrap();
        bank.add_owner(a).await.unwrap();
        bank.add_owner(b).await.unwrap();
        bank.add_member(c).await.unwrap();
        fund_bank(&from, b1, "USD", "250").await;

        let summary = MigrationService::new(&from, &to).run().await.unwrap();

        let migrated = to.bank_account(b1).await.unwrap().unwrap();
        assert_eq!(migrated.owners().await.unwrap(), HashSet::from([a, b]));
        assert_eq!(migrated.members().await.unwrap(), HashSet::from([c]));
        assert_eq!(bank_balance_of(&to, b1, "USD").await, dec("250"));
        assert_eq!(bank_balance_of(&from, b1, "USD").await, Decimal::ZERO);
        assert_eq!(summary.bank_accounts_processed, 1);
        assert!(summary.bank_accounts_migrated);
    }

    #[tokio::test]
    async fn test_existing_bank_keeps_its_owners_but_receives_balance() {
        let from = provider("Alpha", &["USD"]);
        let to = provider("Beta", &["USD"]);
        let (a, b, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let b1 = Uuid::new_v4();

        let bank = from.create_bank_account(b1).await.unwrap();
        bank.add_owner(a).await.unwrap();
        bank.add_owner(b).await.unwrap();
        fund_bank(&from, b1, "USD", "40").await;

        to.create_bank_account(b1)
            .await
            .unwrap()
            .add_owner(d)
            .await
            .unwrap();
        fund_bank(&to, b1, "USD", "2").await;

        MigrationService::new(&from, &to).run().await.unwrap();

        let existing = to.bank_account(b1).await.unwrap().unwrap();
        assert_eq!(existing.owners().await.unwrap(), HashSet::from([d]));
        assert!(existing.members().await.unwrap().is_empty());
        assert_eq!(bank_balance_of(&to, b1, "USD").await, dec("42"));
    }

    #[tokio::test]
    async fn test_negative_noise_is_clamped_and_nothing_moves() {
        let from = provider("Alpha", &["USD"]);
        let to = provider("Beta", &["USD"]);
        let p1 = Uuid::new_v4();
        from.create_account(p1).await.unwrap();
        from.force_balance(AccountKind::Player, p1, "USD", dec("-0.000000000001"));

        let summary = MigrationService::new(&from, &to).run().await.unwrap();

        assert_eq!(summary.player_accounts_processed, 1);
        assert_eq!(balance_of(&to, p1, "USD").await, Decimal::ZERO);
        assert!(summary.transferred["USD"].is_zero());
    }

    #[tokio::test]
    async fn test_value_is_conserved_per_currency() {
        let from = provider("Alpha", &["USD", "GEMS", "EUR"]);
        let to = provider("Beta", &["usd", "gems"]);
        let players: Vec<Identity> = (0..5).map(|_| Uuid::new_v4()).collect();
        let amounts = ["0.10", "12.345", "0", "999.99", "3"];

        for (identity, amount) in players.iter().zip(amounts) {
            fund(&from, *identity, "USD", amount).await;
            fund(&from, *identity, "GEMS", "7").await;
            fund(&from, *identity, "EUR", "1").await;
        }
        let bank = Uuid::new_v4();
        fund_bank(&from, bank, "USD", "50.5").await;

        let summary = MigrationService::new(&from, &to).run().await.unwrap();

        let mut usd_total = Decimal::ZERO;
        let mut gems_total = Decimal::ZERO;
        for identity in &players {
            usd_total += balance_of(&to, *identity, "USD").await;
            gems_total += balance_of(&to, *identity, "GEMS").await;
            // Skipped currencies stay where they were
            assert_eq!(balance_of(&from, *identity, "EUR").await, dec("1"));
        }
        usd_total += bank_balance_of(&to, bank, "USD").await;

        assert_eq!(usd_total, dec("1065.935"));
        assert_eq!(gems_total, dec("35"));
        assert_eq!(summary.transferred["USD"].value(), dec("1065.935"));
        assert_eq!(summary.player_accounts_processed, 5);
        assert_eq!(summary.bank_accounts_processed, 1);
    }

    #[tokio::test]
    async fn test_existing_destination_player_is_credited_not_duplicated() {
        let from = provider("Alpha", &["USD"]);
        let to = provider("Beta", &["USD"]);
        let p1 = Uuid::new_v4();
        fund(&from, p1, "USD", "10").await;
        fund(&to, p1, "USD", "5").await;

        MigrationService::new(&from, &to).run().await.unwrap();

        assert_eq!(to.account_ids().await.unwrap(), vec![p1]);
        assert_eq!(balance_of(&to, p1, "USD").await, dec("15"));
    }

    #[tokio::test]
    async fn test_bank_pass_skipped_without_support() {
        let from = provider("Alpha", &["USD"]);
        let to = provider("Beta", &["USD"]).with_bank_support(false);
        let b1 = Uuid::new_v4();
        fund_bank(&from, b1, "USD", "9").await;

        let summary = MigrationService::new(&from, &to).run().await.unwrap();

        assert!(!summary.bank_accounts_migrated);
        assert_eq!(summary.bank_accounts_processed, 0);
        assert_eq!(bank_balance_of(&from, b1, "USD").await, dec("9"));
    }

    /// Delegates to an in-memory provider, with switches for injecting faults.
    struct FaultyProvider {
        inner: InMemoryProvider,
        creations_left: AtomicUsize,
        phantom_accounts: Vec<Identity>,
        phantom_banks: Vec<Identity>,
        reject_deposits: bool,
    }

    impl FaultyProvider {
        fn new(inner: InMemoryProvider) -> Self {
            Self {
                inner,
                creations_left: AtomicUsize::new(usize::MAX),
                phantom_accounts: Vec::new(),
                phantom_banks: Vec::new(),
                reject_deposits: false,
            }
        }

        fn wrap(&self, account: Box<dyn Account>) -> Box<dyn Account> {
            if self.reject_deposits {
                Box::new(RejectingDeposits(account))
            } else {
                account
            }
        }
    }

    /// An account whose withdrawals work but whose deposits always fail.
    struct RejectingDeposits(Box<dyn Account>);

    #[async_trait]
    impl Account for RejectingDeposits {
        fn identity(&self) -> Identity {
            self.0.identity()
        }

        async fn balance(&self, currency: &Currency) -> Result<Decimal, EconomyError> {
            self.0.balance(currency).await
        }

        async fn deposit(&self, _amount: Decimal, _currency: &Currency) -> Result<Amount, EconomyError> {
            Err(EconomyError::StoreError("disk full".to_string()))
        }

        async fn withdraw(&self, amount: Decimal, currency: &Currency) -> Result<Amount, EconomyError> {
            self.0.withdraw(amount, currency).await
        }
    }

    #[async_trait]
    impl EconomyProvider for FaultyProvider {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn supports(&self, feature: EconomyFeature) -> bool {
            self.inner.supports(feature)
        }

        async fn currencies(&self) -> Result<Vec<Currency>, EconomyError> {
            self.inner.currencies().await
        }

        async fn account_ids(&self) -> Result<Vec<Identity>, EconomyError> {
            let mut ids = self.inner.account_ids().await?;
            ids.extend(self.phantom_accounts.iter().copied());
            Ok(ids)
        }

        async fn bank_account_ids(&self) -> Result<Vec<Identity>, EconomyError> {
            let mut ids = self.inner.bank_account_ids().await?;
            ids.extend(self.phantom_banks.iter().copied());
            Ok(ids)
        }

        async fn account(
            &self,
            identity: Identity,
        ) -> Result<Option<Box<dyn Account>>, EconomyError> {
            Ok(self.inner.account(identity).await?.map(|a| self.wrap(a)))
        }

        async fn bank_account(
            &self,
            identity: Identity,
        ) -> Result<Option<Box<dyn BankAccount>>, EconomyError> {
            self.inner.bank_account(identity).await
        }

        async fn create_account(&self, identity: Identity) -> Result<Box<dyn Account>, EconomyError> {
            let left = self.creations_left.load(Ordering::SeqCst);
            if left == 0 {
                return Err(EconomyError::AccountAlreadyExists(identity));
            }
            self.creations_left.store(left - 1, Ordering::SeqCst);
            Ok(self.wrap(self.inner.create_account(identity).await?))
        }

        async fn create_bank_account(
            &self,
            identity: Identity,
        ) -> Result<Box<dyn BankAccount>, EconomyError> {
            self.inner.create_bank_account(identity).await
        }
    }

    #[tokio::test]
    async fn test_error_during_accounts_aborts_run() {
        let from = provider("Alpha", &["USD"]);
        let to = FaultyProvider {
            creations_left: AtomicUsize::new(1),
            ..FaultyProvider::new(provider("Beta", &["USD"]))
        };
        let players: Vec<Identity> = (0..3).map(|_| Uuid::new_v4()).collect();
        for identity in &players {
            fund(&from, *identity, "USD", "10").await;
        }
        let bank = Uuid::new_v4();
        fund_bank(&from, bank, "USD", "10").await;

        let result = MigrationService::new(&from, &to).run().await;

        assert!(matches!(
            result,
            Err(MigrationError::Aborted(EconomyError::AccountAlreadyExists(_)))
        ));

        // The first account was fully transferred, the rest were never visited.
        let order = from.account_ids().await.unwrap();
        assert_eq!(balance_of(&from, order[0], "USD").await, Decimal::ZERO);
        assert_eq!(balance_of(&to.inner, order[0], "USD").await, dec("10"));
        for identity in &order[1..] {
            assert_eq!(balance_of(&from, *identity, "USD").await, dec("10"));
        }
        // The bank pass never started.
        assert_eq!(bank_balance_of(&from, bank, "USD").await, dec("10"));
    }

    #[tokio::test]
    async fn test_missing_source_account_aborts_without_creating_it() {
        let p1 = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        let inner = provider("Alpha", &["USD"]);
        fund(&inner, p1, "USD", "10").await;
        let from = FaultyProvider {
            phantom_accounts: vec![ghost],
            ..FaultyProvider::new(inner)
        };
        let to = provider("Beta", &["USD"]);

        let result = MigrationService::new(&from, &to).run().await;

        assert_eq!(
            result.unwrap_err(),
            MigrationError::Aborted(EconomyError::AccountNotFound(ghost))
        );
        assert!(!from.inner.has_account(ghost).await.unwrap());
        assert!(!to.has_account(ghost).await.unwrap());
        assert_eq!(from.inner.account_ids().await.unwrap(), vec![p1]);
        assert_eq!(balance_of(&to, p1, "USD").await, dec("10"));
    }

    #[tokio::test]
    async fn test_missing_source_bank_aborts_without_creating_it() {
        let ghost = Uuid::new_v4();
        let from = FaultyProvider {
            phantom_banks: vec![ghost],
            ..FaultyProvider::new(provider("Alpha", &["USD"]))
        };
        let to = provider("Beta", &["USD"]);

        let result = MigrationService::new(&from, &to).run().await;

        assert_eq!(
            result.unwrap_err(),
            MigrationError::Aborted(EconomyError::AccountNotFound(ghost))
        );
        assert!(!from.inner.has_bank_account(ghost).await.unwrap());
        assert!(!to.has_bank_account(ghost).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_deposit_after_withdraw_is_not_rolled_back() {
        let from = provider("Alpha", &["USD"]);
        let to = FaultyProvider {
            reject_deposits: true,
            ..FaultyProvider::new(provider("Beta", &["USD"]))
        };
        let p1 = Uuid::new_v4();
        fund(&from, p1, "USD", "25").await;

        let result = MigrationService::new(&from, &to).run().await;

        assert_eq!(
            result.unwrap_err(),
            MigrationError::Aborted(EconomyError::StoreError("disk full".to_string()))
        );
        // The withdrawn value is gone from both stores.
        assert_eq!(balance_of(&from, p1, "USD").await, Decimal::ZERO);
        assert_eq!(balance_of(&to.inner, p1, "USD").await, Decimal::ZERO);
    }
}
