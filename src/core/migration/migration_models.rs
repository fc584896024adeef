// Migration data structures: the per-run currency correspondence, the running
// tally, and the result record handed back to the caller.

use crate::core::economy::{Amount, Currency, EconomyError, EconomyProvider};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// A currency present in both providers, resolved on each side.
#[derive(Debug, Clone)]
pub struct CurrencyPair {
    pub source: Currency,
    pub destination: Currency,
}

/// Which source currencies can be migrated and which are skipped.
///
/// Computed once per run and never re-checked while accounts are processed.
#[derive(Debug, Clone, Default)]
pub struct CurrencyCorrespondence {
    pub migratable: Vec<CurrencyPair>,
    pub skipped: BTreeSet<String>,
}

impl CurrencyCorrespondence {
    /// Match every source currency against the destination's currencies.
    ///
    /// Currencies that only exist in the destination are ignored.
    pub async fn build(
        source: &dyn EconomyProvider,
        destination: &dyn EconomyProvider,
    ) -> Result<Self, EconomyError> {
        let destination_currencies = destination.currencies().await?;
        let mut correspondence = Self::default();

        for currency in source.currencies().await? {
            let identifier = currency.identifier().to_string();
            let present = destination_currencies
                .iter()
                .any(|candidate| candidate.matches(&identifier));

            if present {
                let pair = CurrencyPair {
                    source: source.resolve_currency(&identifier).await?,
                    destination: destination.resolve_currency(&identifier).await?,
                };
                tracing::debug!("Currency of ID '{}' will be migrated.", identifier);
                correspondence.migratable.push(pair);
            } else {
                tracing::debug!("Currency of ID '{}' will not be migrated.", identifier);
                correspondence.skipped.insert(identifier);
            }
        }

        Ok(correspondence)
    }

    pub fn migratable_identifiers(&self) -> BTreeSet<String> {
        self.migratable
            .iter()
            .map(|pair| pair.source.identifier().to_string())
            .collect()
    }
}

/// The entire observable output of a successful migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub source: String,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub player_accounts_processed: u64,
    pub bank_accounts_processed: u64,
    pub migrated_currencies: BTreeSet<String>,
    pub skipped_currencies: BTreeSet<String>,
    /// False when either side lacks bank support and the bank pass was skipped.
    pub bank_accounts_migrated: bool,
    /// Total moved per migrated currency identifier, across both account kinds.
    pub transferred: BTreeMap<String, Amount>,
}

/// Counters accumulated while a run is in flight.
#[derive(Debug)]
pub(crate) struct MigrationTally {
    started_at: DateTime<Utc>,
    timer: Instant,
    pub player_accounts_processed: u64,
    pub bank_accounts_processed: u64,
    pub bank_accounts_migrated: bool,
    transferred: BTreeMap<String, Amount>,
}

impl MigrationTally {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            timer: Instant::now(),
            player_accounts_processed: 0,
            bank_accounts_processed: 0,
            bank_accounts_migrated: false,
            transferred: BTreeMap::new(),
        }
    }

    pub fn record_transfer(&mut self, currency: &Currency, amount: Amount) -> Result<(), EconomyError> {
        let total = self
            .transferred
            .entry(currency.identifier().to_string())
            .or_insert(Amount::ZERO);
        *total = total.checked_add(amount)?;
        Ok(())
    }

    pub fn finish(
        self,
        source: &dyn EconomyProvider,
        destination: &dyn EconomyProvider,
        correspondence: CurrencyCorrespondence,
    ) -> MigrationSummary {
        let mut transferred = self.transferred;
        // Migrated currencies with no balances anywhere still show up as zero.
        for identifier in correspondence.migratable_identifiers() {
            transferred.entry(identifier).or_insert(Amount::ZERO);
        }

        MigrationSummary {
            source: source.name().to_string(),
            destination: destination.name().to_string(),
            started_at: self.started_at,
            elapsed: self.timer.elapsed(),
            player_accounts_processed: self.player_accounts_processed,
            bank_accounts_processed: self.bank_accounts_processed,
            migrated_currencies: correspondence.migratable_identifiers(),
            skipped_currencies: correspondence.skipped,
            bank_accounts_migrated: self.bank_accounts_migrated,
            transferred,
        }
    }
}
