// SQLite implementation of the EconomyProvider trait

use super::AccountKind;
use crate::core::economy::{
    Account, Amount, BankAccount, Currency, EconomyError, EconomyFeature, EconomyProvider,
    Identity,
};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per (kind, identity) so balance read-modify-write cycles
/// for the same account never interleave.
type WriteLocks = Arc<DashMap<(AccountKind, Identity), Arc<Mutex<()>>>>;

/// Held for the duration of one balance write. On drop the map entry is
/// evicted unless another writer still holds a clone of the same mutex.
struct WriteGuard {
    locks: WriteLocks,
    key: (AccountKind, Identity),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn store_err(e: sqlx::Error) -> EconomyError {
    EconomyError::StoreError(e.to_string())
}

fn parse_identity(raw: &str) -> Result<Identity, EconomyError> {
    Uuid::parse_str(raw)
        .map_err(|e| EconomyError::StoreError(format!("bad identity '{}': {}", raw, e)))
}

fn accounts_table(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::Player => "player_accounts",
        AccountKind::Bank => "bank_accounts",
    }
}

pub struct SqliteProvider {
    name: String,
    bank_support: bool,
    pool: Pool<Sqlite>,
    locks: WriteLocks,
}

impl SqliteProvider {
    /// Open (or create) a provider database at the given path or `sqlite:` URL.
    pub async fn new(
        name: impl Into<String>,
        database_url: &str,
        bank_support: bool,
    ) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await?;

        let provider = Self {
            name: name.into(),
            bank_support,
            pool,
            locks: Arc::new(DashMap::new()),
        };
        provider.migrate().await?;
        Ok(provider)
    }

    /// Run database migrations to create tables.
    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS currencies (
                identifier TEXT NOT NULL PRIMARY KEY COLLATE NOCASE,
                symbol TEXT NOT NULL DEFAULT '',
                display_name_singular TEXT NOT NULL,
                display_name_plural TEXT NOT NULL,
                decimal_digits INTEGER NOT NULL DEFAULT 2
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for table in ["player_accounts", "bank_accounts"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT NOT NULL PRIMARY KEY,
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                )
                "#,
                table
            ))
            .execute(&self.pool)
            .await?;
        }

        // Balances are decimal text, never REAL
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balances (
                kind TEXT NOT NULL,
                account_id TEXT NOT NULL,
                currency TEXT NOT NULL COLLATE NOCASE,
                balance TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (kind, account_id, currency)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for table in ["bank_owners", "bank_members"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    bank_id TEXT NOT NULL,
                    identity TEXT NOT NULL,
                    PRIMARY KEY (bank_id, identity)
                )
                "#,
                table
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Make a currency known to this provider. Registering an identifier
    /// that already exists (in any case) leaves the stored one untouched.
    pub async fn register_currency(&self, currency: &Currency) -> Result<(), EconomyError> {
        sqlx::query(
            r#"
            INSERT INTO currencies (identifier, symbol, display_name_singular, display_name_plural, decimal_digits)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(identifier) DO NOTHING
            "#,
        )
        .bind(currency.identifier())
        .bind(currency.symbol())
        .bind(currency.display_name_singular())
        .bind(currency.display_name_plural())
        .bind(currency.decimal_digits() as i64)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    fn ensure_bank_support(&self) -> Result<(), EconomyError> {
        if self.bank_support {
            Ok(())
        } else {
            Err(EconomyError::UnsupportedFeature(EconomyFeature::BankAccounts))
        }
    }

    fn handle(&self, kind: AccountKind, identity: Identity) -> SqliteAccount {
        SqliteAccount {
            kind,
            identity,
            pool: self.pool.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    async fn ids(&self, kind: AccountKind) -> Result<Vec<Identity>, EconomyError> {
        let rows = sqlx::query(&format!(
            "SELECT id FROM {} ORDER BY created_at, id",
            accounts_table(kind)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| parse_identity(&row.get::<String, _>("id")))
            .collect()
    }

    async fn exists(&self, kind: AccountKind, identity: Identity) -> Result<bool, EconomyError> {
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE id = ?",
            accounts_table(kind)
        ))
        .bind(identity.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.is_some())
    }

    async fn insert(
        &self,
        kind: AccountKind,
        identity: Identity,
    ) -> Result<SqliteAccount, EconomyError> {
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (id) VALUES (?)",
            accounts_table(kind)
        ))
        .bind(identity.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        // Nothing inserted means someone else created it first
        if result.rows_affected() == 0 {
            return Err(EconomyError::AccountAlreadyExists(identity));
        }
        Ok(self.handle(kind, identity))
    }
}

#[async_trait]
impl EconomyProvider for SqliteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, feature: EconomyFeature) -> bool {
        match feature {
            EconomyFeature::BankAccounts => self.bank_support,
        }
    }

    async fn currencies(&self) -> Result<Vec<Currency>, EconomyError> {
        let rows = sqlx::query(
            r#"
            SELECT identifier, symbol, display_name_singular, display_name_plural, decimal_digits
            FROM currencies
            ORDER BY identifier
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let identifier: String = row.get("identifier");
                let raw_digits: i64 = row.get("decimal_digits");
                let decimal_digits = u32::try_from(raw_digits).map_err(|_| {
                    EconomyError::StoreError(format!(
                        "bad decimal digits {} for currency '{}'",
                        raw_digits, identifier
                    ))
                })?;

                Ok(Currency::new(identifier)
                    .with_symbol(row.get::<String, _>("symbol"))
                    .with_display_names(
                        row.get::<String, _>("display_name_singular"),
                        row.get::<String, _>("display_name_plural"),
                    )
                    .with_decimal_digits(decimal_digits))
            })
            .collect()
    }

    async fn account_ids(&self) -> Result<Vec<Identity>, EconomyError> {
        self.ids(AccountKind::Player).await
    }

    async fn bank_account_ids(&self) -> Result<Vec<Identity>, EconomyError> {
        self.ensure_bank_support()?;
        self.ids(AccountKind::Bank).await
    }

    async fn has_account(&self, identity: Identity) -> Result<bool, EconomyError> {
        self.exists(AccountKind::Player, identity).await
    }

    async fn has_bank_account(&self, identity: Identity) -> Result<bool, EconomyError> {
        self.ensure_bank_support()?;
        self.exists(AccountKind::Bank, identity).await
    }

    async fn account(&self, identity: Identity) -> Result<Option<Box<dyn Account>>, EconomyError> {
        if self.exists(AccountKind::Player, identity).await? {
            Ok(Some(Box::new(self.handle(AccountKind::Player, identity))))
        } else {
            Ok(None)
        }
    }

    async fn bank_account(
        &self,
        identity: Identity,
    ) -> Result<Option<Box<dyn BankAccount>>, EconomyError> {
        self.ensure_bank_support()?;
        if self.exists(AccountKind::Bank, identity).await? {
            Ok(Some(Box::new(self.handle(AccountKind::Bank, identity))))
        } else {
            Ok(None)
        }
    }

    async fn create_account(&self, identity: Identity) -> Result<Box<dyn Account>, EconomyError> {
        Ok(Box::new(self.insert(AccountKind::Player, identity).await?))
    }

    async fn create_bank_account(
        &self,
        identity: Identity,
    ) -> Result<Box<dyn BankAccount>, EconomyError> {
        self.ensure_bank_support()?;
        Ok(Box::new(self.insert(AccountKind::Bank, identity).await?))
    }
}

/// Handle to one stored account (player or bank).
struct SqliteAccount {
    kind: AccountKind,
    identity: Identity,
    pool: Pool<Sqlite>,
    locks: WriteLocks,
}

impl SqliteAccount {
    async fn lock_for_write(&self) -> WriteGuard {
        let key = (self.kind, self.identity);
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        WriteGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Normalized key for a currency this provider knows, `UnknownCurrency` otherwise.
    async fn currency_key(&self, currency: &Currency) -> Result<String, EconomyError> {
        let row = sqlx::query("SELECT identifier FROM currencies WHERE identifier = ?")
            .bind(currency.identifier())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(_) => Ok(currency.key()),
            None => Err(EconomyError::UnknownCurrency(
                currency.identifier().to_string(),
            )),
        }
    }

    async fn read_balance(&self, key: &str) -> Result<Decimal, EconomyError> {
        let row = sqlx::query(
            r#"
            SELECT balance FROM balances
            WHERE kind = ? AND account_id = ? AND currency = ?
            "#,
        )
        .bind(self.kind.as_str())
        .bind(self.identity.to_string())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => {
                let raw: String = row.get("balance");
                Decimal::from_str(&raw).map_err(|e| {
                    EconomyError::StoreError(format!("bad balance '{}': {}", raw, e))
                })
            }
            None => Ok(Decimal::ZERO),
        }
    }

    async fn write_balance(&self, key: &str, balance: Amount) -> Result<(), EconomyError> {
        sqlx::query(
            r#"
            INSERT INTO balances (kind, account_id, currency, balance)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind, account_id, currency)
            DO UPDATE SET balance = excluded.balance, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(self.kind.as_str())
        .bind(self.identity.to_string())
        .bind(key)
        .bind(balance.value().to_string())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn identities(&self, table: &str) -> Result<HashSet<Identity>, EconomyError> {
        let rows = sqlx::query(&format!("SELECT identity FROM {} WHERE bank_id = ?", table))
            .bind(self.identity.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter()
            .map(|row| parse_identity(&row.get::<String, _>("identity")))
            .collect()
    }

    async fn add_identity(&self, table: &str, identity: Identity) -> Result<(), EconomyError> {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (bank_id, identity) VALUES (?, ?)",
            table
        ))
        .bind(self.identity.to_string())
        .bind(identity.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}

#[async_trait]
impl Account for SqliteAccount {
    fn identity(&self) -> Identity {
        self.identity
    }

    async fn balance(&self, currency: &Currency) -> Result<Decimal, EconomyError> {
        let key = self.currency_key(currency).await?;
        self.read_balance(&key).await
    }

    async fn deposit(&self, amount: Decimal, currency: &Currency) -> Result<Amount, EconomyError> {
        let amount = Amount::new(amount)?;
        let key = self.currency_key(currency).await?;

        let _guard = self.lock_for_write().await;

        let new_balance = Amount::clamped(self.read_balance(&key).await?).checked_add(amount)?;
        self.write_balance(&key, new_balance).await?;
        Ok(new_balance)
    }

    async fn withdraw(
        &self,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<Amount, EconomyError> {
        let amount = Amount::new(amount)?;
        let key = self.currency_key(currency).await?;

        let _guard = self.lock_for_write().await;

        let available = Amount::clamped(self.read_balance(&key).await?);
        if amount > available {
            return Err(EconomyError::InsufficientFunds {
                required: amount.value(),
                available: available.value(),
            });
        }

        let new_balance = available.checked_sub(amount)?;
        self.write_balance(&key, new_balance).await?;
        Ok(new_balance)
    }
}

#[async_trait]
impl BankAccount for SqliteAccount {
    async fn owners(&self) -> Result<HashSet<Identity>, EconomyError> {
        self.identities("bank_owners").await
    }

    async fn members(&self) -> Result<HashSet<Identity>, EconomyError> {
        self.identities("bank_members").await
    }

    async fn add_owner(&self, identity: Identity) -> Result<(), EconomyError> {
        self.add_identity("bank_owners", identity).await
    }

    async fn add_member(&self, identity: Identity) -> Result<(), EconomyError> {
        self.add_identity("bank_members", identity).await
    }
}
