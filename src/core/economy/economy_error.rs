use super::account::Identity;
use rust_decimal::Decimal;
use std::fmt;

/// Optional capabilities a provider may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EconomyFeature {
    /// Shared accounts with owner and member sets.
    BankAccounts,
}

impl fmt::Display for EconomyFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EconomyFeature::BankAccounts => write!(f, "Bank Accounts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EconomyError {
    #[error("Unknown currency: '{0}'")]
    UnknownCurrency(String),

    #[error("Invalid amount: {0} (amounts must not be negative)")]
    InvalidAmount(Decimal),

    #[error("Insufficient funds: need {required}, but only have {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("The account of identity '{0}' already exists")]
    AccountAlreadyExists(Identity),

    #[error("The account of identity '{0}' was listed but could not be found")]
    AccountNotFound(Identity),

    #[error("Unsupported economy feature: {0}")]
    UnsupportedFeature(EconomyFeature),

    #[error("Store error: {0}")]
    StoreError(String),
}

