// Economy infrastructure - provider implementations.

mod in_memory;
mod sqlite_provider;

pub use in_memory::InMemoryProvider;
pub use sqlite_provider::SqliteProvider;

/// Which kind of account a stored row or lock belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Player,
    Bank,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Player => "player",
            AccountKind::Bank => "bank",
        }
    }
}
