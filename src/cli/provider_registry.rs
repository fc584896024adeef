use crate::core::economy::EconomyProvider;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CliError {
    #[error("Migration requires at least two economy providers to be registered")]
    RequiresTwoProviders,

    #[error("You can't migrate a provider into itself. Available providers: {}", .providers.join(", "))]
    ProvidersMatch { providers: Vec<String> },

    #[error("Unknown provider to migrate from. Available providers: {}", .providers.join(", "))]
    InvalidSource { providers: Vec<String> },

    #[error("Unknown provider to migrate to. Available providers: {}", .providers.join(", "))]
    InvalidDestination { providers: Vec<String> },
}

/// The set of currently available, already-opened providers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn EconomyProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn EconomyProvider>) {
        tracing::debug!("Found economy provider: {}", provider.name());
        self.providers.push(provider);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EconomyProvider>> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Resolve the `<from>` and `<to>` names into two distinct providers.
    pub fn resolve_pair(
        &self,
        from: &str,
        to: &str,
    ) -> Result<(Arc<dyn EconomyProvider>, Arc<dyn EconomyProvider>), CliError> {
        if self.providers.len() < 2 {
            return Err(CliError::RequiresTwoProviders);
        }

        if from.eq_ignore_ascii_case(to) {
            return Err(CliError::ProvidersMatch {
                providers: self.names(),
            });
        }

        let source = self.get(from).ok_or_else(|| CliError::InvalidSource {
            providers: self.names(),
        })?;
        let destination = self.get(to).ok_or_else(|| CliError::InvalidDestination {
            providers: self.names(),
        })?;

        Ok((source, destination))
    }
}
