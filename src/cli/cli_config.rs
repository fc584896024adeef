// Configuration for the command-line front end, read from the environment
// (a `.env` file is loaded first by main).

use crate::cli::provider_registry::ProviderRegistry;
use crate::infra::economy::SqliteProvider;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    /// Directory holding one `<name>.db` file per provider.
    pub data_dir: PathBuf,
    /// Provider names to open.
    pub providers: Vec<String>,
    /// Providers with bank support; `None` means all of them.
    pub bank_support: Option<Vec<String>>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl CliConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ECONOMY_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let providers = std::env::var("ECONOMY_PROVIDERS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        let bank_support = std::env::var("ECONOMY_BANK_SUPPORT")
            .ok()
            .map(|raw| split_list(&raw));

        Self {
            data_dir: PathBuf::from(data_dir),
            providers,
            bank_support,
        }
    }

    pub fn supports_banks(&self, provider: &str) -> bool {
        match &self.bank_support {
            Some(names) => names.iter().any(|n| n.eq_ignore_ascii_case(provider)),
            None => true,
        }
    }

    /// Open every configured provider and register it.
    pub async fn build_registry(&self) -> anyhow::Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();

        for name in &self.providers {
            let path = self.data_dir.join(format!("{}.db", name));
            let path = path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Non UTF-8 database path for provider {}", name))?;

            let provider = SqliteProvider::new(name.clone(), path, self.supports_banks(name)).await?;
            registry.register(Arc::new(provider));
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" alpha, beta ,,gamma"),
            vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_bank_support_defaults_to_all() {
        let mut config = CliConfig {
            data_dir: PathBuf::from("data"),
            providers: vec!["Alpha".to_string(), "Beta".to_string()],
            bank_support: None,
        };
        assert!(config.supports_banks("Alpha"));

        config.bank_support = Some(vec!["beta".to_string()]);
        assert!(!config.supports_banks("Alpha"));
        assert!(config.supports_banks("Beta"));
    }

    #[tokio::test]
    async fn test_build_registry_opens_sqlite_providers() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig {
            data_dir: dir.path().to_path_buf(),
            providers: vec!["Alpha".to_string(), "Beta".to_string()],
            bank_support: None,
        };

        let registry = config.build_registry().await.unwrap();

        assert_eq!(registry.names(), vec!["Alpha".to_string(), "Beta".to_string()]);
        assert!(dir.path().join("Alpha.db").exists());
    }
}
