// The `migrate <from> <to>` command.
//
// **The pattern:**
// 1. Validate the arguments
// 2. Resolve the two providers from the registry
// 3. Call the migration engine
// 4. Format the response based on the result

use crate::cli::provider_registry::{CliError, ProviderRegistry};
use crate::core::migration::{MigrationError, MigrationService, MigrationSummary};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;

#[derive(Debug, Parser)]
#[command(
    name = "economy-migrate",
    version,
    about = "Move balances and bank accounts between economy providers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Migrate every account from one provider into another
    Migrate(MigrateArgs),
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct MigrateArgs {
    /// Provider to migrate from
    pub from: String,
    /// Provider to migrate to
    pub to: String,
    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// What the command ended with.
#[derive(Debug)]
pub enum MigrateOutcome {
    Finished(MigrationSummary),
    Rejected(CliError),
    /// The engine aborted; the cause has already been logged.
    InternalError,
}

impl MigrateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MigrateOutcome::Finished(_))
    }

    /// Human-readable message for the terminal.
    pub fn render(&self) -> String {
        match self {
            MigrateOutcome::Finished(summary) => format!(
                "Migration complete! Took {}ms.\n\
                 Player accounts migrated: {}\n\
                 Bank accounts migrated: {}\n\
                 Migrated currencies: {}\n\
                 Non-migrated currencies: {}",
                summary.elapsed.as_millis(),
                summary.player_accounts_processed,
                summary.bank_accounts_processed,
                format_list(&summary.migrated_currencies),
                format_list(&summary.skipped_currencies),
            ),
            MigrateOutcome::Rejected(err) => err.to_string(),
            MigrateOutcome::InternalError => {
                "An internal error occurred while migrating. Check the logs for details."
                    .to_string()
            }
        }
    }
}

fn format_list(items: &BTreeSet<String>) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Run the migrate command against the registered providers.
pub async fn run_migrate(registry: &ProviderRegistry, args: &MigrateArgs) -> MigrateOutcome {
    let (source, destination) = match registry.resolve_pair(&args.from, &args.to) {
        Ok(pair) => pair,
        Err(err) => return MigrateOutcome::Rejected(err),
    };

    match MigrationService::new(source.as_ref(), destination.as_ref())
        .run()
        .await
    {
        Ok(summary) => MigrateOutcome::Finished(summary),
        Err(MigrationError::ProvidersIdentical(_)) => {
            MigrateOutcome::Rejected(CliError::ProvidersMatch {
                providers: registry.names(),
            })
        }
        Err(MigrationError::Aborted(cause)) => {
            tracing::error!(
                "Migration from '{}' to '{}' aborted: {}",
                source.name(),
                destination.name(),
                cause
            );
            MigrateOutcome::InternalError
        }
    }
}
