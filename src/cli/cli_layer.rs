// CLI layer - config, provider lookup and the migrate command.
//
// This layer is THIN - no business logic, just translation between
// command-line input and the core migration engine.

pub mod cli_config;
pub mod migrate_command;
pub mod provider_registry;

pub use cli_config::CliConfig;
pub use migrate_command::{run_migrate, Cli, Commands, MigrateArgs, MigrateOutcome};
pub use provider_registry::{CliError, ProviderRegistry};
