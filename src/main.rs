// This is the entry point of the migration tool.
//
// This file's job is to:
// 1. Parse arguments and load configuration
// 2. Open the configured providers (the "composition root")
// 3. Run the migrate command
// 4. Print the outcome

use clap::Parser;
use economy_migrate::cli::{run_migrate, Cli, CliConfig, Commands, MigrateOutcome};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Commands::Migrate(args) = Cli::parse().command;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Keep provider databases in a dedicated folder so the repo root stays tidy.

    let config = CliConfig::from_env();
    std::fs::create_dir_all(&config.data_dir)?;
    let registry = config.build_registry().await?;

    println!("Starting migration, please wait...");
    let outcome = run_migrate(&registry, &args).await;

    match (&outcome, args.json) {
        (MigrateOutcome::Finished(summary), true) => {
            println!("{}", serde_json::to_string_pretty(summary)?)
        }
        _ => println!("{}", outcome.render()),
    }

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
