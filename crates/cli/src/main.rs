//! Okapi CLI - Database migrations and store maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations (schema and session store)
//! okapi-cli migrate
//!
//! # Mirror the Printful catalog into the products table
//! okapi-cli catalog sync
//!
//! # Turn a guest account into a regular one
//! okapi-cli users promote ada@example.com
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "okapi-cli")]
#[command(author, version, about = "The Okapi Store CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Maintain the local product table
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Manage customer accounts
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Upsert every Printful store product and mark vanished ones out of stock
    Sync,
}

#[derive(Subcommand)]
enum UsersAction {
    /// Mark a guest account as a regular account
    Promote {
        /// Account email address
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Catalog { action } => match action {
            CatalogAction::Sync => {
                commands::catalog::sync().await?;
            }
        },
        Commands::Users { action } => match action {
            UsersAction::Promote { email } => commands::users::promote(&email).await?,
        },
    }
    Ok(())
}
