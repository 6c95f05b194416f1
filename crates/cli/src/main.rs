//! Emporium CLI - database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! emporium migrate
//!
//! # Create an admin account (password from EMPORIUM_ADMIN_PASSWORD)
//! emporium admin create -e admin@example.com --first-name Ada --last-name Lovelace
//!
//! # Promote an existing account
//! emporium admin promote -e ada@example.com
//!
//! # Load categories and products from YAML
//! emporium seed crates/cli/seed/catalog.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `API_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "emporium")]
#[command(author, version, about = "Emporium CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the catalog from a YAML file
    Seed {
        /// Path to the YAML catalog
        file: String,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin account
    Create {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Account password
        #[arg(long, env = "EMPORIUM_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Grant the admin role to an existing account
    Promote {
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
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
        Commands::Admin { action } => match action {
            AdminAction::Create {
                email,
                first_name,
                last_name,
                password,
            } => {
                commands::admin::create_user(&email, &first_name, &last_name, &password).await?;
            }
            AdminAction::Promote { email } => commands::admin::promote(&email).await?,
        },
        Commands::Seed { file } => {
            let report = commands::seed::catalog(&file).await?;
            tracing::info!(
                categories = report.categories,
                products = report.products,
                skipped = report.skipped,
                "Seeding complete"
            );
        }
    }
    Ok(())
}
