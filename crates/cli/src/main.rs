//! Tradepost CLI - Database migrations and admin accounts.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! tp-cli migrate
//!
//! # Create the first admin
//! tp-cli admin seed -e admin@example.com -n "Admin Name" -p 'password'
//!
//! # Promote an existing user
//! tp-cli admin promote -e someone@example.com
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tp-cli")]
#[command(author, version, about = "Tradepost CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin user
    Seed {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name
        #[arg(short, long)]
        name: String,

        /// Admin password
        #[arg(short, long)]
        password: String,
    },
    /// Promote an existing user to admin
    Promote {
        /// Email of the user to promote
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Seed {
                email,
                name,
                password,
            } => {
                commands::admin::seed(&email, &name, &password).await?;
            }
            AdminAction::Promote { email } => {
                commands::admin::promote(&email).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_admin_seed() {
        let cli = Cli::try_parse_from([
            "tp-cli", "admin", "seed", "-e", "a@b.co", "-n", "Ada", "-p", "secret",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Admin {
                action: AdminAction::Seed { .. }
            }
        ));
    }

    #[test]
    fn test_seed_requires_password() {
        assert!(Cli::try_parse_from(["tp-cli", "admin", "seed", "-e", "a@b.co", "-n", "Ada"]).is_err());
    }
}
