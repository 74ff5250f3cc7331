//! ModernShop CLI - Database migrations and user management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! ms-cli migrate
//!
//! # Create a user (password from MODERNSHOP_NEW_USER_PASSWORD)
//! ms-cli user create -u admin -e admin@example.com --admin
//!
//! # Grant or revoke admin
//! ms-cli user set-admin -u alice --admin true
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ms-cli")]
#[command(author, version, about = "ModernShop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a verified user
    Create {
        /// Username
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Make the user an admin
        #[arg(long)]
        admin: bool,
    },
    /// Grant or revoke admin
    SetAdmin {
        /// Username
        #[arg(short, long)]
        username: String,

        /// New admin flag
        #[arg(long, action = clap::ArgAction::Set)]
        admin: bool,
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
        Commands::User { action } => match action {
            UserAction::Create {
                username,
                email,
                admin,
            } => {
                commands::user::create(&username, &email, admin).await?;
            }
            UserAction::SetAdmin { username, admin } => {
                commands::user::set_admin(&username, admin).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_set_admin_takes_explicit_value() {
        let cli = Cli::try_parse_from(["ms-cli", "user", "set-admin", "-u", "alice", "--admin", "false"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::User {
                action: UserAction::SetAdmin { admin: false, .. }
            })
        ));
    }
}
