//! Folio CLI - maintenance commands for the auth store
//!
//! Usage:
//!   folio check-config
//!   folio migrate
//!   folio purge-tokens
//!   folio revoke-sessions <user-id>
//!   folio hash-password <password>

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use folio_api::auth::CredentialHasher;
use folio_api::state::AppState;
use folio_core::config::{AppConfig, StoreBackend};
use folio_core::PgAuthStore;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Folio authentication maintenance CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, short, env = "FOLIO_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate configuration, then print it without secrets
    CheckConfig,
    /// Create the auth tables
    Migrate,
    /// Delete expired refresh tokens once
    PurgeTokens,
    /// Revoke every refresh token of a user
    RevokeSessions {
        /// User id
        user_id: Uuid,
    },
    /// Hash a password with the configured Argon2 costs (for seeding accounts)
    HashPassword {
        password: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?
            .with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgAuthStore> {
    if config.database.backend != StoreBackend::Postgres {
        bail!("this command needs STORE_BACKEND=postgres");
    }
    PgAuthStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")
}

async fn sessions_state(config: AppConfig) -> anyhow::Result<AppState> {
    let store = connect(&config).await?;
    AppState::new(config, Arc::new(store)).context("failed to build auth services")
}

fn print_config(config: &AppConfig) {
    let summary = serde_json::json!({
        "environment": format!("{:?}", config.environment),
        "server": { "host": config.server.host, "port": config.server.port },
        "store": format!("{:?}", config.database.backend),
        "auth": {
            "issuer": config.auth.issuer,
            "access_lifetime_secs": config.auth.access_lifetime_secs,
            "refresh_lifetime_secs": config.auth.refresh_lifetime_secs,
            "purge_interval_secs": config.auth.purge_interval_secs,
            "dev_secrets": config.auth.uses_dev_secrets(),
        },
    });
    println!("{summary:#}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_api=info,folio_core=info,audit=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::CheckConfig => {
            print_config(&config);
            println!("Configuration is valid");
        }
        Commands::Migrate => {
            connect(&config).await?.migrate().await?;
            println!("Schema applied");
        }
        Commands::PurgeTokens => {
            let state = sessions_state(config).await?;
            let purged = state.sessions.purge_expired_tokens().await?;
            println!("Purged {purged} expired refresh tokens");
        }
        Commands::RevokeSessions { user_id } => {
            let state = sessions_state(config).await?;
            let revoked = state.sessions.revoke_all_sessions(user_id).await?;
            println!("Revoked {revoked} refresh tokens for {user_id}");
        }
        Commands::HashPassword { password } => {
            let hasher = CredentialHasher::new(&config.auth.hashing)?;
            println!("{}", hasher.hash(&password)?);
        }
    }

    Ok(())
}
