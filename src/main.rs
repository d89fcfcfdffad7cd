//! Market Data Admin CLI
//!
//! Commands:
//! - `auth` - save, inspect or forget the session token
//! - `collections <domain>` - browse, export, import, refresh, sync and clear collections
//! - `sync` - data source and node sync management
//! - `logs` - system log files
//!
//! Results are printed to stdout as JSON. Logs and progress go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use marketdata_admin::api::types::FileFormat;
use marketdata_admin::api::Domain;
use marketdata_admin::commands::collections::{FilterArgs, PageArgs, RemoteSyncArgs};
use marketdata_admin::commands::logs::LogsCommand;
use marketdata_admin::commands::refresh::RefreshArgs;
use marketdata_admin::commands::sync::SyncCommand;
use marketdata_admin::commands::{auth, collections, logs, refresh, sync};
use marketdata_admin::error::ErrorResponse;
use marketdata_admin::{AppConfig, AppError, AppState};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "marketdata-admin",
    about = "Market data admin client: collections, refresh tasks, sync and logs"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and environment)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token for this invocation only
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session token management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Collections of one data domain
    Collections {
        /// bonds, funds, futures, options, currencies, cryptos or stocks
        domain: Domain,
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Data source and node sync
    Sync {
        #[command(subcommand)]
        action: SyncCommand,
    },
    /// System logs
    Logs {
        #[command(subcommand)]
        action: LogsCommand,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Save a token for later commands
    Login {
        #[arg(id = "login_token", value_name = "TOKEN", env = "MARKETDATA_ADMIN_LOGIN_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Forget the saved token
    Logout,
    /// Show the current session
    Status,
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List the collections of the domain
    List {
        /// Bypass the collection list cache
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Fund company names (funds only)
    Companies {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Domain settings such as the default provider key (currencies only)
    Config {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Show one page of a collection
    Show {
        name: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Collection statistics
    Stats { name: String },
    /// Refresh parameters the backend accepts for a collection
    UpdateConfig { name: String },
    /// Start a refresh task and follow it
    Refresh {
        name: String,
        #[command(flatten)]
        args: RefreshArgs,
    },
    /// Export the filtered collection to a file
    Export {
        name: String,
        #[command(flatten)]
        filter: FilterArgs,
        /// csv, xlsx or json
        #[arg(long, default_value = "csv")]
        format: FileFormat,
        /// File name without extension (defaults to the collection name)
        #[arg(long)]
        file_name: Option<String>,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Upload a file into the collection
    Import { name: String, file: PathBuf },
    /// Copy rows from a remote database
    SyncRemote {
        name: String,
        #[command(flatten)]
        remote: RemoteSyncArgs,
    },
    /// Delete every row of the collection
    Clear {
        name: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    marketdata_admin::init_tracing();
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            tracing::debug!("Command failed: {:?}", err);
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&err))?);
            std::process::exit(1);
        }
    }
}

async fn execute(cli: Cli) -> std::result::Result<Value, AppError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(token) = cli.token.filter(|t| !t.is_empty()) {
        config.token = Some(token);
    }
    config.validate()?;

    let state = AppState::new(config)?;

    match cli.command {
        Commands::Auth { action } => match action {
            AuthAction::Login { token } => auth::login(&state, &token),
            AuthAction::Logout => auth::logout(&state),
            AuthAction::Status => auth::status(&state),
        },
        Commands::Collections { domain, action } => run_collection(&state, domain, action).await,
        Commands::Sync { action } => sync::run(&state, &action).await,
        Commands::Logs { action } => logs::run(&state, &action).await,
    }
}

async fn run_collection(
    state: &AppState,
    domain: Domain,
    action: CollectionAction,
) -> std::result::Result<Value, AppError> {
    match action {
        CollectionAction::List { force } => collections::list(state, domain, force).await,
        CollectionAction::Companies { force } => collections::companies(state, domain, force).await,
        CollectionAction::Config { force } => collections::domain_config(state, domain, force).await,
        CollectionAction::Show { name, filter, page } => {
            collections::show(state, domain, &name, &filter, &page).await
        }
        CollectionAction::Stats { name } => collections::stats(state, domain, &name).await,
        CollectionAction::UpdateConfig { name } => {
            collections::update_config(state, domain, &name).await
        }
        CollectionAction::Refresh { name, args } => {
            refresh::refresh(state, domain, &name, &args).await
        }
        CollectionAction::Export {
            name,
            filter,
            format,
            file_name,
            dir,
        } => collections::export(state, domain, &name, &filter, format, file_name.as_deref(), dir).await,
        CollectionAction::Import { name, file } => {
            collections::import(state, domain, &name, file).await
        }
        CollectionAction::SyncRemote { name, remote } => {
            collections::sync_remote(state, domain, &name, &remote).await
        }
        CollectionAction::Clear { name, yes } => collections::clear(state, domain, &name, yes).await,
    }
}
