use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quota_sync::favorites::FavoriteRecord;
use quota_sync::quota::Identity;
use quota_sync::{SyncConfig, SyncEngine};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quota-sync")]
#[command(about = "Anonymous quota reconciliation and optimistic favorites")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("QUOTA_SYNC_GIT_SHA"), ")"))]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Config file (defaults to ~/.quota-sync/config.yaml, then built-in defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the remaining free actions after a fresh check
    Status,
    /// Pull the authoritative quota from the server
    Reconcile {
        /// Ignore the reconcile interval
        #[arg(long)]
        force: bool,
    },
    /// Record one quota-consuming action locally
    Consume,
    /// Run a quota-consuming action against the server
    Act {
        /// Action endpoint to POST to
        #[arg(long)]
        url: String,
        /// JSON request body
        #[arg(long, default_value = "{}")]
        body: String,
    },
    /// Add or remove a favorite
    Favorite {
        /// Item type (expert, trial, publication, ...)
        #[arg(long = "type")]
        item_type: String,
        /// Server id of the item
        #[arg(long)]
        id: String,
        /// Remove instead of add
        #[arg(long)]
        remove: bool,
    },
    /// Mark the actor as signed in (clears the anonymous counter)
    Login,
    /// Mark the actor as signed out (clears the anonymous counter)
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config =
        SyncConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    let engine = SyncEngine::from_config(config)?;

    match cli.command {
        Command::Status => {
            let presenter = engine.mount_presenter();
            presenter.initial_sync().await;
            println!("{}", presenter.render());
        }
        Command::Reconcile { force } => {
            let view = engine.reconciler().reconcile(force).await;
            println!("{}", view);
        }
        Command::Consume => {
            let view = engine.reconciler().consume_one();
            println!("{}", view);
        }
        Command::Act { url, body } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body must be valid JSON")?;
            match engine.perform_action(&url, body).await {
                Ok(view) => println!("{}", view),
                Err(e) => {
                    eprintln!("[quota-sync] {}", e);
                    println!("{}", engine.reconciler().cached_view());
                    std::process::exit(1);
                }
            }
        }
        Command::Favorite {
            item_type,
            id,
            remove,
        } => {
            let favorites = engine.favorites::<FavoriteRecord>(&item_type);
            if let Err(e) = favorites.load().await {
                eprintln!("[quota-sync] Warning: could not load favorites: {}", e);
            }
            let record = FavoriteRecord::new(&id);
            if favorites.is_favorite(&record) != remove {
                let state = if remove { "not" } else { "already" };
                println!("{} {} is {} a favorite", item_type, id, state);
                return Ok(());
            }
            let outcome = favorites.toggle(record).await;
            if let Some(notice) = favorites.notice_for(&outcome) {
                println!("{}", notice);
            }
            if !outcome.is_committed() {
                std::process::exit(1);
            }
        }
        Command::Login => {
            engine.set_identity(Identity::Authenticated);
            println!("{}", engine.reconciler().cached_view());
        }
        Command::Logout => {
            engine.set_identity(Identity::Anonymous);
            println!("{}", engine.reconciler().cached_view());
        }
    }

    Ok(())
}
