use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use campushub_core::config::{Config, ModerationConfig};
use campushub_core::core_content::ContentPublisher;
use campushub_core::core_membership::MembershipLedger;
use campushub_core::core_moderation::{ModerationGate, StaticClassifier};
use campushub_core::core_session::{spawn_session_manager, ProfileStore, StaticProvider};
use campushub_core::core_store::model::{ContainerId, UserId};
use campushub_core::core_store::Store;
use campushub_core::core_sync::RealtimeSync;
use campushub_core::logging::{init_logging_with_config, LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "campushub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Load and validate the configuration, then print a summary
    CheckConfig,

    /// Open the store and apply any pending schema migrations
    Migrate,

    /// Repair best-effort writes: creator memberships and missing
    /// moderation audits
    Reconcile,

    /// Run a local end-to-end walkthrough against a fresh in-memory store
    Demo {
        /// User id to act as
        #[arg(default_value = "demo-user")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = LogLevel::from_str(&args.log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });
    init_logging_with_config(LogConfig::new(log_level).json_format(args.json_logs))?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    match args.command {
        Some(Command::CheckConfig) => {
            info!(db_path = %config.store.db_path.display(), "store");
            info!(
                enabled = config.moderation.enabled,
                timeout = ?config.moderation.classifier_timeout,
                "moderation"
            );
            info!(admin_secret_set = !config.admin.secret.is_empty(), "admin gate");
            println!("configuration ok");
        }
        Some(Command::Migrate) => {
            let store = Store::open(&config.store.db_path)
                .with_context(|| format!("opening {}", config.store.db_path.display()))?;
            drop(store);
            info!(db_path = %config.store.db_path.display(), "schema up to date");
        }
        Some(Command::Reconcile) => {
            let store = Store::open(&config.store.db_path)
                .with_context(|| format!("opening {}", config.store.db_path.display()))?;
            let ledger = MembershipLedger::new(store.clone());
            let gate = ModerationGate::disabled(store.clone());

            let memberships = ledger.reconcile_creator_memberships().await?;
            let audits = gate.reconcile_missing_audits()?;
            info!(memberships, audits, "reconciliation complete");
        }
        Some(Command::Demo { user }) => {
            run_demo(&user, &config.moderation).await?;
        }
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}

/// Exercise the whole pipeline against an in-memory store: sign in, build
/// a community with a club, subscribe, and publish a post. The demo has
/// no remote classifier, so an always-clean stand-in sits behind the
/// configured moderation settings.
async fn run_demo(user: &str, moderation: &ModerationConfig) -> Result<()> {
    let user_id = UserId::new(user);
    let store = Store::memory()?;

    let (_event_tx, event_rx) = mpsc::channel(8);
    let session = spawn_session_manager(
        Arc::new(StaticProvider::signed_in(user_id.clone(), user)),
        event_rx,
        ProfileStore::new(store.clone()),
        String::new(),
    );
    let ledger = MembershipLedger::new(store.clone());
    let gate = ModerationGate::from_config(
        store.clone(),
        moderation,
        Arc::new(StaticClassifier::approving()),
    );
    let publisher = ContentPublisher::new(store.clone(), session, ledger.clone(), gate);
    let sync = RealtimeSync::new(store.clone());

    let community = ledger
        .create_community("Demo Community", "Demo College", Some(&user_id))
        .await?;
    ledger.join_community(&user_id, &community.id).await?;
    let created = ledger
        .create_club("Demo Club", Some("a club to post in"), &community.id, &user_id)
        .await?;
    if !created.creator_joined {
        warn!(club_id = %created.club.id, "creator join did not land; reconcile will repair it");
    }
    let container = ContainerId::Club(created.club.id.clone());

    let mut subscription = sync.subscribe(&container, &user_id);
    let item = publisher
        .publish(&user_id, &container, "hello from the demo")
        .await?;
    info!(content_id = %item.id, status = ?item.status, "published");

    if let Some(delivery) = subscription.recv().await {
        let delivered = delivery.item();
        println!("[{}] {}: {}", delivered.created_at, delivered.author, delivered.body);
    }
    subscription.unsubscribe();

    info!("demo complete");
    Ok(())
}
