//! # Lifesign — safety check-in deadline scheduler
//!
//! Watches registered users' check-in deadlines and alerts their accepted
//! emergency contacts over push and email when a deadline is missed.
//!
//! Usage:
//!   lifesign                          # Run the scheduler daemon
//!   lifesign --config my.toml         # Custom config file
//!   lifesign --scan-once              # Run a single scan tick and exit
//!   lifesign --sweep-once             # Run a single retention sweep and exit

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lifesign_channels::{Mailer, PushClient};
use lifesign_core::crypto::AesCrypto;
use lifesign_core::LifesignConfig;
use lifesign_scheduler::Scheduler;
use lifesign_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "lifesign",
    version,
    about = "🕐 Lifesign — safety check-in deadline scheduler"
)]
struct Cli {
    /// Config file path (default: ~/.lifesign/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Run a single deadline scan tick and exit
    #[arg(long)]
    scan_once: bool,

    /// Run a single retention sweep and exit
    #[arg(long)]
    sweep_once: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "lifesign=debug,lifesign_scheduler=debug,lifesign_store=debug,lifesign_channels=debug"
    } else {
        "lifesign=info,lifesign_scheduler=info,lifesign_store=info,lifesign_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => LifesignConfig::load_from(std::path::Path::new(&expand_path(path)))?,
        None => LifesignConfig::load()?,
    };

    let db_path = expand_path(cli.db_path.as_deref().unwrap_or(&config.database_path));
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Prefer LIFESIGN_MASTER_KEY env var over the config file
    let master_key = std::env::var("LIFESIGN_MASTER_KEY").unwrap_or(config.master_key.clone());
    if master_key.is_empty() {
        tracing::warn!("⚠️  No master key set! Set LIFESIGN_MASTER_KEY for production.");
    }

    let store = Arc::new(SqliteStore::open(std::path::Path::new(&db_path))?);
    let push = Arc::new(PushClient::new(config.push.clone()));
    let email = Arc::new(Mailer::new(config.email.clone()));
    let crypto = Arc::new(AesCrypto::new(&master_key));

    let mut scheduler =
        Scheduler::new(store, push, email.clone(), crypto, config.scheduler.clone());

    if cli.scan_once {
        let summary = scheduler.scan_once(chrono::Utc::now()).await;
        println!(
            "Scan complete: {} overdue, {} alerted, {} failed, {} reminders",
            summary.overdue, summary.alerted, summary.failed, summary.reminders_sent
        );
        return Ok(());
    }
    if cli.sweep_once {
        scheduler.sweep_once(chrono::Utc::now()).await;
        println!("Sweep complete");
        return Ok(());
    }

    println!("🕐 Lifesign v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database:  {db_path}");
    println!("   ⏰ Scan:      every {}s", config.scheduler.scan_interval_secs);
    println!("   🧹 Sweep:     every {}s", config.scheduler.sweep_interval_secs);
    println!(
        "   📧 Email:     {}",
        if email.is_enabled() { "enabled" } else { "disabled" }
    );
    println!();

    scheduler.start();
    tokio::signal::ctrl_c().await?;
    scheduler.stop();

    Ok(())
}
