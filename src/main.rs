//! Funds Transfer service
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │ Gateway  │───▶│ Orchestrator │───▶│  Ledger  │
//! │ (axum)   │    │   (saga)     │    │ mem / pg │
//! └──────────┘    └──────┬───────┘    └──────────┘
//!                        │ journal
//!                 ┌──────▼───────┐
//!                 │RecoveryWorker│
//!                 └──────────────┘
//! ```
//!
//! Usage: `funds_transfer [--env dev]`

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use funds_transfer::auth::JwtAuthGate;
use funds_transfer::config::{AppConfig, RecoveryConfig, SeedAccount};
use funds_transfer::core_types::AccountId;
use funds_transfer::db::Database;
use funds_transfer::gateway::{self, AppState};
use funds_transfer::ledger::{AccountLedger, LedgerError, MemoryLedger, PgLedger};
use funds_transfer::transfer::{
    MemoryJournal, PgJournal, RecoveryWorker, TransferJournal, TransferOrchestrator,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn open_backends(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn AccountLedger>, Arc<dyn TransferJournal>)> {
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.ensure_schema()
                .await
                .context("Failed to create schema")?;
            info!("Using PostgreSQL ledger and journal");
            let ledger: Arc<dyn AccountLedger> = Arc::new(PgLedger::new(db.pool().clone()));
            let journal: Arc<dyn TransferJournal> = Arc::new(PgJournal::new(db.pool().clone()));
            Ok((ledger, journal))
        }
        None => {
            warn!("No postgres_url configured, using in-memory ledger and journal");
            let memory_ledger = Arc::new(MemoryLedger::new());
            let memory_journal = Arc::new(MemoryJournal::new());
            spawn_housekeeping(memory_ledger.clone(), memory_journal.clone(), &config.recovery);
            let ledger: Arc<dyn AccountLedger> = memory_ledger;
            let journal: Arc<dyn TransferJournal> = memory_journal;
            Ok((ledger, journal))
        }
    }
}

/// Keep the in-memory backend bounded: drop settled transfers and their
/// ledger op keys once the retention period has passed
fn spawn_housekeeping(
    ledger: Arc<MemoryLedger>,
    journal: Arc<MemoryJournal>,
    recovery: &RecoveryConfig,
) {
    let retain = Duration::from_secs(recovery.retain_settled_secs);
    let interval = Duration::from_secs(recovery.scan_interval_secs.max(1));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let pruned = journal.prune_terminal(retain);
            if !pruned.is_empty() {
                ledger.forget_transfers(&pruned);
                info!(count = pruned.len(), "Pruned settled transfers");
            }
        }
    });
}

async fn seed_accounts(ledger: &dyn AccountLedger, seeds: &[SeedAccount]) -> anyhow::Result<()> {
    for seed in seeds {
        let id = AccountId::new(seed.id.trim());
        match ledger.open_account(id, &seed.name, seed.balance).await {
            Ok(account) => info!(account_id = %account.id, balance = %account.balance, "Seeded account"),
            Err(LedgerError::AlreadyExists(id)) => info!(account_id = %id, "Account already exists"),
            Err(e) => return Err(e).with_context(|| format!("Failed to seed {}", seed.id)),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = funds_transfer::logging::init_logging(&config);

    info!("Starting funds transfer service in {} mode", env);

    let (ledger, journal) = open_backends(&config).await?;
    seed_accounts(ledger.as_ref(), &config.seed_accounts).await?;

    let orchestrator = Arc::new(TransferOrchestrator::new(
        ledger,
        journal,
        config.transfer.orchestrator_config(),
    ));

    if config.recovery.enabled {
        let worker = RecoveryWorker::new(orchestrator.clone(), config.recovery.worker_config());
        tokio::spawn(async move {
            worker.run().await;
        });
        info!("Recovery worker started");
    } else {
        warn!("Recovery worker disabled; stuck transfers will not be resumed");
    }

    let auth = Arc::new(JwtAuthGate::new(&config.auth.jwt_secret));
    let state = Arc::new(AppState::new(orchestrator, auth));

    gateway::run_server(&config.gateway, state).await
}
