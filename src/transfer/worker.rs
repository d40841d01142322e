//! Recovery Worker
//!
//! Background worker that resolves transfers left in a non-terminal journal
//! state: a process crash mid-saga, a debit with unknown outcome, or a
//! refund that failed every synchronous attempt.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::coordinator::TransferOrchestrator;
use super::error::TransferError;
use super::state::TransferState;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan for stale transfers
    pub scan_interval: Duration,
    /// How long a transfer must be untouched to be considered stale
    pub stale_threshold: Duration,
    /// Maximum transfers to process per scan
    pub batch_size: usize,
    /// Retries on a pending refund before alerting
    pub alert_after_retries: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(60),
            batch_size: 100,
            alert_after_retries: 10,
        }
    }
}

pub struct RecoveryWorker {
    orchestrator: Arc<TransferOrchestrator>,
    config: WorkerConfig,
}

impl RecoveryWorker {
    pub fn new(orchestrator: Arc<TransferOrchestrator>, config: WorkerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn with_defaults(orchestrator: Arc<TransferOrchestrator>) -> Self {
        Self::new(orchestrator, WorkerConfig::default())
    }

    /// Run the recovery loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            "Starting recovery worker"
        );

        loop {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan. Returns how many transfers changed state.
    pub async fn scan_and_recover(&self) -> Result<usize, TransferError> {
        let journal = self.orchestrator.journal();
        let stale = journal
            .find_stale(self.config.stale_threshold, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale transfers found");
            return Ok(0);
        }

        info!(count = stale.len(), "Found stale transfers to recover");

        let mut recovered = 0;

        for record in &stale {
            debug!(
                transfer_id = %record.transfer_id,
                state = %record.state,
                retry_count = record.retry_count,
                "Recovering transfer"
            );

            match self.orchestrator.resume(record).await {
                Ok(new_state) if new_state != record.state => {
                    info!(
                        transfer_id = %record.transfer_id,
                        old_state = %record.state,
                        new_state = %new_state,
                        "Transfer state advanced"
                    );
                    recovered += 1;
                }
                Ok(_) => {
                    if let Err(e) = journal.increment_retry(record.transfer_id).await {
                        error!(
                            transfer_id = %record.transfer_id,
                            error = %e,
                            "Failed to count recovery retry"
                        );
                        continue;
                    }
                    let retries = record.retry_count + 1;

                    if record.state == TransferState::Compensating
                        && retries >= self.config.alert_after_retries
                    {
                        error!(
                            alert = "compensation_failure",
                            transfer_id = %record.transfer_id,
                            account_id = %record.from,
                            amount = %record.amount,
                            retry_count = retries,
                            "CRITICAL: pending refund still unresolved, manual reconciliation required"
                        );
                    } else {
                        warn!(
                            transfer_id = %record.transfer_id,
                            state = %record.state,
                            retry_count = retries,
                            "Transfer made no progress (will retry)"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        transfer_id = %record.transfer_id,
                        error = %e,
                        "Failed to recover transfer"
                    );
                }
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered transfers this scan");
        }

        Ok(recovered)
    }
}
